use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(proxy_port) = std::env::var("PROXY_PORT") {
        let addr = format!("127.0.0.1:{proxy_port}");
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "proxy listening");
        tokio::spawn(async move {
            if let Err(err) = mock_server::run_proxy(listener, mock_server::ProxyLog::default()).await {
                tracing::error!(error = %err, "proxy stopped");
            }
        });
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    mock_server::run(listener).await
}
