use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("shoal: a minimal chat relay");

    // Bind address: SHOAL_BIND overrides the default IRC port.
    let bind = std::env::var("SHOAL_BIND").unwrap_or_else(|_| "0.0.0.0:6667".to_owned());

    shoal::irc::server::run(&[bind.as_str()]).await
}
