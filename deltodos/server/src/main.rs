#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let config = deltodos_server::config::Config::from_env()?;
    deltodos_server::web::start_web_server(config).await
}
