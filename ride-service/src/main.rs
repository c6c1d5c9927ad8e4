use ride_service::config::Config;
use ride_service::services::init_metrics;
use ride_service::Application;
use service_core::observability::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(
        &config.service_name,
        &config.observability.log_level,
        config.observability.otlp_endpoint.as_deref(),
    );
    init_metrics();

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
