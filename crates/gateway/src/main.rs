use common::{TelemetryGuard, setup_logging};
use gateway::{AppState, GatewayConfig, run_server};
use inference::InferenceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init("gateway", endpoint, config.environment)?),
        None => {
            setup_logging(config.environment);
            None
        }
    };

    let inference_config = InferenceConfig::from_env()?;

    tracing::info!(
        environment = config.environment.as_str(),
        provider = %inference_config.execution_provider,
        "Gateway starting"
    );

    let state = AppState::new();
    state.spawn_model_loader(inference_config);

    run_server(&config, state).await
}
