use anyhow::Context;
use clap::Parser;
use tenant_secrets::{
    cli::{run_command, Cli},
    observability::{init_tracing, log_config_info, shutdown_tracing},
    AppConfig, SecretService, APP_NAME, VERSION,
};
use tracing::{debug, error};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let tracer_provider =
        init_tracing(&config.observability).context("failed to initialize tracing")?;
    debug!(app_name = APP_NAME, version = VERSION, "Starting tenant secrets CLI");
    log_config_info(&config);

    let service = match SecretService::from_config(&config.vault).await {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "Failed to initialize secret service");
            shutdown_tracing(tracer_provider);
            return Err(e).context("failed to initialize secret service");
        }
    };

    let mut stdout = std::io::stdout().lock();
    let result = run_command(&service, &cli.command, &mut stdout).await;

    service.shutdown().await;
    shutdown_tracing(tracer_provider);

    result.context("command failed")
}
