pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;

use anyhow::Context;
use clap::Parser;
pub use config::Config;
use db::Store;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "ridedesk")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let cli = cli::Cli::parse();

    match cli.command.unwrap_or(cli::Commands::Serve) {
        cli::Commands::Serve => serve(config, prometheus_handle).await,
        cli::Commands::Init => {
            if Config::create_default_if_missing()? {
                println!("Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists, leaving it untouched.");
            }
            Ok(())
        }
        cli::Commands::ResetPassword { email } => reset_password(&config, &email).await,
    }
}

async fn serve(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "RideDesk v{} starting on port {}",
        env!("CARGO_PKG_VERSION"),
        config.server.port
    );

    let port = config.server.port;
    let state = api::create_app_state(config, prometheus_handle).await?;
    let app = api::router(state).await;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server_handle = tokio::spawn(async move {
        info!("Admin API listening at http://0.0.0.0:{port}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {e}");
        }
    });

    info!("Press Ctrl+C to stop.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    server_handle.abort();
    info!("Stopped");

    Ok(())
}

/// Resets an operator's password to a freshly generated temporary one and
/// forces a change on next login.
async fn reset_password(config: &Config, email: &str) -> anyhow::Result<()> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let Some(user) = store.get_user_by_email(email).await? else {
        anyhow::bail!("No account found for {email}");
    };

    let temp_password = db::repositories::user::generate_auth_code();
    store
        .reset_user_password(&user.email, &temp_password, &config.security)
        .await?;

    println!("Temporary password for {}: {temp_password}", user.email);
    println!("The user must change it on next login.");

    Ok(())
}
