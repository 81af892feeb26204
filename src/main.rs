//! `chitti-sweeper` - periodically deactivates expired group subscriptions.

use chitti::config::{database, plans, settings};
use chitti::core::subscription::close_expired_subscriptions;
use chitti::errors::Result;
use dotenvy::dotenv;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Connect and make sure the schema exists
    let database_url = database::get_database_url(app_config.database_url.as_deref());
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))?;

    // 5. Seed the plan catalog
    plans::seed_plans(&db, &app_config.plans).await?;

    // 6. Sweep until Ctrl-C
    let mut interval = tokio::time::interval(Duration::from_secs(app_config.sweep_interval_secs));
    info!(
        every_secs = app_config.sweep_interval_secs,
        "Subscription sweeper started"
    );
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match close_expired_subscriptions(&db, chrono::Utc::now()).await {
                    Ok(closed) => info!(closed, "Sweep finished"),
                    Err(e) => error!("Sweep failed: {}", e),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    db.close().await?;
    Ok(())
}
