use plant_app::app::run;
use plant_core::config::ReminderConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let config = ReminderConfig::from_env().unwrap_or_default();
    if let Err(err) = run(config).await {
        eprintln!("Failed to start plant manager: {err:#}");
    }
}
