use gatehouse::configuration::get_config;
use gatehouse::expiry_worker::run_expiry_worker_until_stop;
use gatehouse::startup::Application;
use gatehouse::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() {
    let subscriber = get_subscriber("info".into(), std::io::stdout);
    init_subscriber(subscriber);

    dotenvy::dotenv().ok();

    let settings = get_config().expect("Failed to load configuration");

    let application = Application::build(settings.clone())
        .await
        .expect("Failed to build application");

    tokio::select! {
        outcome = application.run_until_stop() => {
            tracing::info!(?outcome, "The API stopped");
        }
        outcome = run_expiry_worker_until_stop(settings) => {
            tracing::info!(?outcome, "The expiry worker stopped");
        }
    };
}
