use events::EventPublisher;
use hub::domain_event_handler::LiveUpdateEventHandler;
use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logging: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting course selection live-update service ({} environment)",
        config.runtime_env()
    );
    if config.trust_identity_headers {
        info!("Trusting identity headers from the authenticating proxy");
    } else {
        warn!("Identity headers are not trusted; live-update endpoints will answer 401");
    }

    let live_manager = service::init_live_manager(&config);
    let event_publisher = EventPublisher::new().with_handler(Arc::new(
        LiveUpdateEventHandler::new(live_manager.clone()),
    ));

    let app_state = AppState::new(config, live_manager, event_publisher);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
