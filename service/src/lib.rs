use config::Config;
use events::EventPublisher;
use hub::Manager;
use log::info;
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Start the live-update hub sized from configuration.
pub fn init_live_manager(config: &Config) -> Manager {
    info!(
        "Live updates: queue capacity {}, student transport {}, SSE keep-alive {}s",
        config.subscriber_queue_capacity(),
        config.student_transport,
        config.sse_keep_alive_secs,
    );
    Manager::spawn(config.subscriber_queue_capacity())
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub live_manager: Manager,
    pub event_publisher: Arc<EventPublisher>,
}

impl AppState {
    pub fn new(app_config: Config, live_manager: Manager, event_publisher: EventPublisher) -> Self {
        Self {
            config: app_config,
            live_manager,
            event_publisher: Arc::new(event_publisher),
        }
    }
}
