pub(crate) mod health_check_controller;
pub(crate) mod live_stats_controller;
pub(crate) mod notify_controller;
