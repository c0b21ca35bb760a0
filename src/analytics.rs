use async_trait::async_trait;
use log::debug;
use serde_json::Value;

/// Observer notified about game lifecycle changes. Calls are made from a
/// spawned task after the game lock is released, so a slow hook never holds
/// up play.
#[async_trait]
pub trait AnalyticsHook: Send + Sync {
    async fn on_game_start(&self, _game_id: &str, _data: Value) {}

    async fn on_state_update(&self, _game_id: &str, _data: Value) {}

    async fn on_game_end(&self, _game_id: &str, _data: Value) {}
}

/// Discards everything
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsHook for NoopAnalytics {}

/// Writes a debug line per notification
pub struct LogAnalytics;

#[async_trait]
impl AnalyticsHook for LogAnalytics {
    async fn on_game_start(&self, game_id: &str, data: Value) {
        debug!("📊 game {} started: {}", game_id, data);
    }

    async fn on_state_update(&self, game_id: &str, data: Value) {
        debug!(
            "📊 game {} now in {}",
            game_id,
            data.get("phase").unwrap_or(&Value::Null)
        );
    }

    async fn on_game_end(&self, game_id: &str, data: Value) {
        debug!("📊 game {} finished: {}", game_id, data);
    }
}
