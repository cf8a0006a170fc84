use async_trait::async_trait;
use tracing::info;

/// Post-commit announcement hook. Invoked once per successful save,
/// fire-and-forget: a failing notifier never fails the save.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn announce(&self, event: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// Default notifier: announcements go to the log stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl EventNotifier for TracingNotifier {
    async fn announce(&self, event: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        info!(event, payload = %payload, "event announced");
        Ok(())
    }
}
