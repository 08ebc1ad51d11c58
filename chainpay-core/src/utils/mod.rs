use std::time::Duration;
use tokio::sync::watch;

/// Resolves once `signal` carries `true`. A dropped sender never cancels.
pub async fn cancelled(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn is_cancelled(signal: &watch::Receiver<bool>) -> bool {
    *signal.borrow()
}

/// Exponential backoff: `2^attempt` seconds, with the exponent capped at
/// `max_exponent`.
pub fn backoff_delay(attempt: u32, max_exponent: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt.min(max_exponent)))
}
