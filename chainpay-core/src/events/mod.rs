//! Events passed between the reconciliation engine and background
//! processors.
//!
//! # Event Flow
//!
//! 1. `Reconciler` settles an incoming payment -> `PaymentEvent`
//! 2. `ConfirmationWatcher` settles an outgoing transfer -> `PaymentEvent`
//! 3. `NotificationSender` receives `PaymentEvent` and notifies the merchant
//!
//! Events carry identifiers only; processors re-read the transaction from
//! the store.

use chainpay_sdk::objects::NotificationKind;
use tokio::sync::mpsc;

/// Buffer size of the event channel.
///
/// Producers use `try_send`, so a full buffer drops the notification
/// instead of stalling reconciliation.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// A transaction reached a state the merchant should hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentEvent {
    pub transaction_id: i64,
    pub kind: NotificationKind,
}

pub type PaymentEventSender = mpsc::Sender<PaymentEvent>;
pub type PaymentEventReceiver = mpsc::Receiver<PaymentEvent>;

pub fn payment_event_channel() -> (PaymentEventSender, PaymentEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Hand `event` to the notification pipeline without waiting.
pub fn emit(sender: &PaymentEventSender, event: PaymentEvent) {
    if let Err(e) = sender.try_send(event) {
        tracing::warn!(
            transaction_id = event.transaction_id,
            kind = %event.kind,
            error = %e,
            "Dropped payment event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let event = |id| PaymentEvent {
            transaction_id: id,
            kind: NotificationKind::PaymentReceived,
        };
        emit(&tx, event(1));
        emit(&tx, event(2));
        assert_eq!(rx.recv().await, Some(event(1)));
        assert!(rx.try_recv().is_err());
    }
}
