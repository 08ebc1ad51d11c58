//! Engines that act on payments: reconciling provider notifications,
//! sending payouts, watching them settle and notifying merchants.

mod confirmation_watcher;
mod notification_sender;
mod outbound;
mod reconciler;

pub use confirmation_watcher::{CheckOutcome, ConfirmationWatcher};
pub use notification_sender::{
    build_notification, calculate_retry_delay, NotificationError, NotificationSender,
};
pub use outbound::{OutboundError, PayoutRequest, Payouts, SignedTransfer};
pub use reconciler::{
    ReconcileError, ReconcileOutcome, Reconciler, SkipReason, WebhookTarget,
};
