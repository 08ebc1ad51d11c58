pub mod admin;
pub mod blockchains;
pub mod transactions;
pub mod webhook;

pub use blockchains::{Blockchain, ChainFamily, UnknownBlockchain};
pub use transactions::{TransactionStatus, TransactionType};
pub use webhook::{NotificationKind, PaymentNotification, ProviderWebhook, ProviderWebhookKind};
