//! NotificationSender processor.
//!
//! The NotificationSender is responsible for:
//! - Receiving `PaymentEvent` from the queue
//! - Looking up the transaction and the owning merchant's endpoint
//! - Sending HTTP POST requests with a signed body
//! - Handling retries with exponential backoff (2^0 to 2^11 seconds)
//!
//! Deliveries are retried in the background so a slow merchant endpoint
//! never holds up the queue. Retries stop at shutdown.

use crate::collaborators::MerchantDirectory;
use crate::config::MerchantContact;
use crate::currency::{CurrencyError, CurrencyRegistry};
use crate::entities::transaction::Transaction;
use crate::events::{PaymentEvent, PaymentEventReceiver};
use crate::money::{AmountError, CryptoAmount};
use crate::rpc::http_client;
use crate::store::{PaymentStore, StoreError};
use crate::utils::{backoff_delay, cancelled};
use chainpay_sdk::objects::{NotificationKind, PaymentNotification};
use chainpay_sdk::signature::{SignedObject, SIGNATURE_HEADER};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Maximum retry attempts (2^11 = 2048 seconds max backoff)
const MAX_RETRY_COUNT: u32 = 11;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during notification delivery.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transaction {0} not found")]
    TransactionNotFound(i64),

    #[error("merchant {0} is not configured")]
    MerchantNotFound(i64),

    /// Delivery failed (non-2xx status)
    #[error("notification delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },

    /// Payload serialization error
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// A signed notification ready to be POSTed.
#[derive(Debug, Clone)]
struct Delivery {
    transaction_id: i64,
    url: String,
    body: String,
    signature: String,
}

/// Build the merchant-facing payload for `transaction`.
pub fn build_notification(
    transaction: &Transaction,
    merchant_id: i64,
    kind: NotificationKind,
    currencies: &CurrencyRegistry,
) -> Result<PaymentNotification, NotificationError> {
    let currency = currencies.by_ticker(&transaction.currency)?;
    let amount = CryptoAmount::from_units(
        currency.ticker.clone(),
        transaction.amount,
        currency.decimals,
    )?;
    Ok(PaymentNotification {
        event_type: kind,
        transaction_id: transaction.uuid,
        merchant_id,
        blockchain: transaction.blockchain.into(),
        ticker: currency.ticker.to_string(),
        amount: amount.to_decimal().normalize().to_string(),
        network_id: transaction.network_id.clone(),
        is_test: transaction.is_test,
        transaction_type: transaction.tx_type.into(),
        status: transaction.status.into(),
        transaction_hash: transaction.hash.clone(),
        sender_address: transaction.sender_address.clone(),
        recipient_address: transaction.recipient_address.clone(),
        timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
    })
}

/// NotificationSender delivers payment events to merchant endpoints.
pub struct NotificationSender {
    store: Arc<dyn PaymentStore>,
    merchants: Arc<dyn MerchantDirectory>,
    currencies: Arc<CurrencyRegistry>,
    event_rx: PaymentEventReceiver,
    shutdown_rx: watch::Receiver<bool>,
    http_client: reqwest::Client,
}

impl NotificationSender {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        merchants: Arc<dyn MerchantDirectory>,
        currencies: Arc<CurrencyRegistry>,
        event_rx: PaymentEventReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            merchants,
            currencies,
            event_rx,
            shutdown_rx,
            http_client: http_client(REQUEST_TIMEOUT),
        }
    }

    /// Run the NotificationSender.
    pub async fn run(mut self) {
        info!("NotificationSender started");
        let mut deliveries = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("NotificationSender received shutdown signal");
                        break;
                    }
                }

                Some(event) = self.event_rx.recv() => {
                    debug!(event = ?event, "Received PaymentEvent");

                    match self.prepare(event).await {
                        Ok(Some(delivery)) => {
                            let client = self.http_client.clone();
                            let shutdown_rx = self.shutdown_rx.clone();
                            deliveries.spawn(deliver_with_retry(client, delivery, shutdown_rx));
                        }
                        Ok(None) => {}
                        Err(e) => error!(
                            transaction_id = event.transaction_id,
                            error = %e,
                            "Failed to prepare notification"
                        ),
                    }
                }

                Some(_) = deliveries.join_next(), if !deliveries.is_empty() => {}

                else => {
                    info!("PaymentEvent channel closed");
                    break;
                }
            }
        }

        // in-flight deliveries observe the same shutdown signal
        while deliveries.join_next().await.is_some() {}

        info!("NotificationSender shutdown complete");
    }

    /// `None` when nobody is to be notified.
    async fn prepare(&self, event: PaymentEvent) -> Result<Option<Delivery>, NotificationError> {
        let transaction = self
            .store
            .transaction(event.transaction_id)
            .await?
            .ok_or(NotificationError::TransactionNotFound(event.transaction_id))?;
        let Some(merchant_id) = transaction.merchant_id else {
            debug!(
                transaction_id = transaction.id,
                "Transaction has no merchant, skipping notification"
            );
            return Ok(None);
        };
        let merchant = self
            .merchants
            .merchant(merchant_id)
            .await
            .ok_or(NotificationError::MerchantNotFound(merchant_id))?;

        let payload = build_notification(&transaction, merchant_id, event.kind, &self.currencies)?;
        Ok(Some(sign(transaction.id, &merchant, payload)?))
    }
}

fn sign(
    transaction_id: i64,
    merchant: &MerchantContact,
    payload: PaymentNotification,
) -> Result<Delivery, NotificationError> {
    let signed = SignedObject::new(payload, merchant.secret_bytes())?;
    Ok(Delivery {
        transaction_id,
        url: merchant.notify_url.to_string(),
        signature: signed.to_header(),
        body: signed.json,
    })
}

async fn deliver_with_retry(
    client: reqwest::Client,
    delivery: Delivery,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    for attempt in 0..=MAX_RETRY_COUNT {
        match send_notification(&client, &delivery).await {
            Ok(()) => {
                info!(
                    transaction_id = delivery.transaction_id,
                    retry_count = attempt,
                    "Notification delivered successfully"
                );
                return;
            }
            Err(e) => {
                warn!(
                    transaction_id = delivery.transaction_id,
                    error = %e,
                    retry_count = attempt,
                    "Notification delivery failed"
                );
            }
        }
        if attempt == MAX_RETRY_COUNT {
            break;
        }
        tokio::select! {
            biased;
            _ = cancelled(&mut shutdown_rx) => {
                warn!(transaction_id = delivery.transaction_id, "Notification retry abandoned at shutdown");
                return;
            }
            _ = tokio::time::sleep(calculate_retry_delay(attempt)) => {}
        }
    }
    error!(
        transaction_id = delivery.transaction_id,
        url = %delivery.url,
        "Giving up on notification"
    );
}

/// Send the notification HTTP request.
async fn send_notification(
    client: &reqwest::Client,
    delivery: &Delivery,
) -> Result<(), NotificationError> {
    let response = client
        .post(&delivery.url)
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, &delivery.signature)
        .body(delivery.body.clone())
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(NotificationError::DeliveryFailed {
            status: status.as_u16(),
            body,
        })
    }
}

/// Calculate the next retry delay based on retry count.
///
/// Uses exponential backoff: 2^retry_count seconds.
pub fn calculate_retry_delay(retry_count: u32) -> Duration {
    backoff_delay(retry_count, MAX_RETRY_COUNT)
}
