//! ConfirmationWatcher processor.
//!
//! The ConfirmationWatcher is responsible for:
//! - Periodically loading outgoing transactions that were broadcast but not
//!   settled yet
//! - Fetching their receipts through the broadcast engine
//! - Completing or failing them once the chain's confirmation depth is reached
//! - Committing the sending wallet's nonce reservation
//! - Emitting `PaymentEvent`s for settled withdrawals
//!
//! A hash the node no longer knows is parked as `InProgressInvalid` and kept
//! under watch; it moves back to `InProgress` if the transaction reappears.

use crate::broadcast::{BroadcastEngine, BroadcastError, Receipt};
use crate::config::ConfirmationPolicy;
use crate::entities::hot_wallet::CounterChange;
use crate::entities::transaction::Transaction;
use crate::entities::{TransactionStatus, WalletRef};
use crate::events::{emit, PaymentEvent, PaymentEventSender};
use crate::store::{PaymentStore, StoreError};
use crate::utils::is_cancelled;
use chainpay_sdk::objects::NotificationKind;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Rows checked per tick.
const BATCH_SIZE: i64 = 100;

/// What one check did to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Still waiting for confirmations, or the status query failed.
    Waiting,
    Settled(TransactionStatus),
    /// The node does not know the hash.
    Missing,
    Revived,
}

pub struct ConfirmationWatcher {
    store: Arc<dyn PaymentStore>,
    broadcaster: BroadcastEngine,
    events: PaymentEventSender,
    policy: ConfirmationPolicy,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConfirmationWatcher {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        broadcaster: BroadcastEngine,
        events: PaymentEventSender,
        policy: ConfirmationPolicy,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            events,
            policy,
            shutdown_rx,
        }
    }

    /// Run the ConfirmationWatcher.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.policy.watch_interval.as_secs(),
            "ConfirmationWatcher started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("ConfirmationWatcher received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(self.policy.watch_interval) => {
                    if let Err(e) = self.check_once().await {
                        error!(error = %e, "Failed to load in-progress transactions");
                    }
                }
            }
        }

        info!("ConfirmationWatcher shutdown complete");
    }

    /// Check every in-progress outgoing transaction once.
    pub async fn check_once(&self) -> Result<Vec<(i64, CheckOutcome)>, StoreError> {
        let transactions = self.store.in_progress_outgoing(BATCH_SIZE).await?;
        let mut outcomes = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            if is_cancelled(&self.shutdown_rx) {
                break;
            }
            let id = transaction.id;
            match self.check(transaction).await {
                Ok(Some(outcome)) => outcomes.push((id, outcome)),
                Ok(None) => break,
                Err(e) => error!(transaction_id = id, error = %e, "Failed to update transaction"),
            }
        }
        Ok(outcomes)
    }

    /// `None` when the check was cut short by shutdown.
    async fn check(&self, transaction: Transaction) -> Result<Option<CheckOutcome>, StoreError> {
        let Some(hash) = transaction.hash.as_deref() else {
            warn!(transaction_id = transaction.id, "In-progress transaction without hash");
            return Ok(Some(CheckOutcome::Waiting));
        };

        let receipt = self
            .broadcaster
            .get_transaction_receipt(
                transaction.blockchain.into(),
                hash,
                transaction.is_test,
                &self.shutdown_rx,
            )
            .await;

        match receipt {
            Ok(receipt) if receipt.is_confirmed => {
                self.settle(&transaction, &receipt).await.map(Some)
            }
            Ok(receipt) => {
                debug!(
                    transaction_id = transaction.id,
                    confirmations = receipt.confirmations,
                    "Waiting for confirmations"
                );
                if transaction.status == TransactionStatus::InProgressInvalid {
                    self.store
                        .finalize_transaction(transaction.id, TransactionStatus::InProgress, None)
                        .await?;
                    info!(transaction_id = transaction.id, "Transaction reappeared on chain");
                    return Ok(Some(CheckOutcome::Revived));
                }
                Ok(Some(CheckOutcome::Waiting))
            }
            Err(BroadcastError::NotFound(_)) => {
                if transaction.status == TransactionStatus::InProgress {
                    warn!(transaction_id = transaction.id, hash, "Broadcast transaction not found");
                    self.store
                        .finalize_transaction(
                            transaction.id,
                            TransactionStatus::InProgressInvalid,
                            None,
                        )
                        .await?;
                }
                Ok(Some(CheckOutcome::Missing))
            }
            Err(BroadcastError::Cancelled) => Ok(None),
            Err(e) => {
                warn!(transaction_id = transaction.id, hash, error = %e, "Receipt lookup failed");
                Ok(Some(CheckOutcome::Waiting))
            }
        }
    }

    async fn settle(
        &self,
        transaction: &Transaction,
        receipt: &Receipt,
    ) -> Result<CheckOutcome, StoreError> {
        let status = if receipt.success {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        let Some(settled) = self
            .store
            .finalize_transaction(transaction.id, status, Some(receipt.fee.units()))
            .await?
        else {
            // settled elsewhere in the meantime
            return Ok(CheckOutcome::Waiting);
        };

        // a reverted transfer still used up its nonce
        if let Some(WalletRef::Hot(wallet_id)) = settled.wallet() {
            self.store
                .update_nonce_counters(wallet_id, settled.is_test, CounterChange::Commit)
                .await?;
        }

        info!(
            transaction_id = settled.id,
            status = ?status,
            fee = %receipt.fee,
            confirmations = receipt.confirmations,
            "Withdrawal settled"
        );
        emit(
            &self.events,
            PaymentEvent {
                transaction_id: settled.id,
                kind: NotificationKind::WithdrawalSettled,
            },
        );
        Ok(CheckOutcome::Settled(status))
    }
}
