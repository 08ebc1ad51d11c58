use super::{confirmation_threshold, rejected, BroadcastError, BroadcastStrategy, Receipt};
use crate::config::{ConfirmationPolicy, NetworkPair};
use crate::currency::CryptoCurrency;
use crate::fees::SOLANA_LAMPORTS_PER_SIGNATURE;
use crate::money::CryptoAmount;
use crate::rpc::{SignatureStatus, SolanaRpc};
use crate::utils::{cancelled, is_cancelled};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Submits through `sendTransaction` and waits for the cluster to confirm
/// the signature, polling at most `policy.max_attempts` times.
pub struct SolanaBroadcaster {
    rpc: NetworkPair<Arc<dyn SolanaRpc>>,
    native: CryptoCurrency,
    policy: ConfirmationPolicy,
}

impl SolanaBroadcaster {
    pub fn new(
        native: CryptoCurrency,
        rpc: NetworkPair<Arc<dyn SolanaRpc>>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            rpc,
            native,
            policy,
        }
    }

    /// The fee the cluster charged, or the single-signature fee when the
    /// node has no metadata for the transaction.
    async fn charged_fee(&self, rpc: &dyn SolanaRpc, signature: &str) -> u64 {
        match rpc.transaction_fee(signature).await {
            Ok(Some(lamports)) => lamports,
            Ok(None) => SOLANA_LAMPORTS_PER_SIGNATURE,
            Err(e) => {
                warn!(signature, error = %e, "Transaction fee lookup failed");
                SOLANA_LAMPORTS_PER_SIGNATURE
            }
        }
    }

    fn to_receipt(
        &self,
        signature: &str,
        status: &SignatureStatus,
        fee_lamports: u64,
    ) -> Result<Receipt, BroadcastError> {
        let threshold = confirmation_threshold(self.native.blockchain).unwrap_or(32);
        let fee = CryptoAmount::from_u128_units(
            self.native.ticker.clone(),
            u128::from(fee_lamports),
            self.native.decimals,
        )?;
        Ok(Receipt {
            hash: signature.to_owned(),
            sender: None,
            recipient: None,
            fee,
            // rooted blocks report no count
            confirmations: status.confirmations.unwrap_or(threshold),
            // a failed transaction is still confirmed once committed
            is_confirmed: status.is_confirmed(),
            success: !status.failed(),
        })
    }
}

#[async_trait]
impl BroadcastStrategy for SolanaBroadcaster {
    async fn broadcast(&self, raw: &str, is_test: bool) -> Result<String, BroadcastError> {
        self.rpc
            .select(is_test)
            .send_transaction(raw)
            .await
            .map_err(|e| rejected(self.native.blockchain, raw, is_test, e))
    }

    async fn receipt(
        &self,
        hash: &str,
        is_test: bool,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Receipt, BroadcastError> {
        let rpc = self.rpc.select(is_test);
        let mut cancel = cancel.clone();

        for attempt in 1..=self.policy.max_attempts {
            if is_cancelled(&cancel) {
                return Err(BroadcastError::Cancelled);
            }
            match rpc.signature_status(hash).await {
                Ok(Some(status)) if status.is_confirmed() => {
                    debug!(signature = hash, attempt, failed = status.failed(), "Signature settled");
                    let fee = self.charged_fee(rpc.as_ref(), hash).await;
                    return self.to_receipt(hash, &status, fee);
                }
                Ok(_) => debug!(signature = hash, attempt, "Signature not confirmed yet"),
                Err(e) => warn!(signature = hash, attempt, error = %e, "Signature status query failed"),
            }
            if attempt == self.policy.max_attempts {
                break;
            }
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return Err(BroadcastError::Cancelled),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }

        Err(BroadcastError::ConfirmationTimeout {
            hash: hash.to_owned(),
            attempts: self.policy.max_attempts,
        })
    }
}
