use crate::entities::ChainName;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// A custodial wallet whose keys live in the signing service.
///
/// Pending/confirmed counters are tracked per network class and together
/// give the next account nonce.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct HotWallet {
    pub id: i64,
    pub uuid: Uuid,
    pub merchant_id: Option<i64>,
    pub blockchain: ChainName,
    pub address: String,
    pub confirmed_mainnet_txs: i64,
    pub pending_mainnet_txs: i64,
    pub confirmed_testnet_txs: i64,
    pub pending_testnet_txs: i64,
    pub is_active: bool,
    pub created_at: time::PrimitiveDateTime,
}

/// Snapshot of a wallet's outbound counters on one network class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct NonceCounters {
    pub confirmed: i64,
    pub pending: i64,
}

impl HotWallet {
    pub fn counters(&self, is_test: bool) -> NonceCounters {
        if is_test {
            NonceCounters {
                confirmed: self.confirmed_testnet_txs,
                pending: self.pending_testnet_txs,
            }
        } else {
            NonceCounters {
                confirmed: self.confirmed_mainnet_txs,
                pending: self.pending_mainnet_txs,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetHotWalletByUuid {
    pub uuid: Uuid,
}

impl Processor<GetHotWalletByUuid> for DatabaseProcessor {
    type Output = Option<HotWallet>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetHotWalletByUuid")]
    async fn process(&self, query: GetHotWalletByUuid) -> Result<Option<HotWallet>, sqlx::Error> {
        sqlx::query_as::<_, HotWallet>("SELECT * FROM hot_wallets WHERE uuid = $1 AND is_active")
            .bind(query.uuid)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetHotWalletById {
    pub id: i64,
}

impl Processor<GetHotWalletById> for DatabaseProcessor {
    type Output = Option<HotWallet>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetHotWalletById")]
    async fn process(&self, query: GetHotWalletById) -> Result<Option<HotWallet>, sqlx::Error> {
        sqlx::query_as::<_, HotWallet>("SELECT * FROM hot_wallets WHERE id = $1")
            .bind(query.id)
            .fetch_optional(&self.pool)
            .await
    }
}

/// How to move a wallet's outbound counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterChange {
    /// Reserve a nonce slot: pending + 1.
    Reserve,
    /// Give a slot back after a failed attempt: pending - 1, floored at zero.
    Release,
    /// The transaction landed on chain: pending - 1, confirmed + 1.
    Commit,
}

/// Atomically apply a [`CounterChange`] and return the counters after it.
#[derive(Debug, Clone)]
pub struct UpdateNonceCounters {
    pub wallet_id: i64,
    pub is_test: bool,
    pub change: CounterChange,
}

impl Processor<UpdateNonceCounters> for DatabaseProcessor {
    type Output = Option<NonceCounters>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateNonceCounters")]
    async fn process(&self, command: UpdateNonceCounters) -> Result<Option<NonceCounters>, sqlx::Error> {
        let (pending, confirmed) = if command.is_test {
            ("pending_testnet_txs", "confirmed_testnet_txs")
        } else {
            ("pending_mainnet_txs", "confirmed_mainnet_txs")
        };
        let assignments = match command.change {
            CounterChange::Reserve => format!("{pending} = {pending} + 1"),
            CounterChange::Release => format!("{pending} = GREATEST({pending} - 1, 0)"),
            CounterChange::Commit => format!(
                "{pending} = GREATEST({pending} - 1, 0), {confirmed} = {confirmed} + 1"
            ),
        };
        let sql = format!(
            "UPDATE hot_wallets SET {assignments} WHERE id = $1 \
             RETURNING {confirmed} AS confirmed, {pending} AS pending"
        );
        sqlx::query_as::<_, NonceCounters>(&sql)
            .bind(command.wallet_id)
            .fetch_optional(&self.pool)
            .await
    }
}
