use crate::entities::{ChainName, TransactionStatus, TransactionType, WalletKind, WalletRef};
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

/// A ledger row: one incoming payment or one payout.
///
/// `amount` and `network_fee` are integers in the currency's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub uuid: Uuid,
    pub merchant_id: Option<i64>,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub blockchain: ChainName,
    pub network_id: String,
    pub currency: String,
    pub amount: Decimal,
    pub network_fee: Option<Decimal>,
    pub sender_address: Option<String>,
    pub recipient_address: String,
    pub hash: Option<String>,
    pub wallet_kind: Option<WalletKind>,
    pub wallet_id: Option<i64>,
    pub is_test: bool,
    /// Arrived without a pending counterpart; kept for manual follow-up.
    pub is_unexpected: bool,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

impl Transaction {
    pub fn wallet(&self) -> Option<WalletRef> {
        Some(WalletRef::from_parts(self.wallet_kind?, self.wallet_id?))
    }
}

/// Data for inserting a new transaction.
#[derive(Debug, Clone)]
pub struct TransactionInsert {
    pub merchant_id: Option<i64>,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub blockchain: ChainName,
    pub network_id: String,
    pub currency: String,
    pub amount: Decimal,
    pub sender_address: Option<String>,
    pub recipient_address: String,
    pub hash: Option<String>,
    pub wallet: Option<WalletRef>,
    pub is_test: bool,
    pub is_unexpected: bool,
}

impl TransactionInsert {
    pub(crate) fn into_row(self, id: i64) -> Transaction {
        let now = crate::entities::now_utc();
        Transaction {
            id,
            uuid: Uuid::now_v7(),
            merchant_id: self.merchant_id,
            tx_type: self.tx_type,
            status: self.status,
            blockchain: self.blockchain,
            network_id: self.network_id,
            currency: self.currency,
            amount: self.amount,
            network_fee: None,
            sender_address: self.sender_address,
            recipient_address: self.recipient_address,
            hash: self.hash,
            wallet_kind: self.wallet.map(WalletRef::kind),
            wallet_id: self.wallet.map(WalletRef::id),
            is_test: self.is_test,
            is_unexpected: self.is_unexpected,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for the pending incoming transaction a notification may settle.
///
/// Invoices on a hot wallet are matched by wallet; invoices on derived
/// addresses and collectors carry no wallet reference and match by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIncomingFilter {
    pub wallet: Option<WalletRef>,
    pub recipient_address: String,
    pub network_id: String,
    pub currency: String,
}

impl PendingIncomingFilter {
    pub(crate) fn matches(&self, tx: &Transaction) -> bool {
        tx.tx_type == TransactionType::Incoming
            && tx.status == TransactionStatus::Pending
            && tx.hash.is_none()
            && self.wallet.is_none_or(|wallet| tx.wallet() == Some(wallet))
            && tx.recipient_address.eq_ignore_ascii_case(&self.recipient_address)
            && tx.network_id == self.network_id
            && tx.currency == self.currency
    }
}

#[derive(Debug, Clone)]
pub struct GetTransactionById {
    pub id: i64,
}

impl Processor<GetTransactionById> for DatabaseProcessor {
    type Output = Option<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetTransactionById")]
    async fn process(&self, query: GetTransactionById) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(query.id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetTransactionByHash {
    pub network_id: String,
    pub hash: String,
}

impl Processor<GetTransactionByHash> for DatabaseProcessor {
    type Output = Option<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetTransactionByHash")]
    async fn process(
        &self,
        query: GetTransactionByHash,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE network_id = $1 AND hash = $2 LIMIT 1",
        )
        .bind(query.network_id)
        .bind(query.hash)
        .fetch_optional(&self.pool)
        .await
    }
}

impl Processor<PendingIncomingFilter> for DatabaseProcessor {
    type Output = Option<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindPendingIncoming")]
    async fn process(
        &self,
        filter: PendingIncomingFilter,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE tx_type = 'incoming'
              AND status = 'pending'
              AND hash IS NULL
              AND ($1::wallet_kind IS NULL OR (wallet_kind = $1 AND wallet_id = $2))
              AND lower(recipient_address) = lower($3)
              AND network_id = $4
              AND currency = $5
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(filter.wallet.map(WalletRef::kind))
        .bind(filter.wallet.map(WalletRef::id))
        .bind(filter.recipient_address)
        .bind(filter.network_id)
        .bind(filter.currency)
        .fetch_optional(&self.pool)
        .await
    }
}

const INSERT_TRANSACTION: &str = r#"
    INSERT INTO transactions (
        uuid, merchant_id, tx_type, status, blockchain, network_id, currency, amount,
        sender_address, recipient_address, hash, wallet_kind, wallet_id, is_test, is_unexpected
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
"#;

fn bind_insert<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, Transaction, sqlx::postgres::PgArguments>,
    insert: TransactionInsert,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Transaction, sqlx::postgres::PgArguments> {
    query
        .bind(Uuid::now_v7())
        .bind(insert.merchant_id)
        .bind(insert.tx_type)
        .bind(insert.status)
        .bind(insert.blockchain)
        .bind(insert.network_id)
        .bind(insert.currency)
        .bind(insert.amount)
        .bind(insert.sender_address)
        .bind(insert.recipient_address)
        .bind(insert.hash)
        .bind(insert.wallet.map(WalletRef::kind))
        .bind(insert.wallet.map(WalletRef::id))
        .bind(insert.is_test)
        .bind(insert.is_unexpected)
}

impl Processor<TransactionInsert> for DatabaseProcessor {
    type Output = Transaction;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertTransaction")]
    async fn process(&self, insert: TransactionInsert) -> Result<Transaction, sqlx::Error> {
        let sql = format!("{INSERT_TRANSACTION} RETURNING *");
        bind_insert(sqlx::query_as::<_, Transaction>(&sql), insert)
            .fetch_one(&self.pool)
            .await
    }
}

/// Insert keyed by `(network_id, hash)`; returns `None` when the hash is
/// already recorded.
#[derive(Debug, Clone)]
pub struct InsertTransactionIfAbsent {
    pub insert: TransactionInsert,
}

impl Processor<InsertTransactionIfAbsent> for DatabaseProcessor {
    type Output = Option<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertTransactionIfAbsent")]
    async fn process(
        &self,
        command: InsertTransactionIfAbsent,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!("{INSERT_TRANSACTION} ON CONFLICT (network_id, hash) DO NOTHING RETURNING *");
        bind_insert(sqlx::query_as::<_, Transaction>(&sql), command.insert)
            .fetch_optional(&self.pool)
            .await
    }
}

/// Settle a pending incoming transaction. Only applies while the row is
/// still pending without a hash, so concurrent deliveries settle it once.
#[derive(Debug, Clone)]
pub struct CompletePendingIncoming {
    pub id: i64,
    pub hash: String,
    pub sender_address: Option<String>,
}

impl Processor<CompletePendingIncoming> for DatabaseProcessor {
    type Output = Option<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompletePendingIncoming")]
    async fn process(
        &self,
        command: CompletePendingIncoming,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'completed', hash = $2, sender_address = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND hash IS NULL
            RETURNING *
            "#,
        )
        .bind(command.id)
        .bind(command.hash)
        .bind(command.sender_address)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Record the broadcast hash of an outgoing transaction and mark it in progress.
#[derive(Debug, Clone)]
pub struct AttachBroadcastHash {
    pub id: i64,
    pub hash: String,
}

impl Processor<AttachBroadcastHash> for DatabaseProcessor {
    type Output = Option<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AttachBroadcastHash")]
    async fn process(&self, command: AttachBroadcastHash) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'in_progress', hash = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND hash IS NULL
            RETURNING *
            "#,
        )
        .bind(command.id)
        .bind(command.hash)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Move a non-terminal transaction into `status`, optionally recording the fee.
#[derive(Debug, Clone)]
pub struct FinalizeTransaction {
    pub id: i64,
    pub status: TransactionStatus,
    pub network_fee: Option<Decimal>,
}

impl Processor<FinalizeTransaction> for DatabaseProcessor {
    type Output = Option<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FinalizeTransaction")]
    async fn process(&self, command: FinalizeTransaction) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2, network_fee = COALESCE($3, network_fee), updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'in_progress', 'in_progress_invalid')
            RETURNING *
            "#,
        )
        .bind(command.id)
        .bind(command.status)
        .bind(command.network_fee)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListInProgressOutgoing {
    pub limit: i64,
}

impl Processor<ListInProgressOutgoing> for DatabaseProcessor {
    type Output = Vec<Transaction>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListInProgressOutgoing")]
    async fn process(&self, query: ListInProgressOutgoing) -> Result<Vec<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE tx_type = 'outgoing'
              AND status IN ('in_progress', 'in_progress_invalid')
              AND hash IS NOT NULL
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}
