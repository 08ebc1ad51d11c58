use crate::entities::ChainName;
use crate::framework::{DatabaseAccessor, DatabaseProcessor, TransactionProcessor};
use kanau::processor::Processor;
use uuid::Uuid;

/// A merchant's extended public key on one chain.
///
/// `last_derived_index` is `-1` until the first address is derived.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct XpubWallet {
    pub id: i64,
    pub uuid: Uuid,
    pub merchant_id: i64,
    pub blockchain: ChainName,
    pub xpub: String,
    pub derivation_path: String,
    pub last_derived_index: i32,
    pub is_active: bool,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub struct XpubWalletInsert {
    pub merchant_id: i64,
    pub blockchain: ChainName,
    pub xpub: String,
    pub derivation_path: String,
}

/// One address derived from an [`XpubWallet`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DerivedAddress {
    pub id: i64,
    pub uuid: Uuid,
    pub xpub_wallet_id: i64,
    pub merchant_id: i64,
    pub blockchain: ChainName,
    pub address: String,
    pub derivation_path: String,
    pub derivation_index: i32,
    pub public_key: Option<String>,
    pub is_used: bool,
    pub transaction_id: Option<i64>,
    pub created_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub struct DerivedAddressInsert {
    pub xpub_wallet_id: i64,
    pub merchant_id: i64,
    pub blockchain: ChainName,
    pub address: String,
    pub derivation_path: String,
    pub derivation_index: i32,
    pub public_key: Option<String>,
}

impl Processor<XpubWalletInsert> for DatabaseProcessor {
    type Output = XpubWallet;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertXpubWallet")]
    async fn process(&self, insert: XpubWalletInsert) -> Result<XpubWallet, sqlx::Error> {
        sqlx::query_as::<_, XpubWallet>(
            r#"
            INSERT INTO xpub_wallets (uuid, merchant_id, blockchain, xpub, derivation_path)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(insert.merchant_id)
        .bind(insert.blockchain)
        .bind(insert.xpub)
        .bind(insert.derivation_path)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetActiveXpubWallet {
    pub merchant_id: i64,
    pub blockchain: ChainName,
}

impl Processor<GetActiveXpubWallet> for DatabaseProcessor {
    type Output = Option<XpubWallet>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetActiveXpubWallet")]
    async fn process(&self, query: GetActiveXpubWallet) -> Result<Option<XpubWallet>, sqlx::Error> {
        sqlx::query_as::<_, XpubWallet>(
            "SELECT * FROM xpub_wallets WHERE merchant_id = $1 AND blockchain = $2 AND is_active",
        )
        .bind(query.merchant_id)
        .bind(query.blockchain)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct DeactivateXpubWallet {
    pub id: i64,
}

impl Processor<DeactivateXpubWallet> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeactivateXpubWallet")]
    async fn process(&self, command: DeactivateXpubWallet) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE xpub_wallets SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active",
        )
        .bind(command.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
pub struct GetDerivedAddressByUuid {
    pub uuid: Uuid,
}

impl Processor<GetDerivedAddressByUuid> for DatabaseProcessor {
    type Output = Option<DerivedAddress>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDerivedAddressByUuid")]
    async fn process(
        &self,
        query: GetDerivedAddressByUuid,
    ) -> Result<Option<DerivedAddress>, sqlx::Error> {
        sqlx::query_as::<_, DerivedAddress>("SELECT * FROM xpub_derived_addresses WHERE uuid = $1")
            .bind(query.uuid)
            .fetch_optional(&self.pool)
            .await
    }
}

impl XpubWallet {
    /// Lock the wallet row for the rest of the surrounding transaction.
    pub async fn lock_for_update(
        db: &mut TransactionProcessor<'_>,
        id: i64,
    ) -> Result<Option<XpubWallet>, sqlx::Error> {
        sqlx::query_as::<_, XpubWallet>(
            "SELECT * FROM xpub_wallets WHERE id = $1 AND is_active FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(db.acquire())
        .await
    }

    /// Bump `last_derived_index` and return the new value.
    pub async fn advance_index(
        db: &mut TransactionProcessor<'_>,
        id: i64,
    ) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE xpub_wallets
            SET last_derived_index = last_derived_index + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING last_derived_index
            "#,
        )
        .bind(id)
        .fetch_one(db.acquire())
        .await
    }
}

impl DerivedAddress {
    pub async fn lowest_unused(
        db: &mut TransactionProcessor<'_>,
        xpub_wallet_id: i64,
    ) -> Result<Option<DerivedAddress>, sqlx::Error> {
        sqlx::query_as::<_, DerivedAddress>(
            r#"
            SELECT * FROM xpub_derived_addresses
            WHERE xpub_wallet_id = $1 AND NOT is_used
            ORDER BY derivation_index ASC
            LIMIT 1
            "#,
        )
        .bind(xpub_wallet_id)
        .fetch_optional(db.acquire())
        .await
    }

    pub async fn insert(
        db: &mut TransactionProcessor<'_>,
        insert: DerivedAddressInsert,
    ) -> Result<DerivedAddress, sqlx::Error> {
        sqlx::query_as::<_, DerivedAddress>(
            r#"
            INSERT INTO xpub_derived_addresses (
                uuid, xpub_wallet_id, merchant_id, blockchain, address,
                derivation_path, derivation_index, public_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(insert.xpub_wallet_id)
        .bind(insert.merchant_id)
        .bind(insert.blockchain)
        .bind(insert.address)
        .bind(insert.derivation_path)
        .bind(insert.derivation_index)
        .bind(insert.public_key)
        .fetch_one(db.acquire())
        .await
    }

    pub async fn mark_used(
        db: &mut TransactionProcessor<'_>,
        id: i64,
        transaction_id: Option<i64>,
    ) -> Result<Option<DerivedAddress>, sqlx::Error> {
        sqlx::query_as::<_, DerivedAddress>(
            r#"
            UPDATE xpub_derived_addresses
            SET is_used = TRUE, transaction_id = COALESCE($2, transaction_id)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .fetch_optional(db.acquire())
        .await
    }
}
