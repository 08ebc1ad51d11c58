pub mod collector;
pub mod hot_wallet;
pub mod transaction;
pub mod xpub_wallet;

use chainpay_sdk::objects::{
    Blockchain, TransactionStatus as SdkTransactionStatus,
    TransactionType as SdkTransactionType,
};

/// Blockchain name for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `chainpay_sdk::objects::Blockchain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "blockchain_name")]
pub enum ChainName {
    Btc,
    Eth,
    Tron,
    Matic,
    Bsc,
    Arbitrum,
    Avax,
    Sol,
    Xmr,
}

impl From<ChainName> for Blockchain {
    fn from(value: ChainName) -> Self {
        match value {
            ChainName::Btc => Blockchain::Btc,
            ChainName::Eth => Blockchain::Eth,
            ChainName::Tron => Blockchain::Tron,
            ChainName::Matic => Blockchain::Matic,
            ChainName::Bsc => Blockchain::Bsc,
            ChainName::Arbitrum => Blockchain::Arbitrum,
            ChainName::Avax => Blockchain::Avax,
            ChainName::Sol => Blockchain::Sol,
            ChainName::Xmr => Blockchain::Xmr,
        }
    }
}

impl From<Blockchain> for ChainName {
    fn from(value: Blockchain) -> Self {
        match value {
            Blockchain::Btc => ChainName::Btc,
            Blockchain::Eth => ChainName::Eth,
            Blockchain::Tron => ChainName::Tron,
            Blockchain::Matic => ChainName::Matic,
            Blockchain::Bsc => ChainName::Bsc,
            Blockchain::Arbitrum => ChainName::Arbitrum,
            Blockchain::Avax => ChainName::Avax,
            Blockchain::Sol => ChainName::Sol,
            Blockchain::Xmr => ChainName::Xmr,
        }
    }
}

/// Transaction direction for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "transaction_type")]
pub enum TransactionType {
    Incoming,
    Outgoing,
}

impl From<TransactionType> for SdkTransactionType {
    fn from(value: TransactionType) -> Self {
        match value {
            TransactionType::Incoming => SdkTransactionType::Incoming,
            TransactionType::Outgoing => SdkTransactionType::Outgoing,
        }
    }
}

/// Transaction lifecycle state for database operations.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "transaction_status")]
pub enum TransactionStatus {
    Pending,
    InProgress,
    InProgressInvalid,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        SdkTransactionStatus::from(self).is_terminal()
    }
}

impl From<TransactionStatus> for SdkTransactionStatus {
    fn from(value: TransactionStatus) -> Self {
        match value {
            TransactionStatus::Pending => SdkTransactionStatus::Pending,
            TransactionStatus::InProgress => SdkTransactionStatus::InProgress,
            TransactionStatus::InProgressInvalid => SdkTransactionStatus::InProgressInvalid,
            TransactionStatus::Completed => SdkTransactionStatus::Completed,
            TransactionStatus::Failed => SdkTransactionStatus::Failed,
        }
    }
}

/// Which table a transaction's receiving wallet lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "wallet_kind")]
pub enum WalletKind {
    Hot,
    XpubAddress,
    Collector,
}

/// A typed reference to one of the three receiving-wallet variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletRef {
    Hot(i64),
    XpubAddress(i64),
    Collector(i64),
}

impl WalletRef {
    pub fn kind(self) -> WalletKind {
        match self {
            WalletRef::Hot(_) => WalletKind::Hot,
            WalletRef::XpubAddress(_) => WalletKind::XpubAddress,
            WalletRef::Collector(_) => WalletKind::Collector,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            WalletRef::Hot(id) | WalletRef::XpubAddress(id) | WalletRef::Collector(id) => id,
        }
    }

    pub fn from_parts(kind: WalletKind, id: i64) -> Self {
        match kind {
            WalletKind::Hot => WalletRef::Hot(id),
            WalletKind::XpubAddress => WalletRef::XpubAddress(id),
            WalletKind::Collector => WalletRef::Collector(id),
        }
    }
}

pub(crate) fn now_utc() -> time::PrimitiveDateTime {
    let now = time::OffsetDateTime::now_utc();
    time::PrimitiveDateTime::new(now.date(), now.time())
}
