use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// All blockchains handled by the gateway.
#[serde(rename_all = "UPPERCASE")]
pub enum Blockchain {
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

/// Groups chains that share an address format, fee model and transaction shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Bitcoin-like chains.
    Utxo,
    /// Account-model chains with gas fees (Ethereum and its relatives).
    Evm,
    Tron,
    Solana,
    Monero,
}

impl Blockchain {
    pub const ALL: [Blockchain; 9] = [
        Blockchain::Btc,
        Blockchain::Eth,
        Blockchain::Tron,
        Blockchain::Matic,
        Blockchain::Bsc,
        Blockchain::Arbitrum,
        Blockchain::Avax,
        Blockchain::Sol,
        Blockchain::Xmr,
    ];

    pub const fn family(self) -> ChainFamily {
        match self {
            Blockchain::Btc => ChainFamily::Utxo,
            Blockchain::Eth
            | Blockchain::Matic
            | Blockchain::Bsc
            | Blockchain::Arbitrum
            | Blockchain::Avax => ChainFamily::Evm,
            Blockchain::Tron => ChainFamily::Tron,
            Blockchain::Sol => ChainFamily::Solana,
            Blockchain::Xmr => ChainFamily::Monero,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Blockchain::Btc => "BTC",
            Blockchain::Eth => "ETH",
            Blockchain::Tron => "TRON",
            Blockchain::Matic => "MATIC",
            Blockchain::Bsc => "BSC",
            Blockchain::Arbitrum => "ARBITRUM",
            Blockchain::Avax => "AVAX",
            Blockchain::Sol => "SOL",
            Blockchain::Xmr => "XMR",
        }
    }

    pub const fn is_evm(self) -> bool {
        matches!(self.family(), ChainFamily::Evm)
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown blockchain {0:?}")]
pub struct UnknownBlockchain(pub String);

impl FromStr for Blockchain {
    type Err = UnknownBlockchain;

    /// Accepts the canonical upper-case names case-insensitively, plus a few
    /// aliases used by notification providers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let chain = match upper.as_str() {
            "BTC" | "BITCOIN" => Blockchain::Btc,
            "ETH" | "ETHEREUM" => Blockchain::Eth,
            "TRON" | "TRX" => Blockchain::Tron,
            "MATIC" | "POLYGON" => Blockchain::Matic,
            "BSC" | "BNB" => Blockchain::Bsc,
            "ARBITRUM" | "ARB" => Blockchain::Arbitrum,
            "AVAX" | "AVALANCHE" => Blockchain::Avax,
            "SOL" | "SOLANA" => Blockchain::Sol,
            "XMR" | "MONERO" => Blockchain::Xmr,
            _ => return Err(UnknownBlockchain(s.to_owned())),
        };
        Ok(chain)
    }
}
