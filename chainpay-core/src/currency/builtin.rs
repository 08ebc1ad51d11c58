use super::{CryptoCurrency, CurrencyKind};
use chainpay_sdk::objects::Blockchain;

fn coin(
    blockchain: Blockchain,
    ticker: &str,
    name: &str,
    decimals: u32,
    networks: (&str, &str),
) -> CryptoCurrency {
    CryptoCurrency {
        blockchain,
        ticker: ticker.into(),
        symbol: ticker.rsplit('_').next().unwrap_or(ticker).into(),
        name: name.into(),
        kind: CurrencyKind::Coin,
        decimals,
        network_id: networks.0.into(),
        test_network_id: networks.1.into(),
        token_contract: None,
        test_token_contract: None,
    }
}

fn token(
    blockchain: Blockchain,
    symbol: &str,
    name: &str,
    decimals: u32,
    networks: (&str, &str),
    contracts: (&str, &str),
) -> CryptoCurrency {
    CryptoCurrency {
        blockchain,
        ticker: format!("{}_{}", blockchain.as_str(), symbol).into(),
        symbol: symbol.into(),
        name: name.into(),
        kind: CurrencyKind::Token,
        decimals,
        network_id: networks.0.into(),
        test_network_id: networks.1.into(),
        token_contract: Some(contracts.0.into()),
        test_token_contract: Some(contracts.1.into()),
    }
}

pub(super) fn currencies() -> Vec<CryptoCurrency> {
    use Blockchain::*;

    const ETH_NET: (&str, &str) = ("1", "5");
    const MATIC_NET: (&str, &str) = ("137", "80001");
    const BSC_NET: (&str, &str) = ("56", "97");
    const ARBITRUM_NET: (&str, &str) = ("42161", "421613");
    const AVAX_NET: (&str, &str) = ("43114", "43113");
    const TRON_NET: (&str, &str) = ("mainnet", "testnet");
    const SOL_NET: (&str, &str) = ("mainnet-beta", "devnet");
    const BTC_NET: (&str, &str) = ("mainnet", "testnet");
    const XMR_NET: (&str, &str) = ("mainnet", "testnet");

    vec![
        coin(Btc, "BTC", "Bitcoin", 8, BTC_NET),
        coin(Eth, "ETH", "Ethereum", 18, ETH_NET),
        token(
            Eth,
            "USDT",
            "Tether",
            6,
            ETH_NET,
            (
                "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                "0xC2C527C0CACF457746Bd31B2a698Fe89de2b6d49",
            ),
        ),
        token(
            Eth,
            "USDC",
            "USD Coin",
            6,
            ETH_NET,
            (
                "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                "0x07865c6E87B9F70255377e024ace6630C1Eaa37F",
            ),
        ),
        coin(Tron, "TRON", "Tron", 6, TRON_NET),
        token(
            Tron,
            "USDT",
            "Tether",
            6,
            TRON_NET,
            (
                "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
                "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf",
            ),
        ),
        coin(Matic, "MATIC", "Polygon", 18, MATIC_NET),
        token(
            Matic,
            "USDT",
            "Tether",
            6,
            MATIC_NET,
            (
                "0xc2132D05D31c914a87C6611C10748AEb04B58e8F",
                "0xA02f6adc7926efeBBd59Fd43A84f4E0c0c91e832",
            ),
        ),
        token(
            Matic,
            "USDC",
            "USD Coin",
            6,
            MATIC_NET,
            (
                "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
                "0x0FA8781a83E46826621b3BC094Ea2A0212e71B23",
            ),
        ),
        coin(Bsc, "BNB", "BNB", 18, BSC_NET),
        token(
            Bsc,
            "USDT",
            "Tether",
            18,
            BSC_NET,
            (
                "0x55d398326f99059fF775485246999027B3197955",
                "0x337610d27c682E347C9cD60BD4b3b107C9d34dDd",
            ),
        ),
        token(
            Bsc,
            "USDC",
            "USD Coin",
            18,
            BSC_NET,
            (
                "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
                "0x64544969ed7EBf5f083679233325356EbE738930",
            ),
        ),
        coin(Arbitrum, "ARBITRUM_ETH", "Ethereum (Arbitrum)", 18, ARBITRUM_NET),
        token(
            Arbitrum,
            "USDT",
            "Tether",
            6,
            ARBITRUM_NET,
            (
                "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9",
                "0x6A2a6D0c1C8b5E7F1C2E1A4d7f8a9b6C5d4E3f21",
            ),
        ),
        token(
            Arbitrum,
            "USDC",
            "USD Coin",
            6,
            ARBITRUM_NET,
            (
                "0xaf88d065e77c8cC2239327C5EDb3A432268e5831",
                "0x8FB1E3fC51F3b789dED7557E680551d93Ea9d892",
            ),
        ),
        coin(Avax, "AVAX", "Avalanche", 18, AVAX_NET),
        token(
            Avax,
            "USDT",
            "Tether",
            6,
            AVAX_NET,
            (
                "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7",
                "0xAb231A5744C8E6c45481754928cCfFFFD4aa0732",
            ),
        ),
        token(
            Avax,
            "USDC",
            "USD Coin",
            6,
            AVAX_NET,
            (
                "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
                "0x5425890298aed601595a70AB815c96711a31Bc65",
            ),
        ),
        coin(Sol, "SOL", "Solana", 9, SOL_NET),
        token(
            Sol,
            "USDC",
            "USD Coin",
            6,
            SOL_NET,
            (
                "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
            ),
        ),
        coin(Xmr, "XMR", "Monero", 12, XMR_NET),
    ]
}
