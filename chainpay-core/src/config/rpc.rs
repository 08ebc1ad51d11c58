use serde::Deserialize;
use url::Url;

/// One upstream node or API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcEndpoint {
    pub url: Url,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl RpcEndpoint {
    pub fn new(url: Url) -> Self {
        Self { url, api_key: None }
    }
}

/// A value that exists once per network class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPair<T> {
    pub mainnet: T,
    pub testnet: T,
}

impl<T> NetworkPair<T> {
    pub fn new(mainnet: T, testnet: T) -> Self {
        Self { mainnet, testnet }
    }

    pub fn select(&self, is_test: bool) -> &T {
        if is_test { &self.testnet } else { &self.mainnet }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> NetworkPair<U> {
        NetworkPair {
            mainnet: f(self.mainnet),
            testnet: f(self.testnet),
        }
    }
}
