use super::*;

/// Thin wrapper around [`bitcoin::Network`] adding the pool-operational
/// concerns the raw enum doesn't carry: a default RPC port per chain and a
/// chain-qualified subdirectory under a Bitcoin Core data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Chain {
    #[default]
    Mainnet,
    Testnet,
    Testnet4,
    Signet,
    Regtest,
}

impl Chain {
    pub(crate) fn default_rpc_port(self) -> u16 {
        match self {
            Self::Mainnet => 8332,
            Self::Testnet => 18332,
            Self::Testnet4 => 48332,
            Self::Signet => 38332,
            Self::Regtest => 18443,
        }
    }

    pub(crate) fn network(self) -> Network {
        Network::from(self)
    }

    pub(crate) fn join_with_data_dir(self, data_dir: impl AsRef<Path>) -> PathBuf {
        let data_dir = data_dir.as_ref();
        match self {
            Self::Mainnet => data_dir.to_path_buf(),
            Self::Testnet => data_dir.join("testnet3"),
            Self::Testnet4 => data_dir.join("testnet4"),
            Self::Signet => data_dir.join("signet"),
            Self::Regtest => data_dir.join("regtest"),
        }
    }
}

impl From<Chain> for Network {
    fn from(chain: Chain) -> Self {
        match chain {
            Chain::Mainnet => Network::Bitcoin,
            Chain::Testnet => Network::Testnet,
            Chain::Testnet4 => Network::Testnet4,
            Chain::Signet => Network::Signet,
            Chain::Regtest => Network::Regtest,
        }
    }
}

impl TryFrom<Network> for Chain {
    type Error = InternalError;

    fn try_from(network: Network) -> Result<Self, Self::Error> {
        Ok(match network {
            Network::Bitcoin => Self::Mainnet,
            Network::Testnet => Self::Testnet,
            Network::Testnet4 => Self::Testnet4,
            Network::Signet => Self::Signet,
            Network::Regtest => Self::Regtest,
            other => {
                return Err(InternalError::InvalidValue {
                    reason: format!("unsupported network: {other:?}"),
                });
            }
        })
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Testnet4 => "testnet4",
            Self::Signet => "signet",
            Self::Regtest => "regtest",
        };
        f.write_str(s)
    }
}

impl FromStr for Chain {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(Self::Mainnet),
            "testnet" | "testnet3" => Ok(Self::Testnet),
            "testnet4" => Ok(Self::Testnet4),
            "signet" => Ok(Self::Signet),
            "regtest" => Ok(Self::Regtest),
            other => Err(InternalError::Parse {
                message: format!("unrecognized chain `{other}`"),
            }),
        }
    }
}
