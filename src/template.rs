use super::*;

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Template {
    pub bits: Nbits,
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: BlockHash,
    #[serde(rename = "curtime", deserialize_with = "ntime_from_u64")]
    pub current_time: Ntime,
    pub height: u64,
    #[serde(deserialize_with = "version_from_i32")]
    pub version: Version,
    pub transactions: Vec<TemplateTransaction>,
    #[serde(with = "bitcoin::script::ScriptBuf", default)]
    pub default_witness_commitment: ScriptBuf,
    pub coinbaseaux: BTreeMap<String, String>,
    #[serde(
        rename = "coinbasevalue",
        with = "bitcoin::amount::serde::as_sat",
        default
    )]
    pub coinbase_value: Amount,
    /// Precomputed merkle branches for the transaction set, coinbase slot
    /// excluded; filled in by the poller after fetching the template.
    #[serde(skip, default)]
    pub merkle_branches: Vec<MerkleNode>,
    #[serde(default)]
    pub masternode: TemplatePayees,
    #[serde(default)]
    pub superblock: TemplatePayees,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub payee_amount: Option<u64>,
    #[serde(default, with = "hex::serde::option")]
    pub coinbase_payload: Option<Vec<u8>>,
}

impl Template {
    pub fn with_merkle_branches(mut self) -> Self {
        let txids: Vec<_> = self.transactions.iter().map(|tx| tx.txid).collect();
        self.merkle_branches = merkle_branches(&txids);
        self
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct TemplateTransaction {
    pub txid: Txid,
    #[serde(rename = "data", deserialize_with = "tx_from_hex")]
    pub transaction: Transaction,
}

fn version_from_i32<'de, D>(d: D) -> Result<Version, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let x = i32::deserialize(d)?;
    Ok(Version::from(x))
}

fn tx_from_hex<'de, D>(d: D) -> Result<Transaction, D::Error>
where
    D: Deserializer<'de>,
{
    let s = <&str>::deserialize(d)?;
    encode::deserialize_hex(s).map_err(serde::de::Error::custom)
}

fn ntime_from_u64<'de, D>(d: D) -> Result<Ntime, D::Error>
where
    D: Deserializer<'de>,
{
    let v = u64::deserialize(d)?;
    Ntime::try_from(v).map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_branches_computed_from_transactions() {
        let template = Template {
            bits: "1c2ac4af".parse().unwrap(),
            previous_block_hash: BlockHash::from_byte_array([0u8; 32]),
            current_time: Ntime::from(0),
            height: 1,
            version: Version(block::Version::TWO),
            transactions: Vec::new(),
            default_witness_commitment: ScriptBuf::new(),
            coinbaseaux: BTreeMap::new(),
            coinbase_value: Amount::ZERO,
            merkle_branches: Vec::new(),
            masternode: TemplatePayees::Absent,
            superblock: TemplatePayees::Absent,
            payee: None,
            payee_amount: None,
            coinbase_payload: None,
        }
        .with_merkle_branches();

        assert!(template.merkle_branches.is_empty());
    }
}
