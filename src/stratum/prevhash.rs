use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct PrevHash(BlockHash);

impl PrevHash {
    pub fn to_block_hash(self) -> BlockHash {
        self.0
    }
}

impl FromStr for PrevHash {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hash = BlockHash::from_str(s).map_err(|err| InternalError::Parse {
            message: err.to_string(),
        })?;
        Ok(PrevHash(hash))
    }
}

impl fmt::Display for PrevHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BlockHash> for PrevHash {
    fn from(hash: BlockHash) -> PrevHash {
        PrevHash(hash)
    }
}

impl From<PrevHash> for BlockHash {
    fn from(prev: PrevHash) -> BlockHash {
        prev.0
    }
}
