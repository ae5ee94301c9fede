use super::*;

impl Template {
    pub(crate) fn merkle_branches(&self) -> &[MerkleNode] {
        &self.merkle_branches
    }

    pub(crate) fn prevhash(&self) -> PrevHash {
        self.previous_block_hash.into()
    }

    pub(crate) fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn nbits(&self) -> Nbits {
        self.bits
    }

    pub(crate) fn ntime(&self) -> Ntime {
        self.current_time
    }

    pub(crate) fn height(&self) -> Option<u64> {
        Some(self.height)
    }

    pub(crate) fn create_job(
        self: &Arc<Self>,
        enonce1: &Extranonce,
        enonce2_size: usize,
        address: Option<&Address>,
        job_id: JobId,
        version_mask: Option<Version>,
    ) -> Result<Job> {
        let address = address.ok_or_else(|| anyhow!("pool mode requires address"))?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system time before UNIX epoch")?
            .as_secs();

        let (_coinbase_tx, coinb1, coinb2) = CoinbaseBuilder::new(
            address.clone(),
            enonce1.clone(),
            enonce2_size,
            self.height,
            self.coinbase_value,
            self.default_witness_commitment.clone(),
        )
        .with_aux(self.coinbaseaux.clone())
        .with_timestamp(timestamp)
        .with_pool_sig("|parasite|".into())
        .with_masternode_payees(self.masternode.clone())
        .with_superblock_payees(self.superblock.clone())
        .with_legacy_payee(self.payee.clone(), self.payee_amount)
        .build()
        .context("failed to build coinbase")?;

        Ok(Job {
            job_id,
            coinb1,
            coinb2,
            enonce1: enonce1.clone(),
            version_mask,
            workbase: self.clone(),
        })
    }

    pub(crate) fn clean_jobs(&self, prev: Option<&Self>) -> bool {
        prev.map(|prev| prev.height != self.height).unwrap_or(true)
    }

    pub(crate) fn build_block(&self, job: &Job, submit: &Submit, header: Header) -> Result<Block> {
        let coinbase_bin = hex::decode(format!(
            "{}{}{}{}",
            job.coinb1, job.enonce1, submit.extranonce2, job.coinb2,
        ))
        .context("failed to decode coinbase hex")?;

        let mut cursor = bitcoin::io::Cursor::new(&coinbase_bin);
        let coinbase_tx = Transaction::consensus_decode_from_finite_reader(&mut cursor)
            .context("failed to decode coinbase transaction")?;

        let txdata = std::iter::once(coinbase_tx)
            .chain(self.transactions.iter().map(|tx| tx.transaction.clone()))
            .collect();

        let block = Block { header, txdata };

        if self.height > 16 {
            ensure!(
                block.bip34_block_height().is_ok(),
                "block has invalid BIP34 height encoding"
            );
        }

        Ok(block)
    }
}
