use super::*;

#[derive(Debug)]
pub(crate) struct PoolExtranonces {
    enonce1_size: usize,
    enonce2_size: usize,
}

#[derive(Debug)]
pub(crate) enum Extranonces {
    Pool(PoolExtranonces),
}

impl PoolExtranonces {
    pub(crate) fn new(enonce1_size: usize, enonce2_size: usize) -> Result<Self> {
        ensure!(
            enonce1_size >= MIN_ENONCE_SIZE,
            "enonce1_size {} below minimum {}",
            enonce1_size,
            MIN_ENONCE_SIZE
        );
        ensure!(
            enonce1_size <= MAX_ENONCE_SIZE,
            "enonce1_size {} exceeds maximum {}",
            enonce1_size,
            MAX_ENONCE_SIZE
        );
        ensure!(
            enonce2_size >= MIN_ENONCE_SIZE,
            "enonce2_size {} below minimum {}",
            enonce2_size,
            MIN_ENONCE_SIZE
        );
        ensure!(
            enonce2_size <= MAX_ENONCE_SIZE,
            "enonce2_size {} exceeds maximum {}",
            enonce2_size,
            MAX_ENONCE_SIZE
        );

        Ok(Self {
            enonce1_size,
            enonce2_size,
        })
    }

    pub(crate) fn enonce1_size(&self) -> usize {
        self.enonce1_size
    }

    pub(crate) fn enonce2_size(&self) -> usize {
        self.enonce2_size
    }
}

impl Extranonces {
    pub(crate) fn enonce1_size(&self) -> usize {
        match self {
            Extranonces::Pool(p) => p.enonce1_size(),
        }
    }

    pub(crate) fn enonce2_size(&self) -> usize {
        match self {
            Extranonces::Pool(p) => p.enonce2_size(),
        }
    }
}
