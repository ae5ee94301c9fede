use super::*;

pub(crate) mod pool;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
    #[command(about = "Run a Stratum mining pool server")]
    Pool(pool::Pool),
}

impl Subcommand {
    pub(crate) async fn run(self, cancel_token: CancellationToken) -> Result {
        match self {
            Self::Pool(pool) => pool.run(cancel_token).await,
        }
    }
}
