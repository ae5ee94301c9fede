use super::*;

// Import snafu for derive macro
use snafu::Snafu;
// Import context selectors for use in submodules
use error::{InvalidValueSnafu, ParseSnafu};

mod authorize;
mod configure;
mod difficulty;
mod error;
mod extranonce;
mod job_id;
mod merkle;
mod message;
mod nbits;
mod nonce;
mod notify;
mod ntime;
mod prevhash;
mod set_difficulty;
mod submit;
mod subscribe;
mod suggest_difficulty;
mod username;
mod version;

pub use {
    authorize::Authorize,
    configure::Configure,
    difficulty::Difficulty,
    error::{InternalError, JsonRpcError, StratumErrorCode},
    extranonce::Extranonce,
    job_id::JobId,
    merkle::{MerkleNode, merkle_branches, merkle_root},
    message::{Id, Message},
    nbits::Nbits,
    nonce::Nonce,
    notify::Notify,
    ntime::Ntime,
    prevhash::PrevHash,
    set_difficulty::SetDifficulty,
    submit::Submit,
    subscribe::{Subscribe, SubscribeResult},
    suggest_difficulty::SuggestDifficulty,
    username::Username,
    version::Version,
};
