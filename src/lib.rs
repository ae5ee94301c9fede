#![allow(clippy::too_many_arguments)]
use {
    anyhow::{Context, Error, anyhow, bail, ensure},
    arguments::Arguments,
    axum::{
        Router,
        extract::{Json, Path as AxumPath, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
    },
    axum_server::Handle,
    banning::{BanCounters, BanningManager},
    bitcoin::{
        Address, Amount, Block, BlockHash, CompactTarget, Network, OutPoint, ScriptBuf, Sequence,
        Target, Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
        address::NetworkUnchecked,
        block::{self, Header},
        consensus::{self, Decodable, Encodable},
        hashes::{Hash, sha256d},
        locktime::absolute::LockTime,
        script::write_scriptint,
    },
    bitcoind_async_client::{Auth, Client, traits::Reader},
    byteorder::{BigEndian, ByteOrder, LittleEndian},
    chain::Chain,
    clap::{Args, Parser},
    coinbase_builder::CoinbaseBuilder,
    daemon_client::DaemonClient,
    dashmap::DashMap,
    decay::DecayingAverage,
    derive_more::Display,
    endpoint::Endpoint,
    extranonces::{Extranonces, PoolExtranonces},
    futures::stream::StreamExt,
    hash_rate::HashRate,
    hex::FromHex,
    job::Job,
    jobs::Jobs,
    lru::LruCache,
    metatron::{Metatron, User, Worker},
    payee::{Payee, TemplatePayees},
    poller::spawn_generator,
    rand::Rng,
    reqwest::Url,
    serde::{
        Deserialize, Serialize, Serializer,
        de::{self, Deserializer},
        ser::SerializeSeq,
    },
    serde_json::{Value, json},
    serde_with::{DeserializeFromStr, SerializeDisplay},
    settings::Settings,
    sqlx::{Pool, Postgres, postgres::PgPoolOptions},
    std::{
        collections::{BTreeMap, HashMap, HashSet},
        env,
        fmt::{self, Display, Formatter},
        fs,
        io::{self, Write as _},
        net::{IpAddr, SocketAddr, ToSocketAddrs},
        num::NonZeroUsize,
        ops::{Add, BitAnd, BitOr, BitXor, Not},
        path::{Path, PathBuf},
        process,
        str::FromStr,
        sync::{
            Arc, LazyLock,
            atomic::{AtomicBool, AtomicU64, Ordering},
        },
        thread,
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratifier::{SessionSnapshot, Stratifier},
    stratum::{
        Authorize, Configure, Difficulty, Extranonce, Id, Message, Nbits, Notify, Ntime, PrevHash,
        SetDifficulty, Submit, Subscribe, SubscribeResult, Username, Version,
    },
    sysinfo::{Disks, System},
    template::Template,
    throbber::{StatusLine, spawn_throbber},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
        net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
        runtime::Runtime,
        signal::ctrl_c,
        sync::{Mutex, mpsc, oneshot, watch},
        task::{self, JoinHandle, JoinSet},
        time::{MissedTickBehavior, interval, sleep, timeout},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    tracing_subscriber::EnvFilter,
    vardiff::Vardiff,
    zeromq::SubSocket,
    zmq::Zmq,
};

mod accounting;
mod api;
mod arguments;
mod banning;
mod chain;
pub mod coinbase_builder;
mod daemon_client;
mod decay;
mod endpoint;
mod extranonces;
pub mod hash_rate;
mod http_server;
mod job;
mod jobs;
pub mod metatron;
mod payee;
mod poller;
mod record_sink;
mod signal;
pub mod settings;
pub mod stratifier;
pub mod stratum;
pub mod subcommand;
mod template;
mod throbber;
mod vardiff;
mod workbase;
mod zmq;

pub const COIN_VALUE: u64 = 100_000_000;
pub const USER_AGENT: &str = "stratum-pool/0.1.0";
pub const EXTRANONCE2_SIZE: usize = 8;

pub(crate) const MIN_ENONCE_SIZE: usize = 2;
pub(crate) const MAX_ENONCE_SIZE: usize = 8;
pub(crate) const ENONCE1_SIZE: usize = 4;
pub(crate) const ENONCE1_EXTENSION_SIZE: usize = 2;
/// Newline-delimited JSON-RPC message cap; flood protection (§ Stratum Session).
pub(crate) const MAX_MESSAGE_SIZE: usize = 10240;
pub(crate) const LRU_CACHE_SIZE: usize = 1024;
pub(crate) const NTIME_FUTURE_TOLERANCE_SECS: u32 = 7;

type Result<T = (), E = Error> = std::result::Result<T, E>;

fn target_as_block_hash(target: bitcoin::Target) -> BlockHash {
    BlockHash::from_raw_hash(Hash::from_byte_array(target.to_le_bytes()))
}

pub(crate) fn logs_enabled() -> bool {
    env::var_os("RUST_LOG").is_some()
}

pub(crate) fn integration_test() -> bool {
    env::var_os("STRATUM_POOL_INTEGRATION_TEST").is_some()
}

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Arguments::parse();

    let runtime = Runtime::new().expect("failed to start async runtime");

    let result = runtime.block_on(async {
        let cancel_token = signal::setup_signal_handler();
        args.run(cancel_token).await
    });

    match result {
        Err(err) => {
            error!("error: {err}");

            if env::var_os("RUST_BACKTRACE")
                .map(|val| val == "1")
                .unwrap_or_default()
            {
                error!("{}", err.backtrace());
            }
            process::exit(1);
        }
        Ok(_) => {
            process::exit(0);
        }
    }
}
