//! Channels and `select` for tasks that share a single thread.
//!
//! Tasks exchange values through [`Channel`]s, which can be rendezvous
//! (every send waits for a receiver), bounded or unbounded. [`select()`]
//! waits on several channel operations at once and performs exactly one of
//! them. Everything here is `!Send`: run it on a single-threaded executor,
//! such as a tokio `LocalSet`.

pub mod config;
pub mod registry;
pub mod utils;

pub use config::{ChanConfig, ConfigError};
pub use registry::{ChanRegistry, RegistryError};
pub use utils::{
    capacity::Capacity,
    path::ChanPath,
    ringchannel::{
        channel, select, CancelToken, ChanStat, Channel, ChannelError, CompatChannel, RecvStream,
        Select,
    },
};
