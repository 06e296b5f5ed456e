//! opm-irc — the IRC presence (§4.3): connection handling, notice
//! pipeline, command interface, rate-limited output, and the
//! verdict/immunity caches (§4.4). Grounded on
//! `original_source/opm/ircpresence.py` and `cache.py`.

mod actions;
mod cache;
mod challenge;
mod commands;
mod config;
mod error;
mod glob;
mod parse;
mod presence;
mod ratelimiter;
mod wire;

pub use challenge::{OperChallenge, RsaChallenge};
pub use config::{NetworkConfig, OnConnectMessage};
pub use error::IrcError;
pub use presence::Presence;
