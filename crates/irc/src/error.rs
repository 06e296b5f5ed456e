//! Errors raised while building a [`crate::Presence`] from config. Runtime
//! connection failures stay `anyhow::Error` (§1 "exactly as the teacher
//! splits them").

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrcError {
    #[error("invalid connregex: {0}")]
    ConnRegex(#[from] regex::Error),

    #[error("invalid mask pattern {pattern:?}: {source}")]
    Mask { pattern: String, source: regex::Error },

    #[error("could not read operator key file {path:?}: {source}")]
    OperKey { path: String, source: std::io::Error },
}
