//! Error Types for Quarry
//!
//! This module defines the error model shared by all Quarry crates.
//!
//! ## Error Categories
//!
//! - `NotFound`: a named entity (leader, tablet, block) does not exist
//! - `InvalidArgument`: a request or reply failed validation
//! - `IllegalState`: an operation was attempted against the wrong state
//! - `Corruption`: data failed an integrity check (CRC mismatch)
//! - `TimedOut`: an operation exceeded its deadline
//! - `Io`: a local filesystem operation failed
//! - `Remote`: the remote service returned an application-level error
//! - `Network`: the transport could not reach the remote
//!
//! ## Context Chaining
//!
//! Errors cross several layers on their way up (RPC -> fetcher -> download
//! pass -> orchestrator), and each layer adds what it was doing. The
//! [`Error::prepend`] and [`Error::append`] helpers build those chains while
//! preserving the original error kind, so callers can still match on the
//! variant:
//!
//! ```ignore
//! client.fetch(req).await.map_err(|e| e.prepend("Unable to fetch data from remote"))?;
//! ```

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Workspace-wide error type.
///
/// The `Display` form is the bare message (no kind prefix) so that context
/// chains built with [`Error::prepend`] read front-to-back, e.g.
/// `"Unable to begin remote bootstrap session: no such tablet"`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    IllegalState(String),

    #[error("{0}")]
    Corruption(String),

    #[error("{0}")]
    TimedOut(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Remote(String),

    #[error("{0}")]
    Network(String),
}

impl Error {
    /// Prefix the message with `context`, keeping the error kind.
    pub fn prepend(self, context: impl std::fmt::Display) -> Self {
        self.rebuild(|msg| format!("{context}: {msg}"))
    }

    /// Suffix the message with `detail`, keeping the error kind.
    pub fn append(self, detail: impl std::fmt::Display) -> Self {
        self.rebuild(|msg| format!("{msg}: {detail}"))
    }

    fn rebuild(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            Error::NotFound(m) => Error::NotFound(f(m)),
            Error::InvalidArgument(m) => Error::InvalidArgument(f(m)),
            Error::IllegalState(m) => Error::IllegalState(f(m)),
            Error::Corruption(m) => Error::Corruption(f(m)),
            Error::TimedOut(m) => Error::TimedOut(f(m)),
            Error::Io(e) => {
                let kind = e.kind();
                Error::Io(std::io::Error::new(kind, f(e.to_string())))
            }
            Error::Remote(m) => Error::Remote(f(m)),
            Error::Network(m) => Error::Network(f(m)),
        }
    }
}
