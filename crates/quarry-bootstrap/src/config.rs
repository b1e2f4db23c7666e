//! Bootstrap client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bytes reserved out of each fetch reply for RPC framing and headers.
pub const RPC_HEADER_MARGIN: u64 = 1024;

/// Tunables for the remote bootstrap client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBootstrapConfig {
    /// RPC deadline for BeginRemoteBootstrapSession and
    /// EndRemoteBootstrapSession calls, in milliseconds (default: 10s).
    #[serde(default = "default_begin_session_timeout_ms")]
    pub begin_session_timeout_ms: u64,

    /// Upper bound on a single RPC message (default: 8MB). Fetch requests
    /// ask for at most this much minus [`RPC_HEADER_MARGIN`] per chunk.
    #[serde(default = "default_rpc_max_message_size")]
    pub rpc_max_message_size: u64,
}

impl Default for RemoteBootstrapConfig {
    fn default() -> Self {
        Self {
            begin_session_timeout_ms: default_begin_session_timeout_ms(),
            rpc_max_message_size: default_rpc_max_message_size(),
        }
    }
}

impl RemoteBootstrapConfig {
    pub fn begin_session_timeout(&self) -> Duration {
        Duration::from_millis(self.begin_session_timeout_ms)
    }

    /// Largest chunk the client asks the remote for in one fetch.
    pub fn max_chunk_length(&self) -> u64 {
        self.rpc_max_message_size.saturating_sub(RPC_HEADER_MARGIN)
    }
}

fn default_begin_session_timeout_ms() -> u64 {
    10_000
}

fn default_rpc_max_message_size() -> u64 {
    8 * 1024 * 1024
}
