//! Quarry Protocol Buffer Definitions
//!
//! This crate contains the gRPC service definition and message types for the
//! remote tablet bootstrap protocol: the session RPCs
//! (`BeginRemoteBootstrapSession`, `FetchData`,
//! `EndRemoteBootstrapSession`), the tablet superblock and consensus
//! messages they carry, and the structured `BootstrapError` that rides the
//! gRPC status details when the service fails a request.
//!
//! ## Usage
//!
//! ```ignore
//! use quarry_proto::bootstrap as pb;
//! use quarry_proto::bootstrap::remote_bootstrap_service_client::RemoteBootstrapServiceClient;
//!
//! let mut client = RemoteBootstrapServiceClient::connect("http://tserver-3:7050").await?;
//! let resp = client
//!     .begin_remote_bootstrap_session(pb::BeginRemoteBootstrapSessionRequest {
//!         requestor_uuid: my_uuid,
//!         tablet_id: tablet_id.to_string(),
//!     })
//!     .await?;
//! ```

use prost::Message;

/// Remote bootstrap gRPC API.
pub mod bootstrap {
    tonic::include_proto!("quarry.bootstrap");
}

use bootstrap::BootstrapError;

/// Build a gRPC status carrying a structured [`BootstrapError`] in its
/// details, the way the bootstrap service reports session-level failures.
pub fn bootstrap_error_status(
    code: tonic::Code,
    message: impl Into<String>,
    error: &BootstrapError,
) -> tonic::Status {
    tonic::Status::with_details(code, message, bytes::Bytes::from(error.encode_to_vec()))
}

/// Decode the structured [`BootstrapError`] from a failed RPC, if one was
/// attached. Returns `None` when the status carries no details; callers
/// treat an undecodable or absent payload as its own error condition.
pub fn decode_bootstrap_error(status: &tonic::Status) -> Option<BootstrapError> {
    let details = status.details();
    if details.is_empty() {
        return None;
    }
    BootstrapError::decode(details).ok()
}
