//! Remote error unwinding.
//!
//! When a bootstrap RPC fails, the service attaches a structured
//! `BootstrapError` (code + status) to the gRPC status details. The
//! helpers here decode that payload and fold it into the local error so
//! callers see the remote's own diagnosis, e.g.
//!
//! ```text
//! Unable to begin remote bootstrap session: tablet lookup failed:
//! Received error code UNKNOWN_TABLET from remote service: no such tablet
//! ```

use quarry_core::Error;
use quarry_proto::bootstrap as pb;
use quarry_proto::decode_bootstrap_error;

/// Translate a wire `AppStatus` into the local error it describes.
pub(crate) fn status_from_pb(status: &pb::AppStatus) -> Error {
    use pb::app_status::ErrorCode;

    let message = status.message.clone();
    match status.code() {
        ErrorCode::NotFound => Error::NotFound(message),
        ErrorCode::InvalidArgument => Error::InvalidArgument(message),
        ErrorCode::IllegalState => Error::IllegalState(message),
        ErrorCode::Corruption => Error::Corruption(message),
        ErrorCode::TimedOut => Error::TimedOut(message),
        ErrorCode::IoError => Error::Io(std::io::Error::other(message)),
        ErrorCode::NetworkError => Error::Network(message),
        ErrorCode::RemoteError | ErrorCode::UnknownError | ErrorCode::Ok => Error::Remote(message),
    }
}

/// Decode the service-specific error extension from a failed RPC.
pub(crate) fn extract_remote_error(status: &tonic::Status) -> Error {
    match decode_bootstrap_error(status) {
        Some(error) => {
            let code = error.code().as_str_name();
            let app = error.status.unwrap_or_default();
            status_from_pb(&app).prepend(format!(
                "Received error code {code} from remote service"
            ))
        }
        None => Error::InvalidArgument(format!(
            "Unable to decode remote bootstrap RPC error message: {}",
            status.message()
        )),
    }
}

/// Translate a failed RPC into a local error. Transport-level failures map
/// to their own kinds; application errors from the service become
/// `Remote` with the decoded extension appended.
pub(crate) fn unwind_remote_error(status: tonic::Status) -> Error {
    match status.code() {
        tonic::Code::DeadlineExceeded => Error::TimedOut(status.message().to_string()),
        tonic::Code::Unavailable | tonic::Code::Cancelled => {
            Error::Network(status.message().to_string())
        }
        _ => {
            let extension = extract_remote_error(&status);
            Error::Remote(status.message().to_string()).append(extension)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pb::{app_status, bootstrap_error, AppStatus, BootstrapError};
    use quarry_proto::bootstrap_error_status;

    fn unknown_tablet_status() -> tonic::Status {
        let error = BootstrapError {
            code: bootstrap_error::Code::UnknownTablet as i32,
            status: Some(AppStatus {
                code: app_status::ErrorCode::NotFound as i32,
                message: "no such tablet".to_string(),
            }),
        };
        bootstrap_error_status(tonic::Code::NotFound, "tablet lookup failed", &error)
    }

    #[test]
    fn test_unwind_with_extension() {
        let err = unwind_remote_error(unknown_tablet_status());
        assert!(matches!(err, Error::Remote(_)));
        let msg = err.to_string();
        assert!(
            msg.contains("Received error code UNKNOWN_TABLET from remote service"),
            "{msg}"
        );
        assert!(msg.contains("no such tablet"), "{msg}");
    }

    #[test]
    fn test_unwind_without_extension() {
        let err = unwind_remote_error(tonic::Status::internal("boom"));
        assert!(matches!(err, Error::Remote(_)));
        assert!(
            err.to_string()
                .contains("Unable to decode remote bootstrap RPC error message"),
            "{err}"
        );
    }

    #[test]
    fn test_transport_failures_keep_their_kind() {
        let err = unwind_remote_error(tonic::Status::deadline_exceeded("too slow"));
        assert!(matches!(err, Error::TimedOut(_)));

        let err = unwind_remote_error(tonic::Status::unavailable("connection refused"));
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn test_status_from_pb_maps_kinds() {
        let status = AppStatus {
            code: app_status::ErrorCode::Corruption as i32,
            message: "bad checksum".to_string(),
        };
        assert!(matches!(status_from_pb(&status), Error::Corruption(_)));
    }
}
