//! Progress reporting seam.
//!
//! The tablet-hosting service registers a listener to surface bootstrap
//! progress to operators (admin UI, tablet status page). Listeners must
//! tolerate rapid updates; the client calls them from the bootstrap task
//! only.

use tracing::info;

/// Receiver for human-readable bootstrap progress messages.
pub trait StatusListener: Send + Sync {
    fn status_message(&self, status: &str);
}

/// Listener that forwards progress to the process log.
#[derive(Debug, Default)]
pub struct LoggingStatusListener;

impl StatusListener for LoggingStatusListener {
    fn status_message(&self, status: &str) {
        info!(%status, "Tablet status");
    }
}
