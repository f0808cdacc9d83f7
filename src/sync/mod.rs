//! Asset push protocol
//!
//! Lets a development tool push files into an installed application:
//! - Manifest version checks that reject stale clients ([`ConflictGuard`])
//! - Per-application push sessions with progress ([`UpdateSession`])
//! - Streamed single-file import ([`SingleFileImporter`])
//! - Ordered zip bundle import ([`BulkImporter`])
//!
//! Mutating operations hold the application's push lock for their whole
//! duration, and staged uploads never outlive the request that created them.

mod bulk;
mod conflict;
mod importer;
mod service;
mod session;
mod staging;
mod transport;
#[cfg(test)]
mod tests;

pub use bulk::{
    read_zip_manifest, BulkImporter, BulkManifestEntry, ZipPushRequest, ZIP_MANIFEST_FILE,
};
pub use conflict::ConflictGuard;
pub use importer::{commit_file, PutFileRequest, SingleFileImporter};
pub use service::{HarnessInfo, SyncOptions, SyncService};
pub use session::{
    PushComplete, PushCompleteCallback, PushNotifier, PushScope, SessionState, UpdateSession,
};
pub use staging::{discard, pipe_to_file, StagingArea, TransferLimits};
pub use transport::{BodyChunks, ChunkSource, MemoryChunks};
