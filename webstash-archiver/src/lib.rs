pub mod archiver;
pub mod capture;
pub mod error;
pub mod rewrite;
pub mod store;
pub mod urls;

pub use archiver::{ArchiveConfig, Archiver, ProgressCallback};
pub use capture::CaptureMetadata;
pub use error::ArchiveError;
pub use store::SnapshotStore;
