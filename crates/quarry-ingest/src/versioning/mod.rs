//! Change detection and version persistence
//!
//! [`ChangeDetector`] fingerprints fetched content and compares it with the
//! latest version a [`VersionStore`] holds. Two stores implement the contract:
//! [`SqliteVersionStore`] and [`FlatFileVersionStore`]. Both lay out artifacts
//! the same way through [`ArtifactWriter`].

mod detector;
mod flat_file;
mod sqlite;
mod store;

pub use detector::{ChangeDecision, ChangeDetector};
pub use flat_file::FlatFileVersionStore;
pub use sqlite::SqliteVersionStore;
pub use store::{
    detect_store_type, file_extension, open_store, open_store_at, ArtifactWriter,
    DatasetRegistration, NewVersion, VersionStore, FLAT_FILE, SQLITE_FILE,
};
