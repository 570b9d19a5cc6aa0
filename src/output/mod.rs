//! Output writing and the artifact ledger.

pub mod ledger;
pub mod writer;

pub use ledger::ArtifactKind;
pub use writer::{OutputWriter, WriteError, entry_file, page_file};
