//! Content-addressed clone orchestration.
//!
//! [`Cas::clone`] composes the git client and the content store:
//! 1. Resolve the source (local directories are used in place)
//! 2. Purge a partial target, or a complete one built for another request
//! 3. Resolve the ref with `ls-remote`
//! 4. Enumerate the tree of a blob-filtered scratch clone
//! 5. Fetch only blobs missing from the store
//! 6. Materialize the working tree from the store
//! 7. Copy the git metadata files consumers inspect
//! 8. Commit by writing the completion marker

mod clone;
mod error;
mod marker;
mod materialize;
mod options;

pub use clone::{Cas, CloneOrigin, CloneReport};
pub use error::CasError;
pub use marker::{
    CLONE_COMPLETE_MARKER, CompletionRecord, is_complete, marker_path, read_record, reusable_record,
};
pub(crate) use marker::write_marker;
pub use options::{CloneOptions, DEFAULT_DEPTH, DEFAULT_INCLUDED_GIT_FILES};
