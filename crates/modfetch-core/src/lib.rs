//! modfetch Core Library
//!
//! Content-addressed retrieval of git-hosted module catalogs: a git
//! plumbing client, a deduplicating blob store and the clone orchestrator
//! that composes them.

pub mod cas;
pub mod catalog;
pub mod config;
pub mod fs;
pub mod git;
pub mod store;

/// Re-exports of commonly used types
pub mod prelude {
    // Orchestration
    pub use crate::cas::{Cas, CasError, CloneOptions, CloneOrigin, CloneReport};

    // Git
    pub use crate::git::{
        CancelToken, GitClient, GitError, GitErrorKind, GitRef, GitRunner, Tree, TreeEntry,
    };

    // Store
    pub use crate::store::{ContentStore, StoreError};

    // Catalog
    pub use crate::catalog::{CatalogSource, Repo};

    // Configuration
    pub use crate::config::FetchConfig;

    // Filesystem
    pub use crate::fs::hash_tree;
}
