//! Catalog repositories.
//!
//! Resolves a catalog source (local directory, plain git remote or
//! `cas://` remote) to a directory on disk and reads the remote URL and
//! branch from its git metadata.

pub mod repo;
pub mod source;

pub use repo::{Repo, parse_branch_name, parse_remote_url};
pub use source::{CAS_PREFIX, CatalogSource};
