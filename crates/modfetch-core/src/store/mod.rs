//! Content-addressable blob store shared across clones.
//!
//! The store knows nothing about git: keys are opaque strings (in practice
//! blob hashes) and values are raw bytes. Concurrency safety comes from the
//! filesystem's atomic rename, so several processes may share one root.

mod content;
mod error;

pub use content::ContentStore;
pub use error::{Result, StoreError};
