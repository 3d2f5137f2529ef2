//! Filesystem primitives shared across features.

pub mod tree_hash;

pub use tree_hash::hash_tree;
