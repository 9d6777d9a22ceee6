//! Siteforge Filetree - Incremental file tree builder and mount projection
//!
//! Consumes pending build steps, merges them into a hierarchical,
//! path-addressed file tree, and projects that tree into the nested
//! directory/file record shape the execution sandbox mounts.

pub mod builder;
pub mod error;
pub mod mount;
pub mod node;

pub use builder::{ApplyOutcome, FileTree};
pub use error::{TreeError, TreeResult};
pub use mount::{
    flatten_files, overlay_file, project, single_file_tree, FileEntry, MountNode, MountTree,
};
pub use node::FileNode;

/// Version information for the filetree crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
