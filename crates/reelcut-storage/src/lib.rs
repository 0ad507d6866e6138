//! Storage collaborator for produced clips.
//!
//! The core hands finished clips to a [`StorageBackend`] and only keeps the
//! returned [`StorageRef`](reelcut_models::StorageRef). [`LocalStorage`] keeps
//! objects in a directory tree.

pub mod backend;
pub mod error;
pub mod fs_utils;
pub mod local;

pub use backend::{validate_key, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use fs_utils::move_file;
pub use local::LocalStorage;
