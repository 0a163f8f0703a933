//! Code lists attached to save entries.
//!
//! The builder assembles the fixed file operations for an entry and merges
//! in cheats parsed from `DATA/<title>.savepatch` by a `PatchEngine`.

mod builder;
mod patch;
mod pure;

pub use builder::CodeBuilder;
pub use patch::{PatchEngine, SavePatchEngine};
pub use pure::{file_options, list_files, storage_options, wildcard_match};
