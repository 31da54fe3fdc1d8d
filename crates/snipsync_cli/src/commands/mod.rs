//! CLI command implementations.

pub mod configure;
pub mod mounted;
pub mod plan;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

/// Local snippet folder used when `--local` is not given.
pub fn default_local_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("snippets")
}
