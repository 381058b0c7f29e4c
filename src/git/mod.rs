//! Git orchestration: subprocess adaptor, diff splitting, materializer.

pub mod client;
pub mod diff;
pub mod materializer;

pub use client::{Git, GitClient};
pub use diff::{split_diff, FileDiff};
pub use materializer::RepoMaterializer;
