pub mod actions;
pub mod chapters;
pub mod config;
pub mod context;
pub mod driver;
pub mod effects;
pub mod error;
pub mod io;
pub mod naming;
pub mod pages;
pub mod pool;
pub mod rules;
pub mod skip;
pub mod tools;
pub mod types;

#[cfg(test)]
mod test_support;

pub use driver::{Driver, RunOptions, RunSummary, VolumeStatus};
pub use error::{FolioError, Result};
