pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod importer;
pub mod logging;
pub mod normalize;
pub mod provider;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
