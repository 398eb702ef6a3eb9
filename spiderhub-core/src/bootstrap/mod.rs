//! Bootstrap module for initializing the spiderhub server
//!
//! This module handles:
//! - Configuration loading
//! - Provider runtime, registry and dispatcher wiring
//! - Restoring previously registered providers

pub mod config;
pub mod services;

pub use config::load_config;
pub use services::{init_services, Services};
