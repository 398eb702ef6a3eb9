// SpiderHub API Library
//
// HTTP surface over the provider registry and protocol dispatcher

pub mod http;

// Re-export commonly used types
pub use http::{create_router, AppState};
