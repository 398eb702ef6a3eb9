// Provider System
//
// Layers, bottom up:
//
//   traits   - Provider capability contract and the ProviderRuntime seam
//   process  - ProcessRuntime: one child process per provider, JSON lines
//   loader   - fetch, materialize, launch, validate, init
//   registry - ProviderRegistry: keyed records, persisted via store

pub mod error;
pub mod loader;
pub mod process;
pub mod record;
pub mod registry;
pub mod store;
pub mod traits;

pub use error::*;
pub use loader::{LoadedProvider, Loader};
pub use process::{ProcessProvider, ProcessRuntime};
pub use record::*;
pub use registry::*;
pub use store::*;
pub use traits::*;
