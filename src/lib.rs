pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod schema;
pub(crate) mod utils;

pub use config::Config;
pub use error::{IsFatal, RegentError};
pub use loader::{HookRegistry, LoadReport, LoadRequest, Loader, ModuleHook, ModuleOutcome};
pub use registry::{NoopLock, ProcessLock, Registry, RegistryCache};
pub use regent_manifest::{Catalog, ModuleDescriptor, ModuleState};
