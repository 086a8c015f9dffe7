//! Module manifests: descriptors, model contributions and addons scanning.

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod model;
pub mod version;

pub use catalog::Catalog;
pub use descriptor::{ModuleDescriptor, ModuleState, UnknownState};
pub use error::ManifestError;
pub use loader::{MANIFEST_FILE, load_manifest, scan_addons};
pub use model::{FieldSpec, FieldType, ModelSpec, default_table_name};
pub use version::adapt_version;
