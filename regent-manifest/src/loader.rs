use crate::catalog::Catalog;
use crate::descriptor::ModuleDescriptor;
use crate::error::ManifestError;
use crate::model::ModelSpec;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MANIFEST_FILE: &str = "manifest.toml";

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(default = "default_version")]
    version: String,
    summary: Option<String>,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    auto_install: bool,
    #[serde(default = "default_installable")]
    installable: bool,
    #[serde(default)]
    data: Vec<String>,
    #[serde(default)]
    demo: Vec<String>,
    pre_init_hook: Option<String>,
    post_init_hook: Option<String>,
    uninstall_hook: Option<String>,
    #[serde(default)]
    models: Vec<ModelSpec>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_installable() -> bool {
    true
}

/// Load and validate the manifest of the module living in `dir`.
pub fn load_manifest(dir: &Path) -> Result<ModuleDescriptor, ManifestError> {
    let path = dir.join(MANIFEST_FILE);
    let contents = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let raw: RawManifest = toml::from_str(&contents).map_err(|source| ManifestError::Parse {
        path: path.clone(),
        source,
    })?;

    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ManifestError::MissingField {
            path: path.clone(),
            field: "name",
        })?;

    let directory = dir.file_name().and_then(|d| d.to_str());
    if let Some(directory) = directory.filter(|d| *d != name) {
        return Err(ManifestError::NameMismatch {
            path,
            declared: name,
            directory: directory.to_string(),
        });
    }

    let mut depends = Vec::with_capacity(raw.depends.len());
    for dep in raw.depends {
        if dep == name {
            return Err(ManifestError::Invalid {
                module: name,
                message: "module depends on itself".to_string(),
            });
        }
        if !depends.contains(&dep) {
            depends.push(dep);
        }
    }

    for model in &raw.models {
        validate_model(&name, model)?;
    }

    Ok(ModuleDescriptor {
        name,
        version: raw.version,
        summary: raw.summary,
        depends,
        auto_install: raw.auto_install,
        installable: raw.installable,
        data: raw.data,
        demo: raw.demo,
        pre_init_hook: raw.pre_init_hook,
        post_init_hook: raw.post_init_hook,
        uninstall_hook: raw.uninstall_hook,
        models: raw.models,
        path: Some(dir.to_path_buf()),
    })
}

fn validate_model(module: &str, model: &ModelSpec) -> Result<(), ManifestError> {
    let invalid = |message: String| ManifestError::Invalid {
        module: module.to_string(),
        message,
    };

    if model.name.trim().is_empty() {
        return Err(invalid("model without a name".to_string()));
    }

    let mut seen = HashSet::new();
    for field in &model.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(invalid(format!(
                "field '{}' declared twice on model '{}'",
                field.name, model.name
            )));
        }
        if field.name == "id" {
            return Err(invalid(format!(
                "model '{}' redefines the reserved field 'id'",
                model.name
            )));
        }
        if field.kind.is_relational() && field.comodel.is_none() {
            return Err(invalid(format!(
                "relational field '{}.{}' has no comodel",
                model.name, field.name
            )));
        }
    }
    Ok(())
}

/// Scan addons directories and build the module catalog.
///
/// Directories are visited in the given order; when two directories provide a
/// module with the same name the first one wins.
pub fn scan_addons(paths: &[PathBuf]) -> Result<Catalog, ManifestError> {
    let mut catalog = Catalog::default();

    for root in paths {
        if !root.is_dir() {
            warn!(path = %root.display(), "addons path not found; skipping");
            continue;
        }

        let entries = fs::read_dir(root).map_err(|source| ManifestError::Io {
            path: root.clone(),
            source,
        })?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(e) => Some(e.path()),
                Err(e) => {
                    warn!(path = %root.display(), error = %e, "failed to read addons dir entry");
                    None
                }
            })
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            let descriptor = load_manifest(&dir)?;
            if catalog.contains(&descriptor.name) {
                warn!(
                    module = %descriptor.name,
                    path = %dir.display(),
                    "module already provided by an earlier addons path; ignoring"
                );
                continue;
            }
            debug!(module = %descriptor.name, path = %dir.display(), "manifest loaded");
            catalog.insert(descriptor);
        }
    }

    info!(modules = catalog.len(), "module catalog scanned");
    Ok(catalog)
}
