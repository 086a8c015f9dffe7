//! Module dependency resolution.
//!
//! Everything here is a pure function of the catalog and the request; the loader
//! feeds the results to the database.

mod order;

pub use order::DependencyGraph;

use crate::error::GraphError;
use ahash::AHashSet;
use regent_manifest::Catalog;
use std::collections::BTreeSet;

/// Resolve requested modules into a load order.
///
/// Adds every transitive dependency, then every auto-install module whose
/// dependencies are all selected, and sorts the result so that dependencies
/// come first.
pub fn resolve<S: AsRef<str>>(catalog: &Catalog, requested: &[S]) -> Result<Vec<String>, GraphError> {
    let selected = expand_install(catalog, &AHashSet::default(), requested)?;
    topological_order(catalog, &selected)
}

/// Modules to install for `requested`, given the modules already `installed`.
///
/// Installed modules satisfy dependencies without being selected again.
pub fn expand_install<S: AsRef<str>>(
    catalog: &Catalog,
    installed: &AHashSet<String>,
    requested: &[S],
) -> Result<BTreeSet<String>, GraphError> {
    check_known(catalog, requested)?;

    let mut selected = BTreeSet::new();
    let mut to_check: Vec<(String, Option<String>)> = requested
        .iter()
        .map(|name| (name.as_ref().to_string(), None))
        .collect();

    while let Some((name, required_by)) = to_check.pop() {
        if installed.contains(&name) || selected.contains(&name) {
            continue;
        }
        let Some(module) = catalog.get(&name) else {
            return Err(GraphError::MissingDependency {
                module: required_by.unwrap_or_default(),
                dependency: name,
            });
        };
        if !module.installable {
            return Err(GraphError::NotInstallable {
                module: name,
                required_by,
            });
        }
        for dep in &module.depends {
            to_check.push((dep.clone(), Some(name.clone())));
        }
        selected.insert(name);
    }

    Ok(expand_auto_install(catalog, installed, selected))
}

/// Fixed point of the auto-install rule.
///
/// An installable auto-install module joins the selection once each of its
/// dependencies is installed or selected; the loop repeats so chains of
/// auto-install modules are picked up too.
pub fn expand_auto_install(
    catalog: &Catalog,
    installed: &AHashSet<String>,
    mut selected: BTreeSet<String>,
) -> BTreeSet<String> {
    loop {
        let before = selected.len();
        for module in catalog.iter() {
            if !module.auto_install
                || !module.installable
                || installed.contains(&module.name)
                || selected.contains(&module.name)
            {
                continue;
            }
            let satisfied = module
                .depends
                .iter()
                .all(|dep| installed.contains(dep) || selected.contains(dep));
            if satisfied {
                selected.insert(module.name.clone());
            }
        }
        if selected.len() == before {
            return selected;
        }
    }
}

/// `modules` plus every `active` module that depends on them, transitively.
pub fn expand_dependents<S: AsRef<str>>(
    catalog: &Catalog,
    active: &AHashSet<String>,
    modules: &[S],
) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut to_check: Vec<String> = modules.iter().map(|m| m.as_ref().to_string()).collect();

    while let Some(name) = to_check.pop() {
        if !found.insert(name.clone()) {
            continue;
        }
        to_check.extend(
            catalog
                .iter()
                .filter(|m| active.contains(&m.name) && m.depends.contains(&name))
                .map(|m| m.name.clone()),
        );
    }
    found
}

/// Topological order of exactly `names`.
pub fn topological_order(
    catalog: &Catalog,
    names: &BTreeSet<String>,
) -> Result<Vec<String>, GraphError> {
    DependencyGraph::build(catalog, names)?.order()
}

fn check_known<S: AsRef<str>>(catalog: &Catalog, requested: &[S]) -> Result<(), GraphError> {
    let unknown: Vec<String> = requested
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !catalog.contains(name))
        .map(str::to_string)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(GraphError::UnknownModules(unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regent_manifest::ModuleDescriptor;

    fn catalog(modules: Vec<ModuleDescriptor>) -> Catalog {
        modules.into_iter().collect()
    }

    #[test]
    fn auto_install_follows_its_dependencies() {
        let catalog = catalog(vec![
            ModuleDescriptor::new("x"),
            ModuleDescriptor::new("y").depends_on(["x"]),
            ModuleDescriptor::new("z")
                .depends_on(["x", "y"])
                .auto_install(true),
        ]);

        assert_eq!(resolve(&catalog, &["y"]).unwrap(), vec!["x", "y", "z"]);
        assert_eq!(resolve(&catalog, &["x"]).unwrap(), vec!["x"]);
    }

    #[test]
    fn auto_install_chains_reach_a_fixed_point() {
        let catalog = catalog(vec![
            ModuleDescriptor::new("base"),
            ModuleDescriptor::new("mail").depends_on(["base"]),
            ModuleDescriptor::new("mail_bot")
                .depends_on(["mail"])
                .auto_install(true),
            ModuleDescriptor::new("mail_bot_hr")
                .depends_on(["mail_bot", "base"])
                .auto_install(true),
        ]);

        let once = expand_install(&catalog, &AHashSet::default(), &["mail"]).unwrap();
        assert!(once.contains("mail_bot_hr"));
        let twice = expand_auto_install(&catalog, &AHashSet::default(), once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn installed_modules_satisfy_dependencies() {
        let catalog = catalog(vec![
            ModuleDescriptor::new("base"),
            ModuleDescriptor::new("sale").depends_on(["base"]),
        ]);
        let installed: AHashSet<String> = ["base".to_string()].into_iter().collect();

        let selected = expand_install(&catalog, &installed, &["sale"]).unwrap();
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec!["sale"]);
    }

    #[test]
    fn cycle_names_the_modules_involved() {
        let catalog = catalog(vec![
            ModuleDescriptor::new("a").depends_on(["b"]),
            ModuleDescriptor::new("b").depends_on(["a"]),
            ModuleDescriptor::new("c").depends_on(["a"]),
        ]);

        match resolve(&catalog, &["c"]) {
            Err(GraphError::Cycle { modules }) => {
                assert!(modules.contains(&"a".to_string()));
                assert!(modules.contains(&"b".to_string()));
                assert!(!modules.contains(&"c".to_string()));
            }
            other => panic!("expected a cycle error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_names_are_reported() {
        let catalog = catalog(vec![ModuleDescriptor::new("base")]);

        let err = resolve(&catalog, &["base", "nope", "nada"]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownModules(vec!["nope".to_string(), "nada".to_string()])
        );
    }

    #[test]
    fn missing_dependency_names_module_and_dependent() {
        let catalog = catalog(vec![ModuleDescriptor::new("sale").depends_on(["product"])]);

        let err = resolve(&catalog, &["sale"]).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingDependency {
                module: "sale".to_string(),
                dependency: "product".to_string(),
            }
        );
    }

    #[test]
    fn uninstallable_dependency_is_rejected() {
        let mut legacy = ModuleDescriptor::new("legacy");
        legacy.installable = false;
        let catalog = catalog(vec![legacy, ModuleDescriptor::new("app").depends_on(["legacy"])]);

        let err = resolve(&catalog, &["app"]).unwrap_err();
        assert_eq!(
            err,
            GraphError::NotInstallable {
                module: "legacy".to_string(),
                required_by: Some("app".to_string()),
            }
        );
    }

    #[test]
    fn dependents_are_expanded_transitively_within_active_modules() {
        let catalog = catalog(vec![
            ModuleDescriptor::new("base"),
            ModuleDescriptor::new("sale").depends_on(["base"]),
            ModuleDescriptor::new("sale_stock").depends_on(["sale"]),
            ModuleDescriptor::new("crm").depends_on(["base"]),
        ]);
        let active: AHashSet<String> = ["base", "sale", "sale_stock"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let removed = expand_dependents(&catalog, &active, &["sale"]);
        assert_eq!(
            removed.into_iter().collect::<Vec<_>>(),
            vec!["sale", "sale_stock"]
        );
    }
}
