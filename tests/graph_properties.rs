use ahash::AHashSet;
use proptest::prelude::*;
use regent::graph;
use regent_manifest::{Catalog, ModuleDescriptor};
use std::collections::BTreeSet;

/// Random acyclic catalog: module `i` may only depend on modules `< i`.
fn dag() -> impl Strategy<Value = Catalog> {
    (1usize..16)
        .prop_flat_map(|n| {
            (
                proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n),
                proptest::collection::vec(prop::bool::weighted(0.2), n),
            )
        })
        .prop_map(|(deps, autos)| {
            deps.into_iter()
                .zip(autos)
                .enumerate()
                .map(|(i, (picks, auto))| {
                    let depends: BTreeSet<String> = if i == 0 {
                        BTreeSet::new()
                    } else {
                        picks.iter().map(|p| format!("m{:02}", p.index(i))).collect()
                    };
                    ModuleDescriptor::new(format!("m{i:02}"))
                        .depends_on(depends)
                        .auto_install(auto)
                })
                .collect()
        })
}

fn requested_from(catalog: &Catalog, picks: &[prop::sample::Index]) -> Vec<String> {
    let names: Vec<&str> = catalog.names().collect();
    let mut requested: Vec<String> = picks
        .iter()
        .map(|p| names[p.index(names.len())].to_string())
        .collect();
    requested.dedup();
    requested
}

proptest! {
    #[test]
    fn order_puts_dependencies_first(
        catalog in dag(),
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..4),
    ) {
        let requested = requested_from(&catalog, &picks);
        let order = graph::resolve(&catalog, &requested).unwrap();

        for (pos, name) in order.iter().enumerate() {
            for dep in &catalog.get(name).unwrap().depends {
                let dep_pos = order.iter().position(|m| m == dep);
                prop_assert!(dep_pos.is_some(), "{dep} missing from {order:?}");
                prop_assert!(dep_pos.unwrap() < pos, "{dep} after {name} in {order:?}");
            }
        }
        for name in &requested {
            prop_assert!(order.contains(name));
        }
        let unique: BTreeSet<&String> = order.iter().collect();
        prop_assert_eq!(unique.len(), order.len());
    }

    #[test]
    fn auto_install_reaches_a_fixed_point(
        catalog in dag(),
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..4),
    ) {
        let requested = requested_from(&catalog, &picks);
        let none = AHashSet::default();
        let selected = graph::expand_install(&catalog, &none, &requested).unwrap();

        for module in catalog.iter().filter(|m| m.auto_install) {
            let satisfied = module.depends.iter().all(|d| selected.contains(d));
            if satisfied {
                prop_assert!(selected.contains(&module.name), "{} left out", module.name);
            }
        }
        let again = graph::expand_auto_install(&catalog, &none, selected.clone());
        prop_assert_eq!(again, selected);
    }

    #[test]
    fn resolution_is_deterministic(
        catalog in dag(),
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..4),
    ) {
        let requested = requested_from(&catalog, &picks);
        let mut reversed = requested.clone();
        reversed.reverse();

        let first = graph::resolve(&catalog, &requested).unwrap();
        let second = graph::resolve(&catalog, &reversed).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn installed_modules_are_not_selected_again(
        catalog in dag(),
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..4),
    ) {
        let requested = requested_from(&catalog, &picks);
        let installed: AHashSet<String> = catalog.names().take(3).map(str::to_string).collect();
        let selected = graph::expand_install(&catalog, &installed, &requested).unwrap();

        prop_assert!(selected.iter().all(|m| !installed.contains(m)));
        for name in &selected {
            for dep in &catalog.get(name).unwrap().depends {
                prop_assert!(selected.contains(dep) || installed.contains(dep));
            }
        }
    }
}
