use crate::descriptor::ModuleDescriptor;
use std::collections::BTreeMap;

/// All modules known on disk, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    modules: BTreeMap<String, ModuleDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, replacing any previous module with the same name.
    pub fn insert(&mut self, module: ModuleDescriptor) -> Option<ModuleDescriptor> {
        self.modules.insert(module.name.clone(), module)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl FromIterator<ModuleDescriptor> for Catalog {
    fn from_iter<T: IntoIterator<Item = ModuleDescriptor>>(iter: T) -> Self {
        let mut catalog = Catalog::default();
        for module in iter {
            catalog.insert(module);
        }
        catalog
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ModuleDescriptor;
    type IntoIter = std::collections::btree_map::Values<'a, String, ModuleDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.values()
    }
}
