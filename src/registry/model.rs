use regent_manifest::{FieldSpec, ModelSpec, default_table_name};
use serde::Serialize;
use std::collections::BTreeMap;

/// Model name to composed model, ordered by name.
pub type ModelMap = BTreeMap<String, Model>;

/// A model as seen after merging every contribution loaded so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub name: String,
    pub table: String,
    pub description: Option<String>,
    pub is_abstract: bool,
    pub transient: bool,
    /// Fields in declaration order; a redefined field keeps its first position.
    pub fields: Vec<FieldSpec>,
    /// Contributing modules in load order.
    pub modules: Vec<String>,
}

impl Model {
    /// Model defined by `module`'s contribution.
    pub fn from_spec(module: &str, spec: &ModelSpec) -> Self {
        let mut model = Self {
            name: spec.name.clone(),
            table: spec
                .table
                .clone()
                .unwrap_or_else(|| default_table_name(&spec.name)),
            description: spec.description.clone(),
            is_abstract: spec.is_abstract,
            transient: spec.transient,
            fields: Vec::with_capacity(spec.fields.len()),
            modules: Vec::new(),
        };
        model.merge(module, spec);
        model
    }

    /// Fold a later contribution into the model.
    ///
    /// Fields are additive and the later definition of a field replaces the
    /// earlier one. Explicit `table`/`description` always win; the `abstract`
    /// and `transient` flags are only taken from contributions that redefine
    /// the model rather than extend it.
    pub fn merge(&mut self, module: &str, spec: &ModelSpec) {
        if let Some(table) = &spec.table {
            self.table.clone_from(table);
        }
        if spec.description.is_some() {
            self.description.clone_from(&spec.description);
        }
        if !spec.extend {
            self.is_abstract = spec.is_abstract;
            self.transient = spec.transient;
        }

        for field in &spec.fields {
            match self.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field.clone(),
                None => self.fields.push(field.clone()),
            }
        }

        if !self.modules.iter().any(|m| m == module) {
            self.modules.push(module.to_string());
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields backed by a column of the model's table.
    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.has_column())
    }

    pub fn has_table(&self) -> bool {
        !self.is_abstract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regent_manifest::FieldType;

    #[test]
    fn later_contribution_wins_on_conflict() {
        let base = ModelSpec::new("res.partner")
            .with_field(FieldSpec::new("name", FieldType::Char))
            .with_field(FieldSpec::new("ref", FieldType::Char));

        let mut ext = ModelSpec::new("res.partner");
        ext.extend = true;
        ext.description = Some("Contact".to_string());
        let mut name = FieldSpec::new("name", FieldType::Text);
        name.required = true;
        ext.fields = vec![name, FieldSpec::new("email", FieldType::Char)];

        let mut model = Model::from_spec("base", &base);
        model.merge("contacts", &ext);

        assert_eq!(model.table, "res_partner");
        assert_eq!(model.description.as_deref(), Some("Contact"));
        let names: Vec<&str> = model.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "ref", "email"]);
        let name = model.field("name").unwrap();
        assert_eq!(name.kind, FieldType::Text);
        assert!(name.required);
        assert_eq!(model.modules, ["base", "contacts"]);
    }

    #[test]
    fn extension_keeps_abstract_flag() {
        let mut mixin = ModelSpec::new("mail.thread");
        mixin.is_abstract = true;
        let mut ext = ModelSpec::new("mail.thread");
        ext.extend = true;

        let mut model = Model::from_spec("mail", &mixin);
        model.merge("sale", &ext);
        assert!(!model.has_table());
    }
}
