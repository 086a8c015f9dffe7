use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Char,
    Text,
    Integer,
    Float,
    Monetary,
    Boolean,
    Date,
    Datetime,
    Binary,
    Selection,
    Many2one,
    One2many,
    Many2many,
}

impl FieldType {
    /// SQLite column type for fields backed by a column, `None` for fields that
    /// live elsewhere (reverse relations, relation tables).
    pub fn column_type(self) -> Option<&'static str> {
        match self {
            FieldType::Char | FieldType::Selection => Some("VARCHAR"),
            FieldType::Text => Some("TEXT"),
            FieldType::Integer | FieldType::Many2one => Some("INTEGER"),
            FieldType::Float => Some("REAL"),
            FieldType::Monetary => Some("NUMERIC"),
            FieldType::Boolean => Some("BOOLEAN"),
            FieldType::Date => Some("DATE"),
            FieldType::Datetime => Some("TIMESTAMP"),
            FieldType::Binary => Some("BLOB"),
            FieldType::One2many | FieldType::Many2many => None,
        }
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            FieldType::Many2one | FieldType::One2many | FieldType::Many2many
        )
    }
}

/// One field as declared by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FieldType,

    /// Target model of relational fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comodel: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub index: bool,

    #[serde(default)]
    pub unique: bool,

    /// Non-stored fields are computed by the ORM and get no column.
    #[serde(default = "default_store")]
    pub store: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            comodel: None,
            required: false,
            index: false,
            unique: false,
            store: true,
            default: None,
        }
    }

    /// True when the field is persisted as a column of the model's own table.
    pub fn has_column(&self) -> bool {
        self.store && self.kind.column_type().is_some()
    }
}

fn default_store() -> bool {
    true
}

/// A module's contribution to one logical model.
///
/// Several modules may contribute to the same model name; the loader merges the
/// contributions in load order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,

    #[serde(default)]
    pub transient: bool,

    /// The contribution only extends a model some dependency already defines.
    #[serde(default)]
    pub extend: bool,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            description: None,
            is_abstract: false,
            transient: false,
            extend: false,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

/// Default table name for a model: dots become underscores.
pub fn default_table_name(model: &str) -> String {
    model.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_relations_have_no_column() {
        let mut lines = FieldSpec::new("line_ids", FieldType::One2many);
        lines.comodel = Some("sale.order.line".to_string());
        assert!(!lines.has_column());

        let mut computed = FieldSpec::new("total", FieldType::Float);
        computed.store = false;
        assert!(!computed.has_column());

        assert!(FieldSpec::new("partner_id", FieldType::Many2one).has_column());
    }

    #[test]
    fn table_name_replaces_dots() {
        assert_eq!(default_table_name("res.partner.bank"), "res_partner_bank");
    }
}
