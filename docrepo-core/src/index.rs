//! Declarative index definitions and the store-level index model.

use std::time::Duration;

use bson::{Bson, Document};

/// One key of an index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    pub name: String,
    pub ascending: bool,
}

/// An ordered list of fields making up a (possibly compound) index.
///
/// # Example
///
/// ```ignore
/// use docrepo_core::index::IndexDefinition;
///
/// let definition = IndexDefinition::new()
///     .add_field("name", true)
///     .add_field("age", false);
///
/// // keys: { "name": 1, "age": -1 }
/// let model = definition.to_index_model(None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDefinition {
    fields: Vec<IndexField>,
}

impl IndexDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, name: impl Into<String>, ascending: bool) -> Self {
        self.fields.push(IndexField { name: name.into(), ascending });
        self
    }

    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Translates the definition into an index request, preserving field order.
    ///
    /// Returns `None` when the definition has no fields.
    pub fn to_index_model(&self, options: Option<IndexOptions>) -> Option<IndexModel> {
        if self.fields.is_empty() {
            return None;
        }

        let mut keys = Document::new();
        for field in &self.fields {
            keys.insert(field.name.clone(), Bson::Int32(if field.ascending { 1 } else { -1 }));
        }

        Some(IndexModel { keys, options })
    }
}

/// Options accepted when creating an index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOptions {
    pub name: Option<String>,
    pub unique: Option<bool>,
    pub sparse: Option<bool>,
    pub expire_after: Option<Duration>,
}

impl IndexOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = Some(sparse);
        self
    }

    pub fn with_expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = Some(expire_after);
        self
    }
}

/// A single index creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub keys: Document,
    pub options: Option<IndexOptions>,
}

impl IndexModel {
    pub fn new(keys: Document) -> Self {
        Self { keys, options: None }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// The explicit name from the options, or the server-style `field_dir` name.
    pub fn name(&self) -> String {
        self.options
            .as_ref()
            .and_then(|options| options.name.clone())
            .unwrap_or_else(|| self.default_name())
    }

    /// Joins `field_direction` pairs the way the server names unnamed indexes.
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| match direction {
                Bson::Int32(value) => format!("{field}_{value}"),
                Bson::Int64(value) => format!("{field}_{value}"),
                Bson::Double(value) => format!("{field}_{value}"),
                Bson::String(value) => format!("{field}_{value}"),
                other => format!("{field}_{other}"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn is_unique(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|options| options.unique)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn compound_definition_preserves_key_order() {
        let model = IndexDefinition::new()
            .add_field("name", true)
            .add_field("age", false)
            .to_index_model(None)
            .unwrap();

        let keys = model.keys.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![("name".to_string(), Bson::Int32(1)), ("age".to_string(), Bson::Int32(-1))]
        );
        assert_eq!(model.default_name(), "name_1_age_-1");
    }

    #[test]
    fn empty_definition_produces_no_model() {
        assert!(IndexDefinition::new().to_index_model(None).is_none());
    }

    #[test]
    fn explicit_name_takes_precedence() {
        let model = IndexModel::new(doc! { "email": 1 })
            .with_options(IndexOptions::default().with_name("by_email").with_unique(true));

        assert_eq!(model.name(), "by_email");
        assert!(model.is_unique());
    }
}
