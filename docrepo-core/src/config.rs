//! Per-repository configuration.
//!
//! A [`Configuration`] is assembled once with [`ConfigurationBuilder`] and shared
//! read-only by a repository and the results it hands out. Setters apply in call order;
//! a later call on the same field overrides an earlier one.

use std::{any::Any, fmt, sync::Arc, time::Duration};

use bson::{Document, de::deserialize_from_document};
use serde::de::DeserializeOwned;

use crate::{
    context::ExecutionContext,
    error::DocumentStoreResult,
    options::{FindOptions, sort_by},
};

/// Timeout applied to each operation unless configured otherwise.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(120);

/// A decode target produced by an item factory.
///
/// Implemented for every deserializable type; [`Box<dyn ResultItem>`] can be downcast
/// back to the concrete type once decoded.
pub trait ResultItem: Send + Sync + fmt::Debug {
    /// Replaces `self` with the value decoded from `document`.
    fn decode(&mut self, document: Document) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T> ResultItem for T
where
    T: DeserializeOwned + Send + Sync + fmt::Debug + 'static,
{
    fn decode(&mut self, document: Document) -> DocumentStoreResult<()> {
        *self = deserialize_from_document(document)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn ResultItem {
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Takes the concrete value out of the box, or gives the box back on mismatch.
    pub fn downcast<T: 'static>(self: Box<Self>) -> Result<T, Box<dyn Any>> {
        self.into_any().downcast::<T>().map(|item| *item)
    }
}

pub type ItemFactory = Arc<dyn Fn() -> Box<dyn ResultItem> + Send + Sync>;
pub type DefaultSort = Arc<dyn Fn(&mut FindOptions) + Send + Sync>;

#[derive(Clone)]
pub struct Configuration {
    query_timeout: Duration,
    default_sort: Option<DefaultSort>,
    item_factory: Option<ItemFactory>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("query_timeout", &self.query_timeout)
            .field("default_sort", &self.default_sort.is_some())
            .field("item_factory", &self.item_factory.is_some())
            .finish()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            default_sort: None,
            item_factory: None,
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Opens an execution scope bounded by this configuration's timeout.
    pub fn create_context(&self) -> ExecutionContext {
        ExecutionContext::from_configuration(Some(self))
    }

    /// Produces a blank decode target, a [`Document`] when no factory is set.
    pub fn create_item(&self) -> Box<dyn ResultItem> {
        match &self.item_factory {
            Some(factory) => factory(),
            None => Box::new(Document::new()),
        }
    }

    pub fn apply_default_sort(&self, options: &mut FindOptions) {
        if let Some(default_sort) = &self.default_sort {
            default_sort(options);
        }
    }

    pub fn has_default_sort(&self) -> bool {
        self.default_sort.is_some()
    }
}

#[derive(Default)]
pub struct ConfigurationBuilder {
    configuration: Configuration,
}

impl ConfigurationBuilder {
    /// Sets the per-operation timeout. `Duration::ZERO` disables the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.configuration.query_timeout = timeout;
        self
    }

    /// Installs a hook adjusting the options of every multi-document find before the
    /// caller's own options apply.
    pub fn with_default_sort<F>(mut self, default_sort: F) -> Self
    where
        F: Fn(&mut FindOptions) + Send + Sync + 'static,
    {
        self.configuration.default_sort = Some(Arc::new(default_sort));
        self
    }

    /// Sorts every multi-document find by `field`, descending.
    pub fn with_default_sort_field(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.with_default_sort(move |options| {
            options.sort = Some(sort_by(&field, false));
        })
    }

    pub fn with_item_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ResultItem> + Send + Sync + 'static,
    {
        self.configuration.item_factory = Some(Arc::new(factory));
        self
    }

    /// Materializes results as `T::default()` before decoding.
    pub fn with_item_type<T>(self) -> Self
    where
        T: ResultItem + Default + 'static,
    {
        self.with_item_factory(|| Box::new(T::default()))
    }

    pub fn build(self) -> Configuration {
        self.configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Tag {
        label: String,
    }

    #[test]
    fn defaults_to_a_finite_timeout_and_document_items() {
        let configuration = Configuration::new();

        assert_eq!(configuration.query_timeout(), DEFAULT_QUERY_TIMEOUT);
        assert!(configuration.create_item().downcast_ref::<Document>().is_some());
    }

    #[test]
    fn later_options_override_earlier_ones() {
        let configuration = Configuration::builder()
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(9))
            .build();

        assert_eq!(configuration.query_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn item_type_factory_decodes_into_the_type() {
        let configuration = Configuration::builder().with_item_type::<Tag>().build();

        let mut item = configuration.create_item();
        item.decode(doc! { "label": "rust" }).unwrap();

        assert_eq!(item.downcast::<Tag>().unwrap(), Tag { label: "rust".into() });
    }

    #[test]
    fn default_sort_field_sorts_descending() {
        let configuration = Configuration::builder().with_default_sort_field("created").build();
        let mut options = FindOptions::default();

        configuration.apply_default_sort(&mut options);

        assert_eq!(options.sort, Some(doc! { "created": -1 }));
    }
}
