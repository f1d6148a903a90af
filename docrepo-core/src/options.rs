//! Per-call options passed through to the store.

use bson::{Bson, Document};

/// Options for multi-document finds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Selects page `index` (1-based) of `size` documents.
    ///
    /// An index below 1 is treated as the first page and a size below 1 as a single
    /// document. The skip saturates instead of overflowing.
    pub fn with_page(self, index: i64, size: i64) -> Self {
        let index = index.max(1) as u64;
        let size = size.max(1);

        self.with_skip((size as u64).saturating_mul(index - 1)).with_limit(size)
    }

    /// Overlays every option set on `other` onto `self`.
    pub fn merge(&mut self, other: FindOptions) {
        if other.skip.is_some() {
            self.skip = other.skip;
        }
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.sort.is_some() {
            self.sort = other.sort;
        }
        if other.projection.is_some() {
            self.projection = other.projection;
        }
    }
}

/// Options for single-document finds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    pub skip: Option<u64>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
}

impl FindOneOptions {
    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
}

impl UpdateOptions {
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

/// Options for find-one-and-update. `upsert` stays off unless requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    pub upsert: Option<bool>,
    pub return_document: ReturnDocument,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
}

impl FindOneAndUpdateOptions {
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }

    pub fn with_return_document(mut self, return_document: ReturnDocument) -> Self {
        self.return_document = return_document;
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceOptions {
    pub upsert: Option<bool>,
}

impl ReplaceOptions {
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    pub allow_disk_use: Option<bool>,
    pub batch_size: Option<u32>,
}

impl AggregateOptions {
    pub fn with_allow_disk_use(mut self, allow_disk_use: bool) -> Self {
        self.allow_disk_use = Some(allow_disk_use);
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Options for bulk writes. Writes are ordered unless turned off.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteOptions {
    pub ordered: bool,
}

impl Default for BulkWriteOptions {
    fn default() -> Self {
        Self { ordered: true }
    }
}

impl BulkWriteOptions {
    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }
}

/// Builds a single-key sort document.
pub fn sort_by(field: &str, ascending: bool) -> Document {
    let mut sort = Document::new();
    sort.insert(field, Bson::Int32(if ascending { 1 } else { -1 }));
    sort
}
