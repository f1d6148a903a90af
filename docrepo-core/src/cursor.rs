//! Store-side streaming cursors.

use std::{collections::VecDeque, fmt::Debug};

use async_trait::async_trait;
use bson::Document;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A forward-only stream of documents returned by a store.
///
/// `advance` moves to the next document and reports whether one exists; `current`
/// yields the document the cursor rests on. Cursors cannot be rewound.
#[async_trait]
pub trait DocumentCursor: Send + Debug {
    async fn advance(&mut self) -> DocumentStoreResult<bool>;

    /// The document under the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NoDocuments`] if `advance` has not yet returned
    /// `true`.
    fn current(&self) -> DocumentStoreResult<Document>;

    /// Releases server-side resources. Further calls to `advance` return `false`.
    async fn close(&mut self) -> DocumentStoreResult<()>;
}

/// A cursor over documents already held in memory.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    pending: VecDeque<Document>,
    current: Option<Document>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            pending: documents.into(),
            current: None,
            closed: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl DocumentCursor for BufferedCursor {
    async fn advance(&mut self) -> DocumentStoreResult<bool> {
        if self.closed {
            return Ok(false);
        }

        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn current(&self) -> DocumentStoreResult<Document> {
        self.current.clone().ok_or(DocumentStoreError::NoDocuments)
    }

    async fn close(&mut self) -> DocumentStoreResult<()> {
        self.closed = true;
        self.pending.clear();
        self.current = None;
        Ok(())
    }
}
