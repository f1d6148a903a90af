use std::fmt;

use async_trait::async_trait;
use bson::Document;
use mongodb::Cursor;

use docrepo_core::{
    cursor::DocumentCursor,
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::error::map_error;

/// A driver cursor streaming documents from the server.
pub struct MongoCursor {
    cursor: Option<Cursor<Document>>,
    current: Option<Document>,
}

impl MongoCursor {
    pub fn new(cursor: Cursor<Document>) -> Self {
        Self {
            cursor: Some(cursor),
            current: None,
        }
    }
}

impl fmt::Debug for MongoCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoCursor")
            .field("open", &self.cursor.is_some())
            .field("current", &self.current)
            .finish()
    }
}

#[async_trait]
impl DocumentCursor for MongoCursor {
    async fn advance(&mut self) -> DocumentStoreResult<bool> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };

        if cursor.advance().await.map_err(map_error)? {
            self.current = Some(cursor.deserialize_current().map_err(map_error)?);
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn current(&self) -> DocumentStoreResult<Document> {
        self.current.clone().ok_or(DocumentStoreError::NoDocuments)
    }

    /// Dropping the driver cursor kills it on the server in the background.
    async fn close(&mut self) -> DocumentStoreResult<()> {
        self.cursor = None;
        self.current = None;
        Ok(())
    }
}
