//! The unified result of a find operation.
//!
//! A [`FindResult`] wraps exactly one of three outcomes fixed at construction:
//!
//! - a single document, from a find-one style lookup;
//! - a streaming cursor, from a multi-document find;
//! - an error.
//!
//! The same decode methods work on every outcome. Iteration is forward-only. Once the
//! stream has been drained by [`FindResult::all`] or [`FindResult::to_all`], the cursor
//! is closed and the result reports [`DocumentStoreError::CursorExhausted`].

use std::{mem, sync::Arc};

use bson::{Document, de::deserialize_from_document};
use futures::{Stream, stream};
use serde::de::DeserializeOwned;

use crate::{
    backend::BoxedCursor,
    config::{Configuration, ResultItem},
    cursor::DocumentCursor,
    error::{DocumentStoreError, DocumentStoreResult},
};

#[derive(Debug)]
enum FindState {
    Single(Document),
    Multi(BoxedCursor),
    Failed(DocumentStoreError),
    Exhausted,
}

#[derive(Debug)]
pub struct FindResult {
    state: FindState,
    configuration: Arc<Configuration>,
}

impl FindResult {
    pub fn single(document: Document, configuration: Arc<Configuration>) -> Self {
        Self { state: FindState::Single(document), configuration }
    }

    pub fn multi(cursor: BoxedCursor, configuration: Arc<Configuration>) -> Self {
        Self { state: FindState::Multi(cursor), configuration }
    }

    pub fn failed(error: DocumentStoreError, configuration: Arc<Configuration>) -> Self {
        Self { state: FindState::Failed(error), configuration }
    }

    /// Wraps a single-document lookup; an absent document becomes the not-found state.
    pub fn from_lookup(
        lookup: DocumentStoreResult<Option<Document>>,
        configuration: Arc<Configuration>,
    ) -> Self {
        match lookup {
            Ok(Some(document)) => Self::single(document, configuration),
            Ok(None) => Self::failed(DocumentStoreError::NoDocuments, configuration),
            Err(error) => Self::failed(error, configuration),
        }
    }

    pub fn single_document(&self) -> Option<&Document> {
        match &self.state {
            FindState::Single(document) => Some(document),
            _ => None,
        }
    }

    pub fn cursor_mut(&mut self) -> Option<&mut (dyn DocumentCursor + 'static)> {
        match &mut self.state {
            FindState::Multi(cursor) => Some(cursor.as_mut()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DocumentStoreError> {
        match &self.state {
            FindState::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, FindState::Exhausted)
    }

    /// Decodes the next document into `T`.
    ///
    /// # Errors
    ///
    /// The stored error for a failed result, or [`DocumentStoreError::NoDocuments`] once
    /// a stream has nothing left.
    pub async fn one<T: DeserializeOwned>(&mut self) -> DocumentStoreResult<T> {
        let document = self.next_document().await?;
        Ok(deserialize_from_document(document)?)
    }

    /// Decodes the next document into an item from the configured factory.
    ///
    /// Not-found is reported as `Ok(None)`.
    pub async fn to_one(&mut self) -> DocumentStoreResult<Option<Box<dyn ResultItem>>> {
        match self.next_document().await {
            Ok(document) => {
                let mut item = self.configuration.create_item();
                item.decode(document)?;
                Ok(Some(item))
            }
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Drains the stream into `Vec<T>` and closes it.
    ///
    /// An empty stream yields an empty vector.
    ///
    /// # Errors
    ///
    /// The stored error for a failed result, [`DocumentStoreError::NoCursor`] for a
    /// single-document result, or the first decode failure.
    pub async fn all<T: DeserializeOwned + Send>(&mut self) -> DocumentStoreResult<Vec<T>> {
        self.drain(|document| Ok(deserialize_from_document(document)?)).await
    }

    /// Like [`FindResult::all`], but materializes each item through the configured factory.
    pub async fn to_all(&mut self) -> DocumentStoreResult<Vec<Box<dyn ResultItem>>> {
        let configuration = Arc::clone(&self.configuration);

        self.drain(move |document| {
            let mut item = configuration.create_item();
            item.decode(document)?;
            Ok(item)
        })
        .await
    }

    /// Closes the underlying stream, if any. Later reads report exhaustion.
    pub async fn close(&mut self) -> DocumentStoreResult<()> {
        match mem::replace(&mut self.state, FindState::Exhausted) {
            FindState::Multi(mut cursor) => cursor.close().await,
            FindState::Failed(error) => {
                self.state = FindState::Failed(error);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Turns the result into a stream of decoded items that ends at exhaustion.
    ///
    /// If closing the drained stream fails, that error is yielded as the final item.
    pub fn into_stream<T>(self) -> impl Stream<Item = DocumentStoreResult<T>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        stream::unfold(Some(self), |state| async move {
            let mut result = match state {
                Some(result) => result,
                None => return None,
            };

            match result.one::<T>().await {
                Ok(item) => Some((Ok(item), Some(result))),
                // A failed close surfaces as the last item.
                Err(DocumentStoreError::NoDocuments | DocumentStoreError::CursorExhausted) => match result.close().await {
                    Ok(()) => None,
                    Err(error) => Some((Err(error), None)),
                },
                Err(error) => Some((Err(error), None)),
            }
        })
    }

    async fn next_document(&mut self) -> DocumentStoreResult<Document> {
        match mem::replace(&mut self.state, FindState::Exhausted) {
            FindState::Single(document) => Ok(document),
            FindState::Failed(error) => {
                self.state = FindState::Failed(error.clone());
                Err(error)
            }
            FindState::Exhausted => Err(DocumentStoreError::CursorExhausted),
            FindState::Multi(mut cursor) => {
                let context = self.configuration.create_context();
                let next = match context.run(cursor.advance()).await {
                    Ok(true) => cursor.current(),
                    Ok(false) => Err(DocumentStoreError::NoDocuments),
                    Err(error) => Err(error),
                };

                self.state = FindState::Multi(cursor);
                next
            }
        }
    }

    async fn drain<T, F>(&mut self, mut decode: F) -> DocumentStoreResult<Vec<T>>
    where
        T: Send,
        F: FnMut(Document) -> DocumentStoreResult<T> + Send,
    {
        let mut cursor = match mem::replace(&mut self.state, FindState::Exhausted) {
            FindState::Multi(cursor) => cursor,
            FindState::Failed(error) => {
                self.state = FindState::Failed(error.clone());
                return Err(error);
            }
            FindState::Single(document) => {
                self.state = FindState::Single(document);
                return Err(DocumentStoreError::NoCursor);
            }
            FindState::Exhausted => return Err(DocumentStoreError::CursorExhausted),
        };

        let context = self.configuration.create_context();
        let collected = context
            .run(async {
                let mut items = Vec::new();
                while cursor.advance().await? {
                    items.push(decode(cursor.current()?)?);
                }
                Ok::<_, DocumentStoreError>(items)
            })
            .await;
        let closed = cursor.close().await;

        let items = collected?;
        closed?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::BufferedCursor;
    use async_trait::async_trait;
    use bson::doc;
    use futures::{StreamExt, TryStreamExt};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Item {
        n: i32,
    }

    #[derive(Debug)]
    struct CountingCursor {
        inner: BufferedCursor,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentCursor for CountingCursor {
        async fn advance(&mut self) -> DocumentStoreResult<bool> {
            self.inner.advance().await
        }

        fn current(&self) -> DocumentStoreResult<Document> {
            self.inner.current()
        }

        async fn close(&mut self) -> DocumentStoreResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close().await
        }
    }

    fn counting(documents: Vec<Document>) -> (BoxedCursor, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let cursor = CountingCursor {
            inner: BufferedCursor::new(documents),
            closes: Arc::clone(&closes),
        };
        (Box::new(cursor), closes)
    }

    #[derive(Debug)]
    struct BrokenCloseCursor(BufferedCursor);

    #[async_trait]
    impl DocumentCursor for BrokenCloseCursor {
        async fn advance(&mut self) -> DocumentStoreResult<bool> {
            self.0.advance().await
        }

        fn current(&self) -> DocumentStoreResult<Document> {
            self.0.current()
        }

        async fn close(&mut self) -> DocumentStoreResult<()> {
            Err(DocumentStoreError::Backend("connection reset".into()))
        }
    }

    fn configuration() -> Arc<Configuration> {
        Arc::new(Configuration::builder().with_item_type::<Item>().build())
    }

    #[tokio::test]
    async fn one_on_failed_result_returns_stored_error() {
        let mut result = FindResult::failed(DocumentStoreError::Backend("down".into()), configuration());

        assert_eq!(result.one::<Item>().await, Err(DocumentStoreError::Backend("down".into())));
        assert_eq!(result.one::<Item>().await, Err(DocumentStoreError::Backend("down".into())));
    }

    #[tokio::test]
    async fn to_one_maps_not_found_to_none() {
        let mut result = FindResult::from_lookup(Ok(None), configuration());

        assert!(result.to_one().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn to_one_propagates_other_errors() {
        let mut result = FindResult::from_lookup(Err(DocumentStoreError::Cancelled), configuration());

        assert_eq!(result.to_one().await.unwrap_err(), DocumentStoreError::Cancelled);
    }

    #[tokio::test]
    async fn single_result_decodes_once() {
        let mut result = FindResult::single(doc! { "n": 4 }, configuration());

        let item = result.to_one().await.unwrap().unwrap();
        assert_eq!(item.downcast::<Item>().unwrap(), Item { n: 4 });
        assert_eq!(result.one::<Item>().await, Err(DocumentStoreError::CursorExhausted));
    }

    #[tokio::test]
    async fn all_requires_a_cursor() {
        let mut result = FindResult::single(doc! { "n": 1 }, configuration());

        assert_eq!(result.all::<Item>().await, Err(DocumentStoreError::NoCursor));
        assert!(result.single_document().is_some());
    }

    #[tokio::test]
    async fn one_on_exhausted_stream_is_not_found() {
        let (cursor, _) = counting(vec![doc! { "n": 1 }]);
        let mut result = FindResult::multi(cursor, configuration());

        assert_eq!(result.one::<Item>().await, Ok(Item { n: 1 }));
        assert_eq!(result.one::<Item>().await, Err(DocumentStoreError::NoDocuments));
    }

    #[tokio::test]
    async fn to_all_on_empty_stream_is_empty_and_closes_once() {
        let (cursor, closes) = counting(vec![]);
        let mut result = FindResult::multi(cursor, configuration());

        assert!(result.to_all().await.unwrap().is_empty());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(result.to_all().await.unwrap_err(), DocumentStoreError::CursorExhausted);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_decodes_in_stream_order() {
        let (cursor, closes) = counting(vec![doc! { "n": 1 }, doc! { "n": 2 }, doc! { "n": 3 }]);
        let mut result = FindResult::multi(cursor, configuration());

        let items = result.all::<Item>().await.unwrap();

        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }, Item { n: 3 }]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decode_failure_still_closes_the_stream() {
        let (cursor, closes) = counting(vec![doc! { "n": 1 }, doc! { "n": "two" }]);
        let mut result = FindResult::multi(cursor, configuration());

        let err = result.to_all().await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Serialization(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(result.is_exhausted());
    }

    #[tokio::test]
    async fn stream_yields_every_item() {
        let (cursor, closes) = counting(vec![doc! { "n": 1 }, doc! { "n": 2 }]);
        let items = FindResult::multi(cursor, configuration())
            .into_stream::<Item>()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_reports_close_failure_last() {
        let cursor = Box::new(BrokenCloseCursor(BufferedCursor::new(vec![doc! { "n": 1 }])));
        let items = FindResult::multi(cursor, configuration())
            .into_stream::<Item>()
            .collect::<Vec<_>>()
            .await;

        assert_eq!(
            items,
            vec![Ok(Item { n: 1 }), Err(DocumentStoreError::Backend("connection reset".into()))]
        );
    }
}
