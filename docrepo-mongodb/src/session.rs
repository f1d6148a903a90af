//! Transactional sessions on the MongoDB driver.

use std::{any::Any, fmt, sync::Arc};

use mea::mutex::Mutex;
use mongodb::{Client, ClientSession};

use docrepo_core::{
    context::{ExecutionContext, SessionHandle, TransactionSession},
    error::DocumentStoreResult,
};

use crate::error::map_error;

/// A driver session shared by the operations of one transaction.
///
/// Operations run under an [`ExecutionContext::transactional`] context lock the
/// session for the duration of each driver call.
pub struct MongoSession {
    pub(crate) session: Mutex<ClientSession>,
}

impl MongoSession {
    pub fn new(session: ClientSession) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    pub async fn start(client: &Client) -> DocumentStoreResult<Self> {
        let session = client.start_session().await.map_err(map_error)?;
        Ok(Self::new(session))
    }

    pub async fn start_transaction(&self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .start_transaction()
            .await
            .map_err(map_error)
    }

    pub async fn commit_transaction(&self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .commit_transaction()
            .await
            .map_err(map_error)
    }

    pub async fn abort_transaction(&self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .abort_transaction()
            .await
            .map_err(map_error)
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(self)
    }
}

impl fmt::Debug for MongoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoSession").finish_non_exhaustive()
    }
}

impl TransactionSession for MongoSession {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The MongoDB session carried by `context`, if any.
pub(crate) fn session_of(context: &ExecutionContext) -> Option<&MongoSession> {
    context
        .session()
        .and_then(|session| session.as_any().downcast_ref::<MongoSession>())
}
