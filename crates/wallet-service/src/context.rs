//! Dependencies shared by every request.

use std::future::Future;
use std::sync::Arc;

use database::Database;
use nip47::Cipher;
use node_core::{with_deadline, BackendError, NodeBackend};
use sqlx::SqlitePool;

use crate::config::ServiceConfig;
use crate::locks::AppLocks;

/// Everything a handler may touch. Built once at startup and passed down
/// explicitly.
pub struct ServiceContext {
    pub db: Database,
    pub backend: Arc<dyn NodeBackend>,
    pub cipher: Cipher,
    pub config: ServiceConfig,
    pub locks: AppLocks,
}

impl ServiceContext {
    pub fn new(
        db: Database,
        backend: Arc<dyn NodeBackend>,
        cipher: Cipher,
        config: ServiceConfig,
    ) -> Self {
        Self {
            db,
            backend,
            cipher,
            config,
            locks: AppLocks::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// Call the backend under the configured deadline.
    ///
    /// The call runs on its own task; on expiry the caller gets
    /// [`BackendError::Timeout`] and the call still runs to completion.
    pub async fn call<T, F, Fut>(&self, call: F) -> Result<T, BackendError>
    where
        F: FnOnce(Arc<dyn NodeBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
        T: Send + 'static,
    {
        with_deadline(self.config.backend_timeout, call(self.backend.clone())).await
    }
}
