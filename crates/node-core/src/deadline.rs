//! Deadline wrapper for backend calls.

use std::future::Future;
use std::time::Duration;

use crate::error::BackendError;

/// Run `call` on its own task and wait at most `deadline` for it.
///
/// On expiry the caller gets [`BackendError::Timeout`] while the task keeps
/// running to completion in the background. A payment that is already on
/// the wire is never abandoned half way.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(call);

    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            tracing::error!(error = %join_error, "Backend call task failed");
            Err(BackendError::Backend(format!("backend task failed: {join_error}")))
        }
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Backend call exceeded deadline");
            Err(BackendError::Timeout)
        }
    }
}
