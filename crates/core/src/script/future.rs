//! Re-readable handle to an in-flight script run.

use std::sync::Mutex;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::script::pool::RunResult;

/// One-shot handle to a background script execution.
///
/// `wait` is idempotent: the outcome is cached after the first completion
/// and every later read returns the same result.
pub struct ScriptFuture {
    handle: Mutex<Option<JoinHandle<CoreResult<RunResult>>>>,
    result: OnceCell<RunResult>,
    token: CancellationToken,
}

impl ScriptFuture {
    pub(crate) fn new(handle: JoinHandle<CoreResult<RunResult>>, token: CancellationToken) -> Self {
        Self {
            handle: Mutex::new(Some(handle)),
            result: OnceCell::new(),
            token,
        }
    }

    /// Await completion and return the outcome. Internal failures (unknown
    /// script, worker panic) are folded into a failed result.
    pub async fn wait(&self) -> RunResult {
        self.result
            .get_or_init(|| async {
                let handle = self.handle.lock().expect("future handle poisoned").take();
                match handle {
                    Some(handle) => match handle.await {
                        Ok(Ok(result)) => result,
                        Ok(Err(err)) => RunResult::failure(err),
                        Err(err) => RunResult::failure(CoreError::Runtime(format!(
                            "execution task failed: {err}"
                        ))),
                    },
                    None => RunResult::failure(CoreError::Runtime(
                        "execution result unavailable".to_string(),
                    )),
                }
            })
            .await
            .clone()
    }

    /// The final value (null when the run failed).
    pub async fn value(&self) -> serde_json::Value {
        self.wait().await.value
    }

    /// The run's error, if it failed.
    pub async fn error(&self) -> Option<CoreError> {
        self.wait().await.error
    }

    /// Request cancellation of the underlying run.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The cancellation token attached to this run.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
