//! The intercept point wrapped around external operations.

use std::future::Future;

use tracing::{debug, warn};

use super::key::{generate_key, MockKey};
use super::session::{InterceptMode, InterceptSession};
use super::value::MockPayload;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Run `real` through the session's intercept mode.
///
/// Without a session the real operation runs untouched. With one, every call
/// appends exactly one entry to the session's execution log:
///
/// * `Disabled` runs the real operation.
/// * `Record` runs the real operation and stores a successful result under
///   the generated key. Failures store nothing.
/// * `Enabled` returns the stored mock for the key without running the real
///   operation, or falls back to it when no mock exists. A mock of the wrong
///   kind fails with `MockTypeMismatch`.
pub async fn intercept<P, T, F, Fut>(
    session: Option<&InterceptSession>,
    operation: &str,
    params: &P,
    real: F,
) -> OrchestratorResult<T>
where
    P: MockKey + ?Sized,
    T: MockPayload,
    F: FnOnce() -> Fut,
    Fut: Future<Output = OrchestratorResult<T>>,
{
    let Some(session) = session else {
        return real().await;
    };

    let key = generate_key(operation, params);

    match session.mode().await {
        InterceptMode::Disabled => {
            let result = real().await;
            session
                .record_call(operation, &key, false, error_text(&result))
                .await;
            result
        }
        InterceptMode::Record => {
            let result = real().await;
            if let Ok(value) = &result {
                session.set_mock(key.clone(), value.to_mock()).await;
                debug!(session_id = %session.id(), key = %key, "Recorded mock");
            }
            session
                .record_call(operation, &key, false, error_text(&result))
                .await;
            result
        }
        InterceptMode::Enabled => match session.get(&key).await {
            Some(stored) => match T::from_mock(&stored) {
                Some(value) => {
                    debug!(session_id = %session.id(), key = %key, "Replayed mock");
                    session.record_call(operation, &key, true, None).await;
                    Ok(value)
                }
                None => {
                    let err = OrchestratorError::MockTypeMismatch {
                        key: key.clone(),
                        expected: T::expected(),
                        found: stored.describe(),
                    };
                    warn!(session_id = %session.id(), key = %key, error = %err, "Mock type mismatch");
                    session
                        .record_call(operation, &key, true, Some(err.to_string()))
                        .await;
                    Err(err)
                }
            },
            None => {
                let result = real().await;
                session
                    .record_call(operation, &key, false, error_text(&result))
                    .await;
                result
            }
        },
    }
}

fn error_text<T>(result: &OrchestratorResult<T>) -> Option<String> {
    result.as_ref().err().map(ToString::to_string)
}
