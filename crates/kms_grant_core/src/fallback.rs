use std::future::Future;

/// Runs `primary`; if it fails, runs `fallback` and reports its outcome.
///
/// The primary error is dropped. `fallback` is only constructed after the
/// primary future has completed, so the two never overlap.
pub async fn attempt_with_fallback<T, E, P, F, Fut>(primary: P, fallback: F) -> Result<T, E>
where
    P: Future<Output = Result<T, E>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match primary.await {
        Ok(value) => Ok(value),
        Err(_) => fallback().await,
    }
}
