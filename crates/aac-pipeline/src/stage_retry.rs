//! Stage retry budget — orthogonal to the per-call retry in `aac-core::retry`
//! and to the optimization-attempt loop. Swallows every failure but the
//! last, retrying the whole stage body up to `stage_retry_limit` times.

use std::future::Future;

use aac_core::EngineError;

pub async fn with_stage_retry<T, F, Fut>(stage_retry_limit: i32, mut f: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let limit = stage_retry_limit.max(1);
    let mut last_error = None;

    for attempt in 1..=limit {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                log::warn!("stage attempt {attempt}/{limit} failed: {err}");
                last_error = Some(err);
            }
        }
    }

    Err(last_error.expect("loop runs at least once"))
}
