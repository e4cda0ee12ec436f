//! Attempt-budgeted retry loop.

use std::future::Future;

/// Run `op` up to `attempts` times, stopping at the first success.
///
/// `on_retry` is called before every attempt after the first, with the
/// 1-based number of the attempt about to start and the error that caused
/// the retry. A budget of zero is treated as one attempt.
///
/// Returns the first success, or the error from the final attempt.
pub async fn run<T, E, F, Fut, R>(attempts: u32, mut on_retry: R, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E),
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => {
                attempt += 1;
                on_retry(attempt, &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_success_skips_observer() {
        let mut retries = Vec::new();
        let mut calls = 0;
        let result: Result<u32, &str> = run(
            3,
            |attempt, _| retries.push(attempt),
            || {
                calls += 1;
                async { Ok(7) }
            },
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls, 1);
        assert!(retries.is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let mut retries = Vec::new();
        let mut calls = 0;
        let result: Result<(), String> = run(
            3,
            |attempt, _| retries.push(attempt),
            || {
                calls += 1;
                let n = calls;
                async move { Err(format!("failure {n}")) }
            },
        )
        .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls, 3);
        // Observer runs between attempts only.
        assert_eq!(retries, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let mut calls = 0;
        let result: Result<&str, &str> = run(
            3,
            |_, _| {},
            || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err("not yet")
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_zero_budget_runs_once() {
        let mut calls = 0;
        let result: Result<(), ()> = run(
            0,
            |_, _| {},
            || {
                calls += 1;
                async { Err(()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
