// SPDX-License-Identifier: MIT
use funcship_api::error::RegistryError;

pub const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

/// Run a registry call, retrying the retryable failure kinds with
/// exponential backoff up to `MAX_ATTEMPTS` total attempts. The other
/// kinds come back immediately.
pub async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, RegistryError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RegistryError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(val) => return Ok(val),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = BASE_DELAY * 2u32.pow(attempt);
                log::warn!("{} failed ({}), retrying in {:?}", what, err, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_gives_up() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = attempts.clone();
        let res: Result<(), _> = with_retry("rate limited call", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(RegistryError::RateLimited)
            }
        })
        .await;
        assert_eq!(res.unwrap_err(), RegistryError::RateLimited);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = attempts.clone();
        let res = with_retry("flaky call", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Err(RegistryError::Transport("connection reset".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 7);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = attempts.clone();
        let res: Result<(), _> = with_retry("bad request", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(RegistryError::ValidationRejected("bad handler".to_string()))
            }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
