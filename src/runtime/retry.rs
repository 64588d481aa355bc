use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts. The last error
/// is propagated once the attempt budget is exhausted.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: F) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    with_retry_if(policy, |_| true, operation).await
}

/// Like [`with_retry`], but an error the predicate rejects is returned
/// immediately without consuming further attempts. For failures that
/// are deterministic (a missing image, say) retrying only adds delay.
pub async fn with_retry_if<T, P, F, Fut>(
    policy: RetryPolicy,
    should_retry: P,
    operation: F,
) -> anyhow::Result<T>
where
    P: Fn(&anyhow::Error) -> bool,
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !should_retry(&error) {
                    return Err(error);
                }

                tracing::warn!(attempt, attempts, "remote call failed: {:#}", error);
                last_error = Some(error);

                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    match last_error {
        Some(error) => Err(error),
        None => Err(anyhow::anyhow!("retry budget exhausted")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn zero_delay(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let invocations = AtomicU32::new(0);

        let result = with_retry(zero_delay(3), || async {
            let attempt = invocations.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= 2 {
                Err(anyhow::anyhow!("transient failure"))
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_propagates_last_error_when_exhausted() {
        let invocations = AtomicU32::new(0);

        let result: anyhow::Result<()> = with_retry(zero_delay(3), || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("permanent failure"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_image_error_not_retried() {
        use crate::runtime::ImageNotPresent;

        let invocations = AtomicU32::new(0);

        let result: anyhow::Result<()> = with_retry_if(
            zero_delay(3),
            |error| !error.is::<ImageNotPresent>(),
            || async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::Error::new(ImageNotPresent {
                    image_ref: "registrybear/sagebear:1".to_owned(),
                }))
            },
        )
        .await;

        assert!(result.unwrap_err().is::<ImageNotPresent>());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_attempt_success_invokes_once() {
        let invocations = AtomicU32::new(0);

        with_retry(zero_delay(3), || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
