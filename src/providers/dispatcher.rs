//! Dispatch layer: retry, timeout, and fallback policy around a provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::{ChatProvider, ProviderError};
use crate::prompt::ProviderRequest;
use crate::retry::RetryPolicy;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors surfaced by [`ProviderDispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The request exceeded the per-request deadline. Never retried; a
    /// timed-out generation is a failed one, not a slow success.
    #[error("provider request timed out after {0:?}")]
    Timeout(Duration),
}

/// Drives a single request through `Pending → Sent → Streaming → Complete`
/// or `Failed`, relaying tokens to the caller's channel along the way.
///
/// The dispatcher holds policy only; the provider itself is an argument to
/// [`dispatch`](Self::dispatch), chosen per request from the profile
/// snapshot. Policy:
/// - retryable errors (network, 5xx, rate limit) retry with bounded
///   exponential backoff, but only while nothing has been streamed yet;
/// - 4xx/auth errors fail immediately;
/// - the fallback provider is engaged only after the primary is fully
///   exhausted with zero streamed tokens. A partially streamed answer is
///   never silently replaced by another provider's.
pub struct ProviderDispatcher {
    fallback: Option<Arc<dyn ChatProvider>>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Default for ProviderDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderDispatcher {
    pub fn new() -> Self {
        Self {
            fallback: None,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn ChatProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dispatches `request` through `provider`, streaming tokens into
    /// `tokens`, and returns the full response text.
    pub async fn dispatch(
        &self,
        provider: &dyn ChatProvider,
        request: &ProviderRequest,
        tokens: flume::Sender<String>,
    ) -> Result<String, DispatchError> {
        let (primary_result, primary_streamed) = self.drive(provider, request, &tokens).await;

        let err = match primary_result {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        // Fallback only on total exhaustion with nothing streamed; a timeout
        // already consumed the request's deadline.
        if primary_streamed == 0
            && let Some(fallback) = &self.fallback
            && matches!(err, DispatchError::Provider(_))
        {
            warn!(
                primary = provider.id(),
                fallback = fallback.id(),
                error = %err,
                "primary exhausted, engaging fallback provider"
            );
            let (result, _) = self.drive(fallback.as_ref(), request, &tokens).await;
            return result;
        }
        Err(err)
    }

    /// Runs the retry loop against one provider. Returns the outcome plus
    /// the number of tokens streamed to the caller, which gates fallback.
    async fn drive(
        &self,
        provider: &dyn ChatProvider,
        request: &ProviderRequest,
        tokens: &flume::Sender<String>,
    ) -> (Result<String, DispatchError>, usize) {
        let streamed = Arc::new(AtomicUsize::new(0));
        let mut attempt = 1;
        loop {
            debug!(provider = provider.id(), attempt, "sending provider request");
            let (attempt_tx, attempt_rx) = flume::unbounded::<String>();
            let forward = {
                let outer = tokens.clone();
                let streamed = Arc::clone(&streamed);
                tokio::spawn(async move {
                    while let Ok(token) = attempt_rx.recv_async().await {
                        streamed.fetch_add(1, Ordering::SeqCst);
                        if outer.send_async(token).await.is_err() {
                            break;
                        }
                    }
                })
            };

            let result =
                tokio::time::timeout(self.timeout, provider.stream(request, attempt_tx)).await;
            // Drain any in-flight tokens before deciding the outcome.
            let _ = forward.await;
            let streamed_so_far = streamed.load(Ordering::SeqCst);

            match result {
                Ok(Ok(text)) => {
                    debug!(
                        provider = provider.id(),
                        attempt,
                        tokens = streamed_so_far,
                        "provider request complete"
                    );
                    return (Ok(text), streamed_so_far);
                }
                Ok(Err(err)) => {
                    let retryable =
                        err.is_retryable() && streamed_so_far == 0 && attempt < self.retry.max_attempts;
                    if !retryable {
                        warn!(
                            provider = provider.id(),
                            attempt,
                            tokens = streamed_so_far,
                            error = %err,
                            "provider request failed"
                        );
                        return (Err(err.into()), streamed_so_far);
                    }
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        provider = provider.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(_) => {
                    warn!(
                        provider = provider.id(),
                        attempt,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "provider request timed out"
                    );
                    return (Err(DispatchError::Timeout(self.timeout)), streamed_so_far);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    enum Step {
        Tokens(Vec<&'static str>),
        Fail(ProviderError),
        TokensThenFail(Vec<&'static str>, ProviderError),
        Hang(Duration),
    }

    struct Scripted {
        id: &'static str,
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(id: &'static str, steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                id,
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for Scripted {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn complete(&self, _: &ProviderRequest) -> Result<String, ProviderError> {
            unreachable!("dispatcher always uses stream")
        }

        async fn stream(
            &self,
            _: &ProviderRequest,
            tokens: flume::Sender<String>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().pop_front().expect("script exhausted");
            match step {
                Step::Tokens(parts) => {
                    for part in &parts {
                        let _ = tokens.send_async((*part).to_string()).await;
                    }
                    Ok(parts.concat())
                }
                Step::Fail(err) => Err(err),
                Step::TokensThenFail(parts, err) => {
                    for part in &parts {
                        let _ = tokens.send_async((*part).to_string()).await;
                    }
                    Err(err)
                }
                Step::Hang(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok("too late".into())
                }
            }
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            prompt: "q".into(),
            model: "m".into(),
            temperature: 0.7,
            max_tokens: 100,
            top_p: 1.0,
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn streams_tokens_in_order_and_completes() {
        let provider = Scripted::new("primary", vec![Step::Tokens(vec!["a", "b", "c"])]);
        let dispatcher = ProviderDispatcher::new();

        let (tx, rx) = flume::unbounded();
        let text = dispatcher
            .dispatch(provider.as_ref(), &request(), tx)
            .await
            .unwrap();

        assert_eq!(text, "abc");
        let streamed: Vec<String> = rx.drain().collect();
        assert_eq!(streamed, vec!["a", "b", "c"]);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let provider = Scripted::new(
            "primary",
            vec![
                Step::Fail(ProviderError::Unavailable("blip".into())),
                Step::Tokens(vec!["ok"]),
            ],
        );
        let dispatcher = ProviderDispatcher::new().with_retry(fast_retry(3));

        let (tx, _rx) = flume::unbounded();
        let text = dispatcher
            .dispatch(provider.as_ref(), &request(), tx)
            .await
            .unwrap();
        assert_eq!(text, "ok");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn retry_bound_is_enforced() {
        // Would succeed on the third call, but the policy allows only two.
        let provider = Scripted::new(
            "primary",
            vec![
                Step::Fail(ProviderError::Unavailable("one".into())),
                Step::Fail(ProviderError::Unavailable("two".into())),
                Step::Tokens(vec!["never reached"]),
            ],
        );
        let dispatcher = ProviderDispatcher::new().with_retry(fast_retry(2));

        let (tx, _rx) = flume::unbounded();
        let err = dispatcher
            .dispatch(provider.as_ref(), &request(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Provider(_)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn rejections_fail_immediately() {
        let provider = Scripted::new(
            "primary",
            vec![Step::Fail(ProviderError::Rejected("bad key".into()))],
        );
        let dispatcher = ProviderDispatcher::new().with_retry(fast_retry(5));

        let (tx, _rx) = flume::unbounded();
        let err = dispatcher
            .dispatch(provider.as_ref(), &request(), tx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Provider(ProviderError::Rejected(_))
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_engages_only_after_primary_exhaustion() {
        let primary = Scripted::new(
            "primary",
            vec![
                Step::Fail(ProviderError::Unavailable("one".into())),
                Step::Fail(ProviderError::Unavailable("two".into())),
            ],
        );
        let fallback = Scripted::new("fallback", vec![Step::Tokens(vec!["rescued"])]);
        let dispatcher = ProviderDispatcher::new()
            .with_fallback(fallback.clone())
            .with_retry(fast_retry(2));

        let (tx, rx) = flume::unbounded();
        let text = dispatcher
            .dispatch(primary.as_ref(), &request(), tx)
            .await
            .unwrap();
        assert_eq!(text, "rescued");
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 1);
        let streamed: Vec<String> = rx.drain().collect();
        assert_eq!(streamed, vec!["rescued"]);
    }

    #[tokio::test]
    async fn no_failover_after_tokens_have_streamed() {
        let primary = Scripted::new(
            "primary",
            vec![Step::TokensThenFail(
                vec!["partial"],
                ProviderError::Unavailable("dropped".into()),
            )],
        );
        let fallback = Scripted::new("fallback", vec![Step::Tokens(vec!["replacement"])]);
        let dispatcher = ProviderDispatcher::new()
            .with_fallback(fallback.clone())
            .with_retry(fast_retry(3));

        let (tx, rx) = flume::unbounded();
        let err = dispatcher
            .dispatch(primary.as_ref(), &request(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Provider(_)));
        // The partial stream is surfaced as a failure, never replaced.
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        let streamed: Vec<String> = rx.drain().collect();
        assert_eq!(streamed, vec!["partial"]);
    }

    #[tokio::test]
    async fn deadline_produces_timeout_not_retry() {
        let provider = Scripted::new(
            "primary",
            vec![Step::Hang(Duration::from_secs(5))],
        );
        let dispatcher = ProviderDispatcher::new()
            .with_retry(fast_retry(3))
            .with_timeout(Duration::from_millis(20));

        let (tx, _rx) = flume::unbounded();
        let err = dispatcher
            .dispatch(provider.as_ref(), &request(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
        assert_eq!(provider.calls(), 1);
    }
}
