//! Rotation over redundant backends for one chain.
//!
//! A [`MultiNetworkProvider`] owns an ordered, non-empty list of providers and
//! a cursor naming the one currently preferred. Requests run against the
//! cursor; a transient failure moves the cursor on and the request is retried
//! against the next candidate, at most once per provider.

use parking_lot::Mutex;
use std::future::Future;
use tracing::{debug, warn};

use chainkit_core::{ChainError, ConfigError, NetworkProvider};

pub struct MultiNetworkProvider<P> {
    providers: Vec<P>,
    cursor: Mutex<usize>,
}

impl<P: NetworkProvider> MultiNetworkProvider<P> {
    /// Wrap `providers`, preferring the first. An empty list is rejected.
    pub fn new(providers: Vec<P>) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::EmptyProviderList);
        }
        Ok(Self { providers, cursor: Mutex::new(0) })
    }

    /// Run `request` against the current provider, rotating on transient
    /// failures.
    ///
    /// Each provider is attempted at most once per request, even when other
    /// callers move the cursor meanwhile. Returns the first success, the first
    /// non-transient failure, or the last failure once every provider has been
    /// tried. The cursor is not advanced after the final attempt.
    pub async fn perform_request<'a, R, F, Fut>(&'a self, request: F) -> Result<R, ChainError>
    where
        F: Fn(&'a P) -> Fut,
        Fut: Future<Output = Result<R, ChainError>>,
    {
        let mut failed_at: Option<usize> = None;
        let mut tried = vec![false; self.providers.len()];
        let mut last_error = None;

        for attempt in 0..self.providers.len() {
            let preferred = match failed_at {
                Some(failed) => self.rotate_from(failed),
                None => *self.cursor.lock(),
            };
            let index = self.first_untried(preferred, &tried);
            tried[index] = true;
            let provider = &self.providers[index];
            debug!(host = provider.base_url(), attempt, "provider request");

            match request(provider).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    debug!(host = provider.base_url(), error = %err, "transient provider failure");
                    failed_at = Some(index);
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        // The loop body runs at least once since the list is non-empty.
        Err(last_error.unwrap_or_else(|| ConfigError::EmptyProviderList.into()))
    }

    /// Advance past `failed` unless another caller already moved the cursor,
    /// and return the index to use next.
    fn rotate_from(&self, failed: usize) -> usize {
        let mut cursor = self.cursor.lock();
        if *cursor == failed {
            let next = (failed + 1) % self.providers.len();
            warn!(
                from = self.providers[failed].base_url(),
                to = self.providers[next].base_url(),
                "rotating provider"
            );
            *cursor = next;
        }
        *cursor
    }

    /// `preferred`, or the next provider after it this request has not tried.
    /// Concurrent rotations can hand back a cursor this request already used.
    fn first_untried(&self, preferred: usize, tried: &[bool]) -> usize {
        let len = self.providers.len();
        (0..len)
            .map(|offset| (preferred + offset) % len)
            .find(|&index| !tried[index])
            .unwrap_or(preferred)
    }

    pub fn current_index(&self) -> usize {
        *self.cursor.lock()
    }

    pub fn current_provider(&self) -> &P {
        &self.providers[self.current_index()]
    }

    /// Base URL of the current provider.
    pub fn current_host(&self) -> &str {
        self.current_provider().base_url()
    }

    pub fn providers(&self) -> &[P] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl<P: NetworkProvider> std::fmt::Debug for MultiNetworkProvider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiNetworkProvider")
            .field("hosts", &self.providers.iter().map(|p| p.base_url()).collect::<Vec<_>>())
            .field("cursor", &self.current_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainkit_core::{AccountError, NetworkError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Provider that answers from a fixed script and counts calls.
    struct Scripted {
        url: String,
        outcome: Result<u32, ChainError>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(url: &str, outcome: Result<u32, ChainError>, calls: &Arc<AtomicUsize>) -> Self {
            Self { url: url.into(), outcome, calls: Arc::clone(calls) }
        }

        async fn fetch(&self) -> Result<u32, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    impl NetworkProvider for Scripted {
        fn base_url(&self) -> &str {
            &self.url
        }
    }

    fn timeout() -> Result<u32, ChainError> {
        Err(NetworkError::Timeout.into())
    }

    fn http(status: u16) -> Result<u32, ChainError> {
        Err(NetworkError::Http { status, body: String::new() }.into())
    }

    #[test]
    fn empty_list_is_rejected() {
        let err = MultiNetworkProvider::<Scripted>::new(Vec::new()).unwrap_err();
        assert_eq!(err, ConfigError::EmptyProviderList);
    }

    #[tokio::test]
    async fn success_keeps_cursor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", Ok(7), &calls),
            Scripted::new("b", Ok(8), &calls),
        ])
        .unwrap();

        assert_eq!(multi.perform_request(|p| p.fetch()).await.unwrap(), 7);
        assert_eq!(multi.current_index(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fail_fail_success_takes_three_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", timeout(), &calls),
            Scripted::new("b", http(503), &calls),
            Scripted::new("c", Ok(42), &calls),
        ])
        .unwrap();

        assert_eq!(multi.perform_request(|p| p.fetch()).await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(multi.current_host(), "c");
    }

    #[tokio::test]
    async fn all_failing_returns_last_error_after_two_rotations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", timeout(), &calls),
            Scripted::new("b", http(502), &calls),
            Scripted::new("c", http(429), &calls),
        ])
        .unwrap();

        let err = multi.perform_request(|p| p.fetch()).await.unwrap_err();
        assert_eq!(err, ChainError::from(NetworkError::Http { status: 429, body: String::new() }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two rotations: a -> b -> c, no advance after the final attempt.
        assert_eq!(multi.current_index(), 2);
    }

    #[tokio::test]
    async fn non_transient_failure_returns_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", Err(AccountError::NotFound("addr".into()).into()), &calls),
            Scripted::new("b", Ok(1), &calls),
        ])
        .unwrap();

        let err = multi.perform_request(|p| p.fetch()).await.unwrap_err();
        assert!(matches!(err, ChainError::Account(AccountError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(multi.current_index(), 0);
    }

    #[tokio::test]
    async fn remote_rejection_does_not_rotate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", Err(ChainError::remote(-32000, "nonce too low")), &calls),
            Scripted::new("b", Ok(1), &calls),
        ])
        .unwrap();

        assert!(multi.perform_request(|p| p.fetch()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(multi.current_host(), "a");
    }

    #[tokio::test]
    async fn next_request_starts_at_rotated_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", timeout(), &calls),
            Scripted::new("b", Ok(2), &calls),
        ])
        .unwrap();

        assert_eq!(multi.perform_request(|p| p.fetch()).await.unwrap(), 2);
        assert_eq!(multi.current_host(), "b");
        calls.store(0, Ordering::SeqCst);

        assert_eq!(multi.perform_request(|p| p.fetch()).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_provider_failure_does_not_rotate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![Scripted::new("only", timeout(), &calls)]).unwrap();

        let err = multi.perform_request(|p| p.fetch()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(multi.current_index(), 0);
    }

    #[test]
    fn stale_rotation_does_not_skip() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", timeout(), &calls),
            Scripted::new("b", timeout(), &calls),
            Scripted::new("c", timeout(), &calls),
        ])
        .unwrap();

        // Two callers both failed against index 0; only the first advances.
        assert_eq!(multi.rotate_from(0), 1);
        assert_eq!(multi.rotate_from(0), 1);
        assert_eq!(multi.current_host(), "b");
    }

    #[tokio::test]
    async fn concurrent_rotation_never_repeats_a_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", timeout(), &calls),
            Scripted::new("b", timeout(), &calls),
            Scripted::new("c", Ok(42), &calls),
        ])
        .unwrap();

        // Other callers move the cursor while this request is in flight:
        // past a while a is failing, then wrapped back to a while b is failing.
        let value = multi
            .perform_request(|p| {
                match p.url.as_str() {
                    "a" => *multi.cursor.lock() = 1,
                    "b" => *multi.cursor.lock() = 0,
                    _ => {}
                }
                p.fetch()
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn first_untried_wraps_around() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![
            Scripted::new("a", timeout(), &calls),
            Scripted::new("b", timeout(), &calls),
            Scripted::new("c", timeout(), &calls),
        ])
        .unwrap();

        assert_eq!(multi.first_untried(1, &[false, false, false]), 1);
        assert_eq!(multi.first_untried(2, &[false, true, true]), 0);
        assert_eq!(multi.first_untried(0, &[true, true, false]), 2);
    }

    #[tokio::test]
    async fn request_can_borrow_provider_and_captures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let multi = MultiNetworkProvider::new(vec![Scripted::new("a", Ok(5), &calls)]).unwrap();
        let offset = 10u32;

        let value = multi
            .perform_request(|p| async move { Ok(p.fetch().await? + offset) })
            .await
            .unwrap();
        assert_eq!(value, 15);
    }
}
