use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ClientError;
use crate::types::ApiSession;

/// Default lifetime of a cached session.
pub const SESSION_TTL: Duration = Duration::from_secs(60);

struct CachedSession {
    session: ApiSession,
    expires_at: Instant,
}

/// Time-bounded cache around the session fetch.
///
/// There is a single account and therefore a single slot. The async mutex
/// doubles as the single-flight guard: a caller that misses holds the lock
/// across its fetch, so concurrent callers queue behind it and then hit
/// the freshly stored entry instead of fetching again.
pub struct SessionCache {
    ttl: Duration,
    slot: Mutex<Option<CachedSession>>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached session if still fresh, otherwise run `fetch` and
    /// store its result with a new expiry. Fetch failures are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<ApiSession, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ApiSession, ClientError>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > Instant::now() {
                debug!("session cache hit");
                return Ok(cached.session.clone());
            }
        }

        debug!("session cache miss, fetching");
        let session = fetch().await?;
        *slot = Some(CachedSession {
            session: session.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(token: &str) -> ApiSession {
        ApiSession {
            access_token: token.to_string(),
            expires: String::new(),
            user: None,
        }
    }

    #[tokio::test]
    async fn second_call_within_ttl_hits_cache() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        for _ in 0..2 {
            let got = cache
                .get_or_fetch(|| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(session("tok"))
                })
                .await
                .unwrap();
            assert_eq!(got.access_token, "tok");
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_refetches() {
        let cache = SessionCache::new(Duration::ZERO);
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        for _ in 0..2 {
            cache
                .get_or_fetch(|| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(session("tok"))
                })
                .await
                .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_not_cached() {
        let cache = SessionCache::new(Duration::from_secs(60));

        let err = cache
            .get_or_fetch(|| async move { Err(ClientError::Unauthorized) })
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Unauthorized);

        let got = cache
            .get_or_fetch(|| async move { Ok(session("tok")) })
            .await
            .unwrap();
        assert_eq!(got.access_token, "tok");
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        let fetch = || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(session("tok"))
        };

        let (a, b) = tokio::join!(cache.get_or_fetch(fetch), cache.get_or_fetch(fetch));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
