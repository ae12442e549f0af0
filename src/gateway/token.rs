use super::GatewayTransport;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Caches the gateway bearer token and refreshes it at most once per expiry.
///
/// Readers share the cached token under a read lock. A caller that finds it
/// stale takes the write lock, checks again (someone else may have refreshed
/// while it waited) and only then calls the OAuth endpoint, so a burst of
/// payments hitting an expired token produces a single refresh.
pub struct TokenManager {
    transport: Arc<dyn GatewayTransport>,
    safety_margin: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenManager {
    /// `safety_margin` is taken off the reported lifetime so a token never
    /// expires while a request carrying it is in flight.
    pub fn new(transport: Arc<dyn GatewayTransport>, safety_margin: Duration) -> Self {
        Self {
            transport,
            safety_margin,
            cached: RwLock::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref()
                && token.is_fresh()
            {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh()
        {
            return Ok(token.value.clone());
        }

        // A failed fetch leaves the previous entry as it was.
        let fresh = self.transport.fetch_token().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(self.safety_margin);
        tracing::debug!(
            expires_in = fresh.expires_in,
            usable_for_secs = lifetime.as_secs(),
            "refreshed gateway access token"
        );
        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }

    /// Forgets the cached token, e.g. after the gateway rejected it.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaymentError;
    use crate::gateway::{
        AccessToken, StkPushRequest, StkPushResponse, StkQueryRequest, StkQueryResponse,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        calls: AtomicUsize,
        failures_left: AtomicUsize,
        expires_in: u64,
    }

    impl CountingTransport {
        fn new(expires_in: u64, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(failures),
                expires_in,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GatewayTransport for CountingTransport {
        async fn fetch_token(&self) -> Result<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
            {
                return Err(PaymentError::GatewayAuth("invalid credentials".to_string()));
            }
            Ok(AccessToken {
                access_token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }

        async fn stk_push(&self, _: &str, _: &StkPushRequest) -> Result<StkPushResponse> {
            Err(PaymentError::GatewayNetwork("not used".to_string()))
        }

        async fn stk_query(&self, _: &str, _: &StkQueryRequest) -> Result<StkQueryResponse> {
            Err(PaymentError::GatewayNetwork("not used".to_string()))
        }
    }

    async fn concurrent_gets(manager: &Arc<TokenManager>, n: usize) -> Vec<String> {
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_token().await.unwrap() })
            })
            .collect();
        let mut tokens = Vec::with_capacity(n);
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }
        tokens
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_served_without_network() {
        let transport = CountingTransport::new(3600, 0);
        let manager = TokenManager::new(transport.clone(), Duration::from_secs(300));

        assert_eq!(manager.get_token().await.unwrap(), "token-1");
        assert_eq!(manager.get_token().await.unwrap(), "token-1");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cold_start_refreshes_once() {
        let transport = CountingTransport::new(3600, 0);
        let manager = Arc::new(TokenManager::new(
            transport.clone(),
            Duration::from_secs(300),
        ));

        let tokens = concurrent_gets(&manager, 32).await;
        assert_eq!(transport.calls(), 1);
        assert!(tokens.iter().all(|t| t == "token-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_at_expiry_refresh_once() {
        let transport = CountingTransport::new(3600, 0);
        let manager = Arc::new(TokenManager::new(
            transport.clone(),
            Duration::from_secs(300),
        ));
        manager.get_token().await.unwrap();

        // Usable lifetime is 3600 - 300 seconds.
        tokio::time::advance(Duration::from_secs(3300)).await;

        let tokens = concurrent_gets(&manager, 32).await;
        assert_eq!(transport.calls(), 2);
        assert!(tokens.iter().all(|t| t == "token-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_does_not_poison_cache() {
        let transport = CountingTransport::new(3600, 1);
        let manager = TokenManager::new(transport.clone(), Duration::from_secs(300));

        assert!(matches!(
            manager.get_token().await,
            Err(PaymentError::GatewayAuth(_))
        ));
        assert_eq!(manager.get_token().await.unwrap(), "token-2");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refresh() {
        let transport = CountingTransport::new(3600, 0);
        let manager = TokenManager::new(transport.clone(), Duration::from_secs(300));

        manager.get_token().await.unwrap();
        manager.invalidate().await;
        assert_eq!(manager.get_token().await.unwrap(), "token-2");
    }
}
