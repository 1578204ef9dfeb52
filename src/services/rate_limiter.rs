//! Login rate limiting
//!
//! Sliding-window counters keyed by email (failed attempts) and by client
//! IP (all attempts). Limits:
//! - 5 failed attempts per email in 15 minutes
//! - 10 attempts per IP in 1 minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, pruned to a fixed window
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash + Clone> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: &K, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        match events.get_mut(key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    async fn record(&self, key: K, now: DateTime<Utc>) {
        self.events.write().await.entry(key).or_default().push(now);
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        before - events.len()
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    by_email: SlidingWindow<String>,
    by_ip: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            by_email: SlidingWindow::new(5, Duration::minutes(15)),
            by_ip: SlidingWindow::new(10, Duration::minutes(1)),
        }
    }

    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.by_email
            .is_limited(&email.trim().to_lowercase(), Utc::now())
            .await
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        self.by_email
            .record(email.trim().to_lowercase(), Utc::now())
            .await;
    }

    /// Forget failures for `email` after a successful login
    pub async fn clear_email(&self, email: &str) {
        self.by_email.clear(&email.trim().to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.by_ip.is_limited(&ip, Utc::now()).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.by_ip.record(ip, Utc::now()).await;
    }

    /// Drop keys with no events inside their window; returns keys removed
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        self.by_email.prune(now).await + self.by_ip.prune(now).await
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_email_limit_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..4 {
            limiter.record_failed_attempt("ada@example.com").await;
        }
        assert!(!limiter.is_email_limited("ada@example.com").await);

        limiter.record_failed_attempt("ADA@example.com").await;
        assert!(limiter.is_email_limited("ada@example.com").await);

        limiter.clear_email("Ada@Example.com").await;
        assert!(!limiter.is_email_limited("ada@example.com").await);
    }

    #[tokio::test]
    async fn test_ip_limit_after_ten_requests() {
        let limiter = LoginRateLimiter::new();
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        for _ in 0..9 {
            limiter.record_ip_request(ip).await;
        }
        assert!(!limiter.is_ip_limited(ip).await);
        limiter.record_ip_request(ip).await;
        assert!(limiter.is_ip_limited(ip).await);

        let other: IpAddr = "10.0.0.8".parse().unwrap();
        assert!(!limiter.is_ip_limited(other).await);
    }

    #[tokio::test]
    async fn test_window_expiry_and_prune() {
        let window = SlidingWindow::new(2, Duration::minutes(1));
        let start = Utc::now();
        window.record("k".to_string(), start).await;
        window.record("k".to_string(), start).await;
        assert!(window.is_limited(&"k".to_string(), start).await);

        let later = start + Duration::minutes(2);
        assert!(!window.is_limited(&"k".to_string(), later).await);
        assert_eq!(window.prune(later).await, 1);
    }
}
