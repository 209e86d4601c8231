//! Login throttling
//!
//! Two sliding windows guard `POST /auth/login`:
//! - failed attempts per email (5 per 15 minutes)
//! - requests per client IP (10 per minute)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, kept for `window`
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: &K, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let events = self.events.read().await;
        events
            .get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.limit)
            .unwrap_or(false)
    }

    async fn record(&self, key: K, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.push(now);
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.events.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter shared by the auth handlers
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
        self.by_email.is_limited(&normalize(email), Utc::now()).await
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        self.by_email.record(normalize(email), Utc::now()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        self.by_email.clear(&normalize(email)).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.by_ip.is_limited(&ip, Utc::now()).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.by_ip.record(ip, Utc::now()).await;
    }

    /// Drop entries whose window has passed
    pub async fn cleanup(&self) {
        let now = Utc::now();
        self.by_email.prune(now).await;
        self.by_ip.prune(now).await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
