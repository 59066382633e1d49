//! Fixed-window rate limiting.
//!
//! In-process counters keyed by action + client. Good enough for a single
//! instance; a multi-instance deployment would move this behind the
//! database or a shared cache.

use crate::app_config;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

struct Window {
    started: Instant,
    count: u32,
}

static WINDOWS: Lazy<DashMap<String, Window>> = Lazy::new(DashMap::new);

/// Error carrying the seconds until the window resets.
#[derive(Debug)]
pub struct RateLimitExceeded {
    pub retry_after_seconds: u64,
}

impl std::fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate limit exceeded, retry in {}s", self.retry_after_seconds)
    }
}

impl std::error::Error for RateLimitExceeded {}

fn check(key: String, max_requests: u32, window: Duration) -> Result<(), RateLimitExceeded> {
    let now = Instant::now();
    let mut entry = WINDOWS.entry(key).or_insert(Window {
        started: now,
        count: 0,
    });

    if now.duration_since(entry.started) >= window {
        entry.started = now;
        entry.count = 0;
    }

    if entry.count >= max_requests {
        let elapsed = now.duration_since(entry.started);
        return Err(RateLimitExceeded {
            retry_after_seconds: window.saturating_sub(elapsed).as_secs().max(1),
        });
    }

    entry.count += 1;
    Ok(())
}

pub fn check_registration_rate_limit(ip: &str) -> Result<(), RateLimitExceeded> {
    let config = app_config::rate_limit();
    check(
        format!("register:{}", ip),
        config.registration_per_hour,
        Duration::from_secs(3600),
    )
}

pub fn check_login_rate_limit(ip: &str) -> Result<(), RateLimitExceeded> {
    let config = app_config::rate_limit();
    check(
        format!("login:{}", ip),
        config.login_max_attempts,
        Duration::from_secs(config.login_window_seconds as u64),
    )
}

/// Comment limiter; `client` is a user id for members or an IP for guests.
pub fn check_comment_rate_limit(client: &str) -> Result<(), RateLimitExceeded> {
    let config = app_config::rate_limit();
    check(
        format!("comment:{}", client),
        config.comments_per_minute,
        Duration::from_secs(60),
    )
}

/// Drop windows that have been idle long enough to be meaningless.
/// Called from the periodic maintenance task in main.
pub fn cleanup_old_entries() {
    WINDOWS.retain(|_, window| window.started.elapsed() < Duration::from_secs(2 * 3600));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_enforced_within_window() {
        let key = "test:enforced".to_string();
        for _ in 0..3 {
            assert!(check(key.clone(), 3, Duration::from_secs(60)).is_ok());
        }
        let err = check(key, 3, Duration::from_secs(60)).unwrap_err();
        assert!(err.retry_after_seconds >= 1);
    }

    #[test]
    fn test_window_reset() {
        let key = "test:reset".to_string();
        assert!(check(key.clone(), 1, Duration::from_millis(10)).is_ok());
        assert!(check(key.clone(), 1, Duration::from_millis(10)).is_err());
        std::thread::sleep(Duration::from_millis(15));
        assert!(check(key, 1, Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        assert!(check("test:a".to_string(), 1, Duration::from_secs(60)).is_ok());
        assert!(check("test:b".to_string(), 1, Duration::from_secs(60)).is_ok());
    }
}
