//! Mutable security state: block lists, failure counters, rate windows.
//!
//! One [`SecurityState`] lives for the lifetime of a server instance and is
//! injected into dispatch rather than accessed as ambient process state, so
//! tests (and multiple servers in one process) get isolated state. Every map
//! sits behind its own mutex: the blocking handler lane can call back into
//! these checks from a worker thread, and each check is a single
//! read-modify-write under one lock acquisition.
//!
//! All window arithmetic prunes on access: no entry older than the
//! configured window ever participates in threshold decisions. The
//! enforcement methods delegate to `*_at` variants taking an explicit `now`,
//! which keeps the sliding-window behavior testable without sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{Block, Limit};
use crate::error::{ApiError, ApiResult};

/// An installed IP block. `blocked_until: None` means permanent.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub blocked_until: Option<Instant>,
    pub message: String,
    pub reason: String,
}

#[derive(Debug, Default)]
struct RateRecord {
    timestamps: VecDeque<Instant>,
    blocked_until: Option<Instant>,
    message: String,
}

/// Per-server holder of the three security maps, keyed by client IP string
/// (`"unknown"` when the peer address is missing).
#[derive(Debug, Default)]
pub struct SecurityState {
    blocked_ips: Mutex<HashMap<String, BlockRecord>>,
    auth_failures: Mutex<HashMap<String, VecDeque<Instant>>>,
    rate_limits: Mutex<HashMap<String, RateRecord>>,
}

impl SecurityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check (and possibly escalate) the block status of an IP.
    ///
    /// Without a status code this is the pre-handler gate: reject if a block
    /// is active, clear it if expired. With a status code among the
    /// configured trigger codes, a failure timestamp is recorded; reaching
    /// the attempt threshold inside the window installs a block and rejects
    /// immediately.
    pub fn enforce_ip_block(&self, ip: &str, cfg: &Block, status: Option<u16>) -> ApiResult<()> {
        self.enforce_ip_block_at(ip, cfg, status, Instant::now())
    }

    fn enforce_ip_block_at(
        &self,
        ip: &str,
        cfg: &Block,
        status: Option<u16>,
        now: Instant,
    ) -> ApiResult<()> {
        {
            let mut blocked = self.blocked_ips.lock().expect("blocked_ips lock poisoned");
            if let Some(record) = blocked.get(ip) {
                match record.blocked_until {
                    None => return Err(ApiError::blocked(&record.message)),
                    Some(until) if until > now => return Err(ApiError::blocked(&record.message)),
                    Some(_) => {
                        blocked.remove(ip);
                    }
                }
            }
        }

        let Some(code) = status else {
            return Ok(());
        };
        if !cfg.codes.contains(&code) {
            return Ok(());
        }

        let window = Duration::from_secs(cfg.interval);
        let reached_threshold = {
            let mut failures = self.auth_failures.lock().expect("auth_failures lock poisoned");
            let list = failures.entry(ip.to_string()).or_default();
            list.push_back(now);
            while let Some(first) = list.front() {
                if now.saturating_duration_since(*first) > window {
                    list.pop_front();
                } else {
                    break;
                }
            }
            if list.len() >= cfg.attempts {
                failures.remove(ip);
                true
            } else {
                false
            }
        };

        if reached_threshold {
            self.install_block(ip, cfg, now);
            return Err(ApiError::blocked(&cfg.message));
        }
        Ok(())
    }

    fn install_block(&self, ip: &str, cfg: &Block, now: Instant) {
        let blocked_until = if cfg.block_minutes < 0 {
            None
        } else {
            Some(now + Duration::from_secs(cfg.block_minutes as u64 * 60))
        };
        let record = BlockRecord {
            blocked_until,
            message: cfg.message.clone(),
            reason: "failure threshold exceeded".to_string(),
        };
        self.blocked_ips
            .lock()
            .expect("blocked_ips lock poisoned")
            .insert(ip.to_string(), record);
    }

    /// Count a request against the IP's sliding window; over the limit the
    /// IP is blocked for the configured minutes and the request rejected.
    pub fn enforce_rate_limit(&self, ip: &str, cfg: &Limit) -> ApiResult<()> {
        self.enforce_rate_limit_at(ip, cfg, Instant::now())
    }

    fn enforce_rate_limit_at(&self, ip: &str, cfg: &Limit, now: Instant) -> ApiResult<()> {
        let window = Duration::from_secs(cfg.window);
        let mut limits = self.rate_limits.lock().expect("rate_limits lock poisoned");
        let record = limits.entry(ip.to_string()).or_default();

        if let Some(until) = record.blocked_until {
            if until > now {
                return Err(ApiError::rate_limited(&record.message));
            }
            record.blocked_until = None;
        }

        while let Some(first) = record.timestamps.front() {
            if now.saturating_duration_since(*first) > window {
                record.timestamps.pop_front();
            } else {
                break;
            }
        }

        record.timestamps.push_back(now);
        if record.timestamps.len() > cfg.limit {
            record.blocked_until = Some(now + Duration::from_secs(cfg.block_minutes * 60));
            record.message = cfg.message.clone();
            return Err(ApiError::rate_limited(&cfg.message));
        }
        Ok(())
    }

    /// Snapshot of the active block for an IP, if any. Used by tests and
    /// introspection-minded callers; enforcement goes through the methods
    /// above.
    pub fn block_for(&self, ip: &str) -> Option<BlockRecord> {
        self.blocked_ips
            .lock()
            .expect("blocked_ips lock poisoned")
            .get(ip)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_cfg(attempts: usize, interval: u64, block_minutes: i64) -> Block {
        Block {
            codes: vec![401],
            attempts,
            interval,
            block_minutes,
            message: "Blocked IP.".to_string(),
        }
    }

    fn limit_cfg(limit: usize, window: u64) -> Limit {
        Limit {
            limit,
            window,
            block_minutes: 5,
            message: "Too many requests.".to_string(),
        }
    }

    #[test]
    fn test_no_block_without_failures() {
        let state = SecurityState::new();
        let cfg = block_cfg(3, 30, -1);
        assert!(state.enforce_ip_block("1.2.3.4", &cfg, None).is_ok());
    }

    #[test]
    fn test_untracked_status_codes_do_not_count() {
        let state = SecurityState::new();
        let cfg = block_cfg(1, 30, -1);
        assert!(state.enforce_ip_block("1.2.3.4", &cfg, Some(404)).is_ok());
        assert!(state.enforce_ip_block("1.2.3.4", &cfg, Some(200)).is_ok());
    }

    #[test]
    fn test_escalation_blocks_after_threshold() {
        let state = SecurityState::new();
        let cfg = block_cfg(3, 30, -1);
        let now = Instant::now();

        assert!(state.enforce_ip_block_at("9.9.9.9", &cfg, Some(401), now).is_ok());
        assert!(state
            .enforce_ip_block_at("9.9.9.9", &cfg, Some(401), now + Duration::from_secs(1))
            .is_ok());
        let err = state
            .enforce_ip_block_at("9.9.9.9", &cfg, Some(401), now + Duration::from_secs(2))
            .unwrap_err();
        assert_eq!(err.code, 403);

        // Pre-handler gate now rejects with no status code at all.
        let err = state
            .enforce_ip_block_at("9.9.9.9", &cfg, None, now + Duration::from_secs(3))
            .unwrap_err();
        assert_eq!(err.code, 403);
    }

    #[test]
    fn test_failures_outside_window_are_pruned() {
        let state = SecurityState::new();
        let cfg = block_cfg(3, 30, -1);
        let now = Instant::now();

        assert!(state.enforce_ip_block_at("8.8.8.8", &cfg, Some(401), now).is_ok());
        assert!(state
            .enforce_ip_block_at("8.8.8.8", &cfg, Some(401), now + Duration::from_secs(10))
            .is_ok());
        // The first failure ages out before the third arrives.
        assert!(state
            .enforce_ip_block_at("8.8.8.8", &cfg, Some(401), now + Duration::from_secs(45))
            .is_ok());
    }

    #[test]
    fn test_timed_block_expires_and_clears() {
        let state = SecurityState::new();
        let cfg = block_cfg(1, 30, 1);
        let now = Instant::now();

        assert!(state.enforce_ip_block_at("7.7.7.7", &cfg, Some(401), now).is_err());
        // Still blocked just inside the minute.
        assert!(state
            .enforce_ip_block_at("7.7.7.7", &cfg, None, now + Duration::from_secs(59))
            .is_err());
        // Expired: the record is cleared and the request passes.
        assert!(state
            .enforce_ip_block_at("7.7.7.7", &cfg, None, now + Duration::from_secs(61))
            .is_ok());
        assert!(state.block_for("7.7.7.7").is_none());
    }

    #[test]
    fn test_zero_minute_block_expires_on_next_check() {
        let state = SecurityState::new();
        let cfg = block_cfg(1, 30, 0);
        let now = Instant::now();

        assert!(state.enforce_ip_block_at("6.6.6.6", &cfg, Some(401), now).is_err());
        assert!(state
            .enforce_ip_block_at("6.6.6.6", &cfg, None, now + Duration::from_secs(1))
            .is_ok());
    }

    #[test]
    fn test_permanent_block_never_expires() {
        let state = SecurityState::new();
        let cfg = block_cfg(1, 30, -1);
        let now = Instant::now();

        assert!(state.enforce_ip_block_at("5.5.5.5", &cfg, Some(401), now).is_err());
        assert!(state
            .enforce_ip_block_at("5.5.5.5", &cfg, None, now + Duration::from_secs(100_000))
            .is_err());
    }

    #[test]
    fn test_rate_limit_allows_up_to_limit() {
        let state = SecurityState::new();
        let cfg = limit_cfg(3, 60);
        let now = Instant::now();

        for i in 0..3 {
            assert!(state
                .enforce_rate_limit_at("1.1.1.1", &cfg, now + Duration::from_secs(i))
                .is_ok());
        }
        let err = state
            .enforce_rate_limit_at("1.1.1.1", &cfg, now + Duration::from_secs(3))
            .unwrap_err();
        assert_eq!(err.code, 429);
    }

    #[test]
    fn test_rate_limit_window_prunes() {
        let state = SecurityState::new();
        let cfg = limit_cfg(3, 60);
        let now = Instant::now();

        for i in 0..3 {
            assert!(state
                .enforce_rate_limit_at("2.2.2.2", &cfg, now + Duration::from_secs(i))
                .is_ok());
        }
        // All three earlier timestamps fall out of the window.
        assert!(state
            .enforce_rate_limit_at("2.2.2.2", &cfg, now + Duration::from_secs(120))
            .is_ok());
    }

    #[test]
    fn test_rate_limit_block_lasts_configured_minutes() {
        let state = SecurityState::new();
        let cfg = limit_cfg(1, 60);
        let now = Instant::now();

        assert!(state.enforce_rate_limit_at("3.3.3.3", &cfg, now).is_ok());
        assert!(state
            .enforce_rate_limit_at("3.3.3.3", &cfg, now + Duration::from_secs(1))
            .is_err());
        // Inside the 5-minute block, even a fresh window is rejected.
        assert!(state
            .enforce_rate_limit_at("3.3.3.3", &cfg, now + Duration::from_secs(120))
            .is_err());
        // After the block lapses requests flow again.
        assert!(state
            .enforce_rate_limit_at("3.3.3.3", &cfg, now + Duration::from_secs(301))
            .is_ok());
    }

    #[test]
    fn test_ips_are_tracked_independently() {
        let state = SecurityState::new();
        let cfg = limit_cfg(1, 60);
        let now = Instant::now();

        assert!(state.enforce_rate_limit_at("4.4.4.4", &cfg, now).is_ok());
        assert!(state.enforce_rate_limit_at("4.4.4.5", &cfg, now).is_ok());
    }
}
