//! # Rate Limiting
//!
//! Two layers guard submissions. The windowed limiter counts recent
//! submissions per ip and across all ips against configured thresholds;
//! both counts run concurrently so the decision costs one round-trip. The
//! coarse request tally counts every request per ip since process start
//! and trips a fixed ceiling before any storage access happens.

use std::time::Duration;

use dashmap::DashMap;
use ew_core::error::{AppError, Result};
use ew_core::models::ConfigMap;
use ew_core::traits::CommentRepo;

use crate::state::cfg_u64;

/// Trailing window for submission counting.
pub const SUBMIT_WINDOW: Duration = Duration::from_secs(600);

/// Default threshold for both windowed counters. A configured 0 disables
/// that counter entirely.
pub const DEFAULT_SUBMIT_LIMIT: u64 = 10;

/// Lifetime per-ip request ceiling, reset only by a process restart.
pub const REQUEST_CEILING: u32 = 2000;

/// In-memory, non-windowed request counter. Cheap abuse brake, not a
/// fairness mechanism.
pub struct RequestTally {
    counts: DashMap<String, u32>,
    ceiling: u32,
}

impl RequestTally {
    pub fn new(ceiling: u32) -> Self {
        Self {
            counts: DashMap::new(),
            ceiling,
        }
    }

    pub fn bump(&self, ip: &str) -> Result<()> {
        let mut entry = self.counts.entry(ip.to_string()).or_insert(0);
        *entry += 1;
        if *entry > self.ceiling {
            return Err(AppError::RateLimited(
                "too many requests from this address".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RequestTally {
    fn default() -> Self {
        Self::new(REQUEST_CEILING)
    }
}

async fn windowed_count(
    repo: &dyn CommentRepo,
    enabled: bool,
    ip: Option<&str>,
    since: i64,
) -> anyhow::Result<i64> {
    if !enabled {
        return Ok(0);
    }
    repo.count_submissions_since(ip, since).await
}

/// The windowed check before a submission. Both counters are evaluated
/// concurrently and neither short-circuits the other; each rejection has
/// its own user-facing message.
pub async fn check_submission(
    repo: &dyn CommentRepo,
    config: &ConfigMap,
    ip: &str,
    now: i64,
) -> Result<()> {
    let per_ip = cfg_u64(config, "LIMIT").unwrap_or(DEFAULT_SUBMIT_LIMIT);
    let global = cfg_u64(config, "LIMIT_ALL").unwrap_or(DEFAULT_SUBMIT_LIMIT);
    if per_ip == 0 && global == 0 {
        return Ok(());
    }

    let since = now - SUBMIT_WINDOW.as_millis() as i64;
    let (ip_count, all_count) = tokio::join!(
        windowed_count(repo, per_ip > 0, Some(ip), since),
        windowed_count(repo, global > 0, None, since),
    );
    let ip_count = ip_count.map_err(AppError::from)?;
    let all_count = all_count.map_err(AppError::from)?;

    if per_ip > 0 && ip_count >= per_ip as i64 {
        return Err(AppError::RateLimited(
            "you are commenting too frequently, please wait a moment".to_string(),
        ));
    }
    if global > 0 && all_count >= global as i64 {
        return Err(AppError::RateLimited(
            "the site is receiving too many comments right now, try again later".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_trips_at_ceiling() {
        let tally = RequestTally::new(3);
        assert!(tally.bump("1.1.1.1").is_ok());
        assert!(tally.bump("1.1.1.1").is_ok());
        assert!(tally.bump("1.1.1.1").is_ok());
        assert!(tally.bump("1.1.1.1").is_err());
        // Other addresses are unaffected.
        assert!(tally.bump("2.2.2.2").is_ok());
    }
}
