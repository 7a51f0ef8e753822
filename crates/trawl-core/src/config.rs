use chrono::TimeDelta;

use crate::error::AppError;
use crate::pagination::ColdStartPolicy;
use crate::schedule::Schedule;

/// Tunables for the crawl cycles.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub schedule: Schedule,
    /// Items requested per listing page.
    pub page_limit: u32,
    pub cold_start: ColdStartPolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            page_limit: 100,
            cold_start: ColdStartPolicy::default(),
        }
    }
}

impl CrawlConfig {
    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// - `TRAWL_LISTING_POLL_SECS` (default 300)
    /// - `TRAWL_POST_SCAN_SECS` (default 3600)
    /// - `TRAWL_COMMENT_SCAN_SECS` (default 900)
    /// - `TRAWL_PAGE_LIMIT` (default 100)
    /// - `TRAWL_COLD_START` (`single-page` or `paginate`, default `single-page`)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let schedule = Schedule {
            listing_poll: secs_var(&lookup, "TRAWL_LISTING_POLL_SECS")?
                .unwrap_or(defaults.schedule.listing_poll),
            post_scan: secs_var(&lookup, "TRAWL_POST_SCAN_SECS")?
                .unwrap_or(defaults.schedule.post_scan),
            comment_scan: secs_var(&lookup, "TRAWL_COMMENT_SCAN_SECS")?
                .unwrap_or(defaults.schedule.comment_scan),
        };

        let page_limit = match lookup("TRAWL_PAGE_LIMIT") {
            None => defaults.page_limit,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if (1..=100).contains(&n) => n,
                _ => {
                    return Err(AppError::ConfigError(format!(
                        "Invalid TRAWL_PAGE_LIMIT '{raw}': must be between 1 and 100"
                    )));
                }
            },
        };

        let cold_start = match lookup("TRAWL_COLD_START") {
            None => defaults.cold_start,
            Some(raw) => raw.parse().map_err(AppError::ConfigError)?,
        };

        Ok(Self {
            schedule,
            page_limit,
            cold_start,
        })
    }
}

fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<TimeDelta>, AppError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(secs) if secs > 0 => Ok(Some(TimeDelta::seconds(secs))),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {name} '{raw}': must be a positive number of seconds"
        ))),
    }
}
