/**
 * Per-category backoff windows derived from backend replies.
 *
 * The backend announces limits in two ways:
 *
 * - `X-Sentry-Rate-Limits: <seconds>:<cat>;<cat>:<scope>, ...`: one entry
 *   per limit; an empty category list means "all categories".
 * - `Retry-After: <seconds | HTTP-date>` on a 429 without the header above,
 *   which limits every category.
 *
 * A window only ever grows: a shorter limit never shortens an existing one.
 * Announced delays are capped at `MAX_DELAY`.
 * The map lives behind a `std::sync::Mutex`; it is never held across an
 * `.await`.
 */
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::warn;

use crate::protocol::types::EventKind;

/// Applied when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Longest pause a single reply can impose.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

pub const RATE_LIMITS_HEADER: &str = "x-sentry-rate-limits";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Key for limits that apply to every category.
const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Default)]
pub struct RateLimiter {
    limits: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when events of `kind` must not be sent right now.
    pub fn is_rate_limited(&self, kind: EventKind) -> bool {
        self.is_category_limited(kind.category())
    }

    pub fn is_category_limited(&self, category: &str) -> bool {
        let now = Instant::now();
        let Ok(limits) = self.limits.lock() else {
            return false;
        };
        [category, ALL_CATEGORIES]
            .iter()
            .filter_map(|c| limits.get(*c))
            .any(|until| *until > now)
    }

    /// Instant until which `category` is limited, if it currently is.
    pub fn disabled_until(&self, category: &str) -> Option<Instant> {
        let now = Instant::now();
        let limits = self.limits.lock().ok()?;
        [category, ALL_CATEGORIES]
            .iter()
            .filter_map(|c| limits.get(*c).copied())
            .filter(|until| *until > now)
            .max()
    }

    /**
     * Limits `category` for `duration` from now, at most `MAX_DELAY`. An
     * empty category or `"all"` limits every category.
     */
    pub fn limit(&self, category: &str, duration: Duration) {
        let key = if category.is_empty() {
            ALL_CATEGORIES
        } else {
            category
        };
        let now = Instant::now();
        let until = now
            .checked_add(duration.min(MAX_DELAY))
            .unwrap_or(now);

        if let Ok(mut limits) = self.limits.lock() {
            let entry = limits.entry(key.to_string()).or_insert(until);
            if *entry < until {
                *entry = until;
            }
        }
    }

    /**
     * Records any limits announced by a backend reply.
     *
     * # Returns
     * `true` if the reply carried a limit.
     */
    pub fn update_from_reply(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        if let Some(value) = headers.get(RATE_LIMITS_HEADER).and_then(|v| v.to_str().ok()) {
            for (category, delay) in parse_rate_limits(value) {
                warn!(
                    category = %category,
                    delay_secs = delay.as_secs(),
                    "rate limited, sending of this category is paused"
                );
                self.limit(&category, delay);
            }
            return true;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let delay = headers
                .get(RETRY_AFTER_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(parse_retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            warn!(
                delay_secs = delay.as_secs(),
                "rate limited, sending of all categories is paused"
            );
            self.limit(ALL_CATEGORIES, delay);
            return true;
        }

        false
    }
}

/**
 * Parses an `X-Sentry-Rate-Limits` value into `(category, delay)` pairs.
 * An empty category list yields a single `"all"` entry.
 */
fn parse_rate_limits(value: &str) -> Vec<(String, Duration)> {
    let mut out = Vec::new();

    for limit in value.split(',') {
        let mut parts = limit.trim().split(':');
        let delay = parts
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(|delay| delay.min(MAX_DELAY))
            .unwrap_or(DEFAULT_RETRY_AFTER);
        let categories = parts.next().unwrap_or_default();

        if categories.trim().is_empty() {
            out.push((ALL_CATEGORIES.to_string(), delay));
            continue;
        }
        for category in categories.split(';').map(str::trim) {
            let key = if category.is_empty() {
                ALL_CATEGORIES
            } else {
                category
            };
            out.push((key.to_string(), delay));
        }
    }

    out
}

/// `Retry-After` is either delta-seconds or an HTTP-date.
fn parse_retry_after(value: &str) -> Duration {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Duration::from_secs(secs).min(MAX_DELAY);
    }
    match DateTime::parse_from_rfc2822(value) {
        Ok(date) => (date.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(MAX_DELAY),
        Err(_) => DEFAULT_RETRY_AFTER,
    }
}
