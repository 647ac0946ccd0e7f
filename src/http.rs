// 🌐 Auto.dev Client - Blocking HTTP access to listings and VIN decode
// Sliding-window rate limiting, bounded retries, Retry-After on 429

use crate::decode::DecodeRecord;
use crate::source::{DecodeSource, ListingPage, ListingSource, SearchFilters, SourceError};
use crate::vin::VIN_LENGTH;
use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

const USER_AGENT: &str = concat!("4Runner Manual Hunter/", env!("CARGO_PKG_VERSION"));

/// Wait applied on 429 when the server sends no usable Retry-After
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,

    /// Requests allowed per window (default: 100 / 60s)
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,

    /// Total attempts per request, first one included (default: 3)
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            base_url: "https://auto.dev/api".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// RATE LIMITER
// ============================================================================

/// Sliding window over recent request instants
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    recent: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        RateLimiter {
            max_requests: max_requests.max(1),
            window,
            recent: VecDeque::new(),
        }
    }

    /// How long a request made at `now` must wait, if at all
    pub fn wait_time(&mut self, now: Instant) -> Option<Duration> {
        while let Some(oldest) = self.recent.front() {
            if now.duration_since(*oldest) >= self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        if self.recent.len() < self.max_requests {
            return None;
        }

        self.recent
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .filter(|wait| !wait.is_zero())
    }

    pub fn record(&mut self, at: Instant) {
        self.recent.push_back(at);
    }

    /// Block until a slot is free, then claim it
    pub fn acquire(&mut self) {
        if let Some(wait) = self.wait_time(Instant::now()) {
            tracing::info!("Rate limit reached, waiting {:.1}s", wait.as_secs_f64());
            thread::sleep(wait + Duration::from_millis(100));
        }
        self.record(Instant::now());
    }

    pub fn in_window(&self) -> usize {
        self.recent.len()
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct AutoDevClient {
    http: Client,
    settings: ClientSettings,
    limiter: RefCell<RateLimiter>,
    calls: Cell<u64>,
}

impl AutoDevClient {
    pub fn new(settings: ClientSettings) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let limiter = RateLimiter::new(settings.rate_limit_requests, settings.rate_limit_window);

        Ok(AutoDevClient {
            http,
            settings,
            limiter: RefCell::new(limiter),
            calls: Cell::new(0),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn reset_call_count(&self) {
        self.calls.set(0);
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), endpoint)
    }

    /// GET with rate limiting and retries; returns the parsed JSON body
    fn get_json(
        &self,
        endpoint: &str,
        query: &[(&'static str, String)],
    ) -> Result<serde_json::Value, SourceError> {
        let url = self.url(endpoint);
        let attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            self.limiter.borrow_mut().acquire();

            let sent = self
                .http
                .get(&url)
                .bearer_auth(&self.settings.api_key)
                .query(query)
                .send();
            self.calls.set(self.calls.get() + 1);

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!("Request error on {} (attempt {}/{}): {}", endpoint, attempt, attempts, err);
                    last_error = err.to_string();
                    if attempt < attempts {
                        thread::sleep(self.settings.retry_delay);
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();
            match status {
                200..=299 => return parse_body(response),
                401 => {
                    tracing::error!("Authentication failed. Check the API key.");
                    return Err(SourceError::Unauthorized);
                }
                429 => {
                    let wait = retry_after(&response);
                    tracing::warn!("API rate limited, waiting {}s", wait.as_secs());
                    last_error = format!("HTTP 429 on {}", endpoint);
                    if attempt < attempts {
                        thread::sleep(wait);
                    }
                }
                _ => {
                    let message = response.text().unwrap_or_default();
                    tracing::warn!("API request failed: {} - {}", status, truncate(&message, 200));
                    if attempt == attempts {
                        return Err(SourceError::Http { status, message });
                    }
                    last_error = format!("HTTP {}", status);
                    thread::sleep(self.settings.retry_delay);
                }
            }
        }

        Err(SourceError::RetriesExhausted {
            attempts,
            last_error,
        })
    }
}

fn parse_body(response: Response) -> Result<serde_json::Value, SourceError> {
    let text = response
        .text()
        .map_err(|e| SourceError::Network(e.to_string()))?;
    Ok(serde_json::from_str(text.trim_start_matches('\u{feff}'))?)
}

fn retry_after(response: &Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_RETRY_AFTER_SECS))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl ListingSource for AutoDevClient {
    fn fetch_page(&self, page: u32, filters: &SearchFilters) -> Result<ListingPage, SourceError> {
        tracing::info!("Fetching {} {} listings page {}...", filters.make, filters.model, page);
        let body = self.get_json("/listings", &filters.query_pairs(page))?;
        ListingPage::from_value(body)
    }
}

impl DecodeSource for AutoDevClient {
    fn decode(&self, vin: &str) -> Result<DecodeRecord, SourceError> {
        if vin.chars().count() != VIN_LENGTH {
            return Err(SourceError::InvalidVin(vin.to_string()));
        }

        tracing::debug!("Decoding VIN: {}", vin);
        let body = self.get_json(&format!("/vin/{}", vin), &[])?;
        Ok(DecodeRecord::from_value(body)?)
    }

    fn calls_made(&self) -> u64 {
        self.calls.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_window() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(limiter.wait_time(start), None);
        limiter.record(start);
        assert_eq!(limiter.wait_time(start + Duration::from_secs(1)), None);
        limiter.record(start + Duration::from_secs(1));

        // Third request inside the window waits for the oldest to expire
        assert_eq!(
            limiter.wait_time(start + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );

        // Oldest has aged out
        assert_eq!(limiter.wait_time(start + Duration::from_secs(10)), None);
        assert_eq!(limiter.in_window(), 1);
    }

    #[test]
    fn test_zero_limit_still_allows_one() {
        let mut limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert_eq!(limiter.wait_time(Instant::now()), None);
    }

    #[test]
    fn test_decode_rejects_bad_length_without_calling() {
        let client = AutoDevClient::new(ClientSettings::default()).unwrap();

        assert!(matches!(
            client.decode("JT3LN130"),
            Err(SourceError::InvalidVin(_))
        ));
        assert_eq!(client.calls_made(), 0);
    }

    #[test]
    fn test_url_joins_base() {
        let client = AutoDevClient::new(ClientSettings {
            base_url: "https://example.test/api/".to_string(),
            ..ClientSettings::default()
        })
        .unwrap();

        assert_eq!(client.url("/vin/ABC"), "https://example.test/api/vin/ABC");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
