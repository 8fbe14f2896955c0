use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};

use crate::error::PathwayError;
use crate::rate_limit::RateLimiter;

const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Blocking source of raw response bodies. Connectors only talk to this.
pub trait HttpFetch: Send + Sync {
    fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError>;
}

impl<T: HttpFetch + ?Sized> HttpFetch for &T {
    fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError> {
        (**self).fetch(url, params)
    }
}

impl<T: HttpFetch + ?Sized> HttpFetch for Arc<T> {
    fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError> {
        (**self).fetch(url, params)
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

impl FetchSettings {
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

fn user_agent(version: &str) -> Result<HeaderValue, PathwayError> {
    HeaderValue::from_str(&format!("pathwaydb/{version}"))
        .map_err(|err| PathwayError::HttpClient(format!("invalid user agent: {err}")))
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    settings: FetchSettings,
}

enum Attempt {
    Done(Vec<u8>),
    Retry {
        message: String,
        wait: Option<Duration>,
    },
    Fatal(PathwayError),
}

impl HttpFetcher {
    pub fn new(limiter: Arc<RateLimiter>, settings: FetchSettings) -> Result<Self, PathwayError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, user_agent(env!("CARGO_PKG_VERSION"))?);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| PathwayError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            limiter,
            settings,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn attempt(&self, url: &str, params: &[(&str, &str)]) -> Attempt {
        let response = match self.client.get(url).query(params).send() {
            Ok(response) => response,
            Err(err) if is_retryable_error(&err) => {
                return Attempt::Retry {
                    message: err.to_string(),
                    wait: None,
                };
            }
            Err(err) => {
                return Attempt::Fatal(PathwayError::Network {
                    url: url.to_string(),
                    attempts: 1,
                    message: err.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        if response.status().is_success() {
            return match response.bytes() {
                Ok(bytes) => Attempt::Done(bytes.to_vec()),
                Err(err) => Attempt::Retry {
                    message: err.to_string(),
                    wait: None,
                },
            };
        }

        if is_retryable_status(status) {
            let wait = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Attempt::Retry {
                message: format!("status {status}"),
                wait,
            };
        }

        let message = response
            .text()
            .map(|text| truncate(&text, 200))
            .unwrap_or_else(|_| "request failed".to_string());
        Attempt::Fatal(PathwayError::Request {
            url: url.to_string(),
            status,
            message,
        })
    }
}

impl HttpFetch for HttpFetcher {
    fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .ok_or_else(|| PathwayError::Validation(format!("invalid url: {url}")))?;

        let mut attempt = 0usize;
        loop {
            let start = Instant::now();
            let outcome = self.limiter.throttle(&host, || self.attempt(url, params));
            let latency_ms = start.elapsed().as_millis() as u64;
            match outcome {
                Attempt::Done(bytes) => {
                    tracing::debug!(%url, attempt, latency_ms, bytes = bytes.len(), "fetched");
                    return Ok(bytes);
                }
                Attempt::Fatal(err) => {
                    tracing::warn!(%url, attempt, latency_ms, error = %err, "request failed");
                    return Err(err);
                }
                Attempt::Retry { message, wait } => {
                    if attempt >= self.settings.max_retries {
                        return Err(PathwayError::Network {
                            url: url.to_string(),
                            attempts: attempt + 1,
                            message,
                        });
                    }
                    let delay = wait
                        .map(|wait| wait.min(MAX_RETRY_AFTER))
                        .unwrap_or_else(|| self.settings.backoff(attempt));
                    tracing::info!(%url, attempt, delay_ms = delay.as_millis() as u64, %message, "retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

fn truncate(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
