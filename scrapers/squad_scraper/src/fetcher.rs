use rand::Rng;
use std::{thread, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{FetchConfig, ScraperConfig};

/// Statuses that mean "try again later" rather than "this will never work".
const TRANSIENT_STATUSES: [u16; 3] = [429, 502, 503];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    pub fn is_transient(&self) -> bool {
        TRANSIENT_STATUSES.contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub type Headers = Vec<(String, String)>;

pub trait HttpTransport {
    fn get(&self, url: &str, headers: &Headers) -> Result<FetchResponse, FetchError>;
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, headers: &Headers) -> Result<FetchResponse, FetchError> {
        let transport_error = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        };

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().map_err(|e| {
            if e.is_builder() {
                FetchError::InvalidUrl { url: url.to_string(), source: e }
            } else {
                transport_error(e)
            }
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(transport_error)?.to_vec();
        Ok(FetchResponse { status, body })
    }
}

pub fn browser_headers(config: &ScraperConfig) -> Headers {
    vec![
        ("User-Agent".to_string(), config.scraping.user_agent.clone()),
        ("Accept".to_string(), config.scraping.accept.clone()),
        ("Accept-Language".to_string(), config.scraping.accept_language.clone()),
    ]
}

/// Single GET with retries. Transient statuses and transport errors are retried
/// with exponential backoff; once attempts run out a transient response is
/// handed back as-is and a transport error is returned.
pub struct Fetcher<T = ReqwestTransport, S = ThreadSleeper> {
    transport: T,
    sleeper: S,
    config: FetchConfig,
    headers: Headers,
}

impl Fetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        Ok(Self::with_parts(
            ReqwestTransport::new(&config.fetch)?,
            ThreadSleeper,
            config.fetch.clone(),
            browser_headers(config),
        ))
    }
}

impl<T: HttpTransport, S: Sleeper> Fetcher<T, S> {
    pub fn with_parts(transport: T, sleeper: S, config: FetchConfig, headers: Headers) -> Self {
        Self {
            transport,
            sleeper,
            config,
            headers,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn jitter(&self) -> Duration {
        if self.config.initial_jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=self.config.initial_jitter_ms))
    }

    /// Delay before the retry that follows failed attempt `attempt` (zero based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config.base_delay() * 2u32.saturating_pow(attempt) + self.jitter()
    }

    pub fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let attempts = self.config.max_retries.max(1);
        self.sleeper.sleep(self.jitter());

        let mut attempt = 0;
        loop {
            let last_attempt = attempt + 1 >= attempts;
            match self.transport.get(url, &self.headers) {
                Ok(response) if response.is_success() => {
                    debug!("Fetched {} ({} bytes)", url, response.body.len());
                    return Ok(response);
                }
                Ok(response) if response.is_transient() && !last_attempt => {
                    warn!(
                        "HTTP {} from {} (attempt {}/{}), backing off",
                        response.status,
                        url,
                        attempt + 1,
                        attempts
                    );
                }
                Ok(response) => {
                    if response.is_transient() {
                        warn!("Giving up on {} after {} attempts: HTTP {}", url, attempts, response.status);
                    }
                    return Ok(response);
                }
                Err(e @ FetchError::InvalidUrl { .. }) => return Err(e),
                Err(e) if !last_attempt => {
                    warn!("{} (attempt {}/{}), backing off", e, attempt + 1, attempts);
                }
                Err(e) => return Err(e),
            }
            self.sleeper.sleep(self.backoff_delay(attempt));
            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        io,
    };

    pub(crate) struct ScriptedTransport {
        responses: RefCell<VecDeque<Result<FetchResponse, FetchError>>>,
        pub calls: Cell<usize>,
    }

    impl ScriptedTransport {
        pub(crate) fn statuses(statuses: &[u16]) -> Self {
            Self::new(statuses.iter().map(|&status| Ok(response(status))).collect())
        }

        pub(crate) fn new(responses: Vec<Result<FetchResponse, FetchError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, url: &str, _headers: &Headers) -> Result<FetchResponse, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(transport_error(url)))
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    pub(crate) fn response(status: u16) -> FetchResponse {
        FetchResponse {
            status,
            body: format!("status {status}").into_bytes(),
        }
    }

    fn transport_error(url: &str) -> FetchError {
        FetchError::Transport {
            url: url.to_string(),
            source: Box::new(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
        }
    }

    fn fetcher(transport: ScriptedTransport, max_retries: u32) -> Fetcher<ScriptedTransport, RecordingSleeper> {
        let config = FetchConfig {
            max_retries,
            base_delay_ms: 100,
            initial_jitter_ms: 0,
            timeout_secs: 5,
        };
        Fetcher::with_parts(transport, RecordingSleeper::default(), config, Vec::new())
    }

    /// Sleeps after the initial pre-request jitter.
    fn retry_sleeps(fetcher: &Fetcher<ScriptedTransport, RecordingSleeper>) -> Vec<Duration> {
        fetcher.sleeper().sleeps.borrow()[1..].to_vec()
    }

    #[test]
    fn test_success_after_transient_failures() {
        let fetcher = fetcher(ScriptedTransport::statuses(&[503, 503, 200]), 3);
        let response = fetcher.fetch("http://example.test/squad").unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(fetcher.transport().calls.get(), 3);
        assert_eq!(
            retry_sleeps(&fetcher),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn test_exhausted_transient_returns_last_response() {
        let fetcher = fetcher(ScriptedTransport::statuses(&[503, 503, 503]), 3);
        let response = fetcher.fetch("http://example.test/squad").unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(fetcher.transport().calls.get(), 3);
        assert_eq!(retry_sleeps(&fetcher).len(), 2);
    }

    #[test]
    fn test_permanent_status_is_not_retried() {
        let fetcher = fetcher(ScriptedTransport::statuses(&[404, 200]), 3);
        let response = fetcher.fetch("http://example.test/missing").unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(fetcher.transport().calls.get(), 1);
        assert!(retry_sleeps(&fetcher).is_empty());
    }

    #[test]
    fn test_rate_limit_and_bad_gateway_are_transient() {
        let fetcher = fetcher(ScriptedTransport::statuses(&[429, 502, 200]), 3);
        assert_eq!(fetcher.fetch("http://example.test/").unwrap().status, 200);
    }

    #[test]
    fn test_transport_error_retried_then_raised() {
        let transport = ScriptedTransport::new(vec![
            Err(transport_error("http://example.test/")),
            Err(transport_error("http://example.test/")),
        ]);
        let fetcher = fetcher(transport, 2);

        let err = fetcher.fetch("http://example.test/").unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
        assert_eq!(fetcher.transport().calls.get(), 2);
        assert_eq!(retry_sleeps(&fetcher), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn test_transport_error_then_success() {
        let transport = ScriptedTransport::new(vec![Err(transport_error("http://example.test/")), Ok(response(200))]);
        let fetcher = fetcher(transport, 3);
        assert!(fetcher.fetch("http://example.test/").unwrap().is_success());
    }

    #[test]
    fn test_malformed_url_is_not_retried() {
        let fetcher = Fetcher::with_parts(
            ReqwestTransport::new(&FetchConfig::default()).unwrap(),
            RecordingSleeper::default(),
            FetchConfig {
                initial_jitter_ms: 0,
                ..FetchConfig::default()
            },
            Vec::new(),
        );
        let err = fetcher.fetch("not a url").unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert_eq!(fetcher.sleeper().sleeps.borrow().len(), 1);
    }

    #[test]
    fn test_zero_retries_still_makes_one_attempt() {
        let fetcher = fetcher(ScriptedTransport::statuses(&[200]), 0);
        assert!(fetcher.fetch("http://example.test/").is_ok());
        assert_eq!(fetcher.transport().calls.get(), 1);
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let config = FetchConfig {
            max_retries: 3,
            base_delay_ms: 100,
            initial_jitter_ms: 50,
            timeout_secs: 5,
        };
        let fetcher = Fetcher::with_parts(ScriptedTransport::statuses(&[]), RecordingSleeper::default(), config, Vec::new());
        for _ in 0..20 {
            let delay = fetcher.backoff_delay(2);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(450));
        }
    }
}
