//! Blocking RFC 3161 client.

use std::io::Read;
use std::time::Duration;

use tessera_crypto::ContentHash;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{TimestampError, TimestampResult};
use crate::request::TimestampRequest;
use crate::response::TimestampResponse;
use crate::retry::RetryPolicy;

/// Largest TSA response accepted.
pub const MAX_RESPONSE_SIZE: u64 = 1024 * 1024;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// MIME type of a DER `TimeStampReq`.
pub const QUERY_CONTENT_TYPE: &str = "application/timestamp-query";

/// MIME type of a DER `TimeStampResp`.
pub const REPLY_CONTENT_TYPE: &str = "application/timestamp-reply";

/// Client settings.
#[derive(Debug, Clone)]
pub struct TimestampClientConfig {
    /// TSA endpoint.
    pub url: String,
    /// Policy OID to request, in dotted form.
    pub policy_oid: Option<String>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retry schedule for transient failures.
    pub retry: RetryPolicy,
}

impl TimestampClientConfig {
    /// Defaults for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy_oid: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Requests timestamp tokens from one TSA.
#[derive(Debug, Clone)]
pub struct TimestampClient {
    url: Url,
    policy_oid: Option<String>,
    retry: RetryPolicy,
    http: reqwest::blocking::Client,
}

/// Parse and check a TSA URL.
///
/// # Errors
///
/// Returns [`TimestampError::InvalidUrl`] unless the URL is absolute
/// `http` or `https` with a host.
pub fn parse_tsa_url(raw: &str) -> TimestampResult<Url> {
    let url = Url::parse(raw).map_err(|e| TimestampError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TimestampError::InvalidUrl(format!(
            "{raw}: scheme must be http or https"
        )));
    }
    if url.host_str().is_none() {
        return Err(TimestampError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}

impl TimestampClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::InvalidUrl`] for a bad endpoint or policy,
    /// or [`TimestampError::ClientSetup`] if the HTTP stack fails to start.
    pub fn new(config: TimestampClientConfig) -> TimestampResult<Self> {
        let url = parse_tsa_url(&config.url)?;
        if let Some(policy) = &config.policy_oid {
            policy
                .parse::<der::asn1::ObjectIdentifier>()
                .map_err(|e| TimestampError::InvalidUrl(format!("policy OID {policy}: {e}")))?;
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TimestampError::ClientSetup(e.to_string()))?;
        Ok(Self {
            url,
            policy_oid: config.policy_oid,
            retry: config.retry,
            http,
        })
    }

    /// The TSA endpoint.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Obtain a token over `digest`.
    ///
    /// Transport failures and HTTP 5xx are retried per the [`RetryPolicy`].
    /// The response must be granted, cover `digest` and echo the nonce.
    ///
    /// # Errors
    ///
    /// - [`TimestampError::Unreachable`] once retries are exhausted
    /// - [`TimestampError::Rejected`] if the TSA refuses
    /// - [`TimestampError::ImprintMismatch`] or [`TimestampError::NonceMismatch`]
    ///   if the token answers a different request
    /// - parse errors for malformed responses
    pub fn request(&self, digest: &ContentHash) -> TimestampResult<TimestampResponse> {
        let mut request = TimestampRequest::new(*digest);
        if let Some(policy) = &self.policy_oid {
            request = request.with_policy(policy)?;
        }
        let body = request.to_der()?;

        let attempts = self.retry.attempts();
        let mut attempt: u32 = 0;
        let raw = loop {
            debug!(url = %self.url, attempt, "Sending timestamp request");
            match self.send_once(&body) {
                Ok(raw) => break raw,
                Err(e) if e.is_transient() => {
                    attempt = attempt.saturating_add(1);
                    if attempt >= attempts {
                        return Err(TimestampError::Unreachable {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                    let delay = self.retry.delay_after(attempt.saturating_sub(1));
                    warn!(
                        url = %self.url,
                        attempt,
                        error = %e,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "TSA request failed, retrying"
                    );
                    std::thread::sleep(delay);
                },
                Err(e) => return Err(e),
            }
        };

        let response = TimestampResponse::from_der(&raw)?;
        let token = response.granted_token()?;
        let info = token.tst_info();
        if info.hashed_message != digest.as_bytes() {
            return Err(TimestampError::ImprintMismatch {
                token: hex::encode(&info.hashed_message),
                expected: digest.to_hex(),
            });
        }
        if !info.nonce_matches(request.nonce()) {
            return Err(TimestampError::NonceMismatch);
        }

        info!(
            url = %self.url,
            gen_time = %info.gen_time,
            serial = %info.serial_hex(),
            "Timestamp granted"
        );
        Ok(response)
    }

    fn send_once(&self, body: &[u8]) -> TimestampResult<Vec<u8>> {
        let unreachable = |e: reqwest::Error| TimestampError::Unreachable {
            attempts: 1,
            message: e.to_string(),
        };
        let response = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, QUERY_CONTENT_TYPE)
            .body(body.to_vec())
            .send()
            .map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TimestampError::HttpStatus(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_SIZE)
        {
            return Err(TimestampError::ResponseTooLarge {
                limit: MAX_RESPONSE_SIZE,
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type != REPLY_CONTENT_TYPE {
            debug!(%content_type, "Unexpected TSA response content type");
        }

        let mut raw = Vec::new();
        response
            .take(MAX_RESPONSE_SIZE.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|e| TimestampError::Unreachable {
                attempts: 1,
                message: e.to_string(),
            })?;
        if u64::try_from(raw.len()).unwrap_or(u64::MAX) > MAX_RESPONSE_SIZE {
            return Err(TimestampError::ResponseTooLarge {
                limit: MAX_RESPONSE_SIZE,
            });
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{VerifyOptions, verify};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_test::http::{HttpReply, ScriptedServer};
    use tessera_test::tsa::{TestTsa, TokenVariant};

    fn fast_config(url: &str) -> TimestampClientConfig {
        TimestampClientConfig {
            url: url.to_string(),
            policy_oid: None,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        }
    }

    #[test]
    fn test_request_round_trip() {
        let tsa = TestTsa::new();
        let server = ScriptedServer::start(1, move |body| {
            HttpReply::ok(REPLY_CONTENT_TYPE, tsa.respond_to_request(body, TokenVariant::Valid))
        });
        let client = TimestampClient::new(fast_config(server.url())).unwrap();
        let digest = ContentHash::hash(b"log");

        let response = client.request(&digest).unwrap();
        assert!(response.status().is_granted());
        assert!(verify(response.to_der(), &digest, &VerifyOptions::default()).verified);

        let requests = server.finish();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].content_type.as_deref(), Some(QUERY_CONTENT_TYPE));
    }

    #[test]
    fn test_retries_server_errors() {
        let tsa = TestTsa::new();
        let calls = AtomicUsize::new(0);
        let server = ScriptedServer::start(2, move |body| {
            // First call fails, second succeeds.
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                HttpReply::status(503)
            } else {
                HttpReply::ok(REPLY_CONTENT_TYPE, tsa.respond_to_request(body, TokenVariant::Valid))
            }
        });
        let client = TimestampClient::new(fast_config(server.url())).unwrap();
        assert!(client.request(&ContentHash::hash(b"log")).is_ok());
        assert_eq!(server.finish().len(), 2);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let server = ScriptedServer::start(1, |_| HttpReply::status(400));
        let client = TimestampClient::new(fast_config(server.url())).unwrap();
        let err = client.request(&ContentHash::hash(b"log")).unwrap_err();
        assert!(matches!(err, TimestampError::HttpStatus(400)));
        assert_eq!(server.finish().len(), 1);
    }

    #[test]
    fn test_nonce_mismatch_detected() {
        let tsa = TestTsa::new();
        let server = ScriptedServer::start(1, move |body| {
            let imprint = TestTsa::imprint_of(body).unwrap_or_default();
            HttpReply::ok(
                REPLY_CONTENT_TYPE,
                tsa.respond(&imprint, Some(1), TokenVariant::Valid),
            )
        });
        let client = TimestampClient::new(fast_config(server.url())).unwrap();
        let err = client.request(&ContentHash::hash(b"log")).unwrap_err();
        assert!(matches!(err, TimestampError::NonceMismatch));
    }

    #[test]
    fn test_oversized_response_rejected() {
        let server = ScriptedServer::start(1, |_| {
            HttpReply::ok(REPLY_CONTENT_TYPE, vec![0u8; 2 * 1024 * 1024])
        });
        let client = TimestampClient::new(fast_config(server.url())).unwrap();
        let err = client.request(&ContentHash::hash(b"log")).unwrap_err();
        assert!(matches!(err, TimestampError::ResponseTooLarge { .. }));
    }

    #[test]
    fn test_unreachable_after_retries() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/tsr", listener.local_addr().unwrap());
        drop(listener);

        let client = TimestampClient::new(fast_config(&url)).unwrap();
        let err = client.request(&ContentHash::hash(b"log")).unwrap_err();
        assert!(matches!(err, TimestampError::Unreachable { attempts: 3, .. }));
    }

    #[test]
    fn test_invalid_urls() {
        for url in ["not a url", "ftp://tsa.example/", "file:///tmp/x"] {
            assert!(matches!(
                TimestampClient::new(TimestampClientConfig::new(url)),
                Err(TimestampError::InvalidUrl(_))
            ));
        }
        let mut config = TimestampClientConfig::new("https://tsa.example/");
        config.policy_oid = Some("nope".into());
        assert!(TimestampClient::new(config).is_err());
    }
}
