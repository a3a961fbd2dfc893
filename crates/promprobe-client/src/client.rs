//! HTTP client for the Prometheus API surface.
//!
//! Wraps the health, readiness, query, and status endpoints with a
//! per-request timeout. Retry policy deliberately lives with the caller:
//! this client only classifies failures.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Errors returned by [`PromClient`] calls.
///
/// The variants are disjoint so the caller can distinguish "the target is
/// slow" from "the target is gone" from "the target answered with an error".
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Transport-level failure: connection refused, DNS, TLS.
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("{url} returned {status}: {message}")]
    Response {
        url: String,
        status: u16,
        message: String,
    },

    /// The body could not be decoded as the expected shape.
    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// The standard Prometheus API envelope: `{"status": "...", "data": ...}`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Result type reported by the query endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Vector,
    Matrix,
    Scalar,
}

/// A single series from an instant query: labels plus one sampled value.
#[derive(Debug, Clone, Deserialize)]
pub struct InstantSample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// `[unix_ts, "value"]` per the Prometheus wire format.
    pub value: (f64, String),
}

impl InstantSample {
    /// Parses the sampled value as a float, if it is one.
    pub fn float_value(&self) -> Option<f64> {
        self.value.1.parse().ok()
    }
}

/// A single series from a range query: labels plus sampled values over time.
#[derive(Debug, Clone, Deserialize)]
pub struct RangeSample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub values: Vec<(f64, String)>,
}

#[derive(Debug, Deserialize)]
struct QueryData<T> {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<T>,
}

/// Decoded result of an instant query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub kind: ResultKind,
    pub samples: Vec<InstantSample>,
}

impl QueryResult {
    /// Returns the first sample's float value, the common case for
    /// aggregate expressions like `sum(...)` or `count(...)`.
    pub fn scalar(&self) -> Option<f64> {
        self.samples.first().and_then(InstantSample::float_value)
    }
}

/// Thin client for a Prometheus-compatible HTTP endpoint.
///
/// Stateless between calls apart from the underlying connection pool.
#[derive(Debug, Clone)]
pub struct PromClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl PromClient {
    /// Creates a client for the given base URL with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    /// The base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `GET /-/healthy`. True iff the target reports itself healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        self.probe_endpoint("/-/healthy").await
    }

    /// `GET /-/ready`. True iff the target reports itself ready to serve.
    pub async fn ready(&self) -> Result<bool, ClientError> {
        self.probe_endpoint("/-/ready").await
    }

    /// Runs an instant query via `GET /api/v1/query`.
    pub async fn query(&self, expr: &str) -> Result<QueryResult, ClientError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let data: QueryData<InstantSample> = self
            .get_api(&url, &[("query", expr)])
            .await?;

        Ok(QueryResult {
            kind: parse_result_kind(&url, &data.result_type)?,
            samples: data.result,
        })
    }

    /// Runs a range query via `GET /api/v1/query_range`.
    ///
    /// `start` and `end` are unix timestamps; `step` is the resolution.
    pub async fn query_range(
        &self,
        expr: &str,
        start: f64,
        end: f64,
        step: Duration,
    ) -> Result<Vec<RangeSample>, ClientError> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        let start = format!("{start}");
        let end = format!("{end}");
        let step = format!("{}s", step.as_secs().max(1));
        let data: QueryData<RangeSample> = self
            .get_api(
                &url,
                &[
                    ("query", expr),
                    ("start", &start),
                    ("end", &end),
                    ("step", &step),
                ],
            )
            .await?;

        Ok(data.result)
    }

    /// `GET /api/v1/status/buildinfo`. Returns the reported version string.
    pub async fn build_info(&self) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        struct BuildInfo {
            #[serde(default)]
            version: String,
        }

        let url = format!("{}/api/v1/status/buildinfo", self.base_url);
        let info: BuildInfo = self.get_api(&url, &[]).await?;
        Ok(info.version)
    }

    /// `GET /api/v1/status/tsdb`. Returns the head-series count.
    pub async fn tsdb_head_series(&self) -> Result<u64, ClientError> {
        #[derive(Deserialize)]
        struct HeadStats {
            #[serde(rename = "numSeries", default)]
            num_series: u64,
        }

        #[derive(Deserialize)]
        struct TsdbStatus {
            #[serde(rename = "headStats")]
            head_stats: HeadStats,
        }

        let url = format!("{}/api/v1/status/tsdb", self.base_url);
        let status: TsdbStatus = self.get_api(&url, &[]).await?;
        Ok(status.head_stats.num_series)
    }

    /// Issues a bare GET against an arbitrary path.
    ///
    /// Any 2xx counts as a positive probe; non-2xx is a negative probe, not
    /// an error. Only transport failure to attempt the check raises.
    pub async fn probe_endpoint(&self, path: &str) -> Result<bool, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| classify_send_error(&url, err))?;

        Ok(response.status().is_success())
    }

    /// Issues a GET and unwraps the Prometheus API envelope.
    async fn get_api<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .get(url)
            .query(params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| classify_send_error(url, err))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| ClientError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        if !status.is_success() {
            // The API reports errors inside the envelope; surface its
            // message when present instead of the raw body.
            let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.error)
                .unwrap_or_else(|| truncate(&body, 200));

            return Err(ClientError::Response {
                url: url.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&body).map_err(|err| ClientError::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            })?;

        if envelope.status != "success" {
            return Err(ClientError::Response {
                url: url.to_string(),
                status: status.as_u16(),
                message: format!(
                    "{}: {}",
                    envelope.error_type.unwrap_or_default(),
                    envelope.error.unwrap_or_default()
                ),
            });
        }

        envelope.data.ok_or_else(|| ClientError::Decode {
            url: url.to_string(),
            reason: "missing 'data' in successful response".to_string(),
        })
    }
}

fn classify_send_error(url: &str, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout {
            url: url.to_string(),
        }
    } else {
        ClientError::Connection {
            url: url.to_string(),
            source: err,
        }
    }
}

fn parse_result_kind(url: &str, raw: &str) -> Result<ResultKind, ClientError> {
    match raw {
        "vector" => Ok(ResultKind::Vector),
        "matrix" => Ok(ResultKind::Matrix),
        "scalar" => Ok(ResultKind::Scalar),
        other => Err(ClientError::Decode {
            url: url.to_string(),
            reason: format!("unknown resultType '{other}'"),
        }),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut boundary = max_len.min(s.len());
        while boundary > 0 && !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        format!("{}...", &s[..boundary])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_sample_float_value() {
        let sample: InstantSample = serde_json::from_str(
            r#"{"metric": {"job": "prometheus"}, "value": [1712000000.123, "42.5"]}"#,
        )
        .unwrap();

        assert_eq!(sample.float_value(), Some(42.5));
        assert_eq!(sample.metric.get("job").map(String::as_str), Some("prometheus"));
    }

    #[test]
    fn test_instant_sample_non_numeric_value() {
        let sample: InstantSample =
            serde_json::from_str(r#"{"metric": {}, "value": [1712000000.0, "NaN-ish"]}"#).unwrap();

        assert_eq!(sample.float_value(), None);
    }

    #[test]
    fn test_envelope_decodes_vector_result() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"instance": "localhost:9090"}, "value": [1712000000.0, "1"]}
                ]
            }
        }"#;

        let envelope: ApiEnvelope<QueryData<InstantSample>> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.status, "success");
        let data = envelope.data.unwrap();
        assert_eq!(data.result_type, "vector");
        assert_eq!(data.result.len(), 1);
    }

    #[test]
    fn test_envelope_decodes_error_fields() {
        let body = r#"{"status": "error", "errorType": "bad_data", "error": "parse error"}"#;
        let envelope: ApiEnvelope<QueryData<InstantSample>> = serde_json::from_str(body).unwrap();

        assert_eq!(envelope.status, "error");
        assert_eq!(envelope.error_type.as_deref(), Some("bad_data"));
        assert_eq!(envelope.error.as_deref(), Some("parse error"));
    }

    #[test]
    fn test_query_result_scalar_takes_first_sample() {
        let result = QueryResult {
            kind: ResultKind::Vector,
            samples: vec![
                InstantSample {
                    metric: BTreeMap::new(),
                    value: (0.0, "3.5".to_string()),
                },
                InstantSample {
                    metric: BTreeMap::new(),
                    value: (0.0, "9.0".to_string()),
                },
            ],
        };

        assert_eq!(result.scalar(), Some(3.5));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = PromClient::new("http://localhost:9090/", Duration::from_secs(5));
        assert_eq!(client.base_url(), "http://localhost:9090");
    }

    #[test]
    fn test_parse_result_kind_rejects_unknown() {
        let err = parse_result_kind("http://x", "streams").unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_connection_error_classified_as_connection() {
        // Port 1 is essentially guaranteed to refuse connections.
        let client = PromClient::new("http://127.0.0.1:1", Duration::from_secs(2));
        let err = client.health().await.unwrap_err();

        assert!(matches!(err, ClientError::Connection { .. }), "got: {err}");
    }
}
