//! Graph store sink
//!
//! The engine treats the target store as a text-statement sink: each
//! flush is submitted as one all-or-nothing transaction and answered
//! with write statistics. [`HttpSink`] talks to a transactional commit
//! HTTP endpoint; [`MockSink`] records submissions for tests and
//! [`NullSink`] backs debug runs, which never submit.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::TargetConfig;
use crate::error::ImportError;

/// Timeout for one batch submission
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Counters reported by the store for one or more submissions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct WriteStats {
    #[serde(default)]
    pub nodes_created: u64,
    #[serde(default)]
    pub nodes_deleted: u64,
    #[serde(default)]
    pub relationships_created: u64,
    #[serde(default)]
    pub relationships_deleted: u64,
    #[serde(default)]
    pub properties_set: u64,
    #[serde(default)]
    pub labels_added: u64,
}

impl WriteStats {
    /// Fold another submission's counters into this aggregate
    pub fn merge(&mut self, other: &WriteStats) {
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
    }
}

impl std::fmt::Display for WriteStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes created, {} relationships created, {} properties set, \
             {} labels added, {} nodes deleted, {} relationships deleted",
            self.nodes_created,
            self.relationships_created,
            self.properties_set,
            self.labels_added,
            self.nodes_deleted,
            self.relationships_deleted
        )
    }
}

/// Statement sink executing each submission as one transaction
pub trait CypherSink {
    fn submit(&self, script: &str) -> Result<WriteStats, ImportError>;
}

// ============================================================================
// HTTP SINK
// ============================================================================

/// Sink for a graph database transactional commit endpoint
/// (e.g. `http://localhost:7474/db/neo4j/tx/commit`)
pub struct HttpSink {
    client: reqwest::blocking::Client,
    url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl HttpSink {
    pub fn new(target: &TargetConfig) -> Result<Self, ImportError> {
        let url = Url::parse(&target.url).map_err(|e| {
            ImportError::Configuration(format!("invalid target url '{}': {e}", target.url))
        })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(SUBMIT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("graphload/0.1")
            .build()
            .map_err(|e| ImportError::Sink(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            username: target.username.clone(),
            password: target.password.clone(),
        })
    }
}

impl CypherSink for HttpSink {
    fn submit(&self, script: &str) -> Result<WriteStats, ImportError> {
        let body = json!({
            "statements": [{ "statement": script, "includeStats": true }]
        });

        let mut request = self.client.post(self.url.clone()).json(&body);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request
            .send()
            .map_err(|e| ImportError::Sink(format!("submission failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ImportError::Sink(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ImportError::Sink(format!(
                "store answered {status}: {text}"
            )));
        }

        parse_tx_response(&text)
    }
}

/// Parse a transactional endpoint response: surface the first reported
/// error, otherwise aggregate the per-statement write statistics.
fn parse_tx_response(body: &str) -> Result<WriteStats, ImportError> {
    #[derive(Deserialize)]
    struct TxResponse {
        #[serde(default)]
        results: Vec<TxResult>,
        #[serde(default)]
        errors: Vec<TxError>,
    }

    #[derive(Deserialize)]
    struct TxResult {
        stats: Option<WriteStats>,
    }

    #[derive(Deserialize)]
    struct TxError {
        #[serde(default)]
        code: String,
        #[serde(default)]
        message: String,
    }

    let response: TxResponse = serde_json::from_str(body)
        .map_err(|e| ImportError::Sink(format!("unparseable store response: {e}")))?;

    if let Some(error) = response.errors.first() {
        return Err(ImportError::Sink(format!(
            "{}: {}",
            error.code, error.message
        )));
    }

    let mut stats = WriteStats::default();
    for result in &response.results {
        if let Some(s) = &result.stats {
            stats.merge(s);
        }
    }
    Ok(stats)
}

// ============================================================================
// NULL / MOCK SINKS
// ============================================================================

/// Sink that accepts nothing. Backs debug runs, which render and
/// accumulate but never flush.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl CypherSink for NullSink {
    fn submit(&self, _script: &str) -> Result<WriteStats, ImportError> {
        Ok(WriteStats::default())
    }
}

/// Recording sink for tests: remembers every submission and can be
/// told to fail the nth one.
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    submissions: Arc<Mutex<Vec<String>>>,
    fail_on: Arc<Mutex<Option<usize>>>,
    stats_per_submit: WriteStats,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every submission will report these stats
    pub fn with_stats(mut self, stats: WriteStats) -> Self {
        self.stats_per_submit = stats;
        self
    }

    /// Fail the nth submission (1-based)
    pub fn fail_on(&self, n: usize) {
        *self.fail_on.lock() = Some(n);
    }

    /// Everything submitted so far, in order
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().clone()
    }
}

impl CypherSink for MockSink {
    fn submit(&self, script: &str) -> Result<WriteStats, ImportError> {
        let mut submissions = self.submissions.lock();
        let n = submissions.len() + 1;
        if *self.fail_on.lock() == Some(n) {
            return Err(ImportError::Sink(format!("mock sink failed submission #{n}")));
        }
        submissions.push(script.to_string());
        Ok(self.stats_per_submit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_merge() {
        let mut total = WriteStats {
            nodes_created: 1,
            properties_set: 2,
            ..Default::default()
        };
        total.merge(&WriteStats {
            nodes_created: 2,
            labels_added: 5,
            ..Default::default()
        });
        assert_eq!(total.nodes_created, 3);
        assert_eq!(total.properties_set, 2);
        assert_eq!(total.labels_added, 5);
    }

    #[test]
    fn parse_response_aggregates_stats() {
        let body = r#"{
            "results": [
                {"stats": {"nodes_created": 2, "properties_set": 4}},
                {"stats": {"nodes_created": 1, "labels_added": 3}}
            ],
            "errors": []
        }"#;
        let stats = parse_tx_response(body).unwrap();
        assert_eq!(stats.nodes_created, 3);
        assert_eq!(stats.properties_set, 4);
        assert_eq!(stats.labels_added, 3);
    }

    #[test]
    fn parse_response_surfaces_first_error() {
        let body = r#"{
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad query"}]
        }"#;
        let err = parse_tx_response(body).unwrap_err();
        assert!(matches!(err, ImportError::Sink(_)));
        assert!(err.to_string().contains("SyntaxError"));
        assert!(err.to_string().contains("bad query"));
    }

    #[test]
    fn parse_response_tolerates_missing_fields() {
        let stats = parse_tx_response(r#"{"results": [{"stats": null}]}"#).unwrap();
        assert_eq!(stats, WriteStats::default());
    }

    #[test]
    fn http_sink_rejects_bad_url() {
        let target = TargetConfig {
            url: "not a url".into(),
            username: None,
            password: None,
        };
        assert!(matches!(
            HttpSink::new(&target),
            Err(ImportError::Configuration(_))
        ));
    }

    #[test]
    fn mock_sink_records_and_fails_on_demand() {
        let sink = MockSink::new();
        sink.submit("A;").unwrap();
        sink.fail_on(2);
        assert!(sink.submit("B;").is_err());
        assert_eq!(sink.submissions(), vec!["A;"]);
    }
}
