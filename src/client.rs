//! Query service abstraction
//!
//! [`QueryService`] is how the pipeline talks to the remote query backend.
//! [`LookerClient`] is the production implementation over the Looker REST
//! API; [`MockQueryService`] returns configurable looks and results without
//! making real API calls, with call counters so deduplication is
//! observable in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::LookerConfig;
use crate::query::{Look, QueryRequest, WriteQuery};

/// Per-request timeout (bounded; a hung remote call nulls one group only)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw result of one executed query
#[derive(Debug, Clone)]
pub enum RawResult {
    /// `json_bi` payload: field metadata plus rows
    Tabular(Value),
    /// Rendered image bytes (png/jpg result formats)
    Binary(Vec<u8>),
}

impl RawResult {
    pub fn as_tabular(&self) -> Option<&Value> {
        match self {
            RawResult::Tabular(v) => Some(v),
            RawResult::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            RawResult::Binary(b) => Some(b),
            RawResult::Tabular(_) => None,
        }
    }
}

/// Core trait the pipeline depends on to resolve and execute queries
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Service name for logging (e.g. "looker", "mock")
    fn name(&self) -> &str;

    /// Fetch an upstream look and its base query
    async fn look(&self, id: &str) -> Result<Look>;

    /// Execute one resolved query
    async fn run_query(&self, request: &QueryRequest) -> Result<RawResult>;

    /// Download bytes from a result-derived URL (image bindings)
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Looker REST client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

/// Production client for the Looker 4.0 REST API
pub struct LookerClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl LookerClient {
    /// Authenticate with client credentials and return a ready client.
    ///
    /// The session token lives as long as the run; there is no refresh.
    pub async fn connect(config: &LookerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("lookdeck/0.1")
            .build()
            .context("failed to build HTTP client")?;

        let login_url = config
            .base_url
            .join("api/4.0/login")
            .context("invalid base URL")?;
        let response = http
            .post(login_url)
            .form(&[
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
            ])
            .send()
            .await
            .context("Looker login request failed")?;

        if !response.status().is_success() {
            bail!("Looker login rejected: {}", response.status());
        }
        let token: AccessToken = response
            .json()
            .await
            .context("Looker login returned an unexpected payload")?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            token: token.access_token,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
    }
}

#[async_trait]
impl QueryService for LookerClient {
    fn name(&self) -> &str {
        "looker"
    }

    #[instrument(skip(self))]
    async fn look(&self, id: &str) -> Result<Look> {
        let url = self.base_url.join(&format!("api/4.0/looks/{id}"))?;
        let response = self
            .authed(self.http.get(url))
            .send()
            .await
            .with_context(|| format!("fetching look {id}"))?;
        if !response.status().is_success() {
            bail!("look {id} not resolvable: {}", response.status());
        }

        // The wire id is numeric; everything downstream keys on strings.
        let wire: Value = response.json().await?;
        let query: WriteQuery = serde_json::from_value(
            wire.get("query")
                .cloned()
                .ok_or_else(|| anyhow!("look {id} has no query"))?,
        )
        .with_context(|| format!("look {id}: malformed base query"))?;

        Ok(Look {
            id: id.to_string(),
            title: wire
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string),
            query,
        })
    }

    #[instrument(skip(self, request), fields(result_format = %request.result_format))]
    async fn run_query(&self, request: &QueryRequest) -> Result<RawResult> {
        let url = self
            .base_url
            .join(&format!("api/4.0/queries/run/{}", request.result_format))?;

        let mut params: Vec<(&str, String)> = vec![
            ("apply_formatting", request.apply_formatting.to_string()),
            ("apply_vis", request.apply_vis.to_string()),
            ("server_table_calcs", request.server_table_calcs.to_string()),
        ];
        if let Some(w) = request.image_width {
            params.push(("image_width", w.to_string()));
        }
        if let Some(h) = request.image_height {
            params.push(("image_height", h.to_string()));
        }

        let response = self
            .authed(self.http.post(url).query(&params).json(&request.body))
            .send()
            .await
            .context("query execution request failed")?;
        if !response.status().is_success() {
            bail!("query execution rejected: {}", response.status());
        }

        if request.result_format.eq_ignore_ascii_case("json_bi") {
            let payload: Value = response.json().await.context("malformed json_bi payload")?;
            Ok(RawResult::Tabular(payload))
        } else {
            let bytes = response.bytes().await?;
            Ok(RawResult::Binary(bytes.to_vec()))
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).with_context(|| format!("result slice '{url}' is not a URL"))?;
        let response = self
            .authed(self.http.get(parsed))
            .send()
            .await
            .with_context(|| format!("downloading {url}"))?;
        if !response.status().is_success() {
            bail!("download of {url} rejected: {}", response.status());
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Mock service for tests
// ---------------------------------------------------------------------------

/// Mock query service with configurable looks, results and failures
#[derive(Default)]
pub struct MockQueryService {
    looks: HashMap<String, Look>,
    /// Results keyed by the query body's view
    results: HashMap<String, RawResult>,
    /// Views whose execution should fail
    failing_views: Mutex<Vec<String>>,
    /// Image bytes keyed by URL
    images: HashMap<String, Vec<u8>>,
    /// Total run_query calls (for dedup assertions)
    run_calls: AtomicUsize,
    /// Every executed request, in execution order (for assertions)
    executed: Mutex<Vec<QueryRequest>>,
}

impl MockQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_look(mut self, look: Look) -> Self {
        self.looks.insert(look.id.clone(), look);
        self
    }

    pub fn with_result(mut self, view: impl Into<String>, result: RawResult) -> Self {
        self.results.insert(view.into(), result);
        self
    }

    /// Make execution fail for every query against the given view
    pub fn with_failing_view(self, view: impl Into<String>) -> Self {
        self.failing_views.lock().unwrap().push(view.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.images.insert(url.into(), bytes);
        self
    }

    /// How many queries were actually executed
    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    /// Every executed request, in execution order
    pub fn executed_requests(&self) -> Vec<QueryRequest> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn look(&self, id: &str) -> Result<Look> {
        self.looks
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("look {id} not found"))
    }

    async fn run_query(&self, request: &QueryRequest) -> Result<RawResult> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(request.clone());
        let view = &request.body.view;
        debug!("mock executing query against view {view}");

        if self.failing_views.lock().unwrap().iter().any(|v| v == view) {
            bail!("simulated execution failure for view {view}");
        }
        self.results
            .get(view)
            .cloned()
            .ok_or_else(|| anyhow!("no mock result for view {view}"))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no mock image for {url}"))
    }
}
