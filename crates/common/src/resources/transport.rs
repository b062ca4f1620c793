//! HTTP transport to the external resource service
//!
//! Adapters talk to providers only through [`ResourceTransport`], so the
//! reqwest client can be swapped for the in-memory [`MockTransport`].

use crate::config::ProvidersConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// A single GET against a provider endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl ProviderRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Successful (2xx) provider response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub content_type: Option<String>,
    pub body: String,
}

impl ProviderResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: Some("text/markdown; charset=utf-8".to_string()),
            body: body.into(),
        }
    }
}

/// Trait for provider HTTP access
#[async_trait]
pub trait ResourceTransport: Send + Sync {
    /// Issue a GET; non-2xx statuses are returned as `AppError::Upstream`
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Cheap reachability check used by the readiness endpoint
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport; the timeout applies to every provider call
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

#[async_trait]
impl ResourceTransport for HttpTransport {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let url = self.url(&request.endpoint);
        debug!(url = %url, params = ?request.params, "Provider request");

        let response = self.client.get(&url).query(&request.params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                status: status.as_u16(),
                endpoint: request.endpoint.clone(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await?;

        Ok(ProviderResponse { content_type, body })
    }

    async fn ping(&self) -> Result<()> {
        // Any HTTP answer means the service is reachable
        self.client.get(&self.base_url).send().await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Respond(ProviderResponse),
    Status(u16),
    Malformed,
}

#[derive(Debug, Clone)]
struct MockRoute {
    endpoint: String,
    expect: Vec<(String, String)>,
    reply: MockReply,
}

impl MockRoute {
    fn matches(&self, request: &ProviderRequest) -> bool {
        self.endpoint == request.endpoint
            && self
                .expect
                .iter()
                .all(|(name, value)| request.get_param(name) == Some(value.as_str()))
    }
}

/// In-memory transport for tests and local development
///
/// Routes are matched in registration order on endpoint plus any expected
/// parameters; unmatched requests answer 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<MockRoute>>,
    calls: Mutex<Vec<ProviderRequest>>,
    latency: Option<Duration>,
    unreachable: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, for cancellation tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every reachability check
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    fn route(self, endpoint: &str, expect: &[(&str, &str)], reply: MockReply) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(MockRoute {
                endpoint: endpoint.to_string(),
                expect: expect
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                reply,
            });
        }
        self
    }

    pub fn respond_json(
        self,
        endpoint: &str,
        expect: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Self {
        let reply = MockReply::Respond(ProviderResponse::json(body.to_string()));
        self.route(endpoint, expect, reply)
    }

    pub fn respond_text(self, endpoint: &str, expect: &[(&str, &str)], body: &str) -> Self {
        self.route(endpoint, expect, MockReply::Respond(ProviderResponse::text(body)))
    }

    pub fn respond_status(self, endpoint: &str, expect: &[(&str, &str)], status: u16) -> Self {
        self.route(endpoint, expect, MockReply::Status(status))
    }

    /// Reply with a JSON content type and a body that does not parse
    pub fn respond_malformed(self, endpoint: &str, expect: &[(&str, &str)]) -> Self {
        self.route(endpoint, expect, MockReply::Malformed)
    }

    /// Every request received so far, in arrival order
    pub fn calls(&self) -> Vec<ProviderRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<ProviderRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.endpoint == endpoint)
            .collect()
    }
}

#[async_trait]
impl ResourceTransport for MockTransport {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self.routes.lock().ok().and_then(|routes| {
            routes
                .iter()
                .find(|r| r.matches(request))
                .map(|r| r.reply.clone())
        });

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Malformed) => Ok(ProviderResponse::json("{\"matches\": [")),
            Some(MockReply::Status(status)) => Err(AppError::Upstream {
                status,
                endpoint: request.endpoint.clone(),
            }),
            None => Err(AppError::Upstream {
                status: 404,
                endpoint: request.endpoint.clone(),
            }),
        }
    }

    async fn ping(&self) -> Result<()> {
        if self.unreachable {
            return Err(AppError::Upstream {
                status: 503,
                endpoint: "/".to_string(),
            });
        }
        Ok(())
    }
}
