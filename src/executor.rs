use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tracing::{debug, warn};

use crate::error::ProbeError;

/// Runs commands inside the cluster and reaches endpoints outside of the API server.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` in `namespace/pod/container` and return its stdout.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[&str],
    ) -> Result<String, ProbeError>;

    /// GET `url`, optionally with a bearer credential, and return the body.
    async fn http_get(&self, url: &str, bearer: Option<&str>) -> Result<String, ProbeError>;

    /// Run `script` in a short-lived pod and return its logs. The pod is removed afterwards.
    async fn run_ephemeral(
        &self,
        namespace: &str,
        name: &str,
        image: &str,
        script: &str,
    ) -> Result<String, ProbeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Outbound HTTP with retries on transport errors and 5xx responses.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(
        timeout: Duration,
        accept_invalid_certs: bool,
        retry: RetryPolicy,
    ) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| ProbeError::Http {
                url: String::new(),
                message: format!("build HTTP client: {}", e),
            })?;
        Ok(Self { client, retry })
    }

    pub async fn get(&self, url: &str, bearer: Option<&str>) -> Result<String, ProbeError> {
        let mut attempt = 0;
        let mut delay = self.retry.initial_delay;
        loop {
            attempt += 1;
            match self.get_once(url, bearer).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        "GET {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        url, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.retry.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str, bearer: Option<&str>) -> Result<String, ProbeError> {
        debug!("GET {}", url);
        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| ProbeError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|e| ProbeError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Scripted executor for tests. Unknown targets fail.
#[derive(Debug, Default)]
pub struct MockExecutor {
    exec_outputs: HashMap<String, Result<String, ProbeError>>,
    http_bodies: HashMap<String, Result<String, ProbeError>>,
    http_fallback: Option<Result<String, ProbeError>>,
    ephemeral_outputs: HashMap<String, Result<String, ProbeError>>,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn exec_key(namespace: &str, pod: &str, container: &str) -> String {
        format!("{}/{}/{}", namespace, pod, container)
    }

    pub fn with_exec(mut self, namespace: &str, pod: &str, container: &str, stdout: &str) -> Self {
        self.exec_outputs.insert(
            Self::exec_key(namespace, pod, container),
            Ok(stdout.to_string()),
        );
        self
    }

    pub fn with_exec_error(
        mut self,
        namespace: &str,
        pod: &str,
        container: &str,
        error: ProbeError,
    ) -> Self {
        self.exec_outputs
            .insert(Self::exec_key(namespace, pod, container), Err(error));
        self
    }

    pub fn with_http(mut self, url: &str, body: &str) -> Self {
        self.http_bodies.insert(url.to_string(), Ok(body.to_string()));
        self
    }

    pub fn with_http_error(mut self, url: &str, error: ProbeError) -> Self {
        self.http_bodies.insert(url.to_string(), Err(error));
        self
    }

    /// Body returned for any URL without an explicit entry.
    pub fn with_http_fallback(mut self, body: &str) -> Self {
        self.http_fallback = Some(Ok(body.to_string()));
        self
    }

    pub fn with_ephemeral(mut self, name: &str, logs: &str) -> Self {
        self.ephemeral_outputs
            .insert(name.to_string(), Ok(logs.to_string()));
        self
    }

    pub fn with_ephemeral_error(mut self, name: &str, error: ProbeError) -> Self {
        self.ephemeral_outputs.insert(name.to_string(), Err(error));
        self
    }

    /// Every call made so far, as `exec:<target>`, `get:<url>` or `run:<name>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn http_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("get:")).count()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        _command: &[&str],
    ) -> Result<String, ProbeError> {
        let key = Self::exec_key(namespace, pod, container);
        self.record(format!("exec:{}", key));
        self.exec_outputs
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(ProbeError::exec(key, "no such container")))
    }

    async fn http_get(&self, url: &str, _bearer: Option<&str>) -> Result<String, ProbeError> {
        self.record(format!("get:{}", url));
        match self.http_bodies.get(url).or(self.http_fallback.as_ref()) {
            Some(response) => response.clone(),
            None => Err(ProbeError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    async fn run_ephemeral(
        &self,
        namespace: &str,
        name: &str,
        _image: &str,
        _script: &str,
    ) -> Result<String, ProbeError> {
        self.record(format!("run:{}", name));
        self.ephemeral_outputs
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(ProbeError::exec(format!("{}/{}", namespace, name), "pod never ran")))
    }
}
