//! HTTP client for the remote authority.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` so a slow
//! authority never stalls the async runtime.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    CanTransitionRequest, RemoteAuthority, RemoteConfig, RemoteDecision, RemoteError,
    CAN_TRANSITION_PATH,
};
use crate::context::RequestContext;

/// Longest slice of an error body kept in [`RemoteError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Remote authority reached over HTTP with JSON bodies.
///
/// - `X-HOS-API-KEY` from `RemoteConfig::api_key`
/// - `X-Request-Id` from the request context
/// - each attempt bounded by `timeout_ms`, retried `retries` times
#[derive(Clone)]
pub struct HttpRemoteAuthority {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl HttpRemoteAuthority {
    pub fn new(config: RemoteConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(config.timeout_ms)))
            .http_status_as_error(false)
            .build();
        HttpRemoteAuthority {
            config,
            agent: ureq::Agent::new_with_config(agent_config),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// POST `payload` to `path` and return the JSON object body.
    pub async fn call(
        &self,
        path: &str,
        payload: Value,
        ctx: &RequestContext,
    ) -> Result<Value, RemoteError> {
        self.send(path, Some(payload), ctx).await
    }

    /// GET `path` and return the JSON object body.
    pub async fn get(&self, path: &str, ctx: &RequestContext) -> Result<Value, RemoteError> {
        self.send(path, None, ctx).await
    }

    async fn send(
        &self,
        path: &str,
        payload: Option<Value>,
        ctx: &RequestContext,
    ) -> Result<Value, RemoteError> {
        if !self.config.is_configured() {
            return Err(RemoteError::NotConfigured);
        }
        let url = join_url(&self.config.base_url, path);
        let agent = self.agent.clone();
        let config = self.config.clone();
        let request_id = ctx.request_id().map(str::to_string);

        tokio::task::spawn_blocking(move || {
            send_with_retries(&agent, &config, &url, payload.as_ref(), request_id.as_deref())
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("task join error: {e}")))?
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemoteAuthority {
    async fn decide(
        &self,
        request: &CanTransitionRequest,
        ctx: &RequestContext,
    ) -> Result<RemoteDecision, RemoteError> {
        let payload =
            serde_json::to_value(request).map_err(|e| RemoteError::InvalidBody(e.to_string()))?;
        let body = self.call(CAN_TRANSITION_PATH, payload, ctx).await?;
        serde_json::from_value(body).map_err(|e| RemoteError::InvalidBody(e.to_string()))
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Run attempts until one succeeds, retries are used up, or the next attempt
/// could not start inside `timeout × (retries + 1)`.
fn send_with_retries(
    agent: &ureq::Agent,
    config: &RemoteConfig,
    url: &str,
    payload: Option<&Value>,
    request_id: Option<&str>,
) -> Result<Value, RemoteError> {
    let started = Instant::now();
    let budget = config.total_budget();
    let delay = Duration::from_millis(config.retry_delay_ms);
    let mut attempt = 0u32;

    loop {
        match send_once(agent, config, url, payload, request_id) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.retries || started.elapsed() + delay >= budget {
                    return Err(err);
                }
                attempt += 1;
                tracing::debug!(url, attempt, error = %err, "retrying remote authority call");
                std::thread::sleep(delay);
            }
        }
    }
}

fn send_once(
    agent: &ureq::Agent,
    config: &RemoteConfig,
    url: &str,
    payload: Option<&Value>,
    request_id: Option<&str>,
) -> Result<Value, RemoteError> {
    let result = match payload {
        Some(body) => with_headers(agent.post(url), config, request_id).send_json(body),
        None => with_headers(agent.get(url), config, request_id).call(),
    };
    let response = result.map_err(|e| RemoteError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let text = response
        .into_body()
        .read_to_string()
        .map_err(|e| RemoteError::Transport(e.to_string()))?;

    if !(200..300).contains(&status) {
        return Err(RemoteError::Status {
            status,
            body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    let value: Value = serde_json::from_str(&text)
        .map_err(|e| RemoteError::InvalidBody(format!("response is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(RemoteError::InvalidBody(
            "response is not a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn with_headers<B>(
    request: ureq::RequestBuilder<B>,
    config: &RemoteConfig,
    request_id: Option<&str>,
) -> ureq::RequestBuilder<B> {
    let mut request = request.header("Accept", "application/json");
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        request = request.header("X-HOS-API-KEY", key);
    }
    if let Some(id) = request_id {
        request = request.header("X-Request-Id", id);
    }
    request
}
