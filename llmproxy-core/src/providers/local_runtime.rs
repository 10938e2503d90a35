use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;
use crate::http_client::{HttpClient, RequestCtx};
use crate::model::Message;
use crate::provider::ProviderAdapter;

/// Default host for a locally-reachable model runtime, mirroring the
/// upstream runtime's own default of a managed cloud endpoint rather than
/// `localhost`, so an unconfigured adapter still has somewhere to talk to.
const DEFAULT_HOST: &str = "https://ollama.com";
const DEFAULT_MODEL: &str = "glm-4.6:cloud";
/// Chat responses from a local runtime can take a while; give it more
/// headroom than the hosted-API kind.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Adapter for a chat-capable local model runtime exposing a single
/// `/api/chat` endpoint. The bearer token is optional: many local runtimes
/// run unauthenticated.
pub struct LocalRuntimeAdapter {
    http: HttpClient,
    name: String,
    host: String,
    model: String,
    api_key: Option<String>,
}

impl LocalRuntimeAdapter {
    pub fn new(name: impl Into<String>, host: Option<String>, model: Option<String>, api_key: Option<String>) -> Result<Self, AdapterError> {
        let http = HttpClient::with_timeouts(
            std::time::Duration::from_secs(5),
            std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )?;
        Ok(Self {
            http,
            name: name.into(),
            host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
        })
    }

    #[cfg(test)]
    pub fn new_for_tests(name: impl Into<String>, server_base: &str) -> Self {
        LocalRuntimeAdapter {
            http: HttpClient::new_default().unwrap(),
            name: name.into(),
            host: server_base.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut h = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(key) = &self.api_key {
            h.push(("Authorization".to_string(), format!("Bearer {key}")));
        }
        h
    }
}

#[derive(Serialize)]
struct RuntimeChatReq<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct RuntimeChatResp {
    message: RuntimeMessage,
}

#[derive(Deserialize)]
struct RuntimeMessage {
    content: String,
}

#[async_trait]
impl ProviderAdapter for LocalRuntimeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "local"
    }

    async fn chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
    ) -> Result<String, AdapterError> {
        let payload = RuntimeChatReq {
            model: &self.model,
            messages,
            stream: false,
        };
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let url = format!("{}/api/chat", self.host);
        let ctx = RequestCtx::default();
        let (resp, _provider_id, _latency) = self
            .http
            .post_json::<_, RuntimeChatResp>(&url, &payload, &hdrs, &ctx, &cancel)
            .await?;
        Ok(resp.message.content)
    }

    async fn probe(&self, timeout: std::time::Duration) -> bool {
        let cancel = CancellationToken::new();
        let url = format!("{}/api/tags", self.host);
        let ctx = RequestCtx::default();
        let result = tokio::time::timeout(
            timeout,
            self.http.get_json::<serde_json::Value>(&url, &[], &ctx, &cancel),
        )
        .await;
        matches!(result, Ok(Ok(_)))
    }
}
