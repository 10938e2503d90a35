use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;
use crate::http_client::{HttpClient, RequestCtx};
use crate::model::Message;
use crate::provider::ProviderAdapter;

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Adapter for a hosted, API-key-gated model service reached over a
/// request/response REST endpoint rather than a long-lived SDK client.
/// This is the adapter kind the factory must accept and fully wire up even
/// though it shipped disabled upstream (see the factory's doc comment).
pub struct HostedApiAdapter {
    http: HttpClient,
    name: String,
    base: String,
    model: String,
    api_key: SecretString,
}

impl HostedApiAdapter {
    pub fn new(
        name: impl Into<String>,
        api_key: SecretString,
        base: Option<String>,
        model: Option<String>,
    ) -> Result<Self, AdapterError> {
        let http = HttpClient::with_timeouts(
            std::time::Duration::from_secs(5),
            std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )?;
        Ok(Self {
            http,
            name: name.into(),
            base: base.unwrap_or_else(|| DEFAULT_BASE.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
        })
    }

    #[cfg(test)]
    pub fn new_for_tests(name: impl Into<String>, server_base: &str) -> Self {
        HostedApiAdapter {
            http: HttpClient::new_default().unwrap(),
            name: name.into(),
            base: server_base.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: SecretString::from("test-key".to_string()),
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("x-goog-api-key".to_string(), self.api_key.expose_secret().to_string()),
        ]
    }
}

/// This wire format has no explicit system role; a system message is
/// prepended to the first user turn instead.
fn to_contents(messages: &[Message]) -> Vec<HostedContent> {
    let mut system_prefix = String::new();
    let mut turns = Vec::with_capacity(messages.len());
    for m in messages {
        if m.role == "system" {
            if !system_prefix.is_empty() {
                system_prefix.push_str("\n\n");
            }
            system_prefix.push_str(&m.content);
            continue;
        }
        let role = if m.role == "assistant" { "model" } else { "user" };
        turns.push((role, m.content.clone()));
    }
    if let Some(first) = turns.first_mut() {
        if !system_prefix.is_empty() {
            first.1 = format!("{system_prefix}\n\n{}", first.1);
        }
    } else if !system_prefix.is_empty() {
        turns.push(("user", system_prefix));
    }
    turns
        .into_iter()
        .map(|(role, text)| HostedContent {
            role: role.to_string(),
            parts: vec![HostedPart { text }],
        })
        .collect()
}

#[derive(Serialize)]
struct HostedReq {
    contents: Vec<HostedContent>,
}

#[derive(Serialize, Deserialize)]
struct HostedContent {
    role: String,
    parts: Vec<HostedPart>,
}

#[derive(Serialize, Deserialize)]
struct HostedPart {
    text: String,
}

#[derive(Deserialize)]
struct HostedResp {
    #[serde(default)]
    candidates: Vec<HostedCandidate>,
}

#[derive(Deserialize)]
struct HostedCandidate {
    content: HostedContent,
}

#[async_trait]
impl ProviderAdapter for HostedApiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "hosted"
    }

    async fn chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
    ) -> Result<String, AdapterError> {
        let payload = HostedReq { contents: to_contents(messages) };
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let url = format!("{}/models/{}:generateContent", self.base, self.model);
        let ctx = RequestCtx::default();
        let (resp, _provider_id, _latency) = self
            .http
            .post_json::<_, HostedResp>(&url, &payload, &hdrs, &ctx, &cancel)
            .await?;

        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Malformed("no candidates in response".into()))?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        if text.is_empty() {
            return Err(AdapterError::Malformed("no content in response".into()));
        }
        Ok(text)
    }

    async fn probe(&self, timeout: std::time::Duration) -> bool {
        let cancel = CancellationToken::new();
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let url = format!("{}/models/{}", self.base, self.model);
        let ctx = RequestCtx::default();
        let result = tokio::time::timeout(
            timeout,
            self.http.get_json::<serde_json::Value>(&url, &hdrs, &ctx, &cancel),
        )
        .await;
        matches!(result, Ok(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn chat_extracts_text_from_first_candidate() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path(format!("/models/{DEFAULT_MODEL}:generateContent"));
            then.status(200).json_body(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "hi there"}]}}]
            }));
        });
        let adapter = HostedApiAdapter::new_for_tests("hosted-1", &server.base_url());
        let messages = vec![Message { role: "user".into(), content: "hello".into() }];
        let out = adapter.chat(CancellationToken::new(), &messages).await.unwrap();
        assert_eq!(out, "hi there");
    }

    #[tokio::test]
    async fn chat_maps_empty_candidates_to_malformed() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path(format!("/models/{DEFAULT_MODEL}:generateContent"));
            then.status(200).json_body(json!({"candidates": []}));
        });
        let adapter = HostedApiAdapter::new_for_tests("hosted-1", &server.base_url());
        let messages = vec![Message { role: "user".into(), content: "hello".into() }];
        let err = adapter.chat(CancellationToken::new(), &messages).await.unwrap_err();
        assert_eq!(err.classify(), crate::error::ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn chat_maps_429_to_transient() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path(format!("/models/{DEFAULT_MODEL}:generateContent"));
            then.status(429).body("rate limited");
        });
        let adapter = HostedApiAdapter::new_for_tests("hosted-1", &server.base_url());
        let messages = vec![Message { role: "user".into(), content: "hello".into() }];
        let err = adapter.chat(CancellationToken::new(), &messages).await.unwrap_err();
        assert_eq!(err.classify(), crate::error::ErrorClass::Transient);
    }

    #[test]
    fn system_message_is_prepended_to_first_user_turn() {
        let messages = vec![
            Message { role: "system".into(), content: "be terse".into() },
            Message { role: "user".into(), content: "hi".into() },
        ];
        let contents = to_contents(&messages);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].role, "user");
        assert!(contents[0].parts[0].text.contains("be terse"));
        assert!(contents[0].parts[0].text.contains("hi"));
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let messages = vec![
            Message { role: "user".into(), content: "hi".into() },
            Message { role: "assistant".into(), content: "hello".into() },
        ];
        let contents = to_contents(&messages);
        assert_eq!(contents[1].role, "model");
    }

    #[tokio::test]
    async fn probe_true_when_reachable() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path(format!("/models/{DEFAULT_MODEL}"));
            then.status(200).json_body(json!({"name": DEFAULT_MODEL}));
        });
        let adapter = HostedApiAdapter::new_for_tests("hosted-1", &server.base_url());
        assert!(adapter.probe(std::time::Duration::from_secs(2)).await);
    }
}
