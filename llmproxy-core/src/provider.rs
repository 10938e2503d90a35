use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;
use crate::model::Message;

/// Uniform capability every provider adapter must satisfy: a blocking chat
/// call and a lightweight reachability probe. Deliberately flat — no shared
/// base struct, no inheritance between adapter kinds.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> &str;

    /// Produce a complete assistant reply for `messages`. Must return
    /// promptly with `AdapterError::Cancelled` once `cancel` fires, even if
    /// the backend call is still outstanding.
    async fn chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
    ) -> Result<String, AdapterError>;

    /// Lightweight reachability check, bounded by `timeout`. Must never
    /// panic; any failure is reported as `false`.
    async fn probe(&self, timeout: std::time::Duration) -> bool;
}

/// Deterministic stub adapter used by tests and as the bootstrap "always
/// present" entry in the registry. Never calls out over the network.
pub struct StubAdapter {
    name: String,
}

impl StubAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        StubAdapter { name: name.into() }
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "stub"
    }

    async fn chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
    ) -> Result<String, AdapterError> {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("stub reply to: {last}"))
    }

    async fn probe(&self, _timeout: std::time::Duration) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_adapter_is_deterministic() {
        let adapter = StubAdapter::new("stub-1");
        let messages = vec![Message { role: "user".into(), content: "hi".into() }];
        let cancel = CancellationToken::new();
        let r1 = adapter.chat(cancel.clone(), &messages).await.unwrap();
        let r2 = adapter.chat(cancel, &messages).await.unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1, "stub reply to: hi");
    }

    #[tokio::test]
    async fn stub_adapter_respects_cancellation() {
        let adapter = StubAdapter::new("stub-1");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let messages = vec![Message { role: "user".into(), content: "hi".into() }];
        let err = adapter.chat(cancel, &messages).await.unwrap_err();
        assert_eq!(err.classify(), crate::error::ErrorClass::Cancelled);
    }

    #[tokio::test]
    async fn stub_adapter_probe_always_healthy() {
        let adapter = StubAdapter::new("stub-1");
        assert!(adapter.probe(std::time::Duration::from_secs(1)).await);
    }
}
