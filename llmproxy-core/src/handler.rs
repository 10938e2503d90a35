use tokio_util::sync::CancellationToken;

use crate::config::RoutingCfg;
use crate::error::ErrorClass;
use crate::model::{ChatCompletionRequest, ChatCompletionResponse, Usage};
use crate::registry::Registry;
use crate::router;

/// Terminal result of one dispatch attempt, consumed by the HTTP layer to
/// pick a status code and body.
pub enum HandlerOutcome {
    Success(ChatCompletionResponse),
    NoProvider,
    Upstream(String),
    BadRequest(String),
    Cancelled,
}

/// Parse-validate, route, and dispatch one chat completion request,
/// walking fallback candidates in order until one succeeds or the
/// candidate list (or fallback policy) is exhausted.
pub async fn dispatch(
    registry: &Registry,
    routing: &RoutingCfg,
    req: ChatCompletionRequest,
    cancel: CancellationToken,
    created_at: i64,
) -> HandlerOutcome {
    if let Err(msg) = req.validate() {
        return HandlerOutcome::BadRequest(msg);
    }

    let order = router::candidates(registry, routing.strategy);
    if order.is_empty() {
        return HandlerOutcome::NoProvider;
    }

    let attempts: &[usize] = if routing.fallback { &order } else { &order[..1] };
    let mut last_err: Option<String> = None;

    for &idx in attempts {
        if cancel.is_cancelled() {
            return HandlerOutcome::Cancelled;
        }
        let adapter = registry.entries()[idx].adapter.clone();
        registry.incr_in_flight(idx);
        let result = adapter.chat(cancel.clone(), &req.messages).await;
        registry.decr_in_flight(idx);

        match result {
            Ok(content) => {
                tracing::debug!(provider = adapter.name(), "dispatch attempt succeeded");
                let usage = Usage::approximate(&req.messages, &content);
                let resp = ChatCompletionResponse::new(req.model.clone(), content, usage, created_at);
                return HandlerOutcome::Success(resp);
            }
            Err(e) => match e.classify() {
                ErrorClass::Cancelled => {
                    tracing::debug!(provider = adapter.name(), "dispatch attempt cancelled");
                    return HandlerOutcome::Cancelled;
                }
                ErrorClass::Transient | ErrorClass::Permanent => {
                    let sanitized = e.sanitized_message();
                    tracing::warn!(provider = adapter.name(), error = %sanitized, "dispatch attempt failed");
                    last_err = Some(sanitized);
                }
            },
        }
    }

    tracing::error!(attempts = attempts.len(), "all dispatch attempts failed");
    HandlerOutcome::Upstream(last_err.unwrap_or_else(|| "no provider responded".to_string()))
}
