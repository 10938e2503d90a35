use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::AdapterError;

/// Request context carries tracing IDs threaded through to the span and,
/// where the adapter supports it, out as request headers.
#[derive(Clone, Copy, Default)]
pub struct RequestCtx<'a> {
    pub request_id: Option<&'a str>,
    pub turn_id: Option<&'a str>,
}

fn apply_ctx_headers(mut req: reqwest::RequestBuilder, ctx: &RequestCtx<'_>) -> reqwest::RequestBuilder {
    if let Some(rid) = ctx.request_id {
        req = req.header("X-Request-Id", rid);
    }
    if let Some(tid) = ctx.turn_id {
        req = req.header("X-Turn-Id", tid);
    }
    req
}

/// Thin wrapper around reqwest::Client carrying the provider's own timeout
/// and identifying itself by name for tracing.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> Result<Self, AdapterError> {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(60))
    }

    pub fn with_timeouts(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, AdapterError> {
        let inner = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| AdapterError::Request(format!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "llmproxy/0.1".to_string(),
        })
    }

    /// POST a JSON body, honoring `cancel` for prompt abandonment, and
    /// decode a JSON response.
    pub async fn post_json<T: Serialize + Sync, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
        ctx: &RequestCtx<'_>,
        cancel: &CancellationToken,
    ) -> Result<(R, Option<String>, u32), AdapterError> {
        let span = tracing::info_span!(
            "http.request",
            method = "POST",
            url = %url,
            request_id = %ctx.request_id.unwrap_or_default(),
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );
        async move {
            let start = Instant::now();
            let mut req = self
                .inner
                .post(url)
                .json(body)
                .header("User-Agent", &self.user_agent);
            for (k, v) in headers {
                req = req.header(*k, *v);
            }
            req = apply_ctx_headers(req, ctx);

            let resp = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
                r = req.send() => r.map_err(|e| classify_reqwest_err(&e))?,
            };

            let status = resp.status();
            tracing::Span::current().record("status", tracing::field::display(status.as_u16()));
            let headers = resp.headers().clone();
            let provider_request_id = extract_request_id(&headers);

            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                let latency = start.elapsed().as_millis() as u32;
                tracing::Span::current().record("latency_ms", latency);
                return Err(map_http_error(status, &text));
            }

            let parsed = resp
                .json::<R>()
                .await
                .map_err(|e| AdapterError::Malformed(format!("json decode error: {e}")))?;
            let latency = start.elapsed().as_millis() as u32;
            tracing::Span::current().record("latency_ms", latency);
            Ok((parsed, provider_request_id, latency))
        }
        .instrument(span)
        .await
    }

    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        ctx: &RequestCtx<'_>,
        cancel: &CancellationToken,
    ) -> Result<(R, Option<String>, u32), AdapterError> {
        let span = tracing::info_span!(
            "http.request",
            method = "GET",
            url = %url,
            request_id = %ctx.request_id.unwrap_or_default(),
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );
        async move {
            let start = Instant::now();
            let mut req = self.inner.get(url).header("User-Agent", &self.user_agent);
            for (k, v) in headers {
                req = req.header(*k, *v);
            }
            req = apply_ctx_headers(req, ctx);

            let resp = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
                r = req.send() => r.map_err(|e| classify_reqwest_err(&e))?,
            };

            let status = resp.status();
            tracing::Span::current().record("status", tracing::field::display(status.as_u16()));
            let headers = resp.headers().clone();
            let provider_request_id = extract_request_id(&headers);

            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                let latency = start.elapsed().as_millis() as u32;
                tracing::Span::current().record("latency_ms", latency);
                return Err(map_http_error(status, &text));
            }

            let parsed = resp
                .json::<R>()
                .await
                .map_err(|e| AdapterError::Malformed(format!("json decode error: {e}")))?;
            let latency = start.elapsed().as_millis() as u32;
            tracing::Span::current().record("latency_ms", latency);
            Ok((parsed, provider_request_id, latency))
        }
        .instrument(span)
        .await
    }
}

fn classify_reqwest_err(e: &reqwest::Error) -> AdapterError {
    if e.is_timeout() {
        AdapterError::Timeout
    } else {
        AdapterError::Request(e.to_string())
    }
}

fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    static CANDIDATES: [&str; 5] = [
        "x-request-id",
        "request-id",
        "x-amzn-requestid",
        "x-amz-request-id",
        "x-cdn-request-id",
    ];
    for k in CANDIDATES {
        if let Some(v) = headers.get(k)
            && let Ok(s) = v.to_str()
        {
            return Some(s.to_string());
        }
    }
    None
}

fn map_http_error(status: StatusCode, body: &str) -> AdapterError {
    AdapterError::Http {
        status: status.as_u16(),
        message: truncate(body, 300),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut t = s[..max].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}
