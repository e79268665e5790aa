//! The authenticated request pipeline.
//!
//! One logical call runs through these steps, in order, per attempt:
//!
//! 1. fresh [`RequestContext`]
//! 2. headers: content type, request id/time, API version, platform, and
//!    the bearer token read from storage (falling back to the in-memory
//!    session when storage is unavailable), merged with caller headers
//! 3. dispatch bounded by the configured timeout
//! 4. 401: end the session, fail with [`ApiError::Unauthorized`], no retry
//! 5. 5xx with retries left: wait `retry_delay * (retry + 1)` and go again
//! 6. other non-2xx: [`ApiError::Http`]
//! 7. decode the JSON body

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::request::{backoff_delay, may_retry, RequestContext, RequestOptions};
use super::ApiError;
use crate::auth::SessionManager;
use crate::config::{ClientPlatform, Config, RetryPolicy};

/// Value of the `X-API-Version` header
const API_VERSION: &str = "1";

const REQUEST_ID_HEADER: &str = "x-request-id";
const REQUEST_TIME_HEADER: &str = "x-request-time";
const API_VERSION_HEADER: &str = "x-api-version";
const PLATFORM_HEADER: &str = "x-client-platform";
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Request pipeline for every call except login.
/// Clone is cheap - reqwest::Client and the session are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    retry_policy: RetryPolicy,
    platform: ClientPlatform,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<SessionManager>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: config.base_url()?,
            timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            retry_policy: config.retry_policy,
            platform: config.platform,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    // ===== Verbs =====

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(Method::GET, endpoint, None, RequestOptions::default())
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, endpoint, Some(to_body(body)?), RequestOptions::default())
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, endpoint, Some(to_body(body)?), RequestOptions::default())
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PATCH, endpoint, Some(to_body(body)?), RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, endpoint, None, RequestOptions::default())
            .await
    }

    /// One logical call, retries included.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let result = self.execute(&method, endpoint, body.as_ref(), &options).await;
        if let Err(ref e) = result {
            error!(method = %method, endpoint, error = %e, "API request failed");
        }
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let url = self.url_for(endpoint)?;
        let extra_headers = options.extra_headers()?;
        let mut retry_count = 0;

        loop {
            let ctx = RequestContext::new(retry_count);
            let headers = self.security_headers(&ctx, extra_headers.clone(), options).await?;

            let started = Instant::now();
            let (status, text) = self
                .dispatch(method, &url, headers, body, &options.query)
                .await?;
            debug!(
                method = %method,
                endpoint,
                status = status.as_u16(),
                duration_ms = started.elapsed().as_millis() as u64,
                request_id = %ctx.request_id,
                retry = retry_count,
                "API request completed"
            );

            if status == StatusCode::UNAUTHORIZED {
                self.session.force_invalidate().await;
                return Err(ApiError::Unauthorized);
            }

            if status.is_server_error()
                && retry_count < self.max_retries
                && may_retry(self.retry_policy, method, options)
            {
                let delay = backoff_delay(self.retry_delay, retry_count);
                warn!(
                    method = %method,
                    endpoint,
                    status = status.as_u16(),
                    retry = retry_count + 1,
                    max_retries = self.max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    "Server error, retrying"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(ApiError::from_status(status, &text));
            }

            return decode(&text);
        }
    }

    /// Send one attempt and read its body, all within the timeout.
    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        headers: HeaderMap,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<(StatusCode, String), ApiError> {
        let mut builder = self.client.request(method.clone(), url).headers(headers);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }

        let attempt = async {
            let response = builder.send().await.map_err(ApiError::from_transport)?;
            let status = response.status();
            let text = response.text().await.map_err(ApiError::from_transport)?;
            Ok::<_, ApiError>((status, text))
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        }
    }

    /// Caller headers go in first so the fixed headers overwrite them;
    /// only `Content-Type` may be overridden.
    async fn security_headers(
        &self,
        ctx: &RequestContext,
        extra: HeaderMap,
        options: &RequestOptions,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in extra.iter() {
            if name == header::CONTENT_TYPE {
                headers.insert(header::CONTENT_TYPE, value.clone());
            } else {
                headers.append(name.clone(), value.clone());
            }
        }

        headers.insert(REQUEST_ID_HEADER, header_value(&ctx.request_id.to_string())?);
        headers.insert(REQUEST_TIME_HEADER, header_value(&ctx.issued_at_header())?);
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
        headers.insert(PLATFORM_HEADER, HeaderValue::from_static(self.platform.as_str()));

        match self.session.access_token().await {
            Some(token) => {
                let mut value = header_value(&format!("Bearer {}", token.expose()))?;
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
            None => {
                headers.remove(header::AUTHORIZATION);
            }
        }

        if let Some(ref key) = options.idempotency_key {
            headers.insert(IDEMPOTENCY_KEY_HEADER, header_value(key)?);
        }
        Ok(headers)
    }

    fn url_for(&self, endpoint: &str) -> Result<String, ApiError> {
        let path = endpoint.split(['?', '#']).next().unwrap_or_default();
        if !path.starts_with('/') || path.starts_with("//") || path.contains("://") {
            return Err(ApiError::Validation(format!(
                "Endpoint must be a path relative to the base URL: {}",
                endpoint
            )));
        }
        Ok(format!("{}{}", self.base_url, endpoint))
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::Validation(format!("Invalid header value: {}", value)))
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::Validation(format!("Failed to serialize request body: {}", e)))
}

/// Empty bodies decode as JSON `null` so `()` and `Option<T>` work for 204s.
fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
}
