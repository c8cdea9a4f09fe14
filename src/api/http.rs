use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{ApiError, OrderApi, OrderPage, OrderQuery, TargetStatus};
use crate::config::ApiConfig;
use crate::domain::{Order, OrderStatus, OrderType};

/// Response envelope used by every backend endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: u16,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Option<T>, ApiError> {
        if (200..300).contains(&self.code) {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected {
                code: self.code,
                message: self.message,
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderBody {
    order_type: OrderType,
}

#[derive(Serialize)]
struct UpdateStatusBody<'a> {
    order_no: &'a str,
    status: TargetStatus,
    signature: &'a str,
}

/// [`OrderApi`] over the backend's JSON REST endpoints.
#[derive(Clone)]
pub struct HttpOrderApi {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl std::fmt::Debug for HttpOrderApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOrderApi")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl HttpOrderApi {
    /// Builds a client with the configured timeout and bearer token.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = config.token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::Decode(format!("Invalid token format: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.timeout_ms,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout_ms)
            } else {
                ApiError::from(e)
            }
        })?;

        let http_status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => {
                debug!(code = envelope.code, "Backend responded");
                envelope.into_result()
            }
            Err(_) if !http_status.is_success() => {
                warn!(status = %http_status, "Backend returned a non-envelope error");
                Err(ApiError::Rejected {
                    code: http_status.as_u16(),
                    message: body.chars().take(200).collect(),
                })
            }
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }

    async fn execute_required<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        self.execute(request)
            .await?
            .ok_or_else(|| ApiError::Decode("Response carried no data".to_string()))
    }

    /// Lists the current user's orders.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, ApiError> {
        let request = self.client.get(self.url("/orders/orders/")).query(query);
        self.execute_required(request).await
    }

    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_no: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&format!("/orders/orders/{order_no}/")));
        self.execute::<serde_json::Value>(request).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    #[instrument(skip(self))]
    async fn create_order(&self, order_type: OrderType) -> Result<Order, ApiError> {
        let request = self
            .client
            .post(self.url("/orders/orders/"))
            .json(&CreateOrderBody { order_type });
        self.execute_required(request).await
    }

    #[instrument(skip(self))]
    async fn get_order_status(&self, order_no: &str) -> Result<Order, ApiError> {
        let request = self
            .client
            .get(self.url("/orders/orders/get_order/"))
            .query(&[("order_no", order_no)]);
        self.execute_required(request).await
    }

    #[instrument(skip(self, signature), fields(target = %OrderStatus::from(status)))]
    async fn update_order_status(
        &self,
        order_no: &str,
        status: TargetStatus,
        signature: &str,
    ) -> Result<Order, ApiError> {
        let request = self
            .client
            .post(self.url("/orders/orders/update_status/"))
            .json(&UpdateStatusBody {
                order_no,
                status,
                signature,
            });
        self.execute_required(request).await
    }
}
