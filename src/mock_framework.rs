//! # Mock Framework
//!
//! Utilities for testing the lifecycle service without a backend.
//!
//! Use [`create_mock_api`] to get an [`OrderApi`] and a receiver.
//! Then use helpers like [`expect_create`] or [`expect_get_status`] to assert
//! each call and answer it whenever the test decides.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::api::{ApiError, OrderApi, TargetStatus};
use crate::domain::{Order, OrderType};

pub type Responder = oneshot::Sender<Result<Order, ApiError>>;

/// One call made against the mock backend.
#[derive(Debug)]
pub enum ApiCall {
    Create {
        order_type: OrderType,
        respond_to: Responder,
    },
    GetStatus {
        order_no: String,
        respond_to: Responder,
    },
    UpdateStatus {
        order_no: String,
        status: TargetStatus,
        signature: String,
        respond_to: Responder,
    },
}

/// Backend double that forwards every call to the test.
///
/// # Testing Strategy
/// The test holds the receiving end. Every call blocks until the test answers
/// through the responder, so the test decides ordering and timing of server
/// responses (late polls, cancel/pay races). Dropping a responder makes the
/// call fail like a broken connection.
pub struct MockOrderApi {
    sender: mpsc::UnboundedSender<ApiCall>,
}

pub fn create_mock_api() -> (Arc<MockOrderApi>, mpsc::UnboundedReceiver<ApiCall>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Arc::new(MockOrderApi { sender }), receiver)
}

impl MockOrderApi {
    async fn call(
        &self,
        build: impl FnOnce(Responder) -> ApiCall,
    ) -> Result<Order, ApiError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .map_err(|_| ApiError::Http("Mock receiver closed".to_string()))?;
        response
            .await
            .map_err(|_| ApiError::Http("Connection reset".to_string()))?
    }
}

#[async_trait]
impl OrderApi for MockOrderApi {
    async fn create_order(&self, order_type: OrderType) -> Result<Order, ApiError> {
        self.call(|respond_to| ApiCall::Create {
            order_type,
            respond_to,
        })
        .await
    }

    async fn get_order_status(&self, order_no: &str) -> Result<Order, ApiError> {
        let order_no = order_no.to_string();
        self.call(|respond_to| ApiCall::GetStatus {
            order_no,
            respond_to,
        })
        .await
    }

    async fn update_order_status(
        &self,
        order_no: &str,
        status: TargetStatus,
        signature: &str,
    ) -> Result<Order, ApiError> {
        let order_no = order_no.to_string();
        let signature = signature.to_string();
        self.call(|respond_to| ApiCall::UpdateStatus {
            order_no,
            status,
            signature,
            respond_to,
        })
        .await
    }
}

/// Helper to verify that the next call is an order creation
pub async fn expect_create(
    receiver: &mut mpsc::UnboundedReceiver<ApiCall>,
) -> Option<(OrderType, Responder)> {
    match receiver.recv().await {
        Some(ApiCall::Create {
            order_type,
            respond_to,
        }) => Some((order_type, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next call is a status check
pub async fn expect_get_status(
    receiver: &mut mpsc::UnboundedReceiver<ApiCall>,
) -> Option<(String, Responder)> {
    match receiver.recv().await {
        Some(ApiCall::GetStatus {
            order_no,
            respond_to,
        }) => Some((order_no, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next call is a status update
pub async fn expect_update_status(
    receiver: &mut mpsc::UnboundedReceiver<ApiCall>,
) -> Option<(String, TargetStatus, String, Responder)> {
    match receiver.recv().await {
        Some(ApiCall::UpdateStatus {
            order_no,
            status,
            signature,
            respond_to,
        }) => Some((order_no, status, signature, respond_to)),
        _ => None,
    }
}

/// Helper to verify that no call arrives within `window`
pub async fn expect_no_call(receiver: &mut mpsc::UnboundedReceiver<ApiCall>, window: Duration) -> bool {
    tokio::time::timeout(window, receiver.recv()).await.is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::fixtures::pending_order;
    use chrono::Utc;

    #[tokio::test]
    async fn test_mock_api() {
        let (api, mut receiver) = create_mock_api();

        let create_task = tokio::spawn(async move { api.create_order(OrderType::Yearly).await });

        let (order_type, responder) = expect_create(&mut receiver).await.expect("Expected Create call");
        assert_eq!(order_type, OrderType::Yearly);
        let order = pending_order("order_1", Utc::now());
        responder.send(Ok(order.clone())).unwrap();

        let result = create_task.await.unwrap();
        assert_eq!(result, Ok(order));
    }

    #[tokio::test]
    async fn test_dropped_responder_is_a_connection_error() {
        let (api, mut receiver) = create_mock_api();

        let status_task = tokio::spawn(async move { api.get_order_status("X").await });

        let (order_no, responder) = expect_get_status(&mut receiver).await.expect("Expected GetStatus call");
        assert_eq!(order_no, "X");
        drop(responder);

        let result = status_task.await.unwrap();
        assert!(matches!(result, Err(ref e) if e.is_transient()));
    }
}
