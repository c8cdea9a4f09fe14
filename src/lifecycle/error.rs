use thiserror::Error;

use crate::api::ApiError;
use crate::domain::OrderStatus;

/// Errors surfaced to the presentation layer by the lifecycle manager.
///
/// Poll failures never show up here; they are absorbed and polling continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    #[error("Order creation failed: {0}")]
    Creation(ApiError),
    #[error("Cancellation rejected, order is {status}")]
    CancellationRejected { status: OrderStatus },
    #[error("Cancellation request failed: {0}")]
    Cancellation(ApiError),
    #[error("No active order")]
    NoActiveOrder,
    #[error("An order is already being created")]
    CreationInProgress,
    #[error("Order is already {status}")]
    AlreadyTerminal { status: OrderStatus },
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}
