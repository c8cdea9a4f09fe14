//! The order backend, as seen from the lifecycle manager.
//!
//! [`OrderApi`] is the seam: the manager only talks to the trait, the binary
//! wires in [`HttpOrderApi`], and tests use the channel-backed mock.

pub mod error;
pub mod http;

pub use error::*;
pub use http::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Order, OrderStatus, OrderType};

/// Statuses a client may ask the backend to move an order into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Scanned,
    Paid,
    Cancelled,
}

impl std::str::FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scanned" => Ok(Self::Scanned),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("Status {other} cannot be requested")),
        }
    }
}

impl From<TargetStatus> for OrderStatus {
    fn from(target: TargetStatus) -> Self {
        match target {
            TargetStatus::Scanned => OrderStatus::Scanned,
            TargetStatus::Paid => OrderStatus::Paid,
            TargetStatus::Cancelled => OrderStatus::Cancelled,
        }
    }
}

/// Query for the user's order history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
}

/// One page of the user's order history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderPage {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<Order>,
}

/// Operations the lifecycle manager needs from the order backend.
#[async_trait]
pub trait OrderApi: Send + Sync + 'static {
    /// Creates an order; the response carries `qr_code`, `signature` and
    /// `expire_time`.
    async fn create_order(&self, order_type: OrderType) -> Result<Order, ApiError>;

    async fn get_order_status(&self, order_no: &str) -> Result<Order, ApiError>;

    async fn update_order_status(
        &self,
        order_no: &str,
        status: TargetStatus,
        signature: &str,
    ) -> Result<Order, ApiError>;
}
