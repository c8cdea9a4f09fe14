use tokio::sync::oneshot;

use super::error::LifecycleError;
use super::poller::PollTicket;
use crate::api::ApiError;
use crate::domain::{Order, OrderType};

pub type ServiceResult<T> = std::result::Result<T, LifecycleError>;
pub type ServiceResponse<T> = oneshot::Sender<ServiceResult<T>>;

/// Everything the lifecycle service reacts to, in arrival order.
///
/// The first group comes from [`LifecycleClient`](super::LifecycleClient).
/// The second group is posted back by the network calls the service spawns.
#[derive(Debug)]
pub enum LifecycleRequest {
    StartOrder {
        order_type: OrderType,
        respond_to: ServiceResponse<Order>,
    },
    BeginPolling {
        respond_to: ServiceResponse<()>,
    },
    StopPolling {
        respond_to: ServiceResponse<()>,
    },
    RequestCancellation {
        respond_to: ServiceResponse<()>,
    },
    CurrentSnapshot {
        respond_to: ServiceResponse<Option<Order>>,
    },
    Clear {
        respond_to: ServiceResponse<()>,
    },
    Shutdown,
    #[cfg(test)]
    UpdateCount {
        respond_to: ServiceResponse<u64>,
    },

    Created {
        result: Result<Order, ApiError>,
        respond_to: ServiceResponse<Order>,
    },
    /// A poll tick fired, whether or not a status call is still in flight.
    Tick {
        ticket: PollTicket,
    },
    Polled {
        ticket: PollTicket,
        result: Result<Order, ApiError>,
    },
    /// `refreshed` is the status fetched after the server rejected the
    /// cancellation; `None` when no refresh was attempted.
    CancelAnswered {
        order_no: String,
        result: Result<Order, ApiError>,
        refreshed: Option<Result<Order, ApiError>>,
        respond_to: ServiceResponse<()>,
    },
}
