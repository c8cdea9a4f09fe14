use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, Instrument};

use super::messages::LifecycleRequest;
use crate::api::{ApiError, OrderApi};
use crate::domain::Order;

type StatusCall = Pin<Box<dyn Future<Output = Result<Order, ApiError>> + Send>>;

/// Identifies which order and which polling run a status response belongs to.
///
/// The epoch changes every time polling is stopped or restarted, so a response
/// dispatched under an old run can be recognised on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub order_no: String,
    pub epoch: u64,
}

/// Handle to a running status poller.
///
/// Cancelling (or dropping) the handle aborts the task; no tick fires after
/// that. A response that was already queued keeps its old ticket and is
/// discarded by the service.
#[derive(Debug)]
pub struct PollHandle {
    ticket: PollTicket,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn spawn(
        api: Arc<dyn OrderApi>,
        ticket: PollTicket,
        interval: Duration,
        request_timeout: Duration,
        mailbox: mpsc::WeakSender<LifecycleRequest>,
    ) -> Self {
        let span = tracing::debug_span!("status_poller", order_no = %ticket.order_no, epoch = ticket.epoch);
        let task = tokio::spawn(
            poll_loop(api, ticket.clone(), interval, request_timeout, mailbox).instrument(span),
        );
        Self { ticket, task }
    }

    pub fn ticket(&self) -> &PollTicket {
        &self.ticket
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Every tick is reported to the service so the deadline is enforced even
/// while a status call hangs. At most one status call is in flight; ticks that
/// fire meanwhile do not start another.
async fn poll_loop(
    api: Arc<dyn OrderApi>,
    ticket: PollTicket,
    interval: Duration,
    request_timeout: Duration,
    mailbox: mpsc::WeakSender<LifecycleRequest>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: Option<StatusCall> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let tick = LifecycleRequest::Tick { ticket: ticket.clone() };
                if !post(&mailbox, tick).await {
                    break;
                }
                if in_flight.is_none() {
                    debug!("Checking order status");
                    let api = Arc::clone(&api);
                    let order_no = ticket.order_no.clone();
                    in_flight = Some(Box::pin(async move {
                        fetch_status(api.as_ref(), &order_no, request_timeout).await
                    }));
                } else {
                    debug!("Status call still in flight, skipping");
                }
            }
            result = async {
                match in_flight.as_mut() {
                    Some(call) => call.await,
                    None => std::future::pending().await,
                }
            }, if in_flight.is_some() => {
                in_flight = None;
                let outcome = LifecycleRequest::Polled {
                    ticket: ticket.clone(),
                    result,
                };
                if !post(&mailbox, outcome).await {
                    break;
                }
            }
        }
    }
    debug!("Lifecycle service gone, poller exiting");
}

/// One status call bounded by `request_timeout`.
pub(crate) async fn fetch_status(
    api: &dyn OrderApi,
    order_no: &str,
    request_timeout: Duration,
) -> Result<Order, ApiError> {
    match tokio::time::timeout(request_timeout, api.get_order_status(order_no)).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(
            u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

/// Delivers a message if the service still has clients. Returns `false` when
/// the mailbox is gone.
pub(crate) async fn post(
    mailbox: &mpsc::WeakSender<LifecycleRequest>,
    message: LifecycleRequest,
) -> bool {
    match mailbox.upgrade() {
        Some(sender) => sender.send(message).await.is_ok(),
        None => false,
    }
}
