use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use super::client::LifecycleClient;
use super::error::LifecycleError;
use super::messages::{LifecycleRequest, ServiceResponse};
use super::poller::{self, PollHandle, PollTicket};
use crate::api::{ApiError, OrderApi, TargetStatus};
use crate::config::PollingConfig;
use crate::domain::{Order, OrderStatus, OrderType, Reconciled};

/// Owns the single in-flight order of one view and keeps it in sync with the
/// backend.
///
/// All state lives inside this task. Network calls are spawned and report back
/// through the mailbox, so requests such as `StopPolling` are always answered
/// without waiting on I/O.
pub struct OrderLifecycleService {
    receiver: mpsc::Receiver<LifecycleRequest>,
    mailbox: mpsc::WeakSender<LifecycleRequest>,
    api: Arc<dyn OrderApi>,
    polling: PollingConfig,
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    snapshot: watch::Sender<Option<Order>>,
    active: Option<Order>,
    poller: Option<PollHandle>,
    epoch: u64,
    creating: bool,
    updates: u64,
}

impl OrderLifecycleService {
    pub fn new(
        api: Arc<dyn OrderApi>,
        polling: PollingConfig,
        buffer_size: usize,
    ) -> (Self, LifecycleClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (snapshot, snapshot_rx) = watch::channel(None);
        let service = Self {
            receiver,
            mailbox: sender.downgrade(),
            api,
            polling,
            now_fn: Box::new(Utc::now),
            snapshot,
            active: None,
            poller: None,
            epoch: 0,
            creating: false,
            updates: 0,
        };
        let client = LifecycleClient::new(sender, snapshot_rx);
        (service, client)
    }

    /// Replaces the wall clock used for expiry checks.
    #[allow(dead_code)]
    pub fn with_clock(mut self, now_fn: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.now_fn = Box::new(now_fn);
        self
    }

    #[instrument(name = "order_lifecycle_service", skip(self))]
    pub async fn run(mut self) {
        info!("OrderLifecycleService starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                LifecycleRequest::StartOrder {
                    order_type,
                    respond_to,
                } => self.handle_start_order(order_type, respond_to),
                LifecycleRequest::BeginPolling { respond_to } => {
                    let _ = respond_to.send(self.begin_polling());
                }
                LifecycleRequest::StopPolling { respond_to } => {
                    self.handle_stop_polling(respond_to);
                }
                LifecycleRequest::RequestCancellation { respond_to } => {
                    self.handle_request_cancellation(respond_to);
                }
                LifecycleRequest::CurrentSnapshot { respond_to } => {
                    let _ = respond_to.send(Ok(self.active.clone()));
                }
                LifecycleRequest::Clear { respond_to } => self.handle_clear(respond_to),
                LifecycleRequest::Shutdown => {
                    info!("OrderLifecycleService shutting down");
                    break;
                }
                #[cfg(test)]
                LifecycleRequest::UpdateCount { respond_to } => {
                    let _ = respond_to.send(Ok(self.updates));
                }
                LifecycleRequest::Created { result, respond_to } => {
                    self.handle_created(result, respond_to);
                }
                LifecycleRequest::Tick { ticket } => self.handle_tick(ticket),
                LifecycleRequest::Polled { ticket, result } => self.handle_polled(ticket, result),
                LifecycleRequest::CancelAnswered {
                    order_no,
                    result,
                    refreshed,
                    respond_to,
                } => self.handle_cancel_answered(order_no, result, refreshed, respond_to),
            }
        }

        self.stop_poller();
        info!("OrderLifecycleService stopped");
    }

    #[instrument(skip(self, respond_to))]
    fn handle_start_order(&mut self, order_type: OrderType, respond_to: ServiceResponse<Order>) {
        debug!("Processing start_order request");

        if self.creating {
            warn!("Creation already in flight");
            let _ = respond_to.send(Err(LifecycleError::CreationInProgress));
            return;
        }
        self.creating = true;

        let api = Arc::clone(&self.api);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = api.create_order(order_type).await;
            poller::post(&mailbox, LifecycleRequest::Created { result, respond_to }).await;
        });
    }

    fn handle_created(&mut self, result: Result<Order, ApiError>, respond_to: ServiceResponse<Order>) {
        self.creating = false;

        let order = match result {
            Ok(order) if order.signature.is_empty() => {
                error!(order_no = %order.order_no, "Created order carries no signature");
                let _ = respond_to.send(Err(LifecycleError::Creation(ApiError::Decode(
                    format!("Created order {} carries no signature", order.order_no),
                ))));
                return;
            }
            Ok(order) => order,
            Err(e) => {
                error!(error = %e, "Order creation failed");
                let _ = respond_to.send(Err(LifecycleError::Creation(e)));
                return;
            }
        };

        self.stop_poller();
        if let Some(previous) = self.active.take() {
            info!(order_no = %previous.order_no, "Superseding previous order");
        }

        info!(
            order_no = %order.order_no,
            order_type = %order.order_type,
            amount = %order.amount,
            expire_time = %order.expire_time,
            "Order created"
        );
        self.active = Some(order.clone());
        self.publish();
        let _ = respond_to.send(Ok(order));

        if let Err(e) = self.begin_polling() {
            debug!(error = %e, "Polling not started");
        }
    }

    /// Starts the poller for the active order. Already polling is a no-op.
    fn begin_polling(&mut self) -> Result<(), LifecycleError> {
        let Some(order) = self.active.as_ref() else {
            return Err(LifecycleError::NoActiveOrder);
        };
        if order.is_terminal() {
            return Err(LifecycleError::AlreadyTerminal {
                status: order.status,
            });
        }
        if self.poller.is_some() {
            return Ok(());
        }
        let order_no = order.order_no.clone();

        if self.check_expiry() {
            return Err(LifecycleError::AlreadyTerminal {
                status: OrderStatus::Failed,
            });
        }

        self.epoch += 1;
        let ticket = PollTicket {
            order_no,
            epoch: self.epoch,
        };
        info!(order_no = %ticket.order_no, epoch = ticket.epoch, "Polling started");
        self.poller = Some(PollHandle::spawn(
            Arc::clone(&self.api),
            ticket,
            self.polling.interval(),
            self.polling.request_timeout(),
            self.mailbox.clone(),
        ));
        Ok(())
    }

    fn handle_stop_polling(&mut self, respond_to: ServiceResponse<()>) {
        if self.stop_poller() {
            info!("Polling stopped on request");
        }
        let _ = respond_to.send(Ok(()));
    }

    /// Cancels the poller and invalidates its outstanding responses.
    fn stop_poller(&mut self) -> bool {
        self.epoch += 1;
        match self.poller.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    fn is_current(&self, ticket: &PollTicket) -> bool {
        self.poller
            .as_ref()
            .is_some_and(|handle| handle.ticket() == ticket)
    }

    /// Enforces the deadline on every tick, even while a status call hangs.
    fn handle_tick(&mut self, ticket: PollTicket) {
        if self.is_current(&ticket) {
            self.check_expiry();
        }
    }

    #[instrument(skip(self, result), fields(order_no = %ticket.order_no, epoch = ticket.epoch))]
    fn handle_polled(&mut self, ticket: PollTicket, result: Result<Order, ApiError>) {
        if !self.is_current(&ticket) {
            debug!("Discarding stale status response");
            return;
        }

        match result {
            Ok(remote) => self.apply_remote(&remote),
            Err(e) if e.is_transient() => debug!(error = %e, "Status check failed, will retry"),
            Err(e) => warn!(error = %e, "Status check rejected, will retry"),
        }

        self.check_expiry();
    }

    /// Folds a server response into the active order and publishes on change.
    fn apply_remote(&mut self, remote: &Order) {
        let Some(order) = self.active.as_mut() else {
            return;
        };

        match order.reconcile(remote) {
            Reconciled::Changed { from, to } => {
                info!(order_no = %remote.order_no, from = %from, to = %to, "Order status updated");
                self.publish();
                if to.is_terminal() {
                    self.stop_poller();
                    info!(status = %to, "Order reached a terminal status, polling stopped");
                }
            }
            Reconciled::Unchanged => debug!("Order unchanged"),
            Reconciled::Regressed { from, to } => {
                warn!(from = %from, to = %to, "Ignoring backward status")
            }
            Reconciled::Sealed => debug!("Order already terminal, response ignored"),
            Reconciled::Mismatched => {
                warn!(remote = %remote.order_no, "Response describes a different order")
            }
        }
    }

    /// Fails the active order locally once its deadline has passed.
    fn check_expiry(&mut self) -> bool {
        let now = (self.now_fn)();
        let expired = self
            .active
            .as_mut()
            .is_some_and(|order| order.expire(now));

        if expired {
            warn!(now = %now, "Order expired before payment, marking failed");
            self.publish();
            self.stop_poller();
        }
        expired
    }

    #[instrument(skip(self, respond_to))]
    fn handle_request_cancellation(&mut self, respond_to: ServiceResponse<()>) {
        debug!("Processing request_cancellation request");

        let Some(order) = self.active.as_ref() else {
            let _ = respond_to.send(Err(LifecycleError::NoActiveOrder));
            return;
        };
        if order.is_terminal() {
            let _ = respond_to.send(Err(LifecycleError::CancellationRejected {
                status: order.status,
            }));
            return;
        }

        info!(order_no = %order.order_no, "Requesting cancellation");
        let api = Arc::clone(&self.api);
        let mailbox = self.mailbox.clone();
        let order_no = order.order_no.clone();
        let signature = order.signature.clone();
        let request_timeout = self.polling.request_timeout();
        tokio::spawn(async move {
            let result = api
                .update_order_status(&order_no, TargetStatus::Cancelled, &signature)
                .await;
            // The server refused; fetch the status it holds instead.
            let refreshed = match &result {
                Err(ApiError::Rejected { .. }) => {
                    Some(poller::fetch_status(api.as_ref(), &order_no, request_timeout).await)
                }
                _ => None,
            };
            let answer = LifecycleRequest::CancelAnswered {
                order_no,
                result,
                refreshed,
                respond_to,
            };
            poller::post(&mailbox, answer).await;
        });
    }

    #[instrument(skip(self, result, refreshed, respond_to))]
    fn handle_cancel_answered(
        &mut self,
        order_no: String,
        result: Result<Order, ApiError>,
        refreshed: Option<Result<Order, ApiError>>,
        respond_to: ServiceResponse<()>,
    ) {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|order| order.order_no == order_no);
        if !is_active {
            debug!("Cancellation answer for an order that is no longer active");
            let _ = respond_to.send(Err(LifecycleError::NoActiveOrder));
            return;
        }

        let outcome = match result {
            Ok(remote) => {
                self.apply_remote(&remote);
                match self.active_status() {
                    Some(OrderStatus::Cancelled) => {
                        info!("Cancellation confirmed");
                        Ok(())
                    }
                    Some(status) => {
                        warn!(status = %status, "Cancellation overruled by server status");
                        Err(LifecycleError::CancellationRejected { status })
                    }
                    None => Err(LifecycleError::NoActiveOrder),
                }
            }
            Err(ApiError::Rejected { code, message }) => {
                warn!(code, message = %message, "Cancellation rejected by server");
                match refreshed {
                    Some(Ok(remote)) => self.apply_remote(&remote),
                    Some(Err(e)) => warn!(error = %e, "Status refresh after rejection failed"),
                    None => {}
                }
                match self.active_status() {
                    Some(status) => Err(LifecycleError::CancellationRejected { status }),
                    None => Err(LifecycleError::NoActiveOrder),
                }
            }
            Err(e) => {
                error!(error = %e, "Cancellation request failed");
                Err(LifecycleError::Cancellation(e))
            }
        };

        let _ = respond_to.send(outcome);
    }

    fn active_status(&self) -> Option<OrderStatus> {
        self.active.as_ref().map(|order| order.status)
    }

    fn handle_clear(&mut self, respond_to: ServiceResponse<()>) {
        self.stop_poller();
        if let Some(order) = self.active.take() {
            info!(order_no = %order.order_no, "Active order cleared");
        }
        self.publish();
        let _ = respond_to.send(Ok(()));
    }

    /// Pushes the active order to observers if it differs from the last one.
    fn publish(&mut self) {
        let next = self.active.clone();
        let changed = self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            self.updates += 1;
        }
    }
}
