use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument};

use super::error::LifecycleError;
use super::messages::LifecycleRequest;
use crate::domain::{Order, OrderType};

/// Generate client methods with oneshot channel boilerplate and automatic tracing.
macro_rules! client_method {
    ($client:ty => fn $method:ident($($param:ident: $param_type:ty),*) -> $return_type:ty as $request:ident::$variant:ident) => {
        #[allow(dead_code)]
        impl $client {
            #[instrument(skip(self))]
            pub async fn $method(&self, $($param: $param_type),*) -> Result<$return_type, LifecycleError> {
                debug!("Sending request");
                let (respond_to, response) = oneshot::channel();
                self.sender.send($request::$variant {
                    $($param,)*
                    respond_to,
                }).await.map_err(|_| LifecycleError::ActorCommunicationError("Actor closed".to_string()))?;

                response.await.map_err(|_| LifecycleError::ActorCommunicationError("Actor dropped".to_string()))?
            }
        }
    };
}

/// Handle the presentation layer uses to drive and observe the lifecycle
/// service. Cheap to clone; every clone talks to the same service.
#[derive(Clone)]
pub struct LifecycleClient {
    pub(crate) sender: mpsc::Sender<LifecycleRequest>,
    snapshot: watch::Receiver<Option<Order>>,
}

impl LifecycleClient {
    pub fn new(
        sender: mpsc::Sender<LifecycleRequest>,
        snapshot: watch::Receiver<Option<Order>>,
    ) -> Self {
        Self { sender, snapshot }
    }

    /// Observe every published snapshot. `None` means no active order.
    pub fn subscribe(&self) -> watch::Receiver<Option<Order>> {
        self.snapshot.clone()
    }

    /// Last published snapshot, without a round trip to the service.
    pub fn latest(&self) -> Option<Order> {
        self.snapshot.borrow().clone()
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        debug!("Sending shutdown request");
        self.sender
            .send(LifecycleRequest::Shutdown)
            .await
            .map_err(|_| LifecycleError::ActorCommunicationError("Actor closed".to_string()))
    }
}

client_method!(LifecycleClient => fn start_order(order_type: OrderType) -> Order as LifecycleRequest::StartOrder);
client_method!(LifecycleClient => fn begin_polling() -> () as LifecycleRequest::BeginPolling);
client_method!(LifecycleClient => fn stop_polling() -> () as LifecycleRequest::StopPolling);
client_method!(LifecycleClient => fn request_cancellation() -> () as LifecycleRequest::RequestCancellation);
client_method!(LifecycleClient => fn current_snapshot() -> Option<Order> as LifecycleRequest::CurrentSnapshot);
client_method!(LifecycleClient => fn clear() -> () as LifecycleRequest::Clear);

#[cfg(test)]
client_method!(LifecycleClient => fn update_count() -> u64 as LifecycleRequest::UpdateCount);
