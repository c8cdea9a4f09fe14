use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::api::OrderApi;
use crate::config::Config;
use crate::lifecycle::{LifecycleClient, OrderLifecycleService};

/// Starts the lifecycle service and hands out its client.
///
/// One `PaymentSystem` per payment view: it owns exactly one active order, and
/// independent views (or tests) each build their own.
pub struct PaymentSystem {
    pub lifecycle_client: LifecycleClient,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl PaymentSystem {
    #[instrument(name = "payment_system", skip_all)]
    pub fn new(api: Arc<dyn OrderApi>, config: &Config) -> Self {
        info!("Starting payment system");

        let (service, lifecycle_client) = OrderLifecycleService::new(
            api,
            config.polling.clone(),
            config.service.mailbox_size,
        );
        let handles = vec![tokio::spawn(service.run())];

        info!("Payment system started");

        Self {
            lifecycle_client,
            handles,
        }
    }

    /// Stops the service (and with it any poller) and waits for the task.
    #[instrument(skip(self))]
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down payment system");

        let _ = self.lifecycle_client.shutdown().await;

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = ?e, "Service shutdown error");
                return Err(format!("Service task failed: {e:?}"));
            }
        }

        info!("Payment system shutdown complete");
        Ok(())
    }
}
