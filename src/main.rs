mod api;
mod app_system;
mod config;
mod domain;
mod lifecycle;

#[cfg(test)]
mod mock_framework;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Instrument};

use crate::api::{HttpOrderApi, OrderApi, OrderQuery, TargetStatus};
use crate::app_system::{setup_tracing, PaymentSystem};
use crate::config::Config;
use crate::domain::{OrderStatus, OrderType};
use crate::lifecycle::StatusBanner;

const DEFAULT_CONFIG: &str = "order-lifecycle.toml";

/// Command-line arguments for the order lifecycle client.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an order and follow it until it is paid, cancelled or failed.
    /// Ctrl-C asks the backend to cancel it.
    Pay {
        /// monthly or yearly
        order_type: OrderType,
    },
    /// List your orders
    List {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        status: Option<OrderStatus>,
        #[arg(long)]
        order_type: Option<OrderType>,
    },
    /// Delete an order
    Delete { order_no: String },
    /// Move an order to scanned, paid or cancelled
    Mark {
        order_no: String,
        status: TargetStatus,
        /// Signature returned when the order was created
        #[arg(long)]
        signature: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    setup_tracing(&args.log_level);

    // Only the default path may be absent.
    let config = if args.config == Path::new(DEFAULT_CONFIG) {
        Config::from_file_or_default(&args.config)?
    } else {
        Config::from_file(&args.config)?
    };
    info!(base_url = %config.api.base_url, "Loaded configuration");

    let api = HttpOrderApi::new(&config.api)?;

    match args.command {
        Command::Pay { order_type } => pay(api, &config, order_type).await?,
        Command::List {
            page,
            page_size,
            status,
            order_type,
        } => {
            let query = OrderQuery {
                page,
                page_size,
                status,
                order_type,
            };
            let page = api.list_orders(&query).await?;
            println!(
                "{} orders (page {}, {} per page)",
                page.total, page.page, page.page_size
            );
            for order in &page.results {
                println!(
                    "{}  {:<8} {:>8}  {:<10} {}",
                    order.order_no, order.order_type, order.amount, order.status, order.created_at
                );
            }
        }
        Command::Delete { order_no } => {
            api.delete_order(&order_no).await?;
            println!("Deleted order {order_no}");
        }
        Command::Mark {
            order_no,
            status,
            signature,
        } => {
            let order = api
                .update_order_status(&order_no, status, &signature)
                .await?;
            println!("Order {} is now {}", order.order_no, order.status);
        }
    }

    Ok(())
}

/// What a Ctrl-C means during the payment flow.
#[derive(Debug, PartialEq, Eq)]
enum InterruptAction {
    RequestCancellation,
    /// Stop following the order without waiting for it to settle.
    Leave,
}

/// The first interrupt asks the backend to cancel; any later one leaves.
#[derive(Debug, Default)]
struct Interrupts {
    seen: u32,
}

impl Interrupts {
    fn next(&mut self) -> InterruptAction {
        self.seen += 1;
        if self.seen == 1 {
            InterruptAction::RequestCancellation
        } else {
            InterruptAction::Leave
        }
    }
}

/// Drives one order through the lifecycle service, printing a banner on
/// every published change.
async fn pay(api: HttpOrderApi, config: &Config, order_type: OrderType) -> Result<(), Box<dyn Error>> {
    let system = PaymentSystem::new(Arc::new(api), config);
    let client = system.lifecycle_client.clone();
    let mut snapshots = client.subscribe();

    let span = tracing::info_span!("order_creation", %order_type);
    let created = async {
        info!("Creating order");
        client.start_order(order_type).await
    }
    .instrument(span)
    .await;

    let order = match created {
        Ok(order) => order,
        Err(e) => {
            error!(error = %e, "Order creation failed");
            system.shutdown().await?;
            return Err(e.into());
        }
    };
    info!(order_no = %order.order_no, expire_time = %order.expire_time, "Order created");

    let mut interrupts = Interrupts::default();
    loop {
        let Some(banner) = client
            .latest()
            .map(|order| StatusBanner::for_order(&order, Utc::now()))
        else {
            break;
        };
        println!("{banner}");
        if banner.is_final() {
            break;
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => match interrupts.next() {
                InterruptAction::RequestCancellation => {
                    info!("Interrupted, requesting cancellation (Ctrl-C again to leave)");
                    match client.request_cancellation().await {
                        Ok(()) => info!("Cancellation confirmed"),
                        Err(e) => warn!(error = %e, "Cancellation not applied"),
                    }
                }
                InterruptAction::Leave => {
                    info!("Interrupted again, leaving");
                    break;
                }
            }
        }
    }

    if let Ok(Some(order)) = client.current_snapshot().await {
        info!(order_no = %order.order_no, status = %order.status, "Final order status");
    }
    client.stop_polling().await?;
    client.clear().await?;

    system.shutdown().await?;
    info!("Payment flow finished");
    Ok(())
}
