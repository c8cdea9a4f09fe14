//! What the view should show for a given order snapshot.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::{LocalFailure, Order, OrderStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum StatusBanner {
    /// Show the QR code and a countdown.
    AwaitingScan {
        order_no: String,
        amount: Decimal,
        qr_code: String,
        expires_in: Duration,
    },
    /// The code was scanned; waiting for the payer to confirm.
    AwaitingConfirmation { order_no: String },
    /// Payment done; the view redirects away.
    Paid {
        order_no: String,
        paid_time: Option<DateTime<Utc>>,
    },
    Cancelled { order_no: String },
    Failed { order_no: String },
    /// The deadline passed on this side before the server settled the order.
    Expired { order_no: String },
}

impl StatusBanner {
    pub fn for_order(order: &Order, now: DateTime<Utc>) -> Self {
        let order_no = order.order_no.clone();
        match (order.status, order.local_failure) {
            (OrderStatus::Pending, _) => Self::AwaitingScan {
                order_no,
                amount: order.amount,
                qr_code: order.qr_code.clone(),
                expires_in: (order.expire_time - now).max(Duration::zero()),
            },
            (OrderStatus::Scanned, _) => Self::AwaitingConfirmation { order_no },
            (OrderStatus::Paid, _) => Self::Paid {
                order_no,
                paid_time: order.paid_time,
            },
            (OrderStatus::Cancelled, _) => Self::Cancelled { order_no },
            (OrderStatus::Failed, Some(LocalFailure::Expired)) => Self::Expired { order_no },
            (OrderStatus::Failed, None) => Self::Failed { order_no },
        }
    }

    /// Whether the view can stop waiting for further updates.
    pub fn is_final(&self) -> bool {
        !matches!(
            self,
            Self::AwaitingScan { .. } | Self::AwaitingConfirmation { .. }
        )
    }
}

impl fmt::Display for StatusBanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingScan {
                order_no,
                amount,
                qr_code,
                expires_in,
            } => write!(
                f,
                "Order {order_no}: scan the QR code to pay {amount} ({} bytes, expires in {}s)",
                qr_code.len(),
                expires_in.num_seconds()
            ),
            Self::AwaitingConfirmation { order_no } => {
                write!(f, "Order {order_no}: scanned, waiting for payment confirmation")
            }
            Self::Paid {
                order_no,
                paid_time: Some(paid_time),
            } => write!(f, "Order {order_no}: paid at {paid_time}"),
            Self::Paid {
                order_no,
                paid_time: None,
            } => write!(f, "Order {order_no}: paid"),
            Self::Cancelled { order_no } => write!(f, "Order {order_no}: cancelled"),
            Self::Failed { order_no } => write!(f, "Order {order_no}: payment failed"),
            Self::Expired { order_no } => {
                write!(f, "Order {order_no}: expired before payment, please create a new order")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::fixtures::pending_order;

    #[test]
    fn test_pending_order_shows_qr_with_countdown() {
        let now = Utc::now();
        let order = pending_order("X", now);

        let banner = StatusBanner::for_order(&order, now + Duration::seconds(100));

        match &banner {
            StatusBanner::AwaitingScan {
                qr_code, expires_in, ..
            } => {
                assert_eq!(qr_code, "data:image/png;base64,X");
                assert_eq!(expires_in.num_seconds(), 500);
            }
            other => panic!("Unexpected banner: {other:?}"),
        }
        assert!(!banner.is_final());
    }

    #[test]
    fn test_countdown_never_negative() {
        let now = Utc::now();
        let order = pending_order("X", now);

        let banner = StatusBanner::for_order(&order, now + Duration::seconds(900));

        assert!(matches!(
            banner,
            StatusBanner::AwaitingScan { expires_in, .. } if expires_in == Duration::zero()
        ));
    }

    #[test]
    fn test_local_expiry_is_distinguished_from_server_failure() {
        let now = Utc::now();
        let mut expired = pending_order("X", now);
        expired.expire(expired.expire_time);
        let mut failed = pending_order("Y", now);
        failed.status = OrderStatus::Failed;

        let expired_banner = StatusBanner::for_order(&expired, now);
        let failed_banner = StatusBanner::for_order(&failed, now);

        assert!(matches!(expired_banner, StatusBanner::Expired { .. }));
        assert!(matches!(failed_banner, StatusBanner::Failed { .. }));
        assert!(expired_banner.is_final());
        assert!(failed_banner.is_final());
    }

    #[test]
    fn test_paid_is_final() {
        let now = Utc::now();
        let mut order = pending_order("X", now);
        order.status = OrderStatus::Paid;
        order.paid_time = Some(now);

        let banner = StatusBanner::for_order(&order, now);

        assert_eq!(
            banner,
            StatusBanner::Paid {
                order_no: "X".to_string(),
                paid_time: Some(now)
            }
        );
        assert!(banner.is_final());
        assert!(banner.to_string().contains("paid at"));
    }
}
