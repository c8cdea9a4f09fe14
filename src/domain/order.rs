use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a payment order.
///
/// `Pending -> Scanned -> Paid` is the forward path. `Cancelled` and `Failed`
/// can be reached from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Scanned,
    Paid,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled | Self::Failed)
    }

    /// Position on the forward path. Branch statuses have no rank.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Scanned => Some(1),
            Self::Paid => Some(2),
            Self::Cancelled | Self::Failed => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    /// Staying on the same status is allowed (field refresh).
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        if self == next {
            return !self.is_terminal();
        }
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            // Non-terminal into a branch status.
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanned => "scanned",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scanned" => Ok(Self::Scanned),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown order status: {other}")),
        }
    }
}

/// Membership tier being purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Monthly,
    Yearly,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("Unknown order type: {other}")),
        }
    }
}

/// Why an order was failed on this side rather than by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFailure {
    /// The expiry deadline passed while the order was still pending or scanned.
    Expired,
}

/// Client-side record of a single payment order.
///
/// Field names follow the order resource exposed by the backend. `signature`
/// and `qr_code` are only guaranteed on the creation response; later reads
/// may omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_no: String,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub order_type: OrderType,
    #[serde(default)]
    pub qr_code: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub expire_time: DateTime<Utc>,
    #[serde(default)]
    pub paid_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signature: String,
    #[serde(skip)]
    pub local_failure: Option<LocalFailure>,
}

/// Result of folding a server response into the current order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// At least one observable field changed.
    Changed { from: OrderStatus, to: OrderStatus },
    /// The response matched what we already had.
    Unchanged,
    /// The response would move the status backward.
    Regressed { from: OrderStatus, to: OrderStatus },
    /// The order is terminal; nothing is accepted anymore.
    Sealed,
    /// The response describes a different order.
    Mismatched,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_time
    }

    /// Folds a server-confirmed view of this order into `self`.
    ///
    /// Creation-time fields (amount, type, QR code, signature, expiry) are
    /// kept; status, `paid_time` and `updated_at` are taken from the server
    /// when the status move is legal.
    pub fn reconcile(&mut self, remote: &Order) -> Reconciled {
        if remote.order_no != self.order_no {
            return Reconciled::Mismatched;
        }
        if self.is_terminal() {
            return Reconciled::Sealed;
        }
        if !self.status.can_advance_to(remote.status) {
            return Reconciled::Regressed {
                from: self.status,
                to: remote.status,
            };
        }

        let mut next = self.clone();
        next.status = remote.status;
        next.paid_time = remote.paid_time.or(self.paid_time);
        next.updated_at = remote.updated_at.or(self.updated_at);

        if next == *self {
            return Reconciled::Unchanged;
        }

        let from = self.status;
        *self = next;
        Reconciled::Changed {
            from,
            to: self.status,
        }
    }

    /// Marks the order failed because the deadline passed.
    /// Returns `false` if the order was already terminal or is not yet due.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_terminal() || !self.is_expired_at(now) {
            return false;
        }
        self.status = OrderStatus::Failed;
        self.local_failure = Some(LocalFailure::Expired);
        true
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{pending_order, remote_view};
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn test_forward_path_is_monotonic() {
        use OrderStatus::*;
        assert!(Pending.can_advance_to(Scanned));
        assert!(Pending.can_advance_to(Paid));
        assert!(Scanned.can_advance_to(Paid));
        assert!(Scanned.can_advance_to(Cancelled));
        assert!(Pending.can_advance_to(Failed));

        assert!(!Scanned.can_advance_to(Pending));
        assert!(!Paid.can_advance_to(Scanned));
        assert!(!Cancelled.can_advance_to(Paid));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn test_reconcile_keeps_creation_fields() {
        let now = Utc::now();
        let mut order = pending_order("X", now);
        let remote = remote_view(&order, OrderStatus::Scanned);

        let outcome = order.reconcile(&remote);

        assert_eq!(
            outcome,
            Reconciled::Changed {
                from: OrderStatus::Pending,
                to: OrderStatus::Scanned
            }
        );
        assert_eq!(order.signature, "sig-X");
        assert_eq!(order.qr_code, "data:image/png;base64,X");
    }

    #[test]
    fn test_reconcile_identical_response_is_unchanged() {
        let now = Utc::now();
        let mut order = pending_order("X", now);
        let remote = remote_view(&order, OrderStatus::Pending);

        assert_eq!(order.reconcile(&remote), Reconciled::Unchanged);
    }

    #[test]
    fn test_reconcile_picks_up_paid_time() {
        let now = Utc::now();
        let mut order = pending_order("X", now);
        let mut remote = remote_view(&order, OrderStatus::Paid);
        remote.paid_time = Some(now + Duration::seconds(30));

        order.reconcile(&remote);

        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.paid_time, remote.paid_time);
    }

    #[test]
    fn test_reconcile_rejects_regression_and_terminal_writes() {
        let now = Utc::now();
        let mut order = pending_order("X", now);
        order.reconcile(&remote_view(&order, OrderStatus::Scanned));

        let back = remote_view(&order, OrderStatus::Pending);
        assert!(matches!(order.reconcile(&back), Reconciled::Regressed { .. }));
        assert_eq!(order.status, OrderStatus::Scanned);

        order.reconcile(&remote_view(&order, OrderStatus::Paid));
        let late = remote_view(&order, OrderStatus::Cancelled);
        assert_eq!(order.reconcile(&late), Reconciled::Sealed);
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn test_reconcile_ignores_other_orders() {
        let now = Utc::now();
        let mut order = pending_order("X", now);
        let other = remote_view(&pending_order("Y", now), OrderStatus::Paid);

        assert_eq!(order.reconcile(&other), Reconciled::Mismatched);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_expire_only_after_deadline() {
        let now = Utc::now();
        let mut order = pending_order("X", now);

        assert!(!order.expire(now));
        assert!(order.expire(order.expire_time));
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.local_failure, Some(LocalFailure::Expired));

        // Already terminal.
        assert!(!order.expire(order.expire_time + Duration::seconds(1)));
    }

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        proptest::sample::select(vec![
            OrderStatus::Pending,
            OrderStatus::Scanned,
            OrderStatus::Paid,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]
        #[test]
        fn prop_status_never_moves_backward(
            statuses in proptest::collection::vec(any_status(), 0..32)
        ) {
            let now = Utc::now();
            let mut order = pending_order("X", now);
            let mut settled: Option<OrderStatus> = None;

            for status in statuses {
                let before = order.status;
                let remote = remote_view(&order, status);
                order.reconcile(&remote);

                if let Some(fixed) = settled {
                    prop_assert_eq!(order.status, fixed);
                }
                if let (Some(from), Some(to)) = (before.rank(), order.status.rank()) {
                    prop_assert!(to >= from, "{} went back to {}", before, order.status);
                }
                if order.status.is_terminal() {
                    settled = Some(order.status);
                }
            }
        }
    }

    #[test]
    fn test_parse_from_cli_strings() {
        assert_eq!("yearly".parse::<OrderType>(), Ok(OrderType::Yearly));
        assert_eq!("scanned".parse::<OrderStatus>(), Ok(OrderStatus::Scanned));
        assert!("weekly".parse::<OrderType>().is_err());
    }

    #[test]
    fn test_deserializes_backend_payload() {
        let payload = serde_json::json!({
            "order_no": "202502131809582a0f8f59",
            "amount": "29.00",
            "status": "pending",
            "order_type": "monthly",
            "qr_code": "data:image/png;base64,AAAA",
            "created_at": "2025-02-13T18:09:58.296459Z",
            "expire_time": "2025-02-13T18:19:58.296459Z",
            "paid_time": null,
            "signature": "md5_signature_here"
        });

        let order: Order = serde_json::from_value(payload).unwrap();

        assert_eq!(order.amount, Decimal::new(2900, 2));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.order_type, OrderType::Monthly);
        assert_eq!(order.updated_at, None);
        assert_eq!(order.local_failure, None);
    }
}
