//! Order status lifecycle
//!
//! The one table every role view consumes: which transitions exist, which
//! staff role may perform them, and how each status is presented per role.
//!
//! ```text
//! PENDING ──► PREPARING ──► READY ──► SERVED ──► PAID
//!    │            │           │          │
//!    └────────────┴───────────┴──────────┴──────► CANCELLED
//! ```

use crate::error::OrderError;
use serde::{Deserialize, Serialize};

/// Order status
///
/// Wire format is SCREAMING_SNAKE_CASE English. The legacy backend spellings
/// are accepted on input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placed by the POS, not yet picked up by the kitchen
    #[default]
    #[serde(alias = "EN_ATTENTE")]
    Pending,
    /// Kitchen is cooking
    #[serde(alias = "EN_PREPARATION")]
    Preparing,
    /// Waiting at the pass for a server
    #[serde(alias = "PRETE")]
    Ready,
    /// Delivered to the table, bill open
    #[serde(alias = "SERVIE")]
    Served,
    /// Settled at the till
    #[serde(alias = "PAYEE")]
    Paid,
    /// Cancelled before payment
    #[serde(alias = "ANNULEE")]
    Cancelled,
}

impl OrderStatus {
    /// All statuses in lifecycle order
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
    ];

    /// Statuses reachable from `self`
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[Served, Cancelled],
            Served => &[Paid, Cancelled],
            Paid | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Validate `self -> next` against the transition table
    pub fn validate_transition(self, next: OrderStatus) -> Result<(), OrderError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Paid and cancelled orders never move again
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }

    /// Wire name (matches the serde representation)
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Served => "SERVED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Presentation metadata for `role`
    pub fn display(self, role: StaffRole) -> StatusDisplay {
        status_display(self, role)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "EN_ATTENTE" => Ok(OrderStatus::Pending),
            "PREPARING" | "EN_PREPARATION" => Ok(OrderStatus::Preparing),
            "READY" | "PRETE" => Ok(OrderStatus::Ready),
            "SERVED" | "SERVIE" => Ok(OrderStatus::Served),
            "PAID" | "PAYEE" => Ok(OrderStatus::Paid),
            "CANCELLED" | "ANNULEE" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Staff role a view is scoped to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Kitchen,
    Server,
    Cashier,
    /// May perform any transition the table allows
    Manager,
}

impl StaffRole {
    pub const ALL: [StaffRole; 4] = [
        StaffRole::Kitchen,
        StaffRole::Server,
        StaffRole::Cashier,
        StaffRole::Manager,
    ];

    /// Whether this role may move an order from `from` to `to`.
    ///
    /// Always false when the transition itself is not in the table.
    pub fn may_transition(self, from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        if !from.can_transition_to(to) {
            return false;
        }
        match self {
            StaffRole::Manager => true,
            StaffRole::Kitchen => matches!((from, to), (Pending, Preparing) | (Preparing, Ready)),
            StaffRole::Server => matches!((from, to), (Ready, Served) | (_, Cancelled)),
            StaffRole::Cashier => matches!((from, to), (Served, Paid) | (_, Cancelled)),
        }
    }

    /// Validate both the transition table and this role's permission
    pub fn validate_transition(self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        from.validate_transition(to)?;
        if self.may_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::RoleNotPermitted {
                role: self,
                from,
                to,
            })
        }
    }

    /// Statuses this role's board shows
    pub fn visible_statuses(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            StaffRole::Kitchen => &[Pending, Preparing],
            StaffRole::Server => &[Pending, Preparing, Ready, Served],
            StaffRole::Cashier => &[Served],
            StaffRole::Manager => &OrderStatus::ALL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StaffRole::Kitchen => "kitchen",
            StaffRole::Server => "server",
            StaffRole::Cashier => "cashier",
            StaffRole::Manager => "manager",
        }
    }
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StaffRole {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kitchen" => Ok(StaffRole::Kitchen),
            "server" => Ok(StaffRole::Server),
            "cashier" => Ok(StaffRole::Cashier),
            "manager" => Ok(StaffRole::Manager),
            other => Err(OrderError::UnknownRole(other.to_string())),
        }
    }
}

// ============================================================================
// Display metadata
// ============================================================================

/// How a status is rendered on a role's board
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatusDisplay {
    pub label: &'static str,
    /// CSS hex color
    pub color: &'static str,
    /// Card pulses until someone acts on it
    pub urgent: bool,
}

const AMBER: &str = "#f59e0b";
const BLUE: &str = "#3b82f6";
const GREEN: &str = "#22c55e";
const PURPLE: &str = "#8b5cf6";
const GRAY: &str = "#6b7280";
const RED: &str = "#ef4444";

const fn meta(label: &'static str, color: &'static str, urgent: bool) -> StatusDisplay {
    StatusDisplay {
        label,
        color,
        urgent,
    }
}

/// Canonical label/color table.
///
/// Colors are shared across roles; labels and urgency differ where a role
/// needs to act. `SERVED` reads "Awaiting payment" for the cashier only.
fn status_display(status: OrderStatus, role: StaffRole) -> StatusDisplay {
    use OrderStatus::*;
    match (status, role) {
        (Pending, StaffRole::Kitchen) => meta("New", AMBER, true),
        (Pending, _) => meta("Pending", AMBER, false),

        (Preparing, _) => meta("Preparing", BLUE, false),

        (Ready, StaffRole::Server) => meta("Ready to serve", GREEN, true),
        (Ready, _) => meta("Ready", GREEN, false),

        (Served, StaffRole::Cashier) => meta("Awaiting payment", PURPLE, true),
        (Served, _) => meta("Served", PURPLE, false),

        (Paid, _) => meta("Paid", GRAY, false),
        (Cancelled, _) => meta("Cancelled", RED, false),
    }
}
