//! Work-order domain types: the requested price mutations, the snapshots
//! captured before execution, and the status state machine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lifecycle of a work order.
///
/// `pending → executing → {completed | failed}`; `completed → undone`.
/// There is no path back to `pending` and no redo after undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkOrderStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Undone,
}

impl WorkOrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkOrderStatus::Pending => "pending",
            WorkOrderStatus::Executing => "executing",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Failed => "failed",
            WorkOrderStatus::Undone => "undone",
        }
    }
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkOrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkOrderStatus::Pending),
            "executing" => Ok(WorkOrderStatus::Executing),
            "completed" => Ok(WorkOrderStatus::Completed),
            "failed" => Ok(WorkOrderStatus::Failed),
            "undone" => Ok(WorkOrderStatus::Undone),
            other => Err(CoreError::UnknownWorkOrderStatus(other.to_string())),
        }
    }
}

/// One requested price change within a work order.
///
/// Targets a product, or a single variant of it when `variant_id` is set.
/// BigCommerce numeric IDs are carried as strings to avoid precision loss.
/// Immutable once the work order is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPriceUpdate {
    pub product_id: String,
    pub product_name: String,
    pub new_regular_price: Option<Decimal>,
    pub new_sale_price: Option<Decimal>,
    pub variant_id: Option<String>,
    pub variant_sku: Option<String>,
}

impl ProductPriceUpdate {
    /// An update with neither price set would be a no-op; creation rejects it.
    #[must_use]
    pub fn has_price_change(&self) -> bool {
        self.new_regular_price.is_some() || self.new_sale_price.is_some()
    }

    /// Identity of the targeted catalog entry.
    #[must_use]
    pub fn key(&self) -> (&str, Option<&str>) {
        (self.product_id.as_str(), self.variant_id.as_deref())
    }
}

/// Prices of a product or variant as they were immediately before a work
/// order mutated them. Captured at execution time, used only for undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub original_regular_price: Option<Decimal>,
    pub original_sale_price: Option<Decimal>,
}

impl PriceSnapshot {
    #[must_use]
    pub fn key(&self) -> (&str, Option<&str>) {
        (self.product_id.as_str(), self.variant_id.as_deref())
    }

    /// Finds the snapshot corresponding to an update by `(product_id, variant_id)`.
    ///
    /// Snapshots are matched by key, not by position: execution skips updates
    /// whose product is missing locally, so the snapshot list may be shorter
    /// than the update list and in a different order.
    #[must_use]
    pub fn find_for<'a>(
        snapshots: &'a [PriceSnapshot],
        update: &ProductPriceUpdate,
    ) -> Option<&'a PriceSnapshot> {
        snapshots.iter().find(|s| s.key() == update.key())
    }
}
