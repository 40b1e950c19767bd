use chrono::{DateTime, Utc};

use stockroom_core::{ProductId, TransactionId, UserId};

use crate::catalog::normalize_description;
use crate::movement::{Quantity, TransactionType};

/// A ledger row: one recorded stock movement.
///
/// `sequence` is assigned by the store when the row is appended and defines
/// ledger order for replay. Rows that have not been appended carry `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub sequence: i64,
    pub product_id: ProductId,
    pub kind: TransactionType,
    pub quantity: Quantity,
    pub description: Option<String>,
    pub created_by: UserId,
    pub last_updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh, not-yet-appended ledger row.
    pub fn record(
        product_id: ProductId,
        kind: TransactionType,
        quantity: Quantity,
        actor: UserId,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            sequence: 0,
            product_id,
            kind,
            quantity,
            description: normalize_description(description),
            created_by: actor,
            last_updated_by: actor,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this row with a new quantity.
    ///
    /// The movement type is immutable. `description: None` keeps the current
    /// text; `Some("")` clears it.
    pub fn amended(
        &self,
        quantity: Quantity,
        actor: UserId,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let description = match description {
            Some(d) => normalize_description(Some(d)),
            None => self.description.clone(),
        };
        Self {
            quantity,
            description,
            last_updated_by: actor,
            updated_at: now,
            ..self.clone()
        }
    }
}
