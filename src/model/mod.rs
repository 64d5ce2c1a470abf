use crate::error::{EstimateError, Result};
use crate::io::SUMMARY_MARKER;

mod table;

pub use table::{CategorySet, EstimateTable, SortDirection, SortKey};

/// Largest accepted quantity or unit price.
pub const MAX_AMOUNT: f64 = 1_000_000.0;

/// Categories offered while the estimate has none of its own.
pub const DEFAULT_CATEGORIES: [&str; 4] = ["Materials", "Labor", "Furniture", "Transport"];

/// One row of the cost estimate.
///
/// The total is never stored; it is always derived from the quantity and the
/// unit price so the two can not drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    name: String,
    quantity: f64,
    unit: String,
    unit_price: f64,
    category: String,
    description: String,
}

impl LineItem {
    /// Validates a draft and turns it into a line item.
    pub fn new(draft: ItemDraft) -> Result<Self> {
        Ok(Self {
            name: validate_name(draft.name)?,
            quantity: validate_amount("quantity", draft.quantity)?,
            unit: draft.unit.trim().to_string(),
            unit_price: validate_amount("unit price", draft.unit_price)?,
            category: draft.category.trim().to_string(),
            description: draft.description.trim().to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn unit_price(&self) -> f64 {
        self.unit_price
    }

    /// Quantity multiplied by unit price.
    pub fn total(&self) -> f64 {
        self.quantity * self.unit_price
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Applies `changes` after validating every changed field; on error the
    /// item is left untouched.
    pub(crate) fn apply(&mut self, changes: ItemChanges) -> Result<()> {
        let name = changes.name.map(validate_name).transpose()?;
        let quantity = changes
            .quantity
            .map(|value| validate_amount("quantity", value))
            .transpose()?;
        let unit_price = changes
            .unit_price
            .map(|value| validate_amount("unit price", value))
            .transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(quantity) = quantity {
            self.quantity = quantity;
        }
        if let Some(unit_price) = unit_price {
            self.unit_price = unit_price;
        }
        if let Some(unit) = changes.unit {
            self.unit = unit.trim().to_string();
        }
        if let Some(category) = changes.category {
            self.category = category.trim().to_string();
        }
        if let Some(description) = changes.description {
            self.description = description.trim().to_string();
        }
        Ok(())
    }
}

/// Input for a new line item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub category: String,
    pub description: String,
}

impl ItemDraft {
    pub fn new(
        name: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
        unit_price: f64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit: unit.into(),
            unit_price,
            category: category.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Field changes for an existing line item. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Checks that `value` is finite and within `0..=MAX_AMOUNT`.
pub fn validate_amount(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && (0.0..=MAX_AMOUNT).contains(&value) {
        Ok(value)
    } else {
        Err(EstimateError::OutOfRange { field, value })
    }
}

fn validate_name(name: String) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(EstimateError::EmptyName)
    } else if trimmed == SUMMARY_MARKER {
        // The reader drops summary rows, so an item with this name would vanish.
        Err(EstimateError::ReservedItemName(trimmed.to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_follows_quantity_and_price() {
        let mut item = LineItem::new(ItemDraft::new("Cement", 10.0, "kg", 5.0, "Materials"))
            .expect("valid item");
        assert_eq!(item.total(), 50.0);

        item.apply(ItemChanges {
            unit_price: Some(7.5),
            ..ItemChanges::default()
        })
        .expect("valid change");
        assert_eq!(item.total(), 75.0);
        assert_eq!(item.unit(), "kg");
    }

    #[test]
    fn rejects_amounts_outside_the_accepted_range() {
        for value in [-0.01, 1_000_000.01, f64::NAN, f64::INFINITY] {
            let result = LineItem::new(ItemDraft::new("Cement", value, "kg", 1.0, "Materials"));
            assert!(matches!(
                result,
                Err(EstimateError::OutOfRange { field: "quantity", .. })
            ));
        }
        assert!(LineItem::new(ItemDraft::new("Cement", 1_000_000.0, "kg", 0.0, "")).is_ok());
    }

    #[test]
    fn failed_change_leaves_item_untouched() {
        let mut item = LineItem::new(ItemDraft::new("Cement", 10.0, "kg", 5.0, "Materials"))
            .expect("valid item");
        let before = item.clone();

        let result = item.apply(ItemChanges {
            name: Some("Concrete".into()),
            quantity: Some(-1.0),
            ..ItemChanges::default()
        });

        assert!(result.is_err());
        assert_eq!(item, before);
    }

    #[test]
    fn blank_names_are_rejected() {
        let result = LineItem::new(ItemDraft::new("   ", 1.0, "szt", 1.0, ""));
        assert!(matches!(result, Err(EstimateError::EmptyName)));
    }

    #[test]
    fn summary_marker_is_not_an_item_name() {
        let result = LineItem::new(ItemDraft::new(" RAZEM ", 2.0, "szt", 10.0, ""));
        assert!(matches!(result, Err(EstimateError::ReservedItemName(_))));

        let mut item = LineItem::new(ItemDraft::new("Cement", 10.0, "kg", 5.0, "Materials"))
            .expect("valid item");
        let renamed = item.apply(ItemChanges {
            name: Some("RAZEM".into()),
            ..ItemChanges::default()
        });
        assert!(matches!(renamed, Err(EstimateError::ReservedItemName(_))));
        assert_eq!(item.name(), "Cement");

        assert!(LineItem::new(ItemDraft::new("Razem z montażem", 1.0, "szt", 1.0, "")).is_ok());
    }
}
