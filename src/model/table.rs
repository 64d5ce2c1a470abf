use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{EstimateError, Result};
use crate::model::{DEFAULT_CATEGORIES, ItemChanges, ItemDraft, LineItem};

/// Column a table can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Total,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Categories to offer the user.
///
/// `InUse` lists what the table actually contains, `Suggested` is the fixed
/// starter set returned for an empty table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySet {
    InUse(BTreeSet<String>),
    Suggested(BTreeSet<String>),
}

impl CategorySet {
    pub fn names(&self) -> &BTreeSet<String> {
        match self {
            CategorySet::InUse(names) | CategorySet::Suggested(names) => names,
        }
    }

    pub fn is_suggested(&self) -> bool {
        matches!(self, CategorySet::Suggested(_))
    }
}

/// Ordered, in-memory set of line items.
///
/// The table never contains the summary row; it is added by the writer and
/// dropped by the reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimateTable {
    items: Vec<LineItem>,
}

impl EstimateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&LineItem> {
        self.items.get(index)
    }

    /// Validates the draft and appends it as the last item.
    pub fn add(&mut self, draft: ItemDraft) -> Result<&LineItem> {
        let item = LineItem::new(draft)?;
        debug!(name = item.name(), total = item.total(), "item added");
        self.items.push(item);
        let last = self.items.len() - 1;
        Ok(&self.items[last])
    }

    /// Applies `changes` to the item at `index`.
    pub fn update(&mut self, index: usize, changes: ItemChanges) -> Result<&LineItem> {
        let len = self.items.len();
        let item = self
            .items
            .get_mut(index)
            .ok_or(EstimateError::IndexOutOfRange { index, len })?;
        item.apply(changes)?;
        debug!(index, total = item.total(), "item updated");
        Ok(item)
    }

    /// Removes and returns the item at `index`; later items shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<LineItem> {
        let len = self.items.len();
        if index >= len {
            return Err(EstimateError::IndexOutOfRange { index, len });
        }
        let removed = self.items.remove(index);
        debug!(index, name = removed.name(), "item removed");
        Ok(removed)
    }

    /// Reorders the stored items. The sort is stable, so equal keys keep their
    /// current relative order in both directions.
    pub fn sort(&mut self, key: SortKey, direction: SortDirection) {
        let compare = |lhs: &LineItem, rhs: &LineItem| -> Ordering {
            match key {
                SortKey::Name => lhs.name().cmp(rhs.name()),
                SortKey::Total => lhs.total().total_cmp(&rhs.total()),
                SortKey::Category => lhs.category().cmp(rhs.category()),
            }
        };
        match direction {
            SortDirection::Ascending => self.items.sort_by(compare),
            SortDirection::Descending => self.items.sort_by(|lhs, rhs| compare(rhs, lhs)),
        }
        debug!(?key, ?direction, "table sorted");
    }

    /// Items whose category equals `category` exactly, in table order.
    pub fn filter_by_category(&self, category: &str) -> Vec<&LineItem> {
        self.items
            .iter()
            .filter(|item| item.category() == category)
            .collect()
    }

    /// Items whose total lies within `min..=max`, in table order.
    pub fn filter_by_cost_range(&self, min: f64, max: f64) -> Result<Vec<&LineItem>> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(EstimateError::InvalidRange { min, max });
        }
        Ok(self
            .items
            .iter()
            .filter(|item| (min..=max).contains(&item.total()))
            .collect())
    }

    /// Sum of all item totals.
    pub fn total_cost(&self) -> f64 {
        self.items.iter().map(LineItem::total).sum()
    }

    /// Categories actually used by the items, sorted and deduplicated.
    pub fn categories_in_use(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .map(|item| item.category().to_string())
            .filter(|category| !category.is_empty())
            .collect()
    }

    /// Categories to offer when picking one: the ones in use, or the default
    /// starter set while the table is empty.
    pub fn distinct_categories(&self) -> CategorySet {
        if self.items.is_empty() {
            CategorySet::Suggested(DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect())
        } else {
            CategorySet::InUse(self.categories_in_use())
        }
    }
}

impl FromIterator<LineItem> for EstimateTable {
    fn from_iter<I: IntoIterator<Item = LineItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
