use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::ids::*;
use crate::model::{ItemRecord, Quantity, Unit};
use crate::validation::ValidationErrors;

pub const MAX_TITLE_LEN: usize = 200;

/// Requested field changes for one item, as received from a caller.
/// Values are unvalidated; see [`ItemChanges::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub checked: Option<bool>,
}

impl ItemChanges {
    pub fn checked(checked: bool) -> Self {
        Self {
            checked: Some(checked),
            ..Self::default()
        }
    }

    pub fn quantity(quantity: f64) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.unit.is_none() && self.checked.is_none()
    }

    pub fn validate(&self, max_quantity: f64) -> Result<ItemPatch, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.is_empty() {
            errors.add("changes", "at least one of quantity, unit or checked is required");
        }

        let quantity = match self.quantity {
            Some(q) => match Quantity::new(q, max_quantity) {
                Ok(q) => Some(q),
                Err(message) => {
                    errors.add("quantity", message);
                    None
                }
            },
            None => None,
        };

        let unit = match self.unit.as_deref() {
            Some(raw) => match Unit::parse(raw) {
                Some(u) => Some(u),
                None => {
                    errors.add(
                        "unit",
                        format!("'{raw}' is not one of: {}", Unit::allowed()),
                    );
                    None
                }
            },
            None => None,
        };

        errors.into_result(ItemPatch {
            quantity,
            unit,
            checked: self.checked,
        })
    }
}

/// Validated item changes, ready to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ItemPatch {
    pub quantity: Option<Quantity>,
    pub unit: Option<Unit>,
    pub checked: Option<bool>,
}

impl ItemPatch {
    /// Field values after applying this patch at `now`. The version is left
    /// untouched: only the record store advances it.
    pub fn apply(&self, item: &ItemRecord, now: Timestamp) -> ItemRecord {
        let mut next = item.clone();
        if let Some(quantity) = self.quantity {
            next.quantity = quantity;
        }
        if let Some(unit) = self.unit {
            next.unit = unit;
        }
        if let Some(checked) = self.checked {
            match (item.checked, checked) {
                (false, true) => next.checked_at = Some(now),
                (true, false) => next.checked_at = None,
                _ => {}
            }
            next.checked = checked;
        }
        next.updated_at = now;
        next
    }

    pub fn checks_item(&self, item: &ItemRecord) -> bool {
        !item.checked && self.checked == Some(true)
    }
}

/// One tuple of a batch: which item, what to change, and the version the caller saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChangeRequest {
    pub item_id: ItemId,
    pub changes: ItemChanges,
    pub expected_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub ingredient_id: IngredientId,
    pub quantity: f64,
    pub unit: String,
}

impl NewItem {
    pub fn new(ingredient_id: IngredientId, quantity: f64, unit: &str) -> Self {
        Self {
            ingredient_id,
            quantity,
            unit: unit.to_string(),
        }
    }

    pub fn validate(&self, max_quantity: f64) -> Result<(Quantity, Unit), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let quantity = Quantity::new(self.quantity, max_quantity)
            .map_err(|message| errors.add("quantity", message))
            .ok();
        let unit = Unit::parse(&self.unit);
        if unit.is_none() {
            errors.add(
                "unit",
                format!("'{}' is not one of: {}", self.unit, Unit::allowed()),
            );
        }
        match (quantity, unit) {
            (Some(q), Some(u)) if errors.is_empty() => Ok((q, u)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewList {
    pub title: String,
    pub note: String,
    pub recipe_id: Option<RecipeId>,
    pub items: Vec<NewItem>,
}

impl NewList {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn with_item(mut self, item: NewItem) -> Self {
        self.items.push(item);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListChanges {
    pub title: Option<String>,
    pub note: Option<String>,
}

impl ListChanges {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.title.is_none() && self.note.is_none() {
            errors.add("changes", "at least one of title or note is required");
        }
        if let Some(title) = &self.title {
            validate_title(title, &mut errors);
        }
        errors.into_result(())
    }
}

pub fn validate_title(title: &str, errors: &mut ValidationErrors) {
    if title.trim().is_empty() {
        errors.add("title", "title must not be blank");
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.add("title", format!("title must be at most {MAX_TITLE_LEN} characters"));
    }
}
