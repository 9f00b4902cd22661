use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::error::CoreError;
use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStatus {
    Pending,
    InProgress,
    Completed,
}

impl ListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(CoreError::InvalidData(format!("unknown list status: {s}"))),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }

    /// Status only moves forward; staying put is allowed.
    pub fn can_transition_to(&self, next: ListStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Piece,
    Gram,
    Kilogram,
    Millilitre,
    Litre,
    Teaspoon,
    Tablespoon,
    Cup,
    Pack,
    Bunch,
    Can,
    Bottle,
}

impl Unit {
    pub const ALL: [Unit; 12] = [
        Unit::Piece,
        Unit::Gram,
        Unit::Kilogram,
        Unit::Millilitre,
        Unit::Litre,
        Unit::Teaspoon,
        Unit::Tablespoon,
        Unit::Cup,
        Unit::Pack,
        Unit::Bunch,
        Unit::Can,
        Unit::Bottle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Piece => "piece",
            Self::Gram => "g",
            Self::Kilogram => "kg",
            Self::Millilitre => "ml",
            Self::Litre => "l",
            Self::Teaspoon => "tsp",
            Self::Tablespoon => "tbsp",
            Self::Cup => "cup",
            Self::Pack => "pack",
            Self::Bunch => "bunch",
            Self::Can => "can",
            Self::Bottle => "bottle",
        }
    }

    /// Returns `None` for anything outside the allowed set.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|u| u.as_str().eq_ignore_ascii_case(s))
    }

    pub fn allowed() -> String {
        Self::ALL
            .iter()
            .map(Unit::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strictly positive, finite amount. Construct through [`Quantity::new`];
/// decoding applies the same checks without an upper bound.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Quantity(f64);

impl Quantity {
    pub const DEFAULT_MAX: f64 = 10_000.0;

    pub fn new(value: f64, max: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("quantity must be a finite number".into());
        }
        if value <= 0.0 {
            return Err("quantity must be greater than zero".into());
        }
        if value > max {
            return Err(format!("quantity must not exceed {max}"));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Quantity {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value, f64::MAX)
    }
}

impl From<Quantity> for f64 {
    fn from(quantity: Quantity) -> f64 {
        quantity.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecord {
    pub list_id: ListId,
    pub owner_id: OwnerId,
    pub recipe_id: Option<RecipeId>,
    pub status: ListStatus,
    pub title: String,
    pub note: String,
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: ItemId,
    pub list_id: ListId,
    pub ingredient_id: IngredientId,
    pub quantity: Quantity,
    pub unit: Unit,
    pub checked: bool,
    pub checked_at: Option<Timestamp>,
    pub version: u64,
    pub position: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ItemRecord {
    /// Whether `self` should replace `other` when both describe the same item:
    /// a higher version wins, equal versions fall back to the update stamp.
    pub fn supersedes(&self, other: &ItemRecord) -> bool {
        self.version > other.version
            || (self.version == other.version && self.updated_at > other.updated_at)
    }
}

impl ListRecord {
    pub fn supersedes(&self, other: &ListRecord) -> bool {
        self.version > other.version
            || (self.version == other.version && self.updated_at > other.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_moves_forward_only() {
        use ListStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Pending));
    }

    #[test]
    fn decoding_rejects_quantities_new_would_refuse() {
        for bad in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let bytes = rmp_serde::to_vec(&bad).unwrap();
            assert!(rmp_serde::from_slice::<Quantity>(&bytes).is_err(), "{bad}");
        }
        let bytes = rmp_serde::to_vec(&Quantity::new(2.5, 10.0).unwrap()).unwrap();
        assert_eq!(rmp_serde::from_slice::<Quantity>(&bytes).unwrap().value(), 2.5);
        assert_eq!(bytes, rmp_serde::to_vec(&2.5f64).unwrap());
    }

    #[test]
    fn status_parse_matches_as_str() {
        for status in [ListStatus::Pending, ListStatus::InProgress, ListStatus::Completed] {
            assert_eq!(ListStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ListStatus::parse("archived").is_err());
    }

    #[test]
    fn unit_parse_is_case_insensitive_and_closed() {
        assert_eq!(Unit::parse("KG"), Some(Unit::Kilogram));
        assert_eq!(Unit::parse(" tbsp "), Some(Unit::Tablespoon));
        assert_eq!(Unit::parse("handful"), None);
    }

    #[test]
    fn quantity_bounds() {
        assert!(Quantity::new(0.5, 10.0).is_ok());
        assert!(Quantity::new(10.0, 10.0).is_ok());
        assert!(Quantity::new(0.0, 10.0).is_err());
        assert!(Quantity::new(-1.0, 10.0).is_err());
        assert!(Quantity::new(10.5, 10.0).is_err());
        assert!(Quantity::new(f64::NAN, 10.0).is_err());
    }
}
