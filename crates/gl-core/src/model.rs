//! Persisted domain records: categories, items and lists.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Id of the list seeded into a fresh collection.
pub const DEFAULT_LIST_ID: &str = "default";

/// Name of the list seeded into a fresh collection.
pub const DEFAULT_LIST_NAME: &str = "My Grocery List";

/// Smallest quantity an item may hold.
pub const MIN_QUANTITY: u8 = 1;

/// Largest quantity an item may hold.
pub const MAX_QUANTITY: u8 = 99;

/// Clamp a requested quantity into `MIN_QUANTITY..=MAX_QUANTITY`.
pub fn clamp_quantity(quantity: i64) -> u8 {
    let clamped = quantity.clamp(i64::from(MIN_QUANTITY), i64::from(MAX_QUANTITY));
    u8::try_from(clamped).unwrap_or(MIN_QUANTITY)
}

/// Trim a user supplied name, returning `None` when nothing is left.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Aisle a grocery item belongs to.
///
/// Declaration order is the display order used for grouping, so the derived
/// `Ord` sorts categories the way they are shown. `Other` is always last.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Category {
    #[serde(rename = "Personal Care")]
    PersonalCare,
    #[default]
    Produce,
    Meat,
    Dairy,
    Bakery,
    Frozen,
    Pantry,
    Beverages,
    Household,
    Other,
}

impl Category {
    /// Every category in display order.
    pub const ALL: [Category; 10] = [
        Category::PersonalCare,
        Category::Produce,
        Category::Meat,
        Category::Dairy,
        Category::Bakery,
        Category::Frozen,
        Category::Pantry,
        Category::Beverages,
        Category::Household,
        Category::Other,
    ];

    /// Human-readable label, also used as the persisted value.
    pub fn label(self) -> &'static str {
        match self {
            Category::PersonalCare => "Personal Care",
            Category::Produce => "Produce",
            Category::Meat => "Meat",
            Category::Dairy => "Dairy",
            Category::Bakery => "Bakery",
            Category::Frozen => "Frozen",
            Category::Pantry => "Pantry",
            Category::Beverages => "Beverages",
            Category::Household => "Household",
            Category::Other => "Other",
        }
    }

    /// Resolve an exact persisted label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.label() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    /// Case-insensitive; `-` and `_` stand in for spaces.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().replace(['-', '_'], " ").to_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.label().to_lowercase() == wanted)
            .ok_or_else(|| CoreError::Validation(format!("unknown category `{value}`")))
    }
}

/// View selector over purchase status.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// Every item.
    #[default]
    All,
    /// Items not yet purchased.
    Active,
    /// Items already purchased.
    Purchased,
}

impl Filter {
    /// Every filter in tab order.
    pub const ALL: [Filter; 3] = [Filter::All, Filter::Active, Filter::Purchased];

    pub fn label(self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Active => "active",
            Filter::Purchased => "purchased",
        }
    }

    /// Whether an item with the given purchase status is visible.
    pub fn matches(self, purchased: bool) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !purchased,
            Filter::Purchased => purchased,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Filter {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|filter| filter.label() == wanted)
            .ok_or_else(|| CoreError::Validation(format!("unknown filter `{value}`")))
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a [`GroceryList`].
    ListId
);
string_id!(
    /// Identifier of an [`Item`], unique across every list.
    ItemId
);

/// A single purchasable entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub quantity: u8,
    pub purchased: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Fixed at creation.
    pub category: Category,
}

/// A named, ordered collection of items with per-category notes.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroceryList {
    pub id: ListId,
    pub name: String,
    /// Display and drag order.
    pub items: Vec<Item>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Unset categories are absent; an empty string is a stored value.
    #[serde(default)]
    pub group_notes: BTreeMap<Category, String>,
}

impl GroceryList {
    /// Create an empty list.
    pub fn new(id: ListId, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            items: Vec::new(),
            created_at,
            group_notes: BTreeMap::new(),
        }
    }

    /// The list every fresh collection starts with.
    pub fn seed(created_at: DateTime<Utc>) -> Self {
        Self::new(ListId::from(DEFAULT_LIST_ID), DEFAULT_LIST_NAME, created_at)
    }

    /// Find an item by id.
    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub(crate) fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    /// Stored note for a category, if any.
    pub fn note(&self, category: Category) -> Option<&str> {
        self.group_notes.get(&category).map(String::as_str)
    }

    /// True when the category's note holds visible text.
    pub fn has_note(&self, category: Category) -> bool {
        self.note(category)
            .is_some_and(|note| !note.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clamp_quantity_bounds() {
        assert_eq!(clamp_quantity(-4), 1);
        assert_eq!(clamp_quantity(0), 1);
        assert_eq!(clamp_quantity(42), 42);
        assert_eq!(clamp_quantity(500), 99);
    }

    #[test]
    fn normalize_name_trims_and_rejects_blank() {
        assert_eq!(normalize_name("  Milk "), Some("Milk".to_string()));
        assert_eq!(normalize_name(" \t "), None);
    }

    #[test]
    fn category_order_puts_other_last() {
        assert_eq!(Category::ALL.last(), Some(&Category::Other));
        assert_eq!(Category::ALL.first(), Some(&Category::PersonalCare));
        let mut sorted = Category::ALL;
        sorted.sort();
        assert_eq!(sorted, Category::ALL);
    }

    #[test]
    fn category_parses_loosely() {
        assert_eq!("dairy".parse::<Category>().unwrap(), Category::Dairy);
        assert_eq!(
            "personal-care".parse::<Category>().unwrap(),
            Category::PersonalCare
        );
        assert!("snacks".parse::<Category>().is_err());
    }

    #[test]
    fn item_serializes_in_storage_shape() {
        let item = Item {
            id: ItemId::from("a1"),
            name: "Soap".into(),
            quantity: 3,
            purchased: false,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            category: Category::PersonalCare,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "a1",
                "name": "Soap",
                "quantity": 3,
                "purchased": false,
                "createdAt": 1_700_000_000_000_i64,
                "category": "Personal Care"
            })
        );
    }

    #[test]
    fn group_notes_use_category_labels_as_keys() {
        let mut list = GroceryList::seed(Utc.timestamp_millis_opt(0).unwrap());
        list.group_notes.insert(Category::Dairy, "lactose free".into());
        list.group_notes.insert(Category::Bakery, String::new());

        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value["groupNotes"]["Dairy"], "lactose free");

        let back: GroceryList = serde_json::from_value(value).unwrap();
        assert!(back.has_note(Category::Dairy));
        assert!(!back.has_note(Category::Bakery));
        assert_eq!(back.note(Category::Bakery), Some(""));
        assert_eq!(back.note(Category::Meat), None);
    }
}
