//! Normalization of persisted collections into the current schema.
//!
//! Older documents may carry items without a `category`, a legacy per-item
//! `notes` field, lists without `groupNotes`, or quantities outside the
//! allowed range. [`migrate`] rewrites such a document into canonical form:
//!
//! - items lacking a known category are filed under `Other`;
//! - fields outside the schema are dropped from items and lists;
//! - `groupNotes` becomes an object holding only known categories with
//!   string values;
//! - quantities are clamped into `1..=99`;
//! - names are trimmed. Blank list names become the default name and items
//!   with blank names are dropped.
//!
//! A record that still cannot be read, such as an item without an `id`, is
//! skipped with a warning and the rest of the document is kept.
//!
//! Migration is idempotent: feeding the canonical output back in yields the
//! same lists with `changed == false`, so callers only rewrite storage when a
//! document actually needed fixing.

use log::warn;
use serde_json::{Map, Value};

use crate::model::{
    clamp_quantity, normalize_name, Category, GroceryList, Item, DEFAULT_LIST_NAME, MIN_QUANTITY,
};
use crate::{CoreError, CoreResult};

const ITEM_FIELDS: [&str; 6] = ["id", "name", "quantity", "purchased", "createdAt", "category"];
const LIST_FIELDS: [&str; 5] = ["id", "name", "items", "createdAt", "groupNotes"];

/// Result of migrating a persisted collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    /// Lists in canonical form, in stored order. Never empty.
    pub lists: Vec<GroceryList>,
    /// Whether the canonical form differs from the input document.
    pub changed: bool,
}

/// Migrate a raw persisted document into typed lists.
///
/// Returns [`CoreError::Migration`] when the document cannot be salvaged:
/// it is not an array or none of its lists can be read.
pub fn migrate(raw: &Value) -> CoreResult<Migration> {
    let Value::Array(records) = raw else {
        return Err(CoreError::Migration("expected an array of lists".into()));
    };
    let lists: Vec<GroceryList> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match migrate_list(record) {
            Ok(list) => Some(list),
            Err(err) => {
                warn!("event=migrate_list module=migration status=skipped index={index} error={err}");
                None
            }
        })
        .collect();
    if lists.is_empty() {
        return Err(CoreError::Migration("collection holds no usable lists".into()));
    }
    let canonical =
        serde_json::to_value(&lists).map_err(|err| CoreError::Migration(err.to_string()))?;
    Ok(Migration {
        changed: canonical != *raw,
        lists,
    })
}

fn migrate_list(raw: &Value) -> CoreResult<GroceryList> {
    let Value::Object(fields) = raw else {
        return Err(CoreError::Migration("list record is not an object".into()));
    };
    let mut list = retain_fields(fields, &LIST_FIELDS);

    let name = list
        .get("name")
        .and_then(Value::as_str)
        .and_then(normalize_name)
        .unwrap_or_else(|| DEFAULT_LIST_NAME.to_string());
    list.insert("name".into(), Value::from(name));

    let items = match list.remove("items") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, record)| match migrate_item(record) {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!("event=migrate_item module=migration status=skipped index={index} error={err}");
                    None
                }
            })
            .collect(),
        Some(_) => return Err(CoreError::Migration("list items are not an array".into())),
        None => Vec::new(),
    };
    list.insert("items".into(), Value::Array(Vec::new()));

    let notes = match list.remove("groupNotes") {
        Some(Value::Object(notes)) => notes
            .into_iter()
            .filter(|(key, value)| Category::from_label(key).is_some() && value.is_string())
            .collect(),
        _ => Map::new(),
    };
    list.insert("groupNotes".into(), Value::Object(notes));

    let mut list: GroceryList = serde_json::from_value(Value::Object(list))
        .map_err(|err| CoreError::Migration(err.to_string()))?;
    list.items = items;
    Ok(list)
}

fn migrate_item(raw: &Value) -> CoreResult<Item> {
    let Value::Object(fields) = raw else {
        return Err(CoreError::Migration("item record is not an object".into()));
    };
    let mut item = retain_fields(fields, &ITEM_FIELDS);

    let name = item
        .get("name")
        .and_then(Value::as_str)
        .and_then(normalize_name)
        .ok_or_else(|| CoreError::Migration("item has a blank name".into()))?;
    item.insert("name".into(), Value::from(name));

    let category = item
        .get("category")
        .and_then(Value::as_str)
        .and_then(Category::from_label)
        .unwrap_or(Category::Other);
    item.insert("category".into(), Value::from(category.label()));

    let quantity = item.get("quantity").map_or(i64::from(MIN_QUANTITY), quantity_of);
    item.insert("quantity".into(), Value::from(clamp_quantity(quantity)));

    if !item.get("purchased").is_some_and(Value::is_boolean) {
        item.insert("purchased".into(), Value::Bool(false));
    }

    serde_json::from_value(Value::Object(item)).map_err(|err| CoreError::Migration(err.to_string()))
}

#[allow(clippy::cast_possible_truncation)]
fn quantity_of(value: &Value) -> i64 {
    if let Some(whole) = value.as_i64() {
        return whole;
    }
    if let Some(fraction) = value.as_f64() {
        return fraction.round() as i64;
    }
    value
        .as_str()
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(i64::from(MIN_QUANTITY))
}

fn retain_fields(fields: &Map<String, Value>, allowed: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
