//! Core domain entities, state transitions and derived views for grocery lists.

use serde_json::Value;
use thiserror::Error;

pub mod migration;
pub mod model;
pub mod services;
pub mod store;
pub mod views;

pub use migration::{migrate, Migration};
pub use model::{
    clamp_quantity, normalize_name, Category, Filter, GroceryList, Item, ItemId, ListId,
    DEFAULT_LIST_ID, DEFAULT_LIST_NAME, MAX_QUANTITY, MIN_QUANTITY,
};
pub use services::{Clock, FixedClock, IdGenerator, SequentialIds, SystemClock, UuidGenerator};
pub use store::{Outcome, Snapshot, Store};
pub use views::{CategoryGroup, ListSummary, Stats};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by core validation and domain rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Returned when user input cannot be interpreted.
    #[error("validation error: {0}")]
    Validation(String),
    /// Returned when repository operations fail.
    #[error("storage error: {0}")]
    Storage(String),
    /// Returned when a persisted document cannot be brought to the current schema.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Persistence abstraction for the list collection.
pub trait ListRepository {
    /// Read the stored document as untyped JSON, or `None` when nothing is stored.
    ///
    /// The store migrates the document itself, so implementations must not
    /// reject records that merely use an older schema.
    fn load_raw(&self) -> CoreResult<Option<Value>>;
    /// Replace the stored document with `lists`.
    fn save(&self, lists: &[GroceryList]) -> CoreResult<()>;
    /// Keep a copy of the stored document before it is replaced by a seed.
    fn back_up(&self) -> CoreResult<()> {
        Ok(())
    }
}
