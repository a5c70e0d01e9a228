//! The state store: every list, the transient UI selectors, and the only
//! mutation surface over them.
//!
//! Each transition clones the current [`Snapshot`], edits the clone and
//! swaps it in. Lists sit behind an `Arc`, so selector-only transitions
//! never copy items and a snapshot handed out earlier keeps its contents.
//!
//! Transitions are total. Blank names, unknown ids and attempts to delete
//! the last list are ignored and reported as [`Outcome::Ignored`].

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::migration::migrate;
use crate::model::{
    clamp_quantity, normalize_name, Category, Filter, GroceryList, Item, ItemId, ListId,
};
use crate::services::{Clock, IdGenerator};
use crate::views::{self, CategoryGroup, ListSummary, Stats};
use crate::ListRepository;

/// Whether a transition changed anything.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        self == Outcome::Applied
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Change {
    None,
    Selectors,
    Collection,
}

/// One immutable state of the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    lists: Arc<Vec<GroceryList>>,
    current_list_id: ListId,
    filter: Filter,
    editing_item_id: Option<ItemId>,
    dragged_item_id: Option<ItemId>,
    drag_over_item_id: Option<ItemId>,
    expanded_note_groups: BTreeSet<Category>,
}

impl Snapshot {
    /// Build a snapshot over `lists`, selecting the first one.
    ///
    /// An empty collection is replaced by `seed` so at least one list exists.
    fn new(mut lists: Vec<GroceryList>, seed: impl FnOnce() -> GroceryList) -> Self {
        if lists.is_empty() {
            lists.push(seed());
        }
        let current_list_id = lists[0].id.clone();
        Self {
            lists: Arc::new(lists),
            current_list_id,
            filter: Filter::default(),
            editing_item_id: None,
            dragged_item_id: None,
            drag_over_item_id: None,
            expanded_note_groups: BTreeSet::new(),
        }
    }

    /// All lists in insertion order. Never empty.
    pub fn lists(&self) -> &[GroceryList] {
        &self.lists
    }

    pub fn current_list_id(&self) -> &ListId {
        &self.current_list_id
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn editing_item_id(&self) -> Option<&ItemId> {
        self.editing_item_id.as_ref()
    }

    pub fn dragged_item_id(&self) -> Option<&ItemId> {
        self.dragged_item_id.as_ref()
    }

    pub fn drag_over_item_id(&self) -> Option<&ItemId> {
        self.drag_over_item_id.as_ref()
    }

    pub fn is_group_expanded(&self, category: Category) -> bool {
        self.expanded_note_groups.contains(&category)
    }

    pub fn expanded_note_groups(&self) -> &BTreeSet<Category> {
        &self.expanded_note_groups
    }

    /// The selected list, or the first list when the selection is stale.
    pub fn current_list(&self) -> &GroceryList {
        views::current_list(&self.lists, &self.current_list_id).unwrap_or(&self.lists[0])
    }

    pub fn filtered_items(&self) -> Vec<&Item> {
        views::filtered_items(self.current_list(), self.filter)
    }

    pub fn grouped_by_category(&self) -> Vec<CategoryGroup<'_>> {
        views::grouped_by_category(&self.filtered_items())
    }

    pub fn stats(&self) -> Stats {
        views::stats(self.current_list())
    }

    pub fn has_note(&self, category: Category) -> bool {
        self.current_list().has_note(category)
    }

    /// Look a list up by exact id, then by case-insensitive name.
    pub fn find_list(&self, key: &str) -> Option<&GroceryList> {
        let key = key.trim();
        self.lists
            .iter()
            .find(|list| list.id.as_str() == key)
            .or_else(|| {
                self.lists
                    .iter()
                    .find(|list| list.name.eq_ignore_ascii_case(key))
            })
    }

    /// The list holding `id`, searching every list.
    pub fn list_containing(&self, id: &ItemId) -> Option<&GroceryList> {
        self.lists.iter().find(|list| list.position(id).is_some())
    }

    pub fn list_summaries(&self) -> Vec<ListSummary<'_>> {
        views::list_summaries(&self.lists, &self.current_list_id)
    }

    fn current_index(&self) -> usize {
        self.lists
            .iter()
            .position(|list| list.id == self.current_list_id)
            .unwrap_or(0)
    }

    fn current_list_mut(&mut self) -> &mut GroceryList {
        let index = self.current_index();
        &mut Arc::make_mut(&mut self.lists)[index]
    }

    fn clear_item_selectors(&mut self) {
        self.editing_item_id = None;
        self.dragged_item_id = None;
        self.drag_over_item_id = None;
    }

    fn forget_item(&mut self, id: &ItemId) {
        for slot in [
            &mut self.editing_item_id,
            &mut self.dragged_item_id,
            &mut self.drag_over_item_id,
        ] {
            if slot.as_ref() == Some(id) {
                *slot = None;
            }
        }
    }

    fn reorder(&mut self, dragged: &ItemId, target: &ItemId) -> Change {
        if dragged == target {
            return Change::None;
        }
        let list = self.current_list();
        let (Some(from), Some(to)) = (list.position(dragged), list.position(target)) else {
            return Change::None;
        };
        let items = &mut self.current_list_mut().items;
        let item = items.remove(from);
        items.insert(to, item);
        Change::Collection
    }
}

/// Owner of the current snapshot and the services transitions depend on.
pub struct Store {
    snapshot: Arc<Snapshot>,
    ids: Box<dyn IdGenerator>,
    clock: Box<dyn Clock>,
    repository: Option<Box<dyn ListRepository>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("snapshot", &self.snapshot)
            .field("persistent", &self.repository.is_some())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// In-memory store over `lists`, seeded with the default list if empty.
    pub fn new(
        lists: Vec<GroceryList>,
        ids: Box<dyn IdGenerator>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let snapshot = Snapshot::new(lists, || GroceryList::seed(clock.now()));
        Self {
            snapshot: Arc::new(snapshot),
            ids,
            clock,
            repository: None,
        }
    }

    /// Load the collection from `repository` and persist every later change
    /// back into it.
    ///
    /// Missing or unreadable documents fall back to the default list, and an
    /// unreadable one is backed up first. A document that needed migration is
    /// written back once in canonical form.
    pub fn load(
        repository: Box<dyn ListRepository>,
        ids: Box<dyn IdGenerator>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let (lists, migrated) = match repository.load_raw() {
            Ok(Some(raw)) => match migrate(&raw) {
                Ok(migration) => (migration.lists, migration.changed),
                Err(err) => {
                    warn!("event=store_load module=store status=fallback reason=migration error={err}");
                    back_up(repository.as_ref());
                    (Vec::new(), false)
                }
            },
            Ok(None) => {
                info!("event=store_load module=store status=seeded reason=absent");
                (Vec::new(), false)
            }
            Err(err) => {
                warn!("event=store_load module=store status=fallback reason=storage error={err}");
                back_up(repository.as_ref());
                (Vec::new(), false)
            }
        };

        let mut store = Self::new(lists, ids, clock);
        store.repository = Some(repository);
        info!(
            "event=store_load module=store status=ok lists={} migrated={migrated}",
            store.snapshot.lists.len()
        );
        if migrated {
            store.persist("migrate");
        }
        store
    }

    /// The current snapshot. Later transitions never modify it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Borrow the current snapshot without bumping the reference count.
    pub fn state(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Add an item to the top of the current list and return its id.
    ///
    /// Blank names are ignored; the quantity is clamped into `1..=99`.
    pub fn add_item(&mut self, name: &str, quantity: i64, category: Category) -> Option<ItemId> {
        let name = normalize_name(name)?;
        let item = Item {
            id: ItemId::new(self.ids.next_id()),
            name,
            quantity: clamp_quantity(quantity),
            purchased: false,
            created_at: self.clock.now(),
            category,
        };
        let id = item.id.clone();
        let outcome = self.apply("add_item", |next| {
            next.current_list_mut().items.insert(0, item);
            Change::Collection
        });
        outcome.is_applied().then_some(id)
    }

    /// Flip the purchased flag of an item in the current list.
    pub fn toggle_item(&mut self, id: &ItemId) -> Outcome {
        self.apply("toggle_item", |next| {
            let Some(index) = next.current_list().position(id) else {
                return Change::None;
            };
            let item = &mut next.current_list_mut().items[index];
            item.purchased = !item.purchased;
            Change::Collection
        })
    }

    pub fn delete_item(&mut self, id: &ItemId) -> Outcome {
        self.apply("delete_item", |next| {
            let Some(index) = next.current_list().position(id) else {
                return Change::None;
            };
            next.current_list_mut().items.remove(index);
            next.forget_item(id);
            Change::Collection
        })
    }

    /// Mark an item of the current list as being edited.
    pub fn begin_edit(&mut self, id: &ItemId) -> Outcome {
        self.apply("begin_edit", |next| {
            if next.current_list().position(id).is_none()
                || next.editing_item_id.as_ref() == Some(id)
            {
                return Change::None;
            }
            next.editing_item_id = Some(id.clone());
            Change::Selectors
        })
    }

    pub fn cancel_edit(&mut self) -> Outcome {
        self.apply("cancel_edit", |next| {
            if next.editing_item_id.take().is_some() {
                Change::Selectors
            } else {
                Change::None
            }
        })
    }

    /// Rename and requantify an item, ending the edit.
    ///
    /// A blank name removes the item instead of renaming it. Category, id,
    /// purchase status and creation time are kept.
    pub fn save_edit(&mut self, id: &ItemId, name: &str, quantity: i64) -> Outcome {
        self.apply("save_edit", |next| {
            let cleared = if next.editing_item_id.take().is_some() {
                Change::Selectors
            } else {
                Change::None
            };
            let Some(index) = next.current_list().position(id) else {
                return cleared;
            };
            let items = &mut next.current_list_mut().items;
            match normalize_name(name) {
                Some(name) => {
                    let item = &mut items[index];
                    item.name = name;
                    item.quantity = clamp_quantity(quantity);
                }
                None => {
                    items.remove(index);
                    next.forget_item(id);
                }
            }
            Change::Collection
        })
    }

    /// Move `dragged` into the slot `target` occupies before the move.
    pub fn reorder_item(&mut self, dragged: &ItemId, target: &ItemId) -> Outcome {
        self.apply("reorder_item", |next| next.reorder(dragged, target))
    }

    /// Start dragging an item of the current list.
    pub fn begin_drag(&mut self, id: &ItemId) -> Outcome {
        self.apply("begin_drag", |next| {
            if next.current_list().position(id).is_none() {
                return Change::None;
            }
            next.dragged_item_id = Some(id.clone());
            next.drag_over_item_id = None;
            Change::Selectors
        })
    }

    /// Highlight `id` as the drop target while a different item is dragged.
    pub fn drag_over(&mut self, id: &ItemId) -> Outcome {
        self.apply("drag_over", |next| {
            let hovering = match next.dragged_item_id.as_ref() {
                Some(dragged) => dragged != id && next.current_list().position(id).is_some(),
                None => false,
            };
            if !hovering || next.drag_over_item_id.as_ref() == Some(id) {
                return Change::None;
            }
            next.drag_over_item_id = Some(id.clone());
            Change::Selectors
        })
    }

    pub fn drag_leave(&mut self) -> Outcome {
        self.apply("drag_leave", |next| {
            if next.drag_over_item_id.take().is_some() {
                Change::Selectors
            } else {
                Change::None
            }
        })
    }

    /// Drop the dragged item onto `target` and end the drag.
    pub fn drop_on(&mut self, target: &ItemId) -> Outcome {
        self.apply("drop_on", |next| {
            let hovered = next.drag_over_item_id.take();
            let Some(dragged) = next.dragged_item_id.take() else {
                return if hovered.is_some() {
                    Change::Selectors
                } else {
                    Change::None
                };
            };
            next.reorder(&dragged, target).max(Change::Selectors)
        })
    }

    /// End a drag without reordering.
    pub fn end_drag(&mut self) -> Outcome {
        self.apply("end_drag", |next| {
            let dragged = next.dragged_item_id.take();
            let hovered = next.drag_over_item_id.take();
            if dragged.is_some() || hovered.is_some() {
                Change::Selectors
            } else {
                Change::None
            }
        })
    }

    pub fn toggle_group_expanded(&mut self, category: Category) -> Outcome {
        self.apply("toggle_group_expanded", |next| {
            if !next.expanded_note_groups.remove(&category) {
                next.expanded_note_groups.insert(category);
            }
            Change::Selectors
        })
    }

    /// Store `text` as the current list's note for `category`.
    ///
    /// An empty string is stored as-is and stays distinct from no note.
    pub fn set_group_note(&mut self, category: Category, text: &str) -> Outcome {
        self.apply("set_group_note", |next| {
            if next.current_list().note(category) == Some(text) {
                return Change::None;
            }
            next.current_list_mut()
                .group_notes
                .insert(category, text.to_string());
            Change::Collection
        })
    }

    /// Append a new empty list, select it and return its id.
    pub fn create_list(&mut self, name: &str) -> Option<ListId> {
        let name = normalize_name(name)?;
        let list = GroceryList::new(ListId::new(self.ids.next_id()), name, self.clock.now());
        let id = list.id.clone();
        let outcome = self.apply("create_list", |next| {
            Arc::make_mut(&mut next.lists).push(list);
            next.current_list_id = id.clone();
            next.clear_item_selectors();
            Change::Collection
        });
        outcome.is_applied().then_some(id)
    }

    /// Remove a list unless it is the only one left.
    ///
    /// Removing the selected list selects the first remaining one.
    pub fn delete_list(&mut self, id: &ListId) -> Outcome {
        self.apply("delete_list", |next| {
            let Some(index) = next.lists.iter().position(|list| &list.id == id) else {
                return Change::None;
            };
            if next.lists.len() == 1 {
                info!("event=delete_list module=store status=refused reason=last_list");
                return Change::None;
            }
            let was_current = next.current_list().id == *id;
            let lists = Arc::make_mut(&mut next.lists);
            lists.remove(index);
            if was_current {
                next.current_list_id = lists[0].id.clone();
                next.clear_item_selectors();
            }
            Change::Collection
        })
    }

    pub fn rename_list(&mut self, id: &ListId, name: &str) -> Outcome {
        let Some(name) = normalize_name(name) else {
            return Outcome::Ignored;
        };
        self.apply("rename_list", |next| {
            let Some(index) = next.lists.iter().position(|list| &list.id == id) else {
                return Change::None;
            };
            if next.lists[index].name == name {
                return Change::None;
            }
            Arc::make_mut(&mut next.lists)[index].name = name;
            Change::Collection
        })
    }

    /// Select another list. Edit and drag state belong to the old list and
    /// are cleared.
    pub fn set_current_list(&mut self, id: &ListId) -> Outcome {
        self.apply("set_current_list", |next| {
            if next.current_list().id == *id || !next.lists.iter().any(|list| &list.id == id) {
                return Change::None;
            }
            next.current_list_id = id.clone();
            next.clear_item_selectors();
            Change::Selectors
        })
    }

    pub fn set_filter(&mut self, filter: Filter) -> Outcome {
        self.apply("set_filter", |next| {
            if next.filter == filter {
                return Change::None;
            }
            next.filter = filter;
            Change::Selectors
        })
    }

    fn apply(&mut self, op: &'static str, transition: impl FnOnce(&mut Snapshot) -> Change) -> Outcome {
        let mut next = Snapshot::clone(&self.snapshot);
        let change = transition(&mut next);
        if change == Change::None {
            debug!("event=transition module=store status=ignored op={op}");
            return Outcome::Ignored;
        }
        self.snapshot = Arc::new(next);
        debug!("event=transition module=store status=applied op={op}");
        if change == Change::Collection {
            self.persist(op);
        }
        Outcome::Applied
    }

    fn persist(&self, op: &'static str) {
        let Some(repository) = &self.repository else {
            return;
        };
        if let Err(err) = repository.save(self.snapshot.lists()) {
            warn!("event=persist module=store status=error op={op} error={err}");
        }
    }
}

fn back_up(repository: &dyn ListRepository) {
    if let Err(err) = repository.back_up() {
        warn!("event=store_backup module=store status=error error={err}");
    }
}
