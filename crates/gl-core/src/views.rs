//! Read-only views computed from a collection and its selectors.

use crate::model::{Category, Filter, GroceryList, Item, ListId};

/// Purchase counters over the unfiltered items of a list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub done: usize,
    pub remaining: usize,
}

/// Items of one category, in list order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryGroup<'a> {
    pub category: Category,
    pub items: Vec<&'a Item>,
}

impl CategoryGroup<'_> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One row of a list picker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListSummary<'a> {
    pub id: &'a ListId,
    pub name: &'a str,
    pub item_count: usize,
    pub is_current: bool,
}

/// Resolve `current`, falling back to the first list when it does not match.
///
/// Returns `None` only for an empty slice.
pub fn current_list<'a>(lists: &'a [GroceryList], current: &ListId) -> Option<&'a GroceryList> {
    lists
        .iter()
        .find(|list| &list.id == current)
        .or_else(|| lists.first())
}

/// Items of `list` visible under `filter`, order preserved.
pub fn filtered_items(list: &GroceryList, filter: Filter) -> Vec<&Item> {
    list.items
        .iter()
        .filter(|item| filter.matches(item.purchased))
        .collect()
}

/// Bucket items by category following [`Category::ALL`].
///
/// Every category gets a bucket, empty or not; hiding empty groups is left
/// to the renderer.
pub fn grouped_by_category<'a>(items: &[&'a Item]) -> Vec<CategoryGroup<'a>> {
    Category::ALL
        .into_iter()
        .map(|category| CategoryGroup {
            category,
            items: items
                .iter()
                .copied()
                .filter(|item| item.category == category)
                .collect(),
        })
        .collect()
}

pub fn stats(list: &GroceryList) -> Stats {
    let total = list.items.len();
    let done = list.items.iter().filter(|item| item.purchased).count();
    Stats {
        total,
        done,
        remaining: total - done,
    }
}

pub fn list_summaries<'a>(lists: &'a [GroceryList], current: &ListId) -> Vec<ListSummary<'a>> {
    let current = current_list(lists, current).map(|list| &list.id);
    lists
        .iter()
        .map(|list| ListSummary {
            id: &list.id,
            name: &list.name,
            item_count: list.items.len(),
            is_current: Some(&list.id) == current,
        })
        .collect()
}
