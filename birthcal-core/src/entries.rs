//! Display-side storage and ordering of birthday entries.

use std::cmp::Ordering;
use std::sync::{PoisonError, RwLock};

use crate::contact::BirthdayEntry;

/// The entry list shown to users, replaced wholesale after each sync.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: RwLock<Vec<BirthdayEntry>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, entries: Vec<BirthdayEntry>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    /// Copy of the current list, safe to sort and render.
    pub fn snapshot(&self) -> Vec<BirthdayEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Column the upcoming birthdays view is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    Name,
    #[default]
    Date,
    Age,
}

/// Sort entries for display.
///
/// - `Date`: next occurrence, ties broken by name
/// - `Name`: case-insensitive
/// - `Age`: age reached next; unknown ages sort after known ones
///
/// `ascending == false` reverses the whole order.
pub fn sort_entries(entries: &mut [BirthdayEntry], column: SortColumn, ascending: bool) {
    entries.sort_by(|a, b| {
        let ordering = compare(a, b, column);
        if ascending { ordering } else { ordering.reverse() }
    });
}

fn compare(a: &BirthdayEntry, b: &BirthdayEntry, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortColumn::Age => match (a.year_known, b.year_known) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.age_next.cmp(&b.age_next),
        },
        SortColumn::Date => a
            .next_occurrence
            .cmp(&b.next_occurrence)
            .then_with(|| a.name.cmp(&b.name)),
    }
}
