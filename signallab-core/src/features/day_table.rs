//! Day-keyed ordered table with oldest-first eviction.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Ordered mapping day → value capped at `capacity` rows.
///
/// Inserting past capacity evicts the oldest days. Re-inserting an existing
/// day replaces its value in place and never evicts.
#[derive(Debug, Clone, PartialEq)]
pub struct DayTable<V> {
    rows: BTreeMap<NaiveDate, V>,
    capacity: usize,
}

impl<V> DayTable<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: BTreeMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() == self.capacity
    }

    /// Insert (or replace) a row, then evict oldest rows beyond capacity.
    pub fn insert(&mut self, day: NaiveDate, value: V) {
        self.rows.insert(day, value);
        while self.rows.len() > self.capacity {
            self.rows.pop_first();
        }
    }

    pub fn get(&self, day: &NaiveDate) -> Option<&V> {
        self.rows.get(day)
    }

    pub fn contains(&self, day: &NaiveDate) -> bool {
        self.rows.contains_key(day)
    }

    /// Most recent row at or before `day`.
    pub fn latest_at_or_before(&self, day: NaiveDate) -> Option<(NaiveDate, &V)> {
        self.rows.range(..=day).next_back().map(|(d, v)| (*d, v))
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.rows.keys().next().copied()
    }

    pub fn last(&self) -> Option<(NaiveDate, &V)> {
        self.rows.iter().next_back().map(|(d, v)| (*d, v))
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &V)> + '_ {
        self.rows.iter().map(|(d, v)| (*d, v))
    }

    /// Drop every row dated before `day`.
    pub fn retain_from(&mut self, day: NaiveDate) {
        self.rows = self.rows.split_off(&day);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
