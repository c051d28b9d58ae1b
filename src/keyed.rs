use std::collections::HashMap;
use std::ops::Index;

use crate::error::MapError;

/// Named values in insertion order with O(1) lookup by name.
#[derive(Debug, Clone)]
pub struct Keyed<T> {
    items: Vec<T>,
    by_name: HashMap<String, usize>,
    kind: &'static str,
}

impl<T> Keyed<T> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Keyed {
            items: Vec::new(),
            by_name: HashMap::new(),
            kind,
        }
    }

    /// Appends `item`; fails if `name` is already taken.
    pub(crate) fn insert(&mut self, name: &str, item: T) -> Result<usize, MapError> {
        if self.by_name.contains_key(name) {
            return Err(MapError::DuplicateKey {
                kind: self.kind,
                name: name.to_owned(),
            });
        }
        let idx = self.items.len();
        self.by_name.insert(name.to_owned(), idx);
        self.items.push(item);
        Ok(idx)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).map(|&i| &self.items[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Index<usize> for Keyed<T> {
    type Output = T;

    fn index(&self, idx: usize) -> &T {
        &self.items[idx]
    }
}

impl<'a, T> IntoIterator for &'a Keyed<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
