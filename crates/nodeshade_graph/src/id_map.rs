// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered associative container keyed by stable integer ids.
//!
//! Ids and elements live in two parallel vectors; the id vector is kept
//! strictly increasing so lookups are a binary search and iteration is in
//! id order.

/// Associative container with sorted ids and parallel elements.
#[derive(Debug, Clone, PartialEq)]
pub struct IdMap<K, T> {
    ids: Vec<K>,
    elements: Vec<T>,
}

impl<K: Copy + Ord, T> IdMap<K, T> {
    /// Create a new empty map
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            elements: Vec::new(),
        }
    }

    /// Insert an element under `id`.
    ///
    /// Returns the stored element and whether the insertion happened. An
    /// existing id is left untouched and its current element is returned.
    pub fn insert(&mut self, id: K, element: T) -> (&mut T, bool) {
        match self.ids.binary_search(&id) {
            Ok(index) => (&mut self.elements[index], false),
            Err(index) => {
                self.ids.insert(index, id);
                self.elements.insert(index, element);
                (&mut self.elements[index], true)
            }
        }
    }

    /// Remove the element under `id`, returning how many were removed (0 or 1)
    pub fn erase(&mut self, id: K) -> usize {
        self.remove(id).map_or(0, |_| 1)
    }

    /// Remove and return the element under `id`
    pub fn remove(&mut self, id: K) -> Option<T> {
        let index = self.ids.binary_search(&id).ok()?;
        self.ids.remove(index);
        Some(self.elements.remove(index))
    }

    /// Get an element by id
    pub fn get(&self, id: K) -> Option<&T> {
        self.ids
            .binary_search(&id)
            .ok()
            .map(|index| &self.elements[index])
    }

    /// Get a mutable element by id
    pub fn get_mut(&mut self, id: K) -> Option<&mut T> {
        match self.ids.binary_search(&id) {
            Ok(index) => Some(&mut self.elements[index]),
            Err(_) => None,
        }
    }

    /// Check whether `id` is present
    pub fn contains(&self, id: K) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Number of stored elements
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.ids.clear();
        self.elements.clear();
    }

    /// Ids in ascending order
    pub fn ids(&self) -> &[K] {
        &self.ids
    }

    /// Elements in id order
    pub fn values(&self) -> &[T] {
        &self.elements
    }

    /// Iterate `(id, element)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.ids.iter().copied().zip(self.elements.iter())
    }
}

impl<K: Copy + Ord, T> Default for IdMap<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_ids_sorted() {
        let mut map = IdMap::new();
        for id in [5u32, 1, 9, 3] {
            let (_, inserted) = map.insert(id, id * 10);
            assert!(inserted);
        }
        assert_eq!(map.ids(), &[1, 3, 5, 9]);
        assert_eq!(map.values(), &[10, 30, 50, 90]);
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut map = IdMap::new();
        map.insert(2u32, "first");
        let (current, inserted) = map.insert(2, "second");
        assert!(!inserted);
        assert_eq!(*current, "first");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_erase() {
        let mut map = IdMap::new();
        map.insert(1u32, 'a');
        map.insert(2, 'b');
        assert_eq!(map.erase(1), 1);
        assert_eq!(map.erase(1), 0);
        assert!(!map.contains(1));
        assert_eq!(map.get(2), Some(&'b'));
        assert_eq!(map.ids().len(), map.values().len());
    }

    #[test]
    fn test_get_mut_and_clear() {
        let mut map = IdMap::new();
        map.insert(7u32, 1.0f32);
        if let Some(v) = map.get_mut(7) {
            *v = 2.5;
        }
        assert_eq!(map.get(7), Some(&2.5));
        assert!(map.get_mut(8).is_none());

        map.clear();
        assert!(map.is_empty());
    }
}
