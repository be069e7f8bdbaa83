use std::marker::PhantomData;
use std::ops::Index;
use std::ops::IndexMut;

/// A vector which can only be indexed by `Key`, so that identifiers of different kinds (domains,
/// propagators, trailed integers) cannot be mixed up.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyedVec<Key, Value> {
    key: PhantomData<Key>,
    elements: Vec<Value>,
}

impl<Key, Value: Clone> Clone for KeyedVec<Key, Value> {
    fn clone(&self) -> Self {
        Self {
            key: PhantomData,
            elements: self.elements.clone(),
        }
    }
}

impl<Key, Value> Default for KeyedVec<Key, Value> {
    fn default() -> Self {
        Self {
            key: PhantomData,
            elements: Vec::new(),
        }
    }
}

impl<Key: StorageKey, Value> KeyedVec<Key, Value> {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Appends the value and returns the key under which it is stored.
    pub fn push(&mut self, value: Value) -> Key {
        self.elements.push(value);
        Key::create_from_index(self.elements.len() - 1)
    }

    pub fn get(&self, key: Key) -> Option<&Value> {
        self.elements.get(key.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &'_ Value> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &'_ mut Value> {
        self.elements.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> {
        (0..self.elements.len()).map(Key::create_from_index)
    }
}

impl<Key: StorageKey, Value: Clone> KeyedVec<Key, Value> {
    /// Makes sure `key` can be used as an index, filling new slots with `default_value`.
    pub fn accomodate(&mut self, key: Key, default_value: Value) {
        if key.index() >= self.elements.len() {
            self.elements.resize(key.index() + 1, default_value);
        }
    }
}

impl<Key: StorageKey, Value> Index<Key> for KeyedVec<Key, Value> {
    type Output = Value;

    fn index(&self, index: Key) -> &Self::Output {
        &self.elements[index.index()]
    }
}

impl<Key: StorageKey, Value> IndexMut<Key> for KeyedVec<Key, Value> {
    fn index_mut(&mut self, index: Key) -> &mut Self::Output {
        &mut self.elements[index.index()]
    }
}

impl StorageKey for usize {
    fn index(&self) -> usize {
        *self
    }

    fn create_from_index(index: usize) -> Self {
        index
    }
}

/// A key which maps to a position in a [`KeyedVec`].
pub trait StorageKey: Clone {
    fn index(&self) -> usize;

    fn create_from_index(index: usize) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_values_are_found_under_the_returned_key() {
        let mut keyed_vec: KeyedVec<usize, &str> = KeyedVec::default();
        let first = keyed_vec.push("first");
        let second = keyed_vec.push("second");

        assert_eq!("first", keyed_vec[first]);
        assert_eq!("second", keyed_vec[second]);
        assert_eq!(vec![0, 1], keyed_vec.keys().collect::<Vec<_>>());
    }

    #[test]
    fn accomodate_only_grows() {
        let mut keyed_vec: KeyedVec<usize, bool> = KeyedVec::default();
        keyed_vec.accomodate(3, false);
        keyed_vec[3] = true;
        keyed_vec.accomodate(1, false);

        assert_eq!(4, keyed_vec.len());
        assert!(keyed_vec[3]);
    }
}
