//! An ordered map whose entries are boxed [`AvlTree`] elements.

use alloc::boxed::Box;
use core::{borrow::Borrow, fmt, marker::PhantomPinned, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Iter, Links, TreeNode};

/// An ordered map based on an [AVL tree].
///
/// Unlike `BTreeMap`, inserting a key which is already present does not replace the existing
/// value: the new pair is handed back instead.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord, V> {
    tree: AvlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K, V> MapNode<K, V> {
    fn into_pair(self: Box<Self>) -> (K, V) {
        let MapNode { key, value, .. } = *self;
        (key, value)
    }
}

impl<K: Ord, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .get(key)
            .map(|node| &Pin::get_ref(node).value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self
            .tree
            .find_raw(&mut |node: &MapNode<K, V>| key.cmp(node.key.borrow()))?;

        // SAFETY: `self` is mutably borrowed, and pinning is not structural for `node.value`.
        unsafe { Some(&mut *core::ptr::addr_of_mut!((*node.as_ptr()).value)) }
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains `key`, the map is not modified and the pair is returned.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), (K, V)> {
        let node = Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        });

        self.tree
            .insert(node)
            .map(drop)
            .map_err(|dup| dup.into_item().into_pair())
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = Pin::get_ref(node);
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(MapNode::into_pair)
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = Pin::get_ref(node);
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(MapNode::into_pair)
    }

    /// Removes the value associated with `key` from the map.
    ///
    /// Returns `None` if the map does not contain `key`.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|node| node.into_pair().1)
    }

    /// Returns an iterator over the key-value pairs of the map, in ascending key order.
    pub fn iter(&self) -> MapIter<'_, K, V> {
        MapIter {
            inner: self.tree.iter(),
        }
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

impl<K: Ord, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// An iterator over the key-value pairs of an [`AvlMap`].
pub struct MapIter<'map, K, V> {
    inner: Iter<'map, MapNode<K, V>>,
}

impl<'map, K, V> Iterator for MapIter<'map, K, V> {
    type Item = (&'map K, &'map V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|node| (&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicates() {
        let mut map = AvlMap::new();

        assert_eq!(map.insert(1, "one"), Ok(()));
        assert_eq!(map.insert(1, "uno"), Err((1, "uno")));
        assert_eq!(map.get(&1), Some(&"one"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_missing_key_is_none() {
        let mut map = AvlMap::new();

        map.insert(3, 'c').unwrap();
        map.insert(1, 'a').unwrap();

        assert_eq!(map.remove(&2), None);
        assert_eq!(map.remove(&3), Some('c'));
        assert_eq!(map.remove(&3), None);
        assert!(!map.contains_key(&3));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn get_mut_updates_value() {
        let mut map = AvlMap::new();

        for key in 0..16u32 {
            map.insert(key, key * 10).unwrap();
        }

        *map.get_mut(&7).unwrap() += 1;
        assert_eq!(map.get(&7), Some(&71));
        assert_eq!(map.get_mut(&16), None);
    }

    #[test]
    fn first_last_and_pop() {
        let mut map = AvlMap::new();

        for key in [5, 3, 8, 1, 4, 7, 9] {
            map.insert(key, key).unwrap();
        }

        assert_eq!(map.first_key_value(), Some((&1, &1)));
        assert_eq!(map.last_key_value(), Some((&9, &9)));
        assert_eq!(map.pop_first(), Some((1, 1)));
        assert_eq!(map.pop_last(), Some((9, 9)));

        let keys: alloc::vec::Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, [3, 4, 5, 7, 8]);

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.first_key_value(), None);
    }
}
