use core::{pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use crate::{links, links_mut, AvlTree, Dir, Links};

/// A view into a single position of an [`AvlTree`], which may be either vacant or occupied.
///
/// Created by [`AvlTree::entry`] and [`AvlTree::entry_by`].
pub enum Entry<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    Vacant(VacantEntry<'tree, T>),
    Occupied(OccupiedEntry<'tree, T>),
}

impl<'tree, T> Entry<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(crate) fn vacant(tree: &'tree mut AvlTree<T>, insert_as: InsertAs<T>) -> Self {
        Entry::Vacant(VacantEntry { tree, insert_as })
    }

    pub(crate) fn occupied(tree: &'tree mut AvlTree<T>, node: NonNull<T>) -> Self {
        Entry::Occupied(OccupiedEntry { tree, node })
    }

    /// Returns `true` if the entry holds an element.
    pub fn is_occupied(&self) -> bool {
        matches!(self, Entry::Occupied(_))
    }
}

// Where a vacant entry links a new element in.
pub(crate) enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

impl<T: ?Sized> Clone for InsertAs<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for InsertAs<T> {}

/// A vacant position in an [`AvlTree`].
pub struct VacantEntry<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    tree: &'tree mut AvlTree<T>,
    insert_as: InsertAs<T>,
}

impl<'tree, T> VacantEntry<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Inserts `item` at the position of this entry and rebalances the tree.
    ///
    /// No comparisons are made. If `item` does not order the same way as the key this entry was
    /// looked up with, the tree is left in an unspecified (but memory-safe) order, and later
    /// lookups may fail.
    ///
    /// # Panics
    ///
    /// Panics if the element is not unlinked; see [`Links::is_unlinked`].
    pub fn insert(self, item: T::Handle) -> Pin<&'tree T> {
        let ptr = T::into_ptr(item);

        assert!(
            unsafe { links(ptr).is_unlinked() },
            "element is already linked into a tree"
        );

        unsafe {
            self.tree.link_at(self.insert_as, ptr);
            Pin::new_unchecked(ptr.as_ref())
        }
    }
}

/// An occupied position in an [`AvlTree`].
pub struct OccupiedEntry<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    tree: &'tree mut AvlTree<T>,
    node: NonNull<T>,
}

impl<'tree, T> OccupiedEntry<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Returns a reference to the element in the entry.
    pub fn get(&self) -> Pin<&T> {
        // SAFETY: `self.tree` is mutably borrowed for `'tree`
        unsafe { Pin::new_unchecked(self.node.as_ref()) }
    }

    /// Converts the entry into a reference to its element.
    pub fn into_ref(self) -> Pin<&'tree T> {
        unsafe { Pin::new_unchecked(self.node.as_ref()) }
    }

    /// Returns a pinned mutable reference to the element in the entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure that neither the links nor the ordering of the mutably borrowed
    /// element are modified, as doing so may result in undefined behavior.
    pub unsafe fn get_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: `self.tree` is mutably borrowed for `'tree`, and `self.node` is guaranteed pinned
        // by contract with `Linked`.
        unsafe { Pin::new_unchecked(self.node.as_mut()) }
    }

    /// Puts `item` in the place of the element in the entry, returning the previous element.
    ///
    /// The new element takes over the links and balance factor of the old one, so no rebalancing
    /// takes place. The old element is returned unlinked.
    ///
    /// # Panics
    ///
    /// Panics if the new element is not unlinked; see [`Links::is_unlinked`].
    pub fn replace(&mut self, item: T::Handle) -> T::Handle {
        let new_ptr = T::into_ptr(item);
        let old_ptr = self.node;

        assert!(
            unsafe { links(new_ptr).is_unlinked() },
            "element is already linked into a tree"
        );

        unsafe {
            // Read the old element's links.
            let old_links = links(old_ptr);
            let balance = old_links.balance();
            let parent = old_links.parent();
            let left = old_links.left();
            let right = old_links.right();

            // Link the new element into the tree.
            self.tree
                .replace_child_or_set_root(parent, old_ptr, Some(new_ptr));

            if let Some(left) = left {
                links_mut(left).set_parent(Some(new_ptr));
            }

            if let Some(right) = right {
                links_mut(right).set_parent(Some(new_ptr));
            }

            let new_links = links_mut(new_ptr);
            new_links.set_parent(parent);
            new_links.set_left(left);
            new_links.set_right(right);
            new_links.set_balance(balance);

            links_mut(old_ptr).mark_unlinked();

            // Point this entry at the new element.
            self.node = new_ptr;

            T::from_ptr(old_ptr)
        }
    }

    /// Removes and returns the element in the entry.
    pub fn remove(self) -> T::Handle {
        unsafe { self.tree.remove_at(self.node) }
    }
}
