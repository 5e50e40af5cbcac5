//! An intrusive, nonrecursive AVL tree.
//!
//! Elements embed a [`Links`] field and implement [`cordyceps::Linked`], which tells the tree how
//! to move ownership of an element in and out and how to reach its links. The tree itself never
//! allocates or frees anything: it only rewires the links of elements it has been handed.
//!
//! Traversal uses parent links alone. No operation recurses or keeps an auxiliary stack, and the
//! only per-node bookkeeping beyond the three links is a signed balance factor.
//!
//! # Examples
//!
//! ```
//! use core::ptr::{self, NonNull};
//!
//! use cordyceps::Linked;
//! use cordyceps_avl::{AvlTree, Links, TreeNode};
//!
//! struct Item {
//!     links: Links<Item>,
//!     key: u32,
//! }
//!
//! unsafe impl Linked<Links<Item>> for Item {
//!     type Handle = Box<Item>;
//!
//!     fn into_ptr(item: Box<Item>) -> NonNull<Item> {
//!         NonNull::from(Box::leak(item))
//!     }
//!
//!     unsafe fn from_ptr(ptr: NonNull<Item>) -> Box<Item> {
//!         Box::from_raw(ptr.as_ptr())
//!     }
//!
//!     unsafe fn links(ptr: NonNull<Item>) -> NonNull<Links<Item>> {
//!         let ptr = ptr.as_ptr();
//!         NonNull::new_unchecked(ptr::addr_of_mut!((*ptr).links))
//!     }
//! }
//!
//! impl TreeNode<Links<Item>> for Item {
//!     type Key = u32;
//!
//!     fn key(&self) -> &u32 {
//!         &self.key
//!     }
//! }
//!
//! let mut tree: AvlTree<Item> = AvlTree::new();
//! for key in [5, 3, 8] {
//!     assert!(tree.insert(Box::new(Item { links: Links::new(), key })).is_ok());
//! }
//!
//! let keys: Vec<u32> = tree.iter().map(|item| item.key).collect();
//! assert_eq!(keys, [3, 5, 8]);
//! ```
#![no_std]

// Conventions used in comments:
// - The height of the subtree rooted at `x` is denoted `h(x)`; an empty subtree has height -1.
// - The balance factor of `x` is `b(x) = h(right(x)) - h(left(x))`.
// - A node is `dir`-heavy if its `dir` subtree is the taller one.
//
// The fundamental invariant of an AVL tree is that every balance factor is -1, 0 or +1.
//
// Between public operations every balance factor stored in `Links` is exact. Inside the
// rebalancing routines a node may be transiently two levels heavy; such a node is always repaired
// by `rebalance_at` before control returns to the caller.

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;

mod cursor;
#[cfg(any(test, feature = "alloc"))]
mod debug;
mod entry;
mod iter;
#[cfg(any(test, feature = "alloc"))]
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
pub mod traverse;

#[cfg(test)]
mod tests;

pub use cursor::{Cursor, CursorMut};
pub use entry::{Entry, OccupiedEntry, VacantEntry};
pub use iter::{DrainPostorder, Iter, IterRev, Postorder};

use entry::InsertAs;

/// An element which is ordered by a key of its own.
///
/// Implementing this trait is optional. Every operation which needs to compare elements has a
/// `_by` variant taking a comparison closure; the methods on [`AvlTree`] that take a key are thin
/// wrappers which compare [`TreeNode::key`]s instead.
pub trait TreeNode<L>: Linked<L> {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// The tree owns the handles of its elements: it takes a [`Linked::Handle`] on insertion and
/// gives it back on removal. Dropping the tree drops every remaining handle.
pub struct AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

/// Links to other elements of an [`AvlTree`], embedded in each element.
///
/// A freshly constructed `Links` is unlinked. It stays that way until its element is inserted into
/// a tree, and becomes unlinked again when the element is removed.
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

/// Returned by the insertion methods when the tree already contains an element which compares
/// equal to the one being inserted.
///
/// The tree is not modified. The rejected element can be recovered with [`Duplicate::into_item`].
pub struct Duplicate<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    item: T::Handle,
    existing: Pin<&'tree T>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    // The change in the balance factor of a node whose `self` subtree grows by one level.
    #[inline]
    fn balance_delta(self) -> i8 {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Parent<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

enum Parent<T: ?Sized> {
    /// Not an element of any tree.
    Unlinked,
    /// The root of a tree.
    Root,
    Node(NonNull<T>),
}

impl<T: ?Sized> Clone for Parent<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Parent<T> {}

type Link<T> = Option<NonNull<T>>;

#[inline]
unsafe fn links<'a, T>(node: NonNull<T>) -> &'a Links<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe { T::links(node).as_ref() }
}

#[inline]
unsafe fn links_mut<'a, T>(node: NonNull<T>) -> &'a mut Links<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe { T::links(node).as_mut() }
}

impl<T> AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the element at the root of the tree.
    pub fn root(&self) -> Option<Pin<&T>> {
        self.root.map(|root| unsafe { Pin::new_unchecked(root.as_ref()) })
    }

    /// Panics if any structural invariant of the tree does not hold.
    ///
    /// Balance factors are checked against subtree heights computed from scratch.
    #[doc(hidden)]
    #[track_caller]
    pub fn assert_invariants(&self) {
        let mut count = 0;

        if let Some(root) = self.root {
            unsafe {
                assert!(
                    matches!(links(root).parent_state(), Parent::Root),
                    "root node must be marked as the root"
                );
                self.assert_invariants_at(root, &mut count);
            }
        }

        assert_eq!(count, self.len, "number of reachable elements must equal `len`");
    }

    // Returns the height of the subtree rooted at `node`.
    #[allow(clippy::only_used_in_recursion)]
    #[track_caller]
    unsafe fn assert_invariants_at(&self, node: NonNull<T>, count: &mut usize) -> i32 {
        *count += 1;

        unsafe {
            let mut heights = [-1; 2];

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = links(node).child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = links(child).parent().expect("child must have a parent link");
                    assert_eq!(node, parent);

                    heights[dir as usize] = self.assert_invariants_at(child, count);
                }
            }

            let balance = links(node).balance();
            assert_eq!(
                i32::from(balance),
                heights[Dir::Right as usize] - heights[Dir::Left as usize],
                "balance factor must equal the height difference of the subtrees"
            );
            assert!((-1..=1).contains(&balance), "node is out of balance: {balance}");

            1 + heights[0].max(heights[1])
        }
    }

    /// Returns the element for which `f` returns [`Ordering::Equal`].
    ///
    /// `f` is called with elements of the tree and must return the ordering of the searched-for
    /// key relative to the element, consistently with the order the tree was built with.
    pub fn find_by<F>(&self, mut f: F) -> Option<Pin<&T>>
    where
        F: FnMut(&T) -> Ordering,
    {
        let ptr = self.find_raw(&mut f)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns the element which compares equal to `probe`.
    ///
    /// `probe` does not need to be an element of the tree; it is passed as the first argument of
    /// `cmp`, the same way an element being inserted is.
    pub fn find_node_by<F>(&self, probe: &T, mut cmp: F) -> Option<Pin<&T>>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.find_by(|node| cmp(probe, node))
    }

    fn find_raw<F>(&self, f: &mut F) -> Link<T>
    where
        F: FnMut(&T) -> Ordering,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match f(cur.as_ref()) {
                    Ordering::Less => opt_cur = links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = links(cur).right(),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        unsafe {
            traverse::first_in_order(self.root).map(|first| Pin::new_unchecked(first.as_ref()))
        }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        unsafe {
            traverse::last_in_order(self.root).map(|last| Pin::new_unchecked(last.as_ref()))
        }
    }

    /// Returns the parent of `node`, or `None` if `node` is the root.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn parent_of(&self, node: &T) -> Option<Pin<&T>> {
        unsafe {
            links(NonNull::from(node))
                .parent()
                .map(|parent| Pin::new_unchecked(parent.as_ref()))
        }
    }

    /// Returns an iterator over the elements of the tree in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns an iterator over the elements of the tree in descending order.
    pub fn iter_rev(&self) -> IterRev<'_, T> {
        IterRev::new(self)
    }

    /// Returns an iterator over the elements of the tree in postorder.
    ///
    /// Every element is yielded after all elements of its subtrees.
    pub fn postorder(&self) -> Postorder<'_, T> {
        Postorder::new(self)
    }

    /// Removes every element from the tree, yielding them in postorder.
    ///
    /// The tree is empty as soon as this method returns. Yielded handles may be dropped right
    /// away; the iterator never looks at an element again once it has been yielded. Elements
    /// that have not been yielded when the iterator is dropped are dropped along with it.
    pub fn drain_postorder(&mut self) -> DrainPostorder<'_, T> {
        let root = self.root.take();
        let len = mem::replace(&mut self.len, 0);

        DrainPostorder::new(root, len)
    }

    /// Returns a cursor pointing to the minimum element of the tree.
    pub fn cursor_first(&self) -> Cursor<'_, T> {
        Cursor::first(self)
    }

    /// Returns a cursor pointing to the maximum element of the tree.
    pub fn cursor_last(&self) -> Cursor<'_, T> {
        Cursor::last(self)
    }

    /// Returns a cursor pointing to the element for which `f` returns [`Ordering::Equal`].
    ///
    /// If there is no such element, the cursor points to the "ghost" non-element.
    pub fn cursor_at_by<F>(&self, mut f: F) -> Cursor<'_, T>
    where
        F: FnMut(&T) -> Ordering,
    {
        let ptr = self.find_raw(&mut f);
        Cursor::at(self, ptr)
    }

    /// Returns an editing cursor pointing to the minimum element of the tree.
    pub fn cursor_first_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut::first(self)
    }

    /// Returns an editing cursor pointing to the maximum element of the tree.
    pub fn cursor_last_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut::last(self)
    }

    /// Returns an editing cursor pointing to the element for which `f` returns
    /// [`Ordering::Equal`].
    ///
    /// If there is no such element, the cursor points to the "ghost" non-element.
    pub fn cursor_at_by_mut<F>(&mut self, mut f: F) -> CursorMut<'_, T>
    where
        F: FnMut(&T) -> Ordering,
    {
        let ptr = self.find_raw(&mut f);
        CursorMut::at(self, ptr)
    }

    /// Returns the entry for the position where `f` returns [`Ordering::Equal`].
    ///
    /// The tree is searched once. A vacant entry remembers where the search ended, so inserting
    /// through it does not compare any elements.
    pub fn entry_by<F>(&mut self, mut f: F) -> Entry<'_, T>
    where
        F: FnMut(&T) -> Ordering,
    {
        let mut insert_as = InsertAs::Root;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            let dir = match f(unsafe { cur.as_ref() }) {
                Ordering::Less => Dir::Left,
                Ordering::Equal => return Entry::occupied(self, cur),
                Ordering::Greater => Dir::Right,
            };

            insert_as = InsertAs::Child { parent: cur, dir };
            opt_cur = unsafe { links(cur).child(dir) };
        }

        Entry::vacant(self, insert_as)
    }

    /// Inserts an element into the tree, ordered by `cmp`.
    ///
    /// `cmp` is called with the new element as its first argument and an element of the tree as
    /// its second. If some element compares equal, the tree is left unchanged and the new element
    /// is handed back inside the [`Duplicate`] error together with the existing element.
    ///
    /// This operation completes in _O(log(n))_ time and performs at most one single or double
    /// rotation.
    ///
    /// # Panics
    ///
    /// Panics if the element is not unlinked; see [`Links::is_unlinked`].
    pub fn insert_by<F>(&mut self, item: T::Handle, mut cmp: F) -> Result<Pin<&T>, Duplicate<'_, T>>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let ptr = T::into_ptr(item);

        assert!(
            unsafe { links(ptr).is_unlinked() },
            "element is already linked into a tree"
        );

        let mut insert_as = InsertAs::Root;
        let mut opt_cur = self.root;

        // Descend the tree, looking for an empty slot.
        while let Some(cur) = opt_cur {
            let ordering = unsafe { cmp(ptr.as_ref(), cur.as_ref()) };

            let dir = match ordering {
                Ordering::Less => Dir::Left,
                Ordering::Equal => {
                    log::debug!("rejecting insertion of an element equal to {cur:p}");

                    return Err(Duplicate {
                        item: unsafe { T::from_ptr(ptr) },
                        existing: unsafe { Pin::new_unchecked(cur.as_ref()) },
                    });
                }
                Ordering::Greater => Dir::Right,
            };

            insert_as = InsertAs::Child { parent: cur, dir };
            opt_cur = unsafe { links(cur).child(dir) };
        }

        unsafe {
            self.link_at(insert_as, ptr);
            Ok(Pin::new_unchecked(ptr.as_ref()))
        }
    }

    // Links the unlinked element `ptr` into the empty slot `insert_as` and rebalances.
    pub(crate) unsafe fn link_at(&mut self, insert_as: InsertAs<T>, ptr: NonNull<T>) {
        unsafe {
            {
                let node_links = links_mut(ptr);
                node_links.set_left(None);
                node_links.set_right(None);
                node_links.set_balance(0);
            }

            match insert_as {
                InsertAs::Root => {
                    debug_assert!(self.root.is_none(), "tree must be empty to insert a root");

                    links_mut(ptr).set_parent(None);
                    self.root = Some(ptr);
                }

                InsertAs::Child { parent, dir } => {
                    let old = links_mut(parent).set_child(dir, Some(ptr));
                    debug_assert!(old.is_none(), "insertion slot must be empty");

                    links_mut(ptr).set_parent(Some(parent));
                    self.rebalance_after_insert(ptr);
                }
            }
        }

        self.len += 1;
    }

    // Performs a bottom-up rebalance of the tree after `node` was linked in as a leaf.
    //
    // Each step accounts for the subtree of `child` having grown by one level.
    unsafe fn rebalance_after_insert(&mut self, node: NonNull<T>) {
        let mut child = node;

        unsafe {
            while let Some(parent) = links(child).parent() {
                let dir = self.which_child(parent, child);
                let balance = links(parent).balance() + dir.balance_delta();

                match balance {
                    // The shorter side caught up, so `h(parent)` is unchanged.
                    0 => {
                        links_mut(parent).set_balance(0);
                        return;
                    }

                    // `parent` grew by one level.
                    -1 | 1 => {
                        links_mut(parent).set_balance(balance);
                        child = parent;
                    }

                    // After the rotation `h(parent)` is back to what it was before the insertion.
                    _ => {
                        self.rebalance_at(parent, dir);
                        return;
                    }
                }
            }
        }
    }

    /// Removes an arbitrary element from the tree.
    ///
    /// A node with two children is replaced by its in-order successor. The removed element is
    /// marked unlinked before its handle is returned, so it may be inserted again right away.
    ///
    /// This operation completes in _O(log(n))_ time.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            let parent = links(node).parent();
            let left = links(node).left();
            let right = links(node).right();

            // The deepest node whose subtree lost a level, and the side on which it lost it.
            let shrunk = match (left, right) {
                (Some(left), Some(right)) => {
                    let successor = traverse::first_in_order(Some(right))
                        .expect("right subtree of a binary node is not empty");
                    let successor_right = links(successor).right();

                    let shrunk = if successor == right {
                        // `successor` keeps its right subtree and moves up a level.
                        (successor, Dir::Right)
                    } else {
                        let successor_parent = links(successor)
                            .parent()
                            .expect("successor below `right` must have a parent");

                        // Elevate the successor's right child to replace it.
                        links_mut(successor_parent).set_left(successor_right);
                        self.maybe_set_parent(successor_right, Some(successor_parent));

                        links_mut(successor).set_right(Some(right));
                        links_mut(right).set_parent(Some(successor));

                        (successor_parent, Dir::Left)
                    };

                    // `successor` takes over the position and balance of `node`.
                    links_mut(successor).set_left(Some(left));
                    links_mut(left).set_parent(Some(successor));
                    links_mut(successor).set_balance(links(node).balance());
                    links_mut(successor).set_parent(parent);
                    self.replace_child_or_set_root(parent, node, Some(successor));

                    log::trace!("replaced {node:p} with its successor {successor:p}");

                    Some(shrunk)
                }

                (child, None) | (None, child) => {
                    let shrunk = parent.map(|p| (p, self.which_child(p, node)));

                    // Elevate the sole child (if any) to replace `node`.
                    self.replace_child_or_set_root(parent, node, child);
                    self.maybe_set_parent(child, parent);

                    shrunk
                }
            };

            if let Some((parent, dir)) = shrunk {
                self.rebalance_after_remove(parent, dir);
            }

            links_mut(node).mark_unlinked();
            self.len -= 1;

            T::from_ptr(node)
        }
    }

    // Performs a bottom-up rebalance of the tree after the `dir` subtree of `parent` lost a level.
    //
    // Unlike insertion, a rotation does not necessarily end the walk: it only does when the
    // rotated subtree keeps its height.
    unsafe fn rebalance_after_remove(&mut self, mut parent: NonNull<T>, mut dir: Dir) {
        unsafe {
            loop {
                let balance = links(parent).balance() - dir.balance_delta();

                let subtree = match balance {
                    // `parent` was balanced; the other side still holds up `h(parent)`.
                    -1 | 1 => {
                        links_mut(parent).set_balance(balance);
                        return;
                    }

                    // The taller side shrank, so `parent` lost a level too.
                    0 => {
                        links_mut(parent).set_balance(0);
                        parent
                    }

                    _ => match self.rebalance_at(parent, !dir) {
                        (root, true) => root,
                        (_, false) => return,
                    },
                };

                let Some(grandparent) = links(subtree).parent() else {
                    return;
                };

                dir = self.which_child(grandparent, subtree);
                parent = grandparent;
            }
        }
    }

    // Restores balance at `node`, whose `heavy` subtree is two levels taller than the other one.
    //
    // Returns the new root of the subtree and whether the rotation made the subtree one level
    // shorter. The stored balance factor of `node` is not read.
    unsafe fn rebalance_at(&mut self, node: NonNull<T>, heavy: Dir) -> (NonNull<T>, bool) {
        let sign = heavy.balance_delta();

        unsafe {
            let child = links(node)
                .child(heavy)
                .expect("heavy side of an unbalanced node must not be empty");
            let child_balance = links(child).balance();

            if child_balance == -sign {
                // `child` leans the other way: lift its inner child above both.
                let grandchild = links(child)
                    .child(!heavy)
                    .expect("inner child of an opposite-leaning node must not be empty");

                log::trace!("double rotation lifting {grandchild:p} above {node:p}");

                self.rotate_twice_at(node, child, grandchild);

                let grandchild_balance = links(grandchild).balance();
                links_mut(node).set_balance(if grandchild_balance == sign { -sign } else { 0 });
                links_mut(child).set_balance(if grandchild_balance == -sign { sign } else { 0 });
                links_mut(grandchild).set_balance(0);

                (grandchild, true)
            } else {
                log::trace!("single rotation lifting {child:p} above {node:p}");

                self.rotate_at(node, child);

                if child_balance == 0 {
                    // Only reachable through removal.
                    links_mut(node).set_balance(sign);
                    links_mut(child).set_balance(-sign);
                    (child, false)
                } else {
                    links_mut(node).set_balance(0);
                    links_mut(child).set_balance(0);
                    (child, true)
                }
            }
        }
    }

    /// Removes and returns the element for which `f` returns [`Ordering::Equal`].
    pub fn remove_by<F>(&mut self, mut f: F) -> Option<T::Handle>
    where
        F: FnMut(&T) -> Ordering,
    {
        let node = self.find_raw(&mut f)?;
        unsafe { Some(self.remove_at(node)) }
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = unsafe { traverse::first_in_order(self.root)? };
        unsafe { Some(self.remove_at(first)) }
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = unsafe { traverse::last_in_order(self.root)? };
        unsafe { Some(self.remove_at(last)) }
    }

    /// Clears the tree, dropping all elements.
    ///
    /// No rebalancing takes place; this operation completes in _O(n)_ time.
    pub fn clear(&mut self) {
        self.drain_postorder().for_each(drop);

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(&mut self, parent: NonNull<T>, old_child: NonNull<T>, new_child: Link<T>) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert!(
                new_child.is_none() || links(parent).child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            links_mut(parent).set_child(dir, new_child);
        }
    }

    // Performs a rotation, moving `up` up and its parent `down` down.
    //
    // Balance factors of the affected nodes are not updated.
    unsafe fn rotate_at(&mut self, down: NonNull<T>, up: NonNull<T>) {
        unsafe {
            // - `up` is the `dir` child of `down`, and `down` becomes the `!dir` child of `up`.
            // - `across` goes from the `!dir` child of `up` to the `dir` child of `down`.
            let dir = self.which_child(down, up);

            let across = links(up).child(!dir);
            links_mut(down).set_child(dir, across);
            self.maybe_set_parent(across, Some(down));

            links_mut(up).set_child(!dir, Some(down));
            let parent = links_mut(down).set_parent(Some(up));
            links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));
        }
    }

    // Performs a double rotation, moving `bottom` above both `middle` and `top`.
    //
    // `middle` is the `dir` child of `top`, and `bottom` is the `!dir` child of `middle`.
    // Balance factors of the affected nodes are not updated.
    unsafe fn rotate_twice_at(&mut self, top: NonNull<T>, middle: NonNull<T>, bottom: NonNull<T>) {
        unsafe {
            let dir = self.which_child(top, middle);

            let to_top = links(bottom).child(!dir);
            let to_middle = links(bottom).child(dir);

            links_mut(top).set_child(dir, to_top);
            self.maybe_set_parent(to_top, Some(top));

            links_mut(middle).set_child(!dir, to_middle);
            self.maybe_set_parent(to_middle, Some(middle));

            links_mut(bottom).set_child(!dir, Some(top));
            links_mut(bottom).set_child(dir, Some(middle));
            links_mut(middle).set_parent(Some(bottom));

            let parent = links_mut(top).set_parent(Some(bottom));
            links_mut(bottom).set_parent(parent);

            self.replace_child_or_set_root(parent, top, Some(bottom));
        }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        unsafe {
            if links(parent).left() == Some(child) {
                Dir::Left
            } else {
                debug_assert_eq!(links(parent).right(), Some(child), "not a child of `parent`");
                Dir::Right
            }
        }
    }
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a reference to the element corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_by(|node| key.cmp(node.key().borrow()))
    }

    /// Returns `true` if the tree contains an element corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts an element into the tree, ordered by its key.
    ///
    /// See [`AvlTree::insert_by`].
    pub fn insert(&mut self, item: T::Handle) -> Result<Pin<&T>, Duplicate<'_, T>> {
        self.insert_by(item, |new, node| new.key().cmp(node.key()))
    }

    /// Removes and returns the element corresponding to `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.remove_by(|node| key.cmp(node.key().borrow()))
    }

    /// Returns the entry for `key`.
    pub fn entry<Q>(&mut self, key: &Q) -> Entry<'_, T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entry_by(|node| key.cmp(node.key().borrow()))
    }
}

impl<T> Default for AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvlTree")
            .field("root", &self.root)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: the tree owns its elements' handles, and only touches elements through `&self` or
// `&mut self`.
unsafe impl<T> Send for AvlTree<T> where T: Linked<Links<T>> + ?Sized + Send {}

unsafe impl<T> Sync for AvlTree<T> where T: Linked<Links<T>> + ?Sized + Sync {}

impl<'tree, T> Duplicate<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Returns the element already in the tree which compared equal to the rejected one.
    pub fn existing(&self) -> Pin<&'tree T> {
        self.existing
    }

    /// Returns the rejected element.
    pub fn into_item(self) -> T::Handle {
        self.item
    }
}

impl<T> fmt::Debug for Duplicate<'_, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Duplicate")
            .field("existing", &NonNull::from(&*self.existing))
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Duplicate<'_, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an equal element is already in the tree")
    }
}

impl<T> core::error::Error for Duplicate<'_, T> where T: Linked<Links<T>> + ?Sized {}

impl<T: ?Sized> Links<T> {
    /// Returns new, unlinked links.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: Parent::Unlinked,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns `true` if the element these links belong to is not in any tree.
    ///
    /// Only unlinked elements may be inserted.
    #[inline]
    pub fn is_unlinked(&self) -> bool {
        matches!(self.parent_state(), Parent::Unlinked)
    }

    /// Marks the links as not belonging to any tree.
    ///
    /// Every removal does this already. It is only needed to recycle the links of an element whose
    /// tree was forgotten rather than cleared.
    pub fn mark_unlinked(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = Parent::Unlinked;
        inner.children = [None; 2];
        inner.balance = 0;
    }

    #[inline]
    fn parent_state(&self) -> Parent<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        match self.parent_state() {
            Parent::Node(parent) => Some(parent),
            Parent::Root | Parent::Unlinked => None,
        }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    // Sets the parent link, returning the previous one. `None` marks the root.
    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        let parent = match parent {
            Some(parent) => Parent::Node(parent),
            None => Parent::Root,
        };

        match mem::replace(&mut self.inner.get_mut().parent, parent) {
            Parent::Node(old) => Some(old),
            Parent::Root | Parent::Unlinked => None,
        }
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_balance(&mut self, balance: i8) {
        self.inner.get_mut().balance = balance;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Links");

        match self.parent_state() {
            Parent::Unlinked => s.field("parent", &format_args!("<unlinked>")),
            Parent::Root => s.field("parent", &format_args!("<root>")),
            Parent::Node(parent) => s.field("parent", &parent),
        };

        s.field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}

unsafe impl<T: Send + ?Sized> Send for Links<T> {}

unsafe impl<T: Sync + ?Sized> Sync for Links<T> {}
