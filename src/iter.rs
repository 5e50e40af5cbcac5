use core::{iter::FusedIterator, marker::PhantomData, ptr::NonNull};

use cordyceps::Linked;

use crate::{links, links_mut, traverse, AvlTree, Link, Links};

/// An iterator over the elements of an [`AvlTree`] in ascending order.
///
/// Created by [`AvlTree::iter`].
pub struct Iter<'tree, T: Linked<Links<T>> + ?Sized> {
    next: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

/// An iterator over the elements of an [`AvlTree`] in descending order.
///
/// Created by [`AvlTree::iter_rev`].
pub struct IterRev<'tree, T: Linked<Links<T>> + ?Sized> {
    next: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

/// An iterator over the elements of an [`AvlTree`] in postorder.
///
/// Created by [`AvlTree::postorder`].
pub struct Postorder<'tree, T: Linked<Links<T>> + ?Sized> {
    state: PostorderState<T>,
    len: usize,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

/// A draining iterator which removes the elements of an [`AvlTree`] in postorder.
///
/// Created by [`AvlTree::drain_postorder`].
pub struct DrainPostorder<'tree, T: Linked<Links<T>> + ?Sized> {
    state: PostorderState<T>,
    len: usize,
    _tree: PhantomData<&'tree mut AvlTree<T>>,
}

// Postorder only needs to remember the element it yielded last and that element's parent. The
// parent is captured when the element is yielded, so the element itself may be gone by the time
// the iterator advances.
enum PostorderState<T: ?Sized> {
    Start(Link<T>),
    After {
        prev: NonNull<T>,
        prev_parent: Link<T>,
    },
}

impl<T: Linked<Links<T>> + ?Sized> PostorderState<T> {
    fn new(root: Link<T>) -> Self {
        PostorderState::Start(unsafe { traverse::first_in_postorder(root) })
    }

    unsafe fn advance(&mut self) -> Option<NonNull<T>> {
        let cur = match *self {
            PostorderState::Start(first) => first?,
            PostorderState::After { prev, prev_parent } => unsafe {
                traverse::next_in_postorder(prev, prev_parent)?
            },
        };

        *self = PostorderState::After {
            prev: cur,
            prev_parent: unsafe { links(cur).parent() },
        };

        Some(cur)
    }
}

impl<'tree, T: Linked<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            next: unsafe { traverse::first_in_order(tree.root) },
            len: tree.len(),
            _tree: PhantomData,
        }
    }
}

impl<'tree, T: Linked<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;

        unsafe {
            self.next = traverse::next_in_order(cur);
            self.len -= 1;

            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: Linked<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}

impl<'tree, T: Linked<Links<T>> + ?Sized> IterRev<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        IterRev {
            next: unsafe { traverse::last_in_order(tree.root) },
            len: tree.len(),
            _tree: PhantomData,
        }
    }
}

impl<'tree, T: Linked<Links<T>> + ?Sized> Iterator for IterRev<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;

        unsafe {
            self.next = traverse::prev_in_order(cur);
            self.len -= 1;

            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: Linked<Links<T>> + ?Sized> ExactSizeIterator for IterRev<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> FusedIterator for IterRev<'_, T> {}

impl<'tree, T: Linked<Links<T>> + ?Sized> Postorder<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Postorder {
            state: PostorderState::new(tree.root),
            len: tree.len(),
            _tree: PhantomData,
        }
    }
}

impl<'tree, T: Linked<Links<T>> + ?Sized> Iterator for Postorder<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        unsafe {
            let cur = self.state.advance()?;
            self.len -= 1;

            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: Linked<Links<T>> + ?Sized> ExactSizeIterator for Postorder<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> FusedIterator for Postorder<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> DrainPostorder<'_, T> {
    // `root` must already be detached from its tree.
    pub(crate) fn new(root: Link<T>, len: usize) -> Self {
        DrainPostorder {
            state: PostorderState::new(root),
            len,
            _tree: PhantomData,
        }
    }
}

impl<T: Linked<Links<T>> + ?Sized> Iterator for DrainPostorder<'_, T> {
    type Item = T::Handle;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        unsafe {
            // The parent is captured inside `advance` before the element's links are reset.
            let cur = self.state.advance()?;
            links_mut(cur).mark_unlinked();
            self.len -= 1;

            Some(T::from_ptr(cur))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: Linked<Links<T>> + ?Sized> ExactSizeIterator for DrainPostorder<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> FusedIterator for DrainPostorder<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> Drop for DrainPostorder<'_, T> {
    fn drop(&mut self) {
        self.for_each(drop);
    }
}
