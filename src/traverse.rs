//! Nonrecursive traversal of an [`AvlTree`](crate::AvlTree).
//!
//! These are the raw building blocks of the tree's iterators and cursors. Each step looks only at
//! the child and parent links of the nodes it passes, so no comparison is ever made and no extra
//! memory is needed.
//!
//! # Safety
//!
//! Every function here takes raw pointers to elements of a tree. The caller must ensure that the
//! pointers refer to live elements of the same tree, and that the tree is not modified while a
//! traversal is in progress. The one exception is documented on [`next_in_postorder`].

use core::ptr::NonNull;

use cordyceps::Linked;

use crate::{links, Dir, Link, Links};

// Descends from `node` along `dir` children as far as possible.
#[inline]
unsafe fn extreme<T>(mut node: NonNull<T>, dir: Dir) -> NonNull<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    while let Some(child) = unsafe { links(node).child(dir) } {
        node = child;
    }

    node
}

// Returns the neighbor of `node` on the `dir` side in key order.
#[inline]
unsafe fn step_in_order<T>(mut node: NonNull<T>, dir: Dir) -> Link<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe {
        if let Some(child) = links(node).child(dir) {
            return Some(extreme(child, !dir));
        }

        // Ascend until arriving from the `!dir` side.
        let mut opt_parent = links(node).parent();

        while let Some(parent) = opt_parent {
            if links(parent).child(dir) != Some(node) {
                break;
            }

            node = parent;
            opt_parent = links(parent).parent();
        }

        opt_parent
    }
}

// Descends from `node` to the first leaf, going left wherever possible.
#[inline]
unsafe fn leftmost_leaf<T>(mut node: NonNull<T>) -> NonNull<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    loop {
        let node_links = unsafe { links(node) };

        node = match (node_links.left(), node_links.right()) {
            (Some(left), _) => left,
            (None, Some(right)) => right,
            (None, None) => return node,
        };
    }
}

/// Starts an in-order traversal: returns the minimum element of the tree rooted at `root`.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe fn first_in_order<T>(root: Option<NonNull<T>>) -> Option<NonNull<T>>
where
    T: Linked<Links<T>> + ?Sized,
{
    root.map(|root| unsafe { extreme(root, Dir::Left) })
}

/// Starts a reverse in-order traversal: returns the maximum element of the tree rooted at `root`.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe fn last_in_order<T>(root: Option<NonNull<T>>) -> Option<NonNull<T>>
where
    T: Linked<Links<T>> + ?Sized,
{
    root.map(|root| unsafe { extreme(root, Dir::Right) })
}

/// Continues an in-order traversal: returns the next-greater element, or `None` if `node` is the
/// maximum.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe fn next_in_order<T>(node: NonNull<T>) -> Option<NonNull<T>>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe { step_in_order(node, Dir::Right) }
}

/// Continues a reverse in-order traversal: returns the next-lesser element, or `None` if `node`
/// is the minimum.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe fn prev_in_order<T>(node: NonNull<T>) -> Option<NonNull<T>>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe { step_in_order(node, Dir::Left) }
}

/// Starts a postorder traversal: returns the first leaf reached by going left wherever possible.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe fn first_in_postorder<T>(root: Option<NonNull<T>>) -> Option<NonNull<T>>
where
    T: Linked<Links<T>> + ?Sized,
{
    root.map(|root| unsafe { leftmost_leaf(root) })
}

/// Continues a postorder traversal: returns the element after `prev`, or `None` if `prev` was the
/// root.
///
/// `prev_parent` must be the parent of `prev`, read before `prev` was yielded. `prev` itself is
/// only compared against, never dereferenced, so it may already have been freed: freeing each
/// element as soon as it has been visited is allowed, as long as nothing else is modified.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe fn next_in_postorder<T>(
    prev: NonNull<T>,
    prev_parent: Option<NonNull<T>>,
) -> Option<NonNull<T>>
where
    T: Linked<Links<T>> + ?Sized,
{
    let parent = prev_parent?;

    unsafe {
        // Coming up from the left, the right subtree is next.
        match links(parent).right() {
            Some(right) if links(parent).left() == Some(prev) => Some(leftmost_leaf(right)),
            _ => Some(parent),
        }
    }
}
