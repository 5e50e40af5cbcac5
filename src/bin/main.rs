use std::ptr::{self, NonNull};

use cordyceps::Linked;
use cordyceps_avl::{AvlTree, Entry, Links, TreeNode};

#[derive(Debug)]
struct Task {
    id: u32,
    name: &'static str,
    links: Links<Task>,
}

impl Task {
    fn new(id: u32, name: &'static str) -> Box<Task> {
        Box::new(Task {
            id,
            name,
            links: Links::new(),
        })
    }
}

unsafe impl Linked<Links<Task>> for Task {
    type Handle = Box<Task>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Task>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl TreeNode<Links<Task>> for Task {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

fn ids<'a>(iter: impl Iterator<Item = &'a Task>) -> Vec<u32> {
    iter.map(|task| task.id).collect()
}

fn main() {
    let mut tree: AvlTree<Task> = AvlTree::new();

    for (id, name) in [
        (5, "init"),
        (3, "kswapd"),
        (8, "sshd"),
        (1, "idle"),
        (4, "kworker"),
        (7, "cron"),
        (9, "getty"),
    ] {
        tree.insert(Task::new(id, name)).unwrap();
        tree.assert_invariants();
    }

    println!("in order:  {:?}", ids(tree.iter()));
    println!("reverse:   {:?}", ids(tree.iter_rev()));
    println!("postorder: {:?}", ids(tree.postorder()));

    if let Err(dup) = tree.insert(Task::new(4, "kworker/1")) {
        println!("rejected {:?}: {} is already queued", dup.existing().id, dup.existing().name);
    }

    match tree.entry(&6) {
        Entry::Vacant(entry) => {
            entry.insert(Task::new(6, "ntpd"));
        }
        Entry::Occupied(entry) => println!("6 is taken by {}", entry.get().name),
    }

    let root = tree.remove(&5).unwrap();
    println!("removed {} ({})", root.id, root.name);
    tree.assert_invariants();
    println!("in order:  {:?}", ids(tree.iter()));

    let mut dot = String::new();
    tree.dotgraph("tasks", |task| task.id, &mut dot).unwrap();
    println!("{dot}");

    for task in tree.drain_postorder() {
        println!("freeing {} ({})", task.id, task.name);
    }

    assert!(tree.is_empty());
}
