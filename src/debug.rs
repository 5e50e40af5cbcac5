use alloc::{collections::VecDeque, string::String};
use core::{fmt, ptr::NonNull};

use cordyceps::Linked;

use crate::{links, AvlTree, Dir, Links};

impl<T> AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Writes the structure of the tree to `w` as a Graphviz digraph.
    ///
    /// Each node is labelled with `label(node)` and its balance factor. Missing children are drawn
    /// as points so that left and right children can be told apart.
    pub fn dotgraph<W, L, D>(&self, name: &str, mut label: L, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
        L: FnMut(&T) -> D,
        D: fmt::Display,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T: ?Sized> {
            Node(NonNull<T>, usize),
            Missing(usize),
        }

        let mut queue = VecDeque::new();
        let mut next_id = 0;
        queue.push_back(Item::Node(root, next_id));
        next_id += 1;

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut edges = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            for _ in 0..queue.len() {
                let Some(item) = queue.pop_front() else {
                    break;
                };

                let (node, id) = match item {
                    Item::Node(node, id) => (node, id),
                    Item::Missing(id) => {
                        write!(w, "\"{name}-{id}\" [shape=point]; ")?;
                        continue;
                    }
                };

                let balance = unsafe { links(node).balance() };
                let text = label(unsafe { node.as_ref() });
                write!(w, "\"{name}-{id}\" [label=\"{text}:{balance:+}\"]; ")?;

                for dir in [Dir::Left, Dir::Right] {
                    let child_id = next_id;
                    next_id += 1;

                    match unsafe { links(node).child(dir) } {
                        Some(child) => queue.push_back(Item::Node(child, child_id)),
                        None => queue.push_back(Item::Missing(child_id)),
                    }

                    writeln!(edges, "\"{name}-{id}\" -> \"{name}-{child_id}\";")?;
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&edges)?;

        w.write_str(" }\n}")
    }
}
