use core::{fmt, ptr::NonNull};
use std::collections::VecDeque;

use cordyceps::Linked;

use super::{links, Color, Links, MultiMap};

impl<T, K, C> MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
    K: fmt::Display,
{
    /// Writes the shape of the tree to `w` as a Graphviz digraph.
    ///
    /// Nodes are laid out one rank per tree level, labeled with their key and filled with their
    /// color. Missing children are drawn as points.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T: ?Sized> {
            Node(NonNull<T>),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut missing = 0;
        let mut edges = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            for _ in 0..queue.len() {
                let node = match queue.pop_front() {
                    Some(Item::Node(node)) => node,
                    Some(Item::Missing(id)) => {
                        write!(w, "\"graph{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                    None => break,
                };

                let node_links = unsafe { links(node) };
                let key = node_links.key();
                let (fill, font) = match node_links.color() {
                    Color::Red => ("red", "white"),
                    Color::Black => ("black", "white"),
                };
                write!(
                    w,
                    "\"graph{name}-{node:p}\" [label=\"{key}\", style=filled, fillcolor={fill}, fontcolor={font}]; "
                )?;

                for child in [node_links.left(), node_links.right()] {
                    match child {
                        Some(child) => {
                            queue.push_back(Item::Node(child));
                            writeln!(edges, "\"graph{name}-{node:p}\" -> \"graph{name}-{child:p}\";")?;
                        }
                        None => {
                            queue.push_back(Item::Missing(missing));
                            writeln!(
                                edges,
                                "\"graph{name}-{node:p}\" -> \"graph{name}-missing{missing}\";"
                            )?;
                            missing += 1;
                        }
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&edges)?;

        w.write_str(" }\n}")
    }
}
