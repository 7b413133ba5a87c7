//! Post-order folding over a [`TreeItem`] tree.

use std::mem;

use super::TreeItem;

/// Folds every child into its parent, children first.
///
/// `merge(parent, child)` runs exactly once per edge, after the child's own
/// subtree has been folded, so values reach a grandparent through the
/// intermediate parent. Childless nodes are left as they are. The walk keeps
/// its own stack, so depth is bounded by memory rather than the call stack.
pub fn fold<T, F>(node: &mut TreeItem<T>, merge: F)
where
    F: FnMut(&mut T, &T),
{
    fold_with_seed(node, |_| {}, merge);
}

/// Like [`fold`], but calls `seed(item)` on each node before any of its
/// children are merged into it.
///
/// A seed that resets a node to its own base value makes the fold
/// repeatable: folding an already folded tree gives the same result.
pub fn fold_with_seed<T, S, F>(root: &mut TreeItem<T>, mut seed: S, mut merge: F)
where
    S: FnMut(&mut T),
    F: FnMut(&mut T, &T),
{
    seed(&mut root.item);
    let mut root_pending = mem::take(&mut root.children).into_iter();
    let mut root_done = Vec::with_capacity(root_pending.len());
    let mut stack: Vec<Frame<T>> = Vec::new();

    loop {
        let next = match stack.last_mut() {
            Some(frame) => frame.pending.next(),
            None => root_pending.next(),
        };
        if let Some(mut child) = next {
            seed(&mut child.item);
            let pending = mem::take(&mut child.children).into_iter();
            stack.push(Frame {
                done: Vec::with_capacity(pending.len()),
                node: child,
                pending,
            });
            continue;
        }

        let Some(Frame { mut node, done, .. }) = stack.pop() else {
            break;
        };
        node.children = done;
        match stack.last_mut() {
            Some(parent) => {
                merge(&mut parent.node.item, &node.item);
                parent.done.push(node);
            }
            None => {
                merge(&mut root.item, &node.item);
                root_done.push(node);
            }
        }
    }

    root.children = root_done;
}

/// A node whose children are detached while they are folded.
struct Frame<T> {
    node: TreeItem<T>,
    pending: std::vec::IntoIter<TreeItem<T>>,
    done: Vec<TreeItem<T>>,
}
