//! Flat-to-tree construction for parent-referencing records.
//!
//! Records name their parent by id; records whose parent id equals the root
//! sentinel become the top-level nodes. Construction uses an explicit stack
//! and tracks the ids on the current descent path, so malformed input fails
//! with a [`TreeError`] instead of recursing without bound.

mod error;
pub mod fold;

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

pub use self::error::TreeError;
pub use self::fold::{fold, fold_with_seed};

/// One record plus the records that name it as their parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem<T> {
    pub item: T,
    pub children: Vec<TreeItem<T>>,
}

impl<T> Drop for TreeItem<T> {
    // Detach descendants onto a heap stack so dropping a deep chain does not
    // recurse once per level.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl<T> TreeItem<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            children: Vec::new(),
        }
    }

    pub fn with_children(item: T, children: Vec<TreeItem<T>>) -> Self {
        Self { item, children }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including this one.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Pre-order iteration over the items of this subtree.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            stack: vec![(0, self)],
        }
    }

    /// Pre-order iteration yielding each item with its depth (the root is 0).
    pub fn iter_with_depth(&self) -> impl Iterator<Item = (usize, &T)> {
        IterNodes {
            stack: vec![(0, self)],
        }
        .map(|(depth, node)| (depth, &node.item))
    }
}

pub struct Iter<'a, T> {
    stack: Vec<(usize, &'a TreeItem<T>)>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        Some(&node.item)
    }
}

struct IterNodes<'a, T> {
    stack: Vec<(usize, &'a TreeItem<T>)>,
}

impl<'a, T> Iterator for IterNodes<'a, T> {
    type Item = (usize, &'a TreeItem<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        Some((depth, node))
    }
}

/// How many top-level nodes a forest has, as an explicit choice for the
/// caller rather than an implicit "take the first".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootSelection<T> {
    NoRoot,
    Single(TreeItem<T>),
    Multiple(Vec<TreeItem<T>>),
}

impl<T> RootSelection<T> {
    pub fn from_forest(mut forest: Vec<TreeItem<T>>) -> Self {
        match forest.len() {
            0 => RootSelection::NoRoot,
            1 => match forest.pop() {
                Some(root) => RootSelection::Single(root),
                None => RootSelection::NoRoot,
            },
            _ => RootSelection::Multiple(forest),
        }
    }
}

struct Frame<T> {
    index: usize,
    next_child: usize,
    children: Vec<TreeItem<T>>,
}

impl<T> Frame<T> {
    fn new(index: usize) -> Self {
        Self {
            index,
            next_child: 0,
            children: Vec::new(),
        }
    }
}

/// Builds the forest of records whose parent id equals `root`, each with its
/// descendants attached.
///
/// Ids are compared with exact equality. Every record must end up in the
/// forest: a record whose parent chain loops, or ends at an id no record
/// carries, is a [`TreeError`]. When no record has `root` as its parent the
/// forest is empty and nothing else is checked, so the caller can report a
/// missing root.
/// The input is only read; records are cloned into the tree.
pub fn build_forest<T, K, FI, FP>(
    records: &[T],
    id_of: FI,
    parent_of: FP,
    root: &K,
) -> Result<Vec<TreeItem<T>>, TreeError>
where
    T: Clone,
    K: Eq + Hash + Display + ?Sized,
    FI: Fn(&T) -> &K,
    FP: Fn(&T) -> &K,
{
    let mut by_id: HashMap<&K, usize> = HashMap::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if by_id.insert(id_of(record), index).is_some() {
            return Err(TreeError::DuplicateId(id_of(record).to_string()));
        }
    }

    let mut roots = Vec::new();
    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (index, record) in records.iter().enumerate() {
        let parent = parent_of(record);
        if parent == root {
            roots.push(index);
        } else if let Some(&parent_index) = by_id.get(parent) {
            children_of[parent_index].push(index);
        }
    }

    if roots.is_empty() {
        return Ok(Vec::new());
    }

    let mut placed = vec![false; records.len()];
    let mut forest = Vec::with_capacity(roots.len());
    for root_index in roots {
        forest.push(build_subtree(
            records,
            root_index,
            &children_of,
            &mut placed,
            &id_of,
        )?);
    }

    if let Some(unplaced) = placed.iter().position(|p| !p) {
        return Err(diagnose_unplaced(
            records, unplaced, &by_id, &id_of, &parent_of, root,
        ));
    }

    Ok(forest)
}

fn build_subtree<T, K, FI>(
    records: &[T],
    root_index: usize,
    children_of: &[Vec<usize>],
    placed: &mut [bool],
    id_of: &FI,
) -> Result<TreeItem<T>, TreeError>
where
    T: Clone,
    K: Display + ?Sized,
    FI: Fn(&T) -> &K,
{
    let mut on_path: HashSet<usize> = HashSet::new();
    on_path.insert(root_index);
    let mut stack = vec![Frame::new(root_index)];

    while let Some(frame) = stack.last_mut() {
        let children = &children_of[frame.index];
        if frame.next_child < children.len() {
            let child = children[frame.next_child];
            frame.next_child += 1;

            if placed[child] || !on_path.insert(child) {
                let mut ids: Vec<String> = stack
                    .iter()
                    .map(|f| id_of(&records[f.index]).to_string())
                    .collect();
                ids.push(id_of(&records[child]).to_string());
                return Err(TreeError::Cycle(ids));
            }
            stack.push(Frame::new(child));
            continue;
        }

        let Some(done) = stack.pop() else { break };
        on_path.remove(&done.index);
        placed[done.index] = true;
        let node = TreeItem::with_children(records[done.index].clone(), done.children);

        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => return Ok(node),
        }
    }

    // The loop only exits through the root frame returning above.
    Err(TreeError::Cycle(vec![id_of(&records[root_index]).to_string()]))
}

/// Walks the parent chain of a record that no root reached and reports why.
fn diagnose_unplaced<T, K, FI, FP>(
    records: &[T],
    start: usize,
    by_id: &HashMap<&K, usize>,
    id_of: &FI,
    parent_of: &FP,
    root: &K,
) -> TreeError
where
    K: Eq + Hash + Display + ?Sized,
    FI: Fn(&T) -> &K,
    FP: Fn(&T) -> &K,
{
    let mut chain: Vec<usize> = vec![start];
    let mut seen: HashSet<usize> = HashSet::from([start]);
    let mut current = start;

    loop {
        let parent = parent_of(&records[current]);
        match by_id.get(parent) {
            Some(&parent_index) if parent != root => {
                if !seen.insert(parent_index) {
                    let loop_start = chain
                        .iter()
                        .position(|&i| i == parent_index)
                        .unwrap_or_default();
                    let mut ids: Vec<String> = chain[loop_start..]
                        .iter()
                        .map(|&i| id_of(&records[i]).to_string())
                        .collect();
                    ids.push(id_of(&records[parent_index]).to_string());
                    return TreeError::Cycle(ids);
                }
                chain.push(parent_index);
                current = parent_index;
            }
            _ => {
                return TreeError::DanglingParent {
                    id: id_of(&records[current]).to_string(),
                    parent: parent.to_string(),
                };
            }
        }
    }
}
