/// RowTree Snapshot
///
/// The tree is a mapping from `RowId` to `TreeNode`, plus per-level node
/// counts used to answer "how deep is the tree" without a traversal. Nodes
/// are held behind `Arc` so cloning a snapshot shares every untouched node;
/// an update pass reallocates only the entries it actually mutates. Two
/// snapshots can therefore coexist and be diffed safely — returning a tree
/// hands full ownership of that version to the caller.
///
/// The synthetic root (`RowId::Root`) is always present and is never
/// removed; every other node's parent chain ends at it.
///
/// # Examples
///
/// ```
/// use rowtree::{build_row_tree, BuildParams, BuilderRow, GroupingCriterion};
///
/// let rows = vec![
///     BuilderRow::new(1, vec![GroupingCriterion::new(Some("g"), "A")]),
///     BuilderRow::new(2, vec![GroupingCriterion::new(Some("g"), "A")]),
/// ];
/// let tree = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();
/// assert_eq!(tree.tree_depth(), 2);
/// assert_eq!(tree.data_row_ids(), vec![1.into(), 2.into()]);
/// ```

use crate::node::{PinnedPosition, TreeNode};
use crate::path::RowId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Per-level node counts. Level 0 holds the top-level rows; the root is not
/// counted. The sum over all levels equals the node count minus the root
/// and any pinned nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeDepths {
    levels: BTreeMap<usize, usize>,
}

impl TreeDepths {
    pub fn new() -> Self {
        TreeDepths::default()
    }

    pub fn add(&mut self, depth: usize) {
        *self.levels.entry(depth).or_insert(0) += 1;
    }

    pub fn remove(&mut self, depth: usize) {
        if let Some(count) = self.levels.get_mut(&depth) {
            *count -= 1;
            if *count == 0 {
                self.levels.remove(&depth);
            }
        }
    }

    pub fn count_at(&self, depth: usize) -> usize {
        self.levels.get(&depth).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.levels.values().sum()
    }

    /// Deepest populated level, if any node exists.
    pub fn deepest(&self) -> Option<usize> {
        self.levels.keys().next_back().copied()
    }
}

/// A full tree snapshot: node arena plus depth bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TreeSnapshot", from = "TreeSnapshot")]
pub struct RowTree {
    nodes: HashMap<RowId, Arc<TreeNode>>,
    depths: TreeDepths,
    grouping_name: String,
}

impl RowTree {
    /// An empty tree containing only the root.
    pub fn new(grouping_name: &str) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            RowId::Root,
            Arc::new(TreeNode::Root {
                children: Vec::new(),
            }),
        );
        RowTree {
            nodes,
            depths: TreeDepths::new(),
            grouping_name: grouping_name.to_string(),
        }
    }

    /// Name of the grouping strategy that produced this tree, e.g.
    /// `"grouping-columns"` or `"tree-data"`.
    pub fn grouping_name(&self) -> &str {
        &self.grouping_name
    }

    pub fn get(&self, id: &RowId) -> Option<&TreeNode> {
        self.nodes.get(id).map(Arc::as_ref)
    }

    pub fn root(&self) -> &TreeNode {
        // The root is inserted at construction and never removed.
        static EMPTY_ROOT: TreeNode = TreeNode::Root {
            children: Vec::new(),
        };
        self.nodes
            .get(&RowId::Root)
            .map(Arc::as_ref)
            .unwrap_or(&EMPTY_ROOT)
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node count excluding the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values().map(Arc::as_ref)
    }

    pub fn depths(&self) -> &TreeDepths {
        &self.depths
    }

    /// Number of levels in the tree: deepest populated level + 1, and at
    /// least 1 so an empty or flat tree still reports one level.
    pub fn tree_depth(&self) -> usize {
        self.depths.deepest().map_or(1, |d| d + 1)
    }

    /// Copy-on-write access to one node: the `Arc` entry is reallocated on
    /// first mutation, leaving other snapshots untouched.
    pub(crate) fn node_mut(&mut self, id: &RowId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id).map(Arc::make_mut)
    }

    /// Insert a node and account for its depth. Replacing an existing id is
    /// the caller's responsibility to have decided (duplicate policy).
    pub(crate) fn insert_node(&mut self, node: TreeNode) {
        if let Some(depth) = node.depth() {
            self.depths.add(depth);
        }
        self.nodes.insert(node.id().clone(), Arc::new(node));
    }

    /// Replace a node without touching depth bookkeeping (same id, same
    /// depth, different shape or payload).
    pub(crate) fn replace_node(&mut self, node: TreeNode) {
        self.nodes.insert(node.id().clone(), Arc::new(node));
    }

    pub(crate) fn remove_node(&mut self, id: &RowId) -> Option<Arc<TreeNode>> {
        let removed = self.nodes.remove(id)?;
        if let Some(depth) = removed.depth() {
            self.depths.remove(depth);
        }
        Some(removed)
    }

    /// Body children of `parent`, or nothing for ids absent from the tree.
    pub(crate) fn child_ids(&self, parent: &RowId) -> &[RowId] {
        self.nodes.get(parent).map_or(&[], |n| n.children())
    }

    /// Re-key a group node, keeping its subtree intact. Two directions:
    /// a data row's path terminates on a slot an auto-generated group
    /// already occupies (the group adopts the row's id and stops being
    /// auto-generated), or a data row that is a group with children is
    /// removed (the group gives the row's id up for the deterministic auto
    /// id, keeping the structure alive for its remaining descendants). The
    /// parent's children list and the children's parent links are patched in
    /// place; expansion state carries over.
    pub(crate) fn rekey_group(
        &mut self,
        old_id: &RowId,
        new_id: RowId,
        is_auto_generated: bool,
    ) -> Result<(), String> {
        let old = self
            .remove_node(old_id)
            .ok_or_else(|| format!("Cannot adopt id of missing node {}", old_id))?;
        let (depth, parent, grouping_key, grouping_field, children, children_expanded, footer) =
            match old.as_ref() {
                TreeNode::Group {
                    depth,
                    parent,
                    grouping_key,
                    grouping_field,
                    children,
                    children_expanded,
                    footer,
                    ..
                } => (
                    *depth,
                    parent.clone(),
                    grouping_key.clone(),
                    grouping_field.clone(),
                    children.clone(),
                    *children_expanded,
                    footer.clone(),
                ),
                other => {
                    let restored = other.clone();
                    self.insert_node(restored);
                    return Err(format!("Node {} is not a group, cannot adopt its id", old_id));
                }
            };

        for child in &children {
            match self.node_mut(child) {
                Some(
                    TreeNode::Group { parent, .. }
                    | TreeNode::Leaf { parent, .. }
                    | TreeNode::Footer { parent, .. },
                ) => *parent = new_id.clone(),
                _ => {}
            }
        }
        if let Some(footer_id) = &footer {
            if let Some(TreeNode::Footer { parent, .. }) = self.node_mut(footer_id) {
                *parent = new_id.clone();
            }
        }
        match self.node_mut(&parent) {
            Some(TreeNode::Root { children } | TreeNode::Group { children, .. }) => {
                if let Some(slot) = children.iter_mut().find(|c| **c == *old_id) {
                    *slot = new_id.clone();
                }
            }
            _ => {}
        }

        self.insert_node(TreeNode::Group {
            id: new_id,
            depth,
            parent,
            is_auto_generated,
            grouping_key,
            grouping_field,
            children,
            children_expanded,
            footer,
        });
        Ok(())
    }

    /// Attach a footer node to a group, e.g. for per-group aggregation
    /// rows. The footer id is derived from the group's id; a group carries
    /// at most one footer.
    pub fn attach_footer(&mut self, group_id: &RowId) -> Result<RowId, String> {
        let (depth, existing) = match self.get(group_id) {
            Some(TreeNode::Group { depth, footer, .. }) => (*depth + 1, footer.clone()),
            Some(_) => return Err(format!("Node {} cannot carry a footer", group_id)),
            None => return Err(format!("Node {} is not in the tree", group_id)),
        };
        if existing.is_some() {
            return Err(format!("Group {} already has a footer", group_id));
        }

        // Criterion encodings start with 'F', so this payload cannot
        // collide with an auto-generated group id.
        let footer_id = RowId::Auto(format!("footer-{}", group_id));
        self.insert_node(TreeNode::Footer {
            id: footer_id.clone(),
            depth,
            parent: group_id.clone(),
        });
        if let Some(TreeNode::Group { footer, .. }) = self.node_mut(group_id) {
            *footer = Some(footer_id.clone());
        }
        Ok(footer_id)
    }

    /// Pin a row to the top or bottom of the grid. Pinned nodes hang off
    /// the root outside the body walk: they never appear in descendant
    /// traversals or data-row flattening, and filtering always shows them.
    pub fn pin_row(&mut self, id: impl Into<RowId>, position: PinnedPosition) -> Result<RowId, String> {
        let id = id.into();
        if self.contains(&id) {
            return Err(format!("Row {} is already in the tree", id));
        }
        self.insert_node(TreeNode::Pinned {
            id: id.clone(),
            position,
        });
        Ok(id)
    }

    /// Walk up from `from`, removing auto-generated groups that lost their
    /// last child (they exist only because rows beneath them shared a
    /// prefix; empty they carry no information). Returns the parent of each
    /// pruned group, nearest first, so callers can report the detachments.
    pub(crate) fn prune_empty_auto_groups(&mut self, from: RowId) -> Vec<RowId> {
        let mut pruned_parents = Vec::new();
        let mut current = from;
        loop {
            let (parent, footer) = match self.get(&current) {
                Some(TreeNode::Group {
                    is_auto_generated: true,
                    children,
                    parent,
                    footer,
                    ..
                }) if children.is_empty() => (parent.clone(), footer.clone()),
                _ => return pruned_parents,
            };
            if let Some(footer_id) = footer {
                self.remove_node(&footer_id);
            }
            if let Some(TreeNode::Root { children } | TreeNode::Group { children, .. }) =
                self.node_mut(&parent)
            {
                children.retain(|c| c != &current);
            }
            self.remove_node(&current);
            pruned_parents.push(parent.clone());
            current = parent;
        }
    }

    /// Depth-ordered descendants of `id`, following each group's children
    /// ordering, via an explicit stack. With `skip_auto_generated`, nodes
    /// synthesized by the engine are omitted (they carry no row data) while
    /// their subtrees are still walked. Footer and pinned nodes are never
    /// included.
    pub fn descendants(&self, id: &RowId, skip_auto_generated: bool) -> Vec<RowId> {
        let mut out = Vec::new();
        let mut stack: Vec<&RowId> = Vec::new();
        if let Some(start) = self.nodes.get(id) {
            for child in start.children().iter().rev() {
                stack.push(child);
            }
        }
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                match node.as_ref() {
                    TreeNode::Footer { .. } | TreeNode::Pinned { .. } | TreeNode::Root { .. } => {}
                    TreeNode::Group { .. } | TreeNode::Leaf { .. } => {
                        if !(skip_auto_generated && node.is_auto_generated()) {
                            out.push(current.clone());
                        }
                        for child in node.children().iter().rev() {
                            stack.push(child);
                        }
                    }
                }
            }
        }
        out
    }

    /// Flattened list of data-row ids: every non-auto-generated, non-footer
    /// node reachable from the root, depth-first in children order.
    pub fn data_row_ids(&self) -> Vec<RowId> {
        self.descendants(&RowId::Root, true)
    }

    /// The grouping path a node currently occupies, root to the node
    /// itself. `None` for ids absent from the tree.
    pub fn node_path(&self, id: &RowId) -> Option<Vec<crate::path::GroupingCriterion>> {
        let mut segments = Vec::new();
        let mut current = self.get(id)?;
        loop {
            match current {
                TreeNode::Root { .. } => break,
                TreeNode::Group {
                    grouping_key,
                    grouping_field,
                    parent,
                    ..
                }
                | TreeNode::Leaf {
                    grouping_key,
                    grouping_field,
                    parent,
                    ..
                } => {
                    // Top-level rows built from an empty path carry no key
                    // and contribute no segment.
                    if let Some(key) = grouping_key {
                        segments.push(crate::path::GroupingCriterion {
                            field: grouping_field.clone(),
                            key: key.clone(),
                        });
                    }
                    current = self.get(parent)?;
                }
                TreeNode::Footer { .. } | TreeNode::Pinned { .. } => return None,
            }
        }
        segments.reverse();
        Some(segments)
    }

    /// Structural self-check used by tests: parent links resolve, child ids
    /// resolve back, child depth is parent depth + 1, and the arena holds
    /// exactly the nodes reachable from the root (plus pinned nodes).
    pub fn validate(&self) -> Result<(), String> {
        let mut reachable = 1; // root
        let mut stack: Vec<&RowId> = self.root().children().iter().rev().collect();
        while let Some(id) = stack.pop() {
            let node = self
                .get(id)
                .ok_or_else(|| format!("Child id {} missing from tree", id))?;
            reachable += 1;
            let parent_id = node
                .parent()
                .ok_or_else(|| format!("Non-root node {} has no parent", id))?;
            let parent = self
                .get(parent_id)
                .ok_or_else(|| format!("Parent {} of {} missing from tree", parent_id, id))?;
            let is_footer_of_parent =
                matches!(parent, TreeNode::Group { footer: Some(f), .. } if f == id);
            if !parent.children().contains(id) && !is_footer_of_parent {
                return Err(format!("Node {} not listed under parent {}", id, parent_id));
            }
            let expected = parent.depth().map_or(0, |d| d + 1);
            if node.depth() != Some(expected) {
                return Err(format!(
                    "Node {} has depth {:?}, expected {}",
                    id,
                    node.depth(),
                    expected
                ));
            }
            for child in node.children().iter().rev() {
                stack.push(child);
            }
            if let TreeNode::Group {
                footer: Some(footer),
                ..
            } = node
            {
                stack.push(footer);
            }
        }
        let pinned = self
            .iter()
            .filter(|n| matches!(n, TreeNode::Pinned { .. }))
            .count();
        if reachable + pinned != self.nodes.len() {
            return Err(format!(
                "{} nodes reachable from root but arena holds {}",
                reachable + pinned,
                self.nodes.len()
            ));
        }
        Ok(())
    }
}

/// Flat serialized form: the arena as a node list. Depth bookkeeping is
/// rebuilt on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    grouping_name: String,
    nodes: Vec<TreeNode>,
}

impl From<RowTree> for TreeSnapshot {
    fn from(tree: RowTree) -> Self {
        TreeSnapshot {
            grouping_name: tree.grouping_name,
            nodes: tree.nodes.values().map(|n| n.as_ref().clone()).collect(),
        }
    }
}

impl From<TreeSnapshot> for RowTree {
    fn from(snapshot: TreeSnapshot) -> Self {
        let mut tree = RowTree::new(&snapshot.grouping_name);
        for node in snapshot.nodes {
            match node {
                TreeNode::Root { children } => {
                    tree.replace_node(TreeNode::Root { children });
                }
                other => tree.insert_node(other),
            }
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::GroupingKey;

    fn leaf(id: i64, depth: usize, parent: RowId) -> TreeNode {
        TreeNode::Leaf {
            id: RowId::from(id),
            depth,
            parent,
            grouping_key: Some(GroupingKey::from("k")),
            grouping_field: None,
        }
    }

    #[test]
    fn test_depths_bookkeeping() {
        let mut depths = TreeDepths::new();
        depths.add(0);
        depths.add(0);
        depths.add(2);
        assert_eq!(depths.count_at(0), 2);
        assert_eq!(depths.total(), 3);
        assert_eq!(depths.deepest(), Some(2));
        depths.remove(2);
        assert_eq!(depths.deepest(), Some(0));
        depths.remove(5); // unknown level is a no-op
        assert_eq!(depths.total(), 2);
    }

    #[test]
    fn test_empty_tree_has_root_and_depth_one() {
        let tree = RowTree::new("tree-data");
        assert!(tree.is_empty());
        assert_eq!(tree.tree_depth(), 1);
        assert!(tree.contains(&RowId::Root));
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_insert_and_remove_track_depths() {
        let mut tree = RowTree::new("tree-data");
        tree.insert_node(leaf(1, 0, RowId::Root));
        if let Some(TreeNode::Root { children }) = tree.node_mut(&RowId::Root) {
            children.push(RowId::from(1));
        }
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.depths().count_at(0), 1);
        assert!(tree.validate().is_ok());

        tree.remove_node(&RowId::from(1));
        assert_eq!(tree.depths().total(), 0);
    }

    #[test]
    fn test_snapshots_share_untouched_nodes() {
        let mut tree = RowTree::new("tree-data");
        tree.insert_node(leaf(1, 0, RowId::Root));
        tree.insert_node(leaf(2, 0, RowId::Root));
        if let Some(TreeNode::Root { children }) = tree.node_mut(&RowId::Root) {
            children.push(RowId::from(1));
            children.push(RowId::from(2));
        }

        let before = tree.clone();
        if let Some(TreeNode::Leaf { grouping_key, .. }) = tree.node_mut(&RowId::from(1)) {
            *grouping_key = Some(GroupingKey::from("changed"));
        }

        // The earlier snapshot still sees the original value.
        assert_eq!(
            before.get(&RowId::from(1)).unwrap().grouping_key(),
            Some(&GroupingKey::from("k"))
        );
        assert_eq!(
            tree.get(&RowId::from(1)).unwrap().grouping_key(),
            Some(&GroupingKey::from("changed"))
        );
    }

    #[test]
    fn test_attach_footer_and_pin_row() {
        let mut tree = RowTree::new("grouping-columns");
        tree.insert_node(TreeNode::Group {
            id: RowId::from("G"),
            depth: 0,
            parent: RowId::Root,
            is_auto_generated: false,
            grouping_key: Some(GroupingKey::from("G")),
            grouping_field: Some("g".to_string()),
            children: vec![RowId::from(1)],
            children_expanded: Some(true),
            footer: None,
        });
        tree.insert_node(leaf(1, 1, RowId::from("G")));
        if let Some(TreeNode::Root { children }) = tree.node_mut(&RowId::Root) {
            children.push(RowId::from("G"));
        }

        let footer_id = tree.attach_footer(&RowId::from("G")).unwrap();
        assert_eq!(tree.get(&footer_id).unwrap().depth(), Some(1));
        assert_eq!(tree.get(&footer_id).unwrap().parent(), Some(&RowId::from("G")));
        // One footer per group, and only on groups.
        assert!(tree.attach_footer(&RowId::from("G")).is_err());
        assert!(tree.attach_footer(&RowId::from(1)).is_err());

        let pinned_id = tree.pin_row("summary", PinnedPosition::Bottom).unwrap();
        assert!(tree.pin_row("summary", PinnedPosition::Top).is_err());

        assert!(tree.validate().is_ok());
        // Neither auxiliary node shows up in the data-row flattening.
        assert_eq!(tree.data_row_ids(), vec![RowId::from("G"), RowId::from(1)]);
        assert!(!tree.data_row_ids().contains(&pinned_id));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut tree = RowTree::new("grouping-columns");
        tree.insert_node(leaf(1, 0, RowId::Root));
        if let Some(TreeNode::Root { children }) = tree.node_mut(&RowId::Root) {
            children.push(RowId::from(1));
        }
        let json = serde_json::to_string(&tree).unwrap();
        let back: RowTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.depths().count_at(0), 1);
    }
}
