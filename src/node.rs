/// Tree Node Variants
///
/// A closed tagged union over every kind of node the row tree can hold.
/// Consumers match exhaustively; there is no optional-field duck-typing and
/// no node outside these five shapes.
///
/// - `Root`: the single synthetic entry point, stored under `RowId::Root`.
/// - `Group`: has children. Auto-generated groups exist only because rows
///   beneath them share a grouping-path prefix; explicit groups are real
///   rows (tree data) that happen to have descendants.
/// - `Leaf`: a real data row with no children.
/// - `Footer`: auxiliary leaf-like node attached to a group or the root.
/// - `Pinned`: auxiliary node attached to the root, outside the tree walk.

use crate::key::GroupingKey;
use crate::path::RowId;
use serde::{Deserialize, Serialize};

static ROOT_ID: RowId = RowId::Root;

/// Where a pinned node is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinnedPosition {
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Root {
        /// Body children only (groups and leaves), in insertion order.
        children: Vec<RowId>,
    },
    Group {
        id: RowId,
        depth: usize,
        parent: RowId,
        is_auto_generated: bool,
        grouping_key: Option<GroupingKey>,
        grouping_field: Option<String>,
        children: Vec<RowId>,
        /// `None` means "no opinion": only valid while the group has no
        /// children, where expansion is meaningless.
        children_expanded: Option<bool>,
        footer: Option<RowId>,
    },
    Leaf {
        id: RowId,
        depth: usize,
        parent: RowId,
        grouping_key: Option<GroupingKey>,
        grouping_field: Option<String>,
    },
    Footer {
        id: RowId,
        depth: usize,
        parent: RowId,
    },
    Pinned {
        id: RowId,
        position: PinnedPosition,
    },
}

impl TreeNode {
    pub fn id(&self) -> &RowId {
        match self {
            TreeNode::Root { .. } => &ROOT_ID,
            TreeNode::Group { id, .. } => id,
            TreeNode::Leaf { id, .. } => id,
            TreeNode::Footer { id, .. } => id,
            TreeNode::Pinned { id, .. } => id,
        }
    }

    /// Depth within the body of the tree; the root sits conceptually at -1
    /// and pinned nodes outside the tree entirely.
    pub fn depth(&self) -> Option<usize> {
        match self {
            TreeNode::Root { .. } | TreeNode::Pinned { .. } => None,
            TreeNode::Group { depth, .. } => Some(*depth),
            TreeNode::Leaf { depth, .. } => Some(*depth),
            TreeNode::Footer { depth, .. } => Some(*depth),
        }
    }

    pub fn parent(&self) -> Option<&RowId> {
        match self {
            TreeNode::Root { .. } => None,
            TreeNode::Group { parent, .. } => Some(parent),
            TreeNode::Leaf { parent, .. } => Some(parent),
            TreeNode::Footer { parent, .. } => Some(parent),
            TreeNode::Pinned { .. } => Some(&ROOT_ID),
        }
    }

    /// Body children, empty for anything that cannot have them.
    pub fn children(&self) -> &[RowId] {
        match self {
            TreeNode::Root { children } => children,
            TreeNode::Group { children, .. } => children,
            TreeNode::Leaf { .. } | TreeNode::Footer { .. } | TreeNode::Pinned { .. } => &[],
        }
    }

    pub fn grouping_key(&self) -> Option<&GroupingKey> {
        match self {
            TreeNode::Group { grouping_key, .. } => grouping_key.as_ref(),
            TreeNode::Leaf { grouping_key, .. } => grouping_key.as_ref(),
            TreeNode::Root { .. } | TreeNode::Footer { .. } | TreeNode::Pinned { .. } => None,
        }
    }

    pub fn grouping_field(&self) -> Option<&str> {
        match self {
            TreeNode::Group { grouping_field, .. } => grouping_field.as_deref(),
            TreeNode::Leaf { grouping_field, .. } => grouping_field.as_deref(),
            TreeNode::Root { .. } | TreeNode::Footer { .. } | TreeNode::Pinned { .. } => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, TreeNode::Group { .. } | TreeNode::Root { .. })
    }

    pub fn is_auto_generated(&self) -> bool {
        matches!(
            self,
            TreeNode::Group {
                is_auto_generated: true,
                ..
            }
        )
    }

    pub fn children_expanded(&self) -> Option<bool> {
        match self {
            TreeNode::Group {
                children_expanded, ..
            } => *children_expanded,
            // The root's children are always reachable.
            TreeNode::Root { .. } => Some(true),
            TreeNode::Leaf { .. } | TreeNode::Footer { .. } | TreeNode::Pinned { .. } => None,
        }
    }
}
