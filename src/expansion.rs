/// Group Expansion Policy
///
/// Decides whether a newly created group starts with its children expanded.
/// Priority order:
///
/// 1. The previous tree's value for the same node id, so rebuilds and
///    incremental updates never reset what the user toggled.
/// 2. `None` ("no opinion") for groups without children, where expansion is
///    meaningless.
/// 3. A caller-supplied predicate, when configured.
/// 4. The default-depth rule: expanded iff the configured depth is -1
///    (expand everything) or strictly greater than the node's depth.

use crate::node::TreeNode;
use crate::path::RowId;
use crate::tree::RowTree;

/// Expand every group, at any depth.
pub const EXPAND_ALL_DEPTH: i32 = -1;

/// The expansion inputs shared by the builder and the updater. Function
/// scoped: constructed per build/update call, never stored.
pub struct ExpansionPolicy<'a> {
    previous_tree: Option<&'a RowTree>,
    is_group_expanded_by_default: Option<&'a dyn Fn(&TreeNode) -> bool>,
    default_grouping_expansion_depth: i32,
}

impl<'a> ExpansionPolicy<'a> {
    pub fn new(
        previous_tree: Option<&'a RowTree>,
        is_group_expanded_by_default: Option<&'a dyn Fn(&TreeNode) -> bool>,
        default_grouping_expansion_depth: i32,
    ) -> Self {
        ExpansionPolicy {
            previous_tree,
            is_group_expanded_by_default,
            default_grouping_expansion_depth,
        }
    }

    /// Expansion state for a freshly created or finalized group. The node
    /// must already carry its final children list and depth.
    pub fn children_expanded(&self, node: &TreeNode) -> Option<bool> {
        if let Some(previous) = self.previous_value(node.id()) {
            return Some(previous);
        }

        if node.children().is_empty() {
            return None;
        }

        if let Some(predicate) = self.is_group_expanded_by_default {
            return Some(predicate(node));
        }

        let depth = node.depth().unwrap_or(0) as i32;
        Some(
            self.default_grouping_expansion_depth == EXPAND_ALL_DEPTH
                || self.default_grouping_expansion_depth > depth,
        )
    }

    fn previous_value(&self, id: &RowId) -> Option<bool> {
        self.previous_tree?.get(id)?.children_expanded()
    }
}
