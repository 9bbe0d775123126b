/// Filter Propagation over the Row Tree
///
/// Computes, for every node, two orthogonal facts plus a count:
///
/// - **filtered-in**: the node passes the active filter, considering
///   subtree matches. A leaf passes when it matches directly; a group with
///   children passes when it matches directly AND at least one descendant
///   passes; ancestors failing the filter veto the whole subtree.
/// - **visible**: filtered-in AND every ancestor is expanded. Collapsing a
///   group hides descendants from rendering without removing them from the
///   filtered-in set, so a collapsed group still reports an accurate
///   "N matching rows" descendant count.
/// - **filtered descendant count**: number of filtered-in data rows in the
///   node's subtree.
///
/// The traversal is a post-order walk driven by an explicit stack: depth is
/// bounded only by grouping-path length times dataset nesting, which is
/// caller-controlled, so recursion is not an option.

use crate::grouping_column::should_apply_filter_item_on_group;
use crate::node::TreeNode;
use crate::path::RowId;
use crate::tree::RowTree;
use std::collections::HashMap;

/// Closure restricting which filter items apply at a given node: called
/// with a column field, returns whether items targeting that column should
/// be evaluated here.
pub type FilterItemScope<'a> = dyn Fn(&str) -> bool + 'a;

/// The per-node match predicate supplied by the filtering subsystem. The
/// second argument is `Some` only for auto-generated groups, where items
/// tied to other grouping criteria must be skipped (they apply to
/// descendants at the matching depth instead).
pub type RowMatcher<'a> = dyn Fn(&RowId, Option<&FilterItemScope<'_>>) -> bool + 'a;

/// Disposable projection of one propagation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutput {
    visible: HashMap<RowId, bool>,
    filtered_in: HashMap<RowId, bool>,
    filtered_descendant_count: HashMap<RowId, usize>,
}

impl FilterOutput {
    /// Filtered-in AND all ancestors expanded: what the renderer draws.
    pub fn is_visible(&self, id: &RowId) -> bool {
        self.visible.get(id).copied().unwrap_or(false)
    }

    /// Passes filtering, independent of expansion.
    pub fn is_filtered_in(&self, id: &RowId) -> bool {
        self.filtered_in.get(id).copied().unwrap_or(false)
    }

    pub fn filtered_descendant_count(&self, id: &RowId) -> usize {
        self.filtered_descendant_count
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn visible_count(&self) -> usize {
        self.visible.values().filter(|v| **v).count()
    }
}

enum Frame<'t> {
    Enter {
        node: &'t TreeNode,
        ancestors_passing: bool,
        ancestors_expanded: bool,
    },
    Exit {
        node: &'t TreeNode,
        is_matching: bool,
        ancestors_passing: bool,
        ancestors_expanded: bool,
    },
}

/// Run one propagation pass. An absent matcher means "everything matches":
/// only expansion then decides visibility.
pub fn filter_row_tree(tree: &RowTree, is_row_matching: Option<&RowMatcher<'_>>) -> FilterOutput {
    let mut out = FilterOutput::default();
    // Post-order return value of each node, summed by its parent.
    let mut subtree_counts: HashMap<RowId, usize> = HashMap::new();

    let mut stack: Vec<Frame<'_>> = Vec::new();
    for child in tree.root().children().iter().rev() {
        if let Some(node) = tree.get(child) {
            stack.push(Frame::Enter {
                node,
                ancestors_passing: true,
                ancestors_expanded: true,
            });
        }
    }

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter {
                node,
                ancestors_passing,
                ancestors_expanded,
            } => {
                let is_matching = match is_row_matching {
                    None => true,
                    Some(matcher) => {
                        if node.is_auto_generated() {
                            let scope = |column_field: &str| {
                                should_apply_filter_item_on_group(column_field, node)
                            };
                            matcher(node.id(), Some(&scope))
                        } else {
                            matcher(node.id(), None)
                        }
                    }
                };

                stack.push(Frame::Exit {
                    node,
                    is_matching,
                    ancestors_passing,
                    ancestors_expanded,
                });
                let expanded = node.children_expanded().unwrap_or(false);
                for child in node.children().iter().rev() {
                    if let Some(child_node) = tree.get(child) {
                        stack.push(Frame::Enter {
                            node: child_node,
                            ancestors_passing: ancestors_passing && is_matching,
                            ancestors_expanded: ancestors_expanded && expanded,
                        });
                    }
                }
            }
            Frame::Exit {
                node,
                is_matching,
                ancestors_passing,
                ancestors_expanded,
            } => {
                let filtered_descendant_count: usize = node
                    .children()
                    .iter()
                    .map(|child| subtree_counts.get(child).copied().unwrap_or(0))
                    .sum();

                let passes = if !ancestors_passing {
                    false
                } else if !node.children().is_empty() {
                    is_matching && filtered_descendant_count > 0
                } else {
                    is_matching
                };

                out.visible
                    .insert(node.id().clone(), passes && ancestors_expanded);
                out.filtered_in.insert(node.id().clone(), passes);

                if let TreeNode::Group {
                    footer: Some(footer),
                    children_expanded,
                    ..
                } = node
                {
                    // A footer follows its group: shown only when the group
                    // passes and is open.
                    out.filtered_in.insert(footer.clone(), passes);
                    out.visible.insert(
                        footer.clone(),
                        passes && ancestors_expanded && children_expanded.unwrap_or(false),
                    );
                }

                if !passes {
                    subtree_counts.insert(node.id().clone(), 0);
                    continue;
                }

                out.filtered_descendant_count
                    .insert(node.id().clone(), filtered_descendant_count);

                // A data row without children counts itself; groups only
                // relay their descendants.
                let own = match node {
                    TreeNode::Leaf { .. } => 1,
                    TreeNode::Group {
                        is_auto_generated: false,
                        children,
                        ..
                    } if children.is_empty() => 1,
                    _ => 0,
                };
                subtree_counts
                    .insert(node.id().clone(), filtered_descendant_count + own);
            }
        }
    }

    // Pinned rows sit outside the tree walk and are always shown.
    for node in tree.iter() {
        if let TreeNode::Pinned { id, .. } = node {
            out.filtered_in.insert(id.clone(), true);
            out.visible.insert(id.clone(), true);
        }
    }

    out
}
