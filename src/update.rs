/// Tree Updater
///
/// Applies a `TreeDelta` (inserted / modified / removed rows) to an
/// existing tree, reusing every unaffected subtree. A full rebuild is O(n)
/// in dataset size on every keystroke-level edit; this bounds the work to
/// the size of the delta plus the depth of the affected paths, with one
/// unavoidable O(n) traversal at the end to re-derive the flattened
/// data-row ordering.
///
/// The previous tree is never mutated: the update works on a copy-on-write
/// clone, so the caller can keep and diff both versions.
///
/// ```
/// use rowtree::{build_row_tree, update_row_tree, BuildParams, UpdateParams,
///               BuilderRow, GroupingCriterion, TreeDelta, RowId};
///
/// let rows = vec![BuilderRow::new(1, vec![GroupingCriterion::new(Some("g"), "A")])];
/// let tree = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();
///
/// let mut delta = TreeDelta::new();
/// delta.insert(2, vec![GroupingCriterion::new(Some("g"), "B"),
///                      GroupingCriterion::new(Some("g"), "b1")]);
/// let out = update_row_tree(UpdateParams::new(&tree, &delta)).unwrap();
/// assert!(out.tree.contains(&RowId::from(2)));
/// assert!(tree.contains(&RowId::from(1))); // previous snapshot untouched
/// ```

use crate::build::{
    detach_and_remove, push_child, resolve_duplicate, DuplicatePath, DuplicatePathHandler,
    DuplicatePolicy,
};
use crate::delta::{GroupAction, TreeDelta, UpdatedGroups};
use crate::expansion::ExpansionPolicy;
use crate::node::TreeNode;
use crate::path::{auto_generated_id, paths_equal, BuilderRow, GroupingCriterion, RowId};
use crate::tree::RowTree;

/// Inputs of one incremental update pass.
pub struct UpdateParams<'a> {
    pub previous_tree: &'a RowTree,
    pub delta: &'a TreeDelta,
    pub default_grouping_expansion_depth: i32,
    pub is_group_expanded_by_default: Option<&'a dyn Fn(&TreeNode) -> bool>,
    pub on_duplicate_path: Option<DuplicatePathHandler<'a>>,
}

impl<'a> UpdateParams<'a> {
    pub fn new(previous_tree: &'a RowTree, delta: &'a TreeDelta) -> Self {
        UpdateParams {
            previous_tree,
            delta,
            default_grouping_expansion_depth: 0,
            is_group_expanded_by_default: None,
            on_duplicate_path: None,
        }
    }

    pub fn expansion_depth(mut self, depth: i32) -> Self {
        self.default_grouping_expansion_depth = depth;
        self
    }

    pub fn expanded_by_default(mut self, predicate: &'a dyn Fn(&TreeNode) -> bool) -> Self {
        self.is_group_expanded_by_default = Some(predicate);
        self
    }

    pub fn on_duplicate_path(mut self, handler: DuplicatePathHandler<'a>) -> Self {
        self.on_duplicate_path = Some(handler);
        self
    }
}

/// Result of an update pass. Ownership of the new snapshot transfers fully
/// to the caller.
pub struct TreeUpdateOutput {
    pub tree: RowTree,
    /// Flattened data-row ids, depth-first in children order.
    pub data_row_ids: Vec<RowId>,
    /// Which groups had their child set or children touched, for targeted
    /// invalidation of cached row heights/positions.
    pub updated_groups: UpdatedGroups,
}

pub fn update_row_tree(mut params: UpdateParams<'_>) -> Result<TreeUpdateOutput, String> {
    let mut tree = params.previous_tree.clone();
    let mut updated_groups = UpdatedGroups::new();
    let policy = ExpansionPolicy::new(
        Some(params.previous_tree),
        params.is_group_expanded_by_default,
        params.default_grouping_expansion_depth,
    );

    for row in &params.delta.inserted {
        insert_data_row(
            &mut tree,
            &mut updated_groups,
            &policy,
            row,
            &mut params.on_duplicate_path,
        )?;
    }

    for id in &params.delta.removed {
        remove_data_row(&mut tree, &mut updated_groups, id);
    }

    for row in &params.delta.modified {
        let previous_path = match tree.node_path(&row.id) {
            Some(path) => path,
            None => {
                log::warn!(
                    "rowtree: modified row {} is not in the tree, skipping",
                    row.id
                );
                continue;
            }
        };

        if paths_equal(&previous_path, &row.path) {
            // No structural move, but height/content caches for the parent
            // must still be refreshed.
            if let Some(parent) = tree.get(&row.id).and_then(|n| n.parent().cloned()) {
                updated_groups.record(&parent, GroupAction::ModifyChildren);
            }
        } else {
            // Remove first so stale auto-generated ancestors are pruned
            // before new ones are (re)allocated.
            remove_data_row(&mut tree, &mut updated_groups, &row.id);
            insert_data_row(
                &mut tree,
                &mut updated_groups,
                &policy,
                row,
                &mut params.on_duplicate_path,
            )?;
        }
    }

    let data_row_ids = tree.data_row_ids();

    Ok(TreeUpdateOutput {
        tree,
        data_row_ids,
        updated_groups,
    })
}

/// Descend/allocate nodes along `row.path`, reusing existing ancestors
/// whose `(field, key)` prefix is already materialized in the live tree.
fn insert_data_row(
    tree: &mut RowTree,
    updated_groups: &mut UpdatedGroups,
    policy: &ExpansionPolicy<'_>,
    row: &BuilderRow,
    on_duplicate_path: &mut Option<DuplicatePathHandler<'_>>,
) -> Result<(), String> {
    if row.path.is_empty() {
        if tree.contains(&row.id) {
            let report = DuplicatePath {
                first_id: row.id.clone(),
                second_id: row.id.clone(),
                path: Vec::new(),
            };
            match resolve_duplicate(&report, on_duplicate_path)? {
                DuplicatePolicy::KeepFirst => return Ok(()),
                DuplicatePolicy::KeepLast => remove_data_row(tree, updated_groups, &row.id),
                DuplicatePolicy::Abort => return Err(format!("Duplicate row id {}", row.id)),
            }
        }
        tree.insert_node(TreeNode::Leaf {
            id: row.id.clone(),
            depth: 0,
            parent: RowId::Root,
            grouping_key: None,
            grouping_field: None,
        });
        push_child(tree, &RowId::Root, row.id.clone());
        updated_groups.record(&RowId::Root, GroupAction::InsertChildren);
        return Ok(());
    }

    let mut parent_id = RowId::Root;

    for depth in 0..row.path.len() {
        let criterion = &row.path[depth];
        let is_final = depth == row.path.len() - 1;

        let node_id = match find_child(tree, &parent_id, criterion) {
            Some(existing) if is_final && existing != row.id => {
                match tree.get(&existing) {
                    Some(node) if node.is_auto_generated() => {
                        tree.rekey_group(&existing, row.id.clone(), false)?;
                        updated_groups.record(&parent_id, GroupAction::InsertChildren);
                        row.id.clone()
                    }
                    _ => {
                        let report = DuplicatePath {
                            first_id: existing.clone(),
                            second_id: row.id.clone(),
                            path: row.path.clone(),
                        };
                        match resolve_duplicate(&report, on_duplicate_path)? {
                            DuplicatePolicy::KeepFirst => return Ok(()),
                            DuplicatePolicy::KeepLast => {
                                if tree.rekey_group(&existing, row.id.clone(), false).is_err() {
                                    // Leaf incumbent: swap it out in place.
                                    // No pruning here, the ancestors are
                                    // about to receive the arriving row.
                                    detach_and_remove(tree, &existing);
                                    tree.insert_node(TreeNode::Leaf {
                                        id: row.id.clone(),
                                        depth,
                                        parent: parent_id.clone(),
                                        grouping_key: Some(criterion.key.clone()),
                                        grouping_field: criterion.field.clone(),
                                    });
                                    push_child(tree, &parent_id, row.id.clone());
                                    updated_groups
                                        .record(&parent_id, GroupAction::RemoveChildren);
                                }
                                updated_groups.record(&parent_id, GroupAction::InsertChildren);
                                row.id.clone()
                            }
                            DuplicatePolicy::Abort => {
                                return Err(format!(
                                    "Duplicate grouping path for rows {} and {}",
                                    report.first_id, report.second_id
                                ))
                            }
                        }
                    }
                }
            }
            Some(existing) => {
                if !is_final {
                    promote_leaf_to_group(tree, &existing);
                }
                existing
            }
            None => {
                if is_final && tree.contains(&row.id) {
                    let report = DuplicatePath {
                        first_id: row.id.clone(),
                        second_id: row.id.clone(),
                        path: row.path.clone(),
                    };
                    match resolve_duplicate(&report, on_duplicate_path)? {
                        DuplicatePolicy::KeepFirst => {
                            // Back out the ancestors allocated for the new
                            // path: nothing will live under them.
                            prune_empty_auto_groups(tree, updated_groups, parent_id);
                            return Ok(());
                        }
                        DuplicatePolicy::KeepLast => {
                            remove_data_row(tree, updated_groups, &row.id)
                        }
                        DuplicatePolicy::Abort => {
                            return Err(format!("Duplicate row id {}", row.id));
                        }
                    }
                }

                let id = if is_final {
                    row.id.clone()
                } else {
                    auto_generated_id(&row.path, depth)
                };
                let node = if is_final {
                    TreeNode::Leaf {
                        id: id.clone(),
                        depth,
                        parent: parent_id.clone(),
                        grouping_key: Some(criterion.key.clone()),
                        grouping_field: criterion.field.clone(),
                    }
                } else {
                    TreeNode::Group {
                        id: id.clone(),
                        depth,
                        parent: parent_id.clone(),
                        is_auto_generated: true,
                        grouping_key: Some(criterion.key.clone()),
                        grouping_field: criterion.field.clone(),
                        children: Vec::new(),
                        children_expanded: None,
                        footer: None,
                    }
                };
                tree.insert_node(node);
                push_child(tree, &parent_id, id.clone());
                updated_groups.record(&parent_id, GroupAction::InsertChildren);
                refresh_expansion(tree, policy, &parent_id);
                id
            }
        };

        parent_id = node_id;
    }

    Ok(())
}

/// Detach one data row. Auto-generated ancestors left childless are pruned
/// recursively; a removed row that is a group with remaining children keeps
/// the structure alive by swapping its id for the deterministic
/// auto-generated one.
fn remove_data_row(tree: &mut RowTree, updated_groups: &mut UpdatedGroups, id: &RowId) {
    let node = match tree.get(id) {
        Some(node) => node,
        None => {
            log::warn!("rowtree: removed row {} is not in the tree, skipping", id);
            return;
        }
    };

    match node {
        TreeNode::Root { .. } | TreeNode::Footer { .. } | TreeNode::Pinned { .. } => {
            log::warn!("rowtree: {} is not a data row, skipping removal", id);
        }
        TreeNode::Group { children, parent, .. } if !children.is_empty() => {
            let parent = parent.clone();
            match tree.node_path(id) {
                Some(path) if !path.is_empty() => {
                    let replacement = auto_generated_id(&path, path.len() - 1);
                    // rekey_group only fails for non-groups; this is a group.
                    let _ = tree.rekey_group(id, replacement, true);
                    updated_groups.record(&parent, GroupAction::RemoveChildren);
                    updated_groups.record(&parent, GroupAction::InsertChildren);
                }
                _ => {
                    // No reconstructible path: drop the whole subtree,
                    // footers included.
                    for descendant in tree.descendants(id, false) {
                        let footer = match tree.get(&descendant) {
                            Some(TreeNode::Group { footer, .. }) => footer.clone(),
                            _ => None,
                        };
                        if let Some(footer_id) = footer {
                            tree.remove_node(&footer_id);
                        }
                        tree.remove_node(&descendant);
                    }
                    let own_footer = match tree.get(id) {
                        Some(TreeNode::Group { footer, .. }) => footer.clone(),
                        _ => None,
                    };
                    if let Some(footer_id) = own_footer {
                        tree.remove_node(&footer_id);
                    }
                    detach_and_remove(tree, id);
                    updated_groups.record(&parent, GroupAction::RemoveChildren);
                }
            }
        }
        TreeNode::Group { parent, footer, .. } => {
            let parent = parent.clone();
            let footer = footer.clone();
            if let Some(footer_id) = footer {
                tree.remove_node(&footer_id);
            }
            detach_and_remove(tree, id);
            updated_groups.record(&parent, GroupAction::RemoveChildren);
            prune_empty_auto_groups(tree, updated_groups, parent);
        }
        TreeNode::Leaf { parent, .. } => {
            let parent = parent.clone();
            detach_and_remove(tree, id);
            updated_groups.record(&parent, GroupAction::RemoveChildren);
            prune_empty_auto_groups(tree, updated_groups, parent);
        }
    }
}

/// Prune childless auto-generated ancestors above `from`, reporting each
/// detachment to the caller's change-set.
fn prune_empty_auto_groups(tree: &mut RowTree, updated_groups: &mut UpdatedGroups, from: RowId) {
    for parent in tree.prune_empty_auto_groups(from) {
        updated_groups.record(&parent, GroupAction::RemoveChildren);
    }
}

fn find_child(tree: &RowTree, parent_id: &RowId, criterion: &GroupingCriterion) -> Option<RowId> {
    tree.child_ids(parent_id)
        .iter()
        .find(|child_id| {
            tree.get(child_id).is_some_and(|node| {
                node.grouping_field() == criterion.field.as_deref()
                    && node
                        .grouping_key()
                        .is_some_and(|key| key.same_as(&criterion.key))
            })
        })
        .cloned()
}

fn promote_leaf_to_group(tree: &mut RowTree, id: &RowId) {
    if let Some(TreeNode::Leaf {
        id,
        depth,
        parent,
        grouping_key,
        grouping_field,
    }) = tree.get(id).cloned()
    {
        tree.replace_node(TreeNode::Group {
            id,
            depth,
            parent,
            is_auto_generated: false,
            grouping_key,
            grouping_field,
            children: Vec::new(),
            children_expanded: None,
            footer: None,
        });
    }
}

/// Newly created or newly promoted groups get their expansion state as soon
/// as they have a child to expand.
fn refresh_expansion(tree: &mut RowTree, policy: &ExpansionPolicy<'_>, id: &RowId) {
    let decision = match tree.get(id) {
        Some(
            node @ TreeNode::Group {
                children_expanded: None,
                ..
            },
        ) if !node.children().is_empty() => policy.children_expanded(node),
        _ => return,
    };
    if let Some(TreeNode::Group {
        children_expanded, ..
    }) = tree.node_mut(id)
    {
        *children_expanded = decision;
    }
}
