/// Tree Builder
///
/// Transforms a flat, ordered list of `(row id, grouping path)` descriptors
/// into a complete `RowTree`: every row becomes a leaf (or an explicit group
/// once other rows pass through it), and every unclaimed path prefix becomes
/// an auto-generated group whose id is a deterministic function of that
/// prefix. Building the same row list twice therefore yields identical node
/// ids and identical children ordering, which downstream selection/
/// expansion/scroll state depends on.
///
/// ```
/// use rowtree::{build_row_tree, BuildParams, BuilderRow, GroupingCriterion, RowId};
///
/// let rows = vec![
///     BuilderRow::new(0, vec![GroupingCriterion::new(Some("g"), "A")]),
///     BuilderRow::new(1, vec![
///         GroupingCriterion::new(Some("g"), "B"),
///         GroupingCriterion::new(Some("g"), "A"),
///     ]),
/// ];
/// let tree = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();
/// // Row 0 sits under an auto-generated "A" group? No: its path *ends* at A,
/// // so id 0 occupies the "A" slot itself. Row 1 sits under the "B" group.
/// assert_eq!(tree.get(&RowId::from(0)).unwrap().depth(), Some(0));
/// assert_eq!(tree.get(&RowId::from(1)).unwrap().depth(), Some(1));
/// assert_eq!(tree.tree_depth(), 2);
/// ```

use crate::expansion::ExpansionPolicy;
use crate::node::TreeNode;
use crate::path::{auto_generated_id, BuilderRow, GroupingCriterion, RowId};
use crate::tree::RowTree;
use std::collections::HashMap;

/// Report passed to the duplicate-path handler: two distinct rows resolved
/// to the same final tree position.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePath {
    /// Id of the row that claimed the position first.
    pub first_id: RowId,
    /// Id of the row now arriving at the same position.
    pub second_id: RowId,
    pub path: Vec<GroupingCriterion>,
}

/// What to do about a duplicate path. Silently merging rows would corrupt
/// row-count invariants, so the caller decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Drop the arriving row, keep the incumbent.
    KeepFirst,
    /// The arriving row takes over the position.
    KeepLast,
    /// Fail the whole build/update.
    Abort,
}

/// Handler invoked once per duplicate path.
pub type DuplicatePathHandler<'a> = &'a mut dyn FnMut(&DuplicatePath) -> DuplicatePolicy;

/// Inputs of a full tree build.
pub struct BuildParams<'a> {
    pub rows: &'a [BuilderRow],
    pub grouping_name: &'a str,
    pub default_grouping_expansion_depth: i32,
    pub is_group_expanded_by_default: Option<&'a dyn Fn(&TreeNode) -> bool>,
    /// Expansion state is reused from here for ids that survive the rebuild.
    pub previous_tree: Option<&'a RowTree>,
    pub on_duplicate_path: Option<DuplicatePathHandler<'a>>,
}

impl<'a> BuildParams<'a> {
    pub fn new(rows: &'a [BuilderRow], grouping_name: &'a str) -> Self {
        BuildParams {
            rows,
            grouping_name,
            default_grouping_expansion_depth: 0,
            is_group_expanded_by_default: None,
            previous_tree: None,
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

    pub fn previous_tree(mut self, tree: &'a RowTree) -> Self {
        self.previous_tree = Some(tree);
        self
    }

    pub fn on_duplicate_path(mut self, handler: DuplicatePathHandler<'a>) -> Self {
        self.on_duplicate_path = Some(handler);
        self
    }
}

/// The per-build index mapping `(field, key)` chains to the node id already
/// allocated for that prefix, so that rows sharing a prefix resolve to the
/// same group. Function scoped: it lives for one build call and is dropped
/// with it.
#[derive(Default)]
pub(crate) struct GroupingCriteriaToIdIndex {
    entries: HashMap<(Option<String>, String), IndexEntry>,
}

struct IndexEntry {
    id: RowId,
    children: GroupingCriteriaToIdIndex,
}

fn index_key(criterion: &GroupingCriterion) -> (Option<String>, String) {
    (criterion.field.clone(), criterion.key.encode())
}

impl GroupingCriteriaToIdIndex {
    fn lookup_id(&self, criterion: &GroupingCriterion) -> Option<RowId> {
        self.entries.get(&index_key(criterion)).map(|e| e.id.clone())
    }

    fn set_id(&mut self, criterion: &GroupingCriterion, id: RowId) {
        if let Some(entry) = self.entries.get_mut(&index_key(criterion)) {
            entry.id = id;
        }
    }

    fn allocate(&mut self, criterion: &GroupingCriterion, id: RowId) {
        self.entries.entry(index_key(criterion)).or_insert_with(|| IndexEntry {
            id,
            children: GroupingCriteriaToIdIndex::default(),
        });
    }

    fn child_level(&mut self, criterion: &GroupingCriterion) -> Option<&mut Self> {
        self.entries
            .get_mut(&index_key(criterion))
            .map(|e| &mut e.children)
    }
}

/// Build a complete tree from scratch. See the module docs for the id
/// determinism guarantees; duplicate final positions are routed through
/// `on_duplicate_path` (absent handler: warn and keep the last row).
pub fn build_row_tree(mut params: BuildParams<'_>) -> Result<RowTree, String> {
    let mut tree = RowTree::new(params.grouping_name);
    let mut index = GroupingCriteriaToIdIndex::default();

    for row in params.rows {
        insert_builder_row(&mut tree, &mut index, row, &mut params.on_duplicate_path)?;
    }

    finalize_expansion(
        &mut tree,
        &ExpansionPolicy::new(
            params.previous_tree,
            params.is_group_expanded_by_default,
            params.default_grouping_expansion_depth,
        ),
    );

    Ok(tree)
}

fn insert_builder_row(
    tree: &mut RowTree,
    index: &mut GroupingCriteriaToIdIndex,
    row: &BuilderRow,
    on_duplicate_path: &mut Option<DuplicatePathHandler<'_>>,
) -> Result<(), String> {
    if row.path.is_empty() {
        return insert_top_level_row(tree, row, on_duplicate_path);
    }

    let mut level = index;
    let mut parent_id = RowId::Root;

    for depth in 0..row.path.len() {
        let criterion = &row.path[depth];
        let is_final = depth == row.path.len() - 1;

        let node_id = match level.lookup_id(criterion) {
            Some(existing) if is_final && existing != row.id => {
                match tree.get(&existing) {
                    // An earlier row only passed through here; the slot
                    // belongs to an auto-generated group that this row now
                    // materializes.
                    Some(node) if node.is_auto_generated() => {
                        tree.rekey_group(&existing, row.id.clone(), false)?;
                        level.set_id(criterion, row.id.clone());
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
                                    // Incumbent is a leaf: swap it out.
                                    detach_and_remove(tree, &existing);
                                }
                                level.set_id(criterion, row.id.clone());
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
            Some(existing) => existing,
            None => {
                // A row id reused at a different position is still a
                // duplicate: one node cannot have two parents.
                if is_final && tree.contains(&row.id) {
                    let report = DuplicatePath {
                        first_id: row.id.clone(),
                        second_id: row.id.clone(),
                        path: row.path.clone(),
                    };
                    match resolve_duplicate(&report, on_duplicate_path)? {
                        DuplicatePolicy::KeepFirst => {
                            // Back out the ancestors allocated for this
                            // path: nothing will live under them.
                            tree.prune_empty_auto_groups(parent_id);
                            return Ok(());
                        }
                        DuplicatePolicy::KeepLast => detach_and_remove(tree, &row.id),
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
                level.allocate(criterion, id.clone());
                id
            }
        };

        ensure_node(tree, &node_id, criterion, depth, &parent_id, is_final);

        parent_id = node_id;
        level = level
            .child_level(criterion)
            .ok_or_else(|| format!("Index entry vanished for row {}", row.id))?;
    }

    Ok(())
}

fn insert_top_level_row(
    tree: &mut RowTree,
    row: &BuilderRow,
    on_duplicate_path: &mut Option<DuplicatePathHandler<'_>>,
) -> Result<(), String> {
    if tree.contains(&row.id) {
        let report = DuplicatePath {
            first_id: row.id.clone(),
            second_id: row.id.clone(),
            path: Vec::new(),
        };
        match resolve_duplicate(&report, on_duplicate_path)? {
            DuplicatePolicy::KeepFirst => return Ok(()),
            DuplicatePolicy::KeepLast => detach_and_remove(tree, &row.id),
            DuplicatePolicy::Abort => {
                return Err(format!("Duplicate row id {}", row.id));
            }
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
    Ok(())
}

/// Create the node for one path position if it does not exist yet, and link
/// it under its parent. Existing leaves hit by a non-final position are
/// promoted to explicit groups (tree data: a data row with descendants).
fn ensure_node(
    tree: &mut RowTree,
    node_id: &RowId,
    criterion: &GroupingCriterion,
    depth: usize,
    parent_id: &RowId,
    is_final: bool,
) {
    match tree.get(node_id) {
        None => {
            let node = if is_final {
                TreeNode::Leaf {
                    id: node_id.clone(),
                    depth,
                    parent: parent_id.clone(),
                    grouping_key: Some(criterion.key.clone()),
                    grouping_field: criterion.field.clone(),
                }
            } else {
                TreeNode::Group {
                    id: node_id.clone(),
                    depth,
                    parent: parent_id.clone(),
                    is_auto_generated: node_id.is_auto_generated(),
                    grouping_key: Some(criterion.key.clone()),
                    grouping_field: criterion.field.clone(),
                    children: Vec::new(),
                    children_expanded: None,
                    footer: None,
                }
            };
            tree.insert_node(node);
            push_child(tree, parent_id, node_id.clone());
        }
        Some(TreeNode::Leaf {
            grouping_key,
            grouping_field,
            parent,
            ..
        }) if !is_final => {
            let promoted = TreeNode::Group {
                id: node_id.clone(),
                depth,
                parent: parent.clone(),
                is_auto_generated: false,
                grouping_key: grouping_key.clone(),
                grouping_field: grouping_field.clone(),
                children: Vec::new(),
                children_expanded: None,
                footer: None,
            };
            tree.replace_node(promoted);
        }
        _ => {}
    }
}

pub(crate) fn push_child(tree: &mut RowTree, parent_id: &RowId, child: RowId) {
    if let Some(TreeNode::Root { children } | TreeNode::Group { children, .. }) =
        tree.node_mut(parent_id)
    {
        children.push(child);
    }
}

pub(crate) fn detach_and_remove(tree: &mut RowTree, id: &RowId) {
    if let Some(parent_id) = tree.get(id).and_then(|n| n.parent().cloned()) {
        if let Some(TreeNode::Root { children } | TreeNode::Group { children, .. }) =
            tree.node_mut(&parent_id)
        {
            children.retain(|c| c != id);
        }
    }
    tree.remove_node(id);
}

pub(crate) fn resolve_duplicate(
    report: &DuplicatePath,
    on_duplicate_path: &mut Option<DuplicatePathHandler<'_>>,
) -> Result<DuplicatePolicy, String> {
    match on_duplicate_path {
        Some(handler) => Ok(handler(report)),
        None => {
            log::warn!(
                "rowtree: rows {} and {} share the same grouping path, keeping the last one",
                report.first_id,
                report.second_id
            );
            Ok(DuplicatePolicy::KeepLast)
        }
    }
}

/// Second pass: every group gets its expansion state now that children
/// lists are final.
pub(crate) fn finalize_expansion(tree: &mut RowTree, policy: &ExpansionPolicy<'_>) {
    let decisions: Vec<(RowId, Option<bool>)> = tree
        .iter()
        .filter(|node| matches!(node, TreeNode::Group { .. }))
        .map(|node| (node.id().clone(), policy.children_expanded(node)))
        .collect();

    for (id, expanded) in decisions {
        if let Some(TreeNode::Group {
            children_expanded, ..
        }) = tree.node_mut(&id)
        {
            *children_expanded = expanded;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crit(key: &str) -> GroupingCriterion {
        GroupingCriterion::new(Some("g"), key)
    }

    fn spec_rows() -> Vec<BuilderRow> {
        vec![
            BuilderRow::new(0, vec![]),
            BuilderRow::new(1, vec![crit("B"), crit("A")]),
            BuilderRow::new(2, vec![crit("B"), crit("A"), crit("A")]),
        ]
    }

    #[test]
    fn test_build_shapes_the_documented_tree() {
        let rows = spec_rows();
        let tree = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();

        // 0, 1, 2 plus the auto-generated "B" group.
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.tree_depth(), 3);
        assert!(tree.validate().is_ok());

        let b_id = auto_generated_id(&[crit("B")], 0);
        let b = tree.get(&b_id).unwrap();
        assert!(b.is_auto_generated());
        assert_eq!(b.depth(), Some(0));

        // Row 1's own path terminates at B/A, so id 1 occupies that slot
        // and row 2 hangs under it.
        let one = tree.get(&RowId::from(1)).unwrap();
        assert_eq!(one.depth(), Some(1));
        assert!(!one.is_auto_generated());
        assert!(one.is_group());
        assert_eq!(tree.get(&RowId::from(2)).unwrap().parent(), Some(&RowId::from(1)));
        assert_eq!(tree.get(&RowId::from(0)).unwrap().depth(), Some(0));
    }

    #[test]
    fn test_collapsed_by_default_at_depth_zero() {
        let rows = spec_rows();
        let tree = build_row_tree(BuildParams::new(&rows, "grouping-columns").expansion_depth(0))
            .unwrap();

        let b_id = auto_generated_id(&[crit("B")], 0);
        assert_eq!(tree.get(&b_id).unwrap().children_expanded(), Some(false));
        assert_eq!(
            tree.get(&RowId::from(1)).unwrap().children_expanded(),
            Some(false)
        );
    }

    #[test]
    fn test_build_is_idempotent() {
        let rows = spec_rows();
        let a = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();
        let b = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.data_row_ids(), b.data_row_ids());
    }

    #[test]
    fn test_adoption_when_parent_row_arrives_after_children() {
        // Same dataset as spec_rows but row 1 (the B/A parent) arrives last.
        let rows = vec![
            BuilderRow::new(2, vec![crit("B"), crit("A"), crit("A")]),
            BuilderRow::new(1, vec![crit("B"), crit("A")]),
        ];
        let tree = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();

        let one = tree.get(&RowId::from(1)).unwrap();
        assert!(one.is_group());
        assert!(!one.is_auto_generated());
        assert_eq!(one.children(), &[RowId::from(2)]);
        assert_eq!(tree.get(&RowId::from(2)).unwrap().parent(), Some(&RowId::from(1)));
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_duplicate_path_keep_first() {
        let rows = vec![
            BuilderRow::new(1, vec![crit("A")]),
            BuilderRow::new(2, vec![crit("A")]),
        ];
        let mut reports = Vec::new();
        let mut handler = |report: &DuplicatePath| {
            reports.push(report.clone());
            DuplicatePolicy::KeepFirst
        };
        let tree = build_row_tree(
            BuildParams::new(&rows, "grouping-columns").on_duplicate_path(&mut handler),
        )
        .unwrap();

        assert!(tree.contains(&RowId::from(1)));
        assert!(!tree.contains(&RowId::from(2)));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].first_id, RowId::from(1));
        assert_eq!(reports[0].second_id, RowId::from(2));
    }

    #[test]
    fn test_duplicate_path_keep_last() {
        let rows = vec![
            BuilderRow::new(1, vec![crit("A")]),
            BuilderRow::new(2, vec![crit("A")]),
        ];
        let mut handler = |_: &DuplicatePath| DuplicatePolicy::KeepLast;
        let tree = build_row_tree(
            BuildParams::new(&rows, "grouping-columns").on_duplicate_path(&mut handler),
        )
        .unwrap();

        assert!(!tree.contains(&RowId::from(1)));
        assert!(tree.contains(&RowId::from(2)));
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_duplicate_path_abort() {
        let rows = vec![
            BuilderRow::new(1, vec![crit("A")]),
            BuilderRow::new(2, vec![crit("A")]),
        ];
        let mut handler = |_: &DuplicatePath| DuplicatePolicy::Abort;
        let result =
            build_row_tree(BuildParams::new(&rows, "grouping-columns").on_duplicate_path(&mut handler));
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_id_keep_first_leaves_no_empty_ancestors() {
        // Row id 1 appears twice with different paths; keeping the first
        // claimant must not leave the loser's auto-generated ancestors
        // behind, childless.
        let rows = vec![
            BuilderRow::new(1, vec![crit("A"), crit("x")]),
            BuilderRow::new(1, vec![crit("B"), crit("y")]),
        ];
        let mut handler = |_: &DuplicatePath| DuplicatePolicy::KeepFirst;
        let tree = build_row_tree(
            BuildParams::new(&rows, "grouping-columns").on_duplicate_path(&mut handler),
        )
        .unwrap();

        let b_id = auto_generated_id(&[crit("B")], 0);
        assert!(!tree.contains(&b_id));
        assert_eq!(tree.len(), 2); // the A group and row 1
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_previous_tree_expansion_survives_rebuild() {
        let rows = spec_rows();
        let mut first =
            build_row_tree(BuildParams::new(&rows, "grouping-columns").expansion_depth(0)).unwrap();

        // User expands the B group.
        let b_id = auto_generated_id(&[crit("B")], 0);
        if let Some(TreeNode::Group {
            children_expanded, ..
        }) = first.node_mut(&b_id)
        {
            *children_expanded = Some(true);
        }

        let second = build_row_tree(
            BuildParams::new(&rows, "grouping-columns")
                .expansion_depth(0)
                .previous_tree(&first),
        )
        .unwrap();
        assert_eq!(second.get(&b_id).unwrap().children_expanded(), Some(true));
        // Groups unknown to the previous tree still follow the default rule.
        assert_eq!(
            second.get(&RowId::from(1)).unwrap().children_expanded(),
            Some(false)
        );
    }

    #[test]
    fn test_sibling_order_follows_input_order() {
        let rows = vec![
            BuilderRow::new(10, vec![crit("G"), crit("x")]),
            BuilderRow::new(11, vec![crit("G"), crit("y")]),
            BuilderRow::new(12, vec![crit("G"), crit("z")]),
        ];
        let tree = build_row_tree(BuildParams::new(&rows, "grouping-columns")).unwrap();
        let g_id = auto_generated_id(&[crit("G")], 0);
        assert_eq!(
            tree.get(&g_id).unwrap().children(),
            &[RowId::from(10), RowId::from(11), RowId::from(12)]
        );
    }
}
