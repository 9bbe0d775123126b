/// RowTree - Hierarchical Row Engine for Grouped Tabular Data
///
/// Builds a hierarchy over flat rows from per-row grouping paths, with
/// auto-generated intermediate groups, incremental delta updates that touch
/// only affected subtrees, expansion-state management, visibility
/// propagation under filtering, and synthesized grouping columns.

pub mod key;
pub mod path;
pub mod node;
pub mod tree;
pub mod delta;
pub mod expansion;
pub mod build;
pub mod update;
pub mod filter;
pub mod grouping_column;

pub use key::GroupingKey;
pub use path::{BuilderRow, GroupingCriterion, RowId};
pub use node::{PinnedPosition, TreeNode};
pub use tree::{RowTree, TreeDepths, TreeSnapshot};
pub use delta::{GroupAction, GroupUpdateInfo, TreeDelta, UpdatedGroups};
pub use expansion::{ExpansionPolicy, EXPAND_ALL_DEPTH};
pub use build::{build_row_tree, BuildParams, DuplicatePath, DuplicatePathHandler, DuplicatePolicy};
pub use update::{update_row_tree, TreeUpdateOutput, UpdateParams};
pub use filter::{filter_row_tree, FilterItemScope, FilterOutput, RowMatcher};
pub use grouping_column::{
    create_grouping_columns, grouping_field_index_compare, is_grouping_column,
    row_grouping_criterion_from_field, row_grouping_field_from_criterion,
    should_apply_filter_item_on_group, ColumnDef, GroupingCell, GroupingColumn, GroupingColumnMode,
    GroupingModel,
    KeyComparator, ROW_GROUPING_SINGLE_GROUPING_FIELD, ROW_GROUPING_STRATEGY,
};

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn crit(field: &str, key: &str) -> GroupingCriterion {
        GroupingCriterion::new(Some(field), key)
    }

    fn sales_rows() -> Vec<BuilderRow> {
        vec![
            BuilderRow::new(1, vec![crit("region", "EMEA"), crit("product", "Widget")]),
            BuilderRow::new(2, vec![crit("region", "EMEA"), crit("product", "Widget")]),
            BuilderRow::new(3, vec![crit("region", "EMEA"), crit("product", "Gadget")]),
            BuilderRow::new(4, vec![crit("region", "APAC"), crit("product", "Widget")]),
            BuilderRow::new(5, vec![]),
        ]
    }

    #[test]
    fn test_complete_workflow() {
        // Build a grouped tree over the sales rows.
        let rows = sales_rows();
        let tree = build_row_tree(
            BuildParams::new(&rows, ROW_GROUPING_STRATEGY).expansion_depth(EXPAND_ALL_DEPTH),
        )
        .unwrap();

        // 5 data rows plus 2 region groups and 3 product groups.
        assert_eq!(tree.len(), 10);
        assert_eq!(tree.tree_depth(), 3);
        tree.validate().unwrap();

        let emea = path::auto_generated_id(&[crit("region", "EMEA")], 0);
        let emea_widget = path::auto_generated_id(
            &[crit("region", "EMEA"), crit("product", "Widget")],
            1,
        );
        assert_eq!(tree.get(&emea).unwrap().children().len(), 2);
        assert_eq!(tree.get(&emea_widget).unwrap().children().len(), 2);
        assert_eq!(
            tree.get(&RowId::from(5)).unwrap().parent(),
            Some(&RowId::Root)
        );

        // Incrementally move row 3 under Widget and add a new APAC row.
        let mut delta = TreeDelta::new();
        delta
            .modify(3, vec![crit("region", "EMEA"), crit("product", "Widget")])
            .insert(6, vec![crit("region", "APAC"), crit("product", "Gadget")]);
        let output = update_row_tree(
            UpdateParams::new(&tree, &delta).expansion_depth(EXPAND_ALL_DEPTH),
        )
        .unwrap();
        let tree = output.tree;
        tree.validate().unwrap();

        // The EMEA/Gadget group lost its only child and was pruned.
        let emea_gadget = path::auto_generated_id(
            &[crit("region", "EMEA"), crit("product", "Gadget")],
            1,
        );
        assert!(!tree.contains(&emea_gadget));
        assert_eq!(tree.get(&emea_widget).unwrap().children().len(), 3);
        let widget_info = output.updated_groups.get(&emea_widget).unwrap();
        assert!(widget_info.inserted_children);

        // Filter down to Widget leaves only.
        let matcher = |id: &RowId, _: Option<&FilterItemScope<'_>>| -> bool {
            matches!(id, RowId::Int(n) if [1, 2, 3, 4].contains(n))
        };
        let filter = filter_row_tree(&tree, Some(&matcher));
        assert!(filter.is_filtered_in(&emea_widget));
        assert_eq!(filter.filtered_descendant_count(&emea), 3);
        let apac_gadget = path::auto_generated_id(
            &[crit("region", "APAC"), crit("product", "Gadget")],
            1,
        );
        assert!(!filter.is_filtered_in(&apac_gadget));
        assert!(!filter.is_filtered_in(&RowId::from(5)));

        // Synthesize grouping columns and read a group cell.
        let model = GroupingModel::new(vec!["region".to_string(), "product".to_string()]);
        let columns = vec![ColumnDef::new("region"), ColumnDef::new("product")];
        let derived = create_grouping_columns(&model, &columns, GroupingColumnMode::PerCriterion).unwrap();
        assert_eq!(
            derived[0].cell_value(&tree, &filter, &emea),
            Some(GroupingCell::Group {
                key: GroupingKey::from("EMEA"),
                filtered_descendant_count: Some(3),
            })
        );
    }

    #[test]
    fn test_update_matches_rebuild() {
        let mut rows = sales_rows();
        let tree = build_row_tree(
            BuildParams::new(&rows, ROW_GROUPING_STRATEGY).expansion_depth(EXPAND_ALL_DEPTH),
        )
        .unwrap();

        let new_path = vec![crit("region", "EMEA"), crit("product", "Widget")];
        let mut delta = TreeDelta::new();
        delta.insert(7, new_path.clone()).remove(4);
        let updated = update_row_tree(
            UpdateParams::new(&tree, &delta).expansion_depth(EXPAND_ALL_DEPTH),
        )
        .unwrap();

        rows.retain(|r| r.id != RowId::from(4));
        rows.push(BuilderRow::new(7, new_path));
        let rebuilt = build_row_tree(
            BuildParams::new(&rows, ROW_GROUPING_STRATEGY).expansion_depth(EXPAND_ALL_DEPTH),
        )
        .unwrap();

        assert_eq!(updated.tree.len(), rebuilt.len());
        for node in rebuilt.iter() {
            let other = updated.tree.get(node.id()).unwrap();
            assert_eq!(node.depth(), other.depth());
            assert_eq!(node.parent(), other.parent());
        }
    }
}
