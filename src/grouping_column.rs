/// Grouping Column Synthesis
///
/// Grouping adds virtual columns to the grid: one per grouping criterion,
/// or a single combined column covering all criteria. A grouping column has
/// no data of its own; its cells, comparators and filter operators delegate
/// to the grouped-by column for group rows of its criterion, optionally to
/// a designated leaf column for data rows, and stand down ("pass") for
/// everything outside its jurisdiction so multiple grouping columns can
/// coexist without collisions.
///
/// The virtual field names are reversibly encoded so the filtering
/// subsystem can recognize grouping columns and map them back to their
/// criterion.

use crate::filter::FilterOutput;
use crate::key::GroupingKey;
use crate::node::TreeNode;
use crate::path::RowId;
use crate::tree::RowTree;
use std::cmp::Ordering;

/// Field name of the combined grouping column.
pub const ROW_GROUPING_SINGLE_GROUPING_FIELD: &str = "__row_group_by_columns_group__";

/// Strategy name reported by trees built from synthetic grouping.
pub const ROW_GROUPING_STRATEGY: &str = "grouping-columns";

pub fn row_grouping_field_from_criterion(criterion: Option<&str>) -> String {
    match criterion {
        None => ROW_GROUPING_SINGLE_GROUPING_FIELD.to_string(),
        Some(criterion) => format!("__row_group_by_columns_group_{}__", criterion),
    }
}

pub fn row_grouping_criterion_from_field(field: &str) -> Option<&str> {
    field
        .strip_prefix("__row_group_by_columns_group_")?
        .strip_suffix("__")
}

pub fn is_grouping_column(field: &str) -> bool {
    field == ROW_GROUPING_SINGLE_GROUPING_FIELD
        || row_grouping_criterion_from_field(field).is_some()
}

/// When filtering a group row, only the filter items related to this
/// group's own criterion apply; items tied to other grouping columns pass
/// here and bite at the matching depth instead. Items on the combined
/// column apply to every group.
pub fn should_apply_filter_item_on_group(column_field: &str, node: &TreeNode) -> bool {
    if column_field == ROW_GROUPING_SINGLE_GROUPING_FIELD {
        return true;
    }
    match row_grouping_criterion_from_field(column_field) {
        Some(criterion) => node.grouping_field() == Some(criterion),
        // Not a grouping column: the item always applies.
        None => true,
    }
}

/// The active grouping configuration: an ordered list of grouped-by fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingModel {
    fields: Vec<String>,
}

impl GroupingModel {
    pub fn new(fields: Vec<String>) -> Self {
        GroupingModel { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Position of a criterion in the model. A grouping field absent from
    /// the model means the tree holds stale data from before a live
    /// reconfiguration; that is an explicit error, not a silent ordering.
    pub fn index_of(&self, field: &str) -> Result<usize, String> {
        self.fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| format!("Grouping field '{}' is not in the grouping model", field))
    }
}

/// Comparator over grouping keys. Delegation target for group sorting.
pub type KeyComparator = Box<dyn Fn(Option<&GroupingKey>, Option<&GroupingKey>) -> Ordering>;

/// The underlying (real) column a grouping column delegates to.
pub struct ColumnDef {
    pub field: String,
    pub header_name: Option<String>,
    pub sortable: bool,
    pub filterable: bool,
    pub sort_comparator: Option<KeyComparator>,
}

impl ColumnDef {
    pub fn new(field: &str) -> Self {
        ColumnDef {
            field: field.to_string(),
            header_name: None,
            sortable: true,
            filterable: true,
            sort_comparator: None,
        }
    }

    fn compare_keys(&self, a: Option<&GroupingKey>, b: Option<&GroupingKey>) -> Ordering {
        match &self.sort_comparator {
            Some(comparator) => comparator(a, b),
            None => default_key_compare(a, b),
        }
    }
}

fn default_key_compare(a: Option<&GroupingKey>, b: Option<&GroupingKey>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// What a grouping-column cell shows for a given node.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupingCell {
    /// A data row: delegate rendering to this real column's cell.
    Leaf { delegated_field: String },
    /// A group of this column's criterion: its key, plus the matching
    /// descendant count for the "(N)" badge unless hidden.
    Group {
        key: GroupingKey,
        filtered_descendant_count: Option<usize>,
    },
}

/// One synthesized grouping column.
pub struct GroupingColumn {
    pub field: String,
    pub header_name: String,
    /// `None` for the combined column covering every criterion.
    pub grouping_criteria: Option<String>,
    pub leaf_field: Option<String>,
    /// When set and matching `grouping_criteria`, sorting/filtering follow
    /// the grouped-by column even if a leaf field is configured for
    /// rendering.
    pub main_grouping_criteria: Option<String>,
    pub hide_descendant_count: bool,
    pub sortable: bool,
    pub filterable: bool,
}

/// How grouping columns are laid out in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingColumnMode {
    /// One combined column covering every criterion.
    Single,
    /// One column per grouping criterion.
    PerCriterion,
}

/// Synthesize one column per criterion, or a single combined column whose
/// header joins the grouped-by columns' headers.
pub fn create_grouping_columns(
    model: &GroupingModel,
    columns: &[ColumnDef],
    mode: GroupingColumnMode,
) -> Result<Vec<GroupingColumn>, String> {
    let lookup = |field: &str| -> Result<&ColumnDef, String> {
        columns
            .iter()
            .find(|c| c.field == field)
            .ok_or_else(|| format!("Grouped-by column '{}' does not exist", field))
    };

    if mode == GroupingColumnMode::Single {
        let headers: Result<Vec<String>, String> = model
            .fields()
            .iter()
            .map(|f| {
                let col = lookup(f)?;
                Ok(col.header_name.clone().unwrap_or_else(|| f.clone()))
            })
            .collect();
        return Ok(vec![GroupingColumn {
            field: row_grouping_field_from_criterion(None),
            header_name: headers?.join(" / "),
            grouping_criteria: None,
            leaf_field: None,
            main_grouping_criteria: None,
            hide_descendant_count: false,
            sortable: true,
            filterable: true,
        }]);
    }

    model
        .fields()
        .iter()
        .map(|criterion| {
            let grouped_by = lookup(criterion)?;
            Ok(GroupingColumn {
                field: row_grouping_field_from_criterion(Some(criterion)),
                header_name: grouped_by
                    .header_name
                    .clone()
                    .unwrap_or_else(|| criterion.clone()),
                grouping_criteria: Some(criterion.clone()),
                leaf_field: None,
                main_grouping_criteria: None,
                hide_descendant_count: false,
                sortable: grouped_by.sortable,
                filterable: grouped_by.filterable,
            })
        })
        .collect()
}

impl GroupingColumn {
    /// Whether a node falls under this column's jurisdiction: group rows of
    /// its criterion (any criterion for the combined column), and data rows
    /// only when leaf delegation is configured.
    pub fn covers(&self, node: &TreeNode) -> bool {
        match node {
            TreeNode::Leaf { .. } => self.leaf_field.is_some(),
            TreeNode::Group { .. } => match (self.grouping_criteria.as_deref(), node.grouping_field()) {
                (Some(criterion), Some(field)) => criterion == field,
                (Some(_), None) => false,
                (None, _) => true,
            },
            _ => false,
        }
    }

    /// Cell content dispatch, `None` for nodes of other criteria so several
    /// grouping columns can coexist.
    pub fn cell_value(
        &self,
        tree: &RowTree,
        filter: &FilterOutput,
        id: &RowId,
    ) -> Option<GroupingCell> {
        let node = tree.get(id)?;
        match node {
            TreeNode::Leaf { .. } => {
                let delegated = self.leaf_field.as_ref()?;
                Some(GroupingCell::Leaf {
                    delegated_field: delegated.clone(),
                })
            }
            TreeNode::Group { .. } => {
                if let Some(criterion) = self.grouping_criteria.as_deref() {
                    if node.grouping_field() != Some(criterion) {
                        return None;
                    }
                }
                let key = node.grouping_key()?.clone();
                let count = if self.hide_descendant_count {
                    None
                } else {
                    Some(filter.filtered_descendant_count(id))
                };
                Some(GroupingCell::Group {
                    key,
                    filtered_descendant_count: count,
                })
            }
            _ => None,
        }
    }

    /// Compare two nodes for sorting under this column. Nodes sharing the
    /// sorted criterion delegate to the grouped-by column's comparator (or
    /// the leaf column's for two data rows under leaf delegation); mixed
    /// pairs fall back to the grouping-model index comparator.
    pub fn sort_compare(
        &self,
        model: &GroupingModel,
        columns: &[ColumnDef],
        a: &TreeNode,
        b: &TreeNode,
    ) -> Result<Ordering, String> {
        let sorted_criterion = self
            .main_grouping_criteria
            .as_deref()
            .or(self.grouping_criteria.as_deref());

        let both_groups = matches!(a, TreeNode::Group { .. }) && matches!(b, TreeNode::Group { .. });

        if self.main_grouping_criteria.is_none() {
            if let Some(leaf_field) = &self.leaf_field {
                if matches!(a, TreeNode::Leaf { .. }) && matches!(b, TreeNode::Leaf { .. }) {
                    let leaf_col = find_column(columns, leaf_field)?;
                    return Ok(leaf_col.compare_keys(a.grouping_key(), b.grouping_key()));
                }
                return grouping_field_index_compare(model, a, b);
            }
        }

        match sorted_criterion {
            Some(criterion)
                if both_groups
                    && a.grouping_field() == Some(criterion)
                    && b.grouping_field() == Some(criterion) =>
            {
                let grouped_by = find_column(columns, criterion)?;
                Ok(grouped_by.compare_keys(a.grouping_key(), b.grouping_key()))
            }
            // Combined column: any two groups of the same criterion sort by
            // that criterion's column.
            None if both_groups
                && a.grouping_field().is_some()
                && a.grouping_field() == b.grouping_field() =>
            {
                let criterion = a.grouping_field().unwrap_or_default();
                let grouped_by = find_column(columns, criterion)?;
                Ok(grouped_by.compare_keys(a.grouping_key(), b.grouping_key()))
            }
            _ => grouping_field_index_compare(model, a, b),
        }
    }

    /// Wrap an underlying filter predicate: nodes outside this column's
    /// jurisdiction always pass, so the item only bites where it belongs.
    pub fn apply_filter<'p>(
        &self,
        node: &TreeNode,
        predicate: impl Fn(&TreeNode) -> bool + 'p,
    ) -> bool {
        if !self.covers(node) {
            return true;
        }
        predicate(node)
    }
}

fn find_column<'c>(columns: &'c [ColumnDef], field: &str) -> Result<&'c ColumnDef, String> {
    columns
        .iter()
        .find(|c| c.field == field)
        .ok_or_else(|| format!("Column '{}' does not exist", field))
}

/// Ordering between nodes of different grouping criteria: groups earlier in
/// the model sort before later ones, and a node with no grouping field
/// sorts before any node with one.
pub fn grouping_field_index_compare(
    model: &GroupingModel,
    a: &TreeNode,
    b: &TreeNode,
) -> Result<Ordering, String> {
    match (a.grouping_field(), b.grouping_field()) {
        (x, y) if x == y => Ok(Ordering::Equal),
        (None, Some(_)) => Ok(Ordering::Less),
        (Some(_), None) => Ok(Ordering::Greater),
        (Some(x), Some(y)) => Ok(model.index_of(x)?.cmp(&model.index_of(y)?)),
        (None, None) => Ok(Ordering::Equal),
    }
}
