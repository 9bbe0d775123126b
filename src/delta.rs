/// Tree Deltas - Incremental Change Batches for RowTree
///
/// This module defines the structures describing what changed between two
/// versions of the dataset, allowing the updater to patch the previous tree
/// instead of rebuilding from scratch.
///
/// # Change Types
///
/// - inserted: a new row appeared, with its resolved grouping path
/// - modified: an existing row's data changed (its path may or may not have)
/// - removed: a row disappeared
///
/// # Usage Pattern
///
/// 1. The caller resolves grouping paths for inserted/modified rows
/// 2. Changes accumulate into a `TreeDelta` for one logical tick
/// 3. `update_row_tree` consumes the batch and returns a new snapshot
/// 4. The returned `UpdatedGroups` tells row-height/position caches which
///    subtrees need their metadata invalidated

use crate::path::{BuilderRow, GroupingCriterion, RowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A batch of row changes to apply to a tree in one update pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeDelta {
    pub inserted: Vec<BuilderRow>,
    pub modified: Vec<BuilderRow>,
    pub removed: Vec<RowId>,
}

impl TreeDelta {
    pub fn new() -> Self {
        TreeDelta::default()
    }

    pub fn insert(&mut self, id: impl Into<RowId>, path: Vec<GroupingCriterion>) -> &mut Self {
        self.inserted.push(BuilderRow::new(id, path));
        self
    }

    pub fn modify(&mut self, id: impl Into<RowId>, path: Vec<GroupingCriterion>) -> &mut Self {
        self.modified.push(BuilderRow::new(id, path));
        self
    }

    pub fn remove(&mut self, id: impl Into<RowId>) -> &mut Self {
        self.removed.push(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.modified.len() + self.removed.len()
    }
}

/// What happened to a group during an update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupAction {
    /// New children were attached under the group.
    InsertChildren,
    /// Children were detached from the group.
    RemoveChildren,
    /// A child row changed in place, structure untouched.
    ModifyChildren,
}

/// Per-group record of an update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdateInfo {
    pub inserted_children: bool,
    pub removed_children: bool,
    pub modified_children: bool,
}

impl GroupUpdateInfo {
    /// True whenever the group's child set itself changed, as opposed to a
    /// child mutating in place.
    pub fn children_changed(&self) -> bool {
        self.inserted_children || self.removed_children
    }
}

/// Change-set of groups touched by one update pass, keyed by group id.
/// Consumers use it to invalidate cached row heights/positions for the
/// affected subtrees only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatedGroups {
    groups: HashMap<RowId, GroupUpdateInfo>,
}

impl UpdatedGroups {
    pub fn new() -> Self {
        UpdatedGroups::default()
    }

    pub(crate) fn record(&mut self, group_id: &RowId, action: GroupAction) {
        let info = self.groups.entry(group_id.clone()).or_default();
        match action {
            GroupAction::InsertChildren => info.inserted_children = true,
            GroupAction::RemoveChildren => info.removed_children = true,
            GroupAction::ModifyChildren => info.modified_children = true,
        }
    }

    pub fn get(&self, group_id: &RowId) -> Option<&GroupUpdateInfo> {
        self.groups.get(group_id)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowId, &GroupUpdateInfo)> {
        self.groups.iter()
    }
}
