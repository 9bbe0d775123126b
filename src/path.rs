/// Row Identity and Grouping Paths
///
/// A `RowId` names a node in the row tree. Caller rows carry `Int` or `Str`
/// ids that must stay stable across updates; groups synthesized by the
/// engine carry `Auto` ids derived deterministically from the grouping-path
/// prefix they stand for, so rebuilding the same dataset always yields the
/// same ids. Downstream consumers (selection, expansion, scroll restoration)
/// rely on that stability.
///
/// The `Auto` payload is a length-prefixed encoding of the `field/key` chain
/// rather than a plain join, so keys that contain the separator cannot
/// produce colliding ids. Keeping `Auto` as its own variant also prevents a
/// caller string id from ever aliasing a synthesized group.

use crate::key::GroupingKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node in the row tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowId {
    /// Caller-provided integer row id.
    Int(i64),
    /// Caller-provided string row id.
    Str(String),
    /// Engine-generated group id; payload is the encoded path prefix.
    Auto(String),
    /// The synthetic root, always present, never removed.
    Root,
}

impl RowId {
    pub fn is_auto_generated(&self) -> bool {
        matches!(self, RowId::Auto(_))
    }

    pub fn is_root(&self) -> bool {
        matches!(self, RowId::Root)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(v) => write!(f, "{}", v),
            RowId::Str(v) => write!(f, "{}", v),
            RowId::Auto(v) => write!(f, "auto-generated-row-{}", v),
            RowId::Root => write!(f, "root"),
        }
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        RowId::Int(v)
    }
}

impl From<&str> for RowId {
    fn from(v: &str) -> Self {
        RowId::Str(v.to_string())
    }
}

impl From<String> for RowId {
    fn from(v: String) -> Self {
        RowId::Str(v)
    }
}

/// One level of a row's grouping path.
///
/// `field` is `None` for flat grouping and explicit tree data, where path
/// segments are bare keys with no originating column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingCriterion {
    pub field: Option<String>,
    pub key: GroupingKey,
}

impl GroupingCriterion {
    pub fn new(field: Option<&str>, key: impl Into<GroupingKey>) -> Self {
        GroupingCriterion {
            field: field.map(str::to_string),
            key: key.into(),
        }
    }

    /// Length-prefixed encoding of this criterion, used to build index keys
    /// and auto-generated ids.
    pub(crate) fn encode(&self) -> String {
        match &self.field {
            Some(field) => format!("F{}:{}/{}", field.len(), field, self.key.encode()),
            None => format!("F-/{}", self.key.encode()),
        }
    }

    /// Structural equality: field AND key must match.
    pub fn same_as(&self, other: &GroupingCriterion) -> bool {
        self.field == other.field && self.key.same_as(&other.key)
    }
}

/// A row descriptor as consumed by the builder and updater: the row's own id
/// and its resolved grouping path, root to leaf ancestor. An empty path puts
/// the row directly under the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderRow {
    pub id: RowId,
    pub path: Vec<GroupingCriterion>,
}

impl BuilderRow {
    pub fn new(id: impl Into<RowId>, path: Vec<GroupingCriterion>) -> Self {
        BuilderRow {
            id: id.into(),
            path,
        }
    }
}

/// Deterministic id for the auto-generated group covering `path[..=depth]`.
pub(crate) fn auto_generated_id(path: &[GroupingCriterion], depth: usize) -> RowId {
    let encoded: Vec<String> = path[..=depth].iter().map(GroupingCriterion::encode).collect();
    RowId::Auto(encoded.join("-"))
}

/// Structural path equality: same length, same field and key at every depth.
/// A partial prefix match is a move, not an equality.
pub(crate) fn paths_equal(a: &[GroupingCriterion], b: &[GroupingCriterion]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crit(field: Option<&str>, key: &str) -> GroupingCriterion {
        GroupingCriterion::new(field, key)
    }

    #[test]
    fn test_auto_id_is_deterministic() {
        let path = vec![crit(Some("g"), "B"), crit(Some("g"), "A")];
        assert_eq!(auto_generated_id(&path, 0), auto_generated_id(&path, 0));
        assert_ne!(auto_generated_id(&path, 0), auto_generated_id(&path, 1));
    }

    #[test]
    fn test_auto_id_resists_separator_keys() {
        // ("a-F", "x") vs ("a", "F-x") would collide under naive joining.
        let p1 = vec![crit(Some("a-F"), "x")];
        let p2 = vec![crit(Some("a"), "F-x")];
        assert_ne!(auto_generated_id(&p1, 0), auto_generated_id(&p2, 0));
    }

    #[test]
    fn test_auto_id_never_aliases_caller_ids() {
        let id = auto_generated_id(&[crit(None, "x")], 0);
        assert!(id.is_auto_generated());
        assert_ne!(id, RowId::from("F-/s1:x"));
    }

    #[test]
    fn test_paths_equal_is_structural() {
        let a = vec![crit(Some("g"), "B"), crit(Some("g"), "A")];
        let b = vec![crit(Some("g"), "B"), crit(Some("g"), "A")];
        let prefix = vec![crit(Some("g"), "B")];
        let other_field = vec![crit(Some("h"), "B"), crit(Some("g"), "A")];
        assert!(paths_equal(&a, &b));
        assert!(!paths_equal(&a, &prefix));
        assert!(!paths_equal(&a, &other_field));
    }
}
