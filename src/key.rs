/// Grouping Keys for RowTree
///
/// A `GroupingKey` is the comparable scalar attached to one level of a row's
/// grouping path: the value of the grouped-by column for synthetic grouping,
/// or the path segment for explicit tree data.
///
/// # Encoding
///
/// Keys must be foldable into the deterministic id of an auto-generated
/// group. `encode` produces a length-prefixed string so that keys containing
/// separator characters cannot collide with each other once concatenated
/// into a path encoding.
///
/// # Examples
///
/// ```
/// use rowtree::GroupingKey;
///
/// let key = GroupingKey::Str("EMEA".to_string());
/// assert_eq!(key.as_str(), Some("EMEA"));
/// assert_eq!(key.encode(), "s4:EMEA");
/// ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scalar value of one grouping criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupingKey {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl GroupingKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GroupingKey::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GroupingKey::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GroupingKey::Float(v) => Some(*v),
            GroupingKey::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GroupingKey::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Stable, collision-free string form used by the per-build index and by
    /// auto-generated group ids. Each variant gets a tag and string payloads
    /// get a byte-length prefix.
    pub fn encode(&self) -> String {
        match self {
            GroupingKey::Str(v) => format!("s{}:{}", v.len(), v),
            GroupingKey::Int(v) => format!("i{}", v),
            // Bit pattern rather than Display so that 0.0/-0.0 and NaN
            // payloads stay distinguishable and re-encodable.
            GroupingKey::Float(v) => format!("f{:016x}", v.to_bits()),
            GroupingKey::Bool(v) => format!("b{}", u8::from(*v)),
        }
    }

    /// Equality used for structural path comparison. Floats compare by bit
    /// pattern so a key equals itself even when NaN.
    pub fn same_as(&self, other: &GroupingKey) -> bool {
        match (self, other) {
            (GroupingKey::Float(a), GroupingKey::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingKey::Str(v) => write!(f, "{}", v),
            GroupingKey::Int(v) => write!(f, "{}", v),
            GroupingKey::Float(v) => write!(f, "{}", v),
            GroupingKey::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for GroupingKey {
    fn from(v: &str) -> Self {
        GroupingKey::Str(v.to_string())
    }
}

impl From<String> for GroupingKey {
    fn from(v: String) -> Self {
        GroupingKey::Str(v)
    }
}

impl From<i64> for GroupingKey {
    fn from(v: i64) -> Self {
        GroupingKey::Int(v)
    }
}

impl From<f64> for GroupingKey {
    fn from(v: f64) -> Self {
        GroupingKey::Float(v)
    }
}

impl From<bool> for GroupingKey {
    fn from(v: bool) -> Self {
        GroupingKey::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(GroupingKey::from("a").as_str(), Some("a"));
        assert_eq!(GroupingKey::from(7i64).as_i64(), Some(7));
        assert_eq!(GroupingKey::from(7i64).as_f64(), Some(7.0));
        assert_eq!(GroupingKey::from(true).as_bool(), Some(true));
        assert_eq!(GroupingKey::from("a").as_i64(), None);
    }

    #[test]
    fn test_encode_is_injective_over_tricky_strings() {
        // Naive joining would make ("a/b", "c") collide with ("a", "b/c").
        let a = GroupingKey::from("a/b");
        let b = GroupingKey::from("a");
        assert_ne!(a.encode(), b.encode());
        assert_eq!(a.encode(), "s3:a/b");
    }

    #[test]
    fn test_float_encoding_distinguishes_zero_signs() {
        assert_ne!(
            GroupingKey::Float(0.0).encode(),
            GroupingKey::Float(-0.0).encode()
        );
    }

    #[test]
    fn test_same_as_handles_nan() {
        let nan = GroupingKey::Float(f64::NAN);
        assert!(nan.same_as(&GroupingKey::Float(f64::NAN)));
        assert!(!GroupingKey::Float(1.0).same_as(&GroupingKey::Float(2.0)));
        assert!(GroupingKey::from("x").same_as(&GroupingKey::from("x")));
    }
}
