use serde::{Deserialize, Serialize};
use std::fmt;

/// Root-to-self sequence of post ids along a reply chain.
///
/// Paths compare lexicographically element by element, and a path sorts
/// before every path it is a prefix of. Sorting posts by path therefore
/// yields a pre-order traversal of the reply tree where each subtree is
/// contiguous and siblings are ordered by id. This is the same ordering
/// Postgres applies to `bigint[]` columns, so the store can sort on it
/// directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AncestryPath(Vec<i64>);

impl AncestryPath {
    /// Path of a post that has no parent.
    pub fn root(id: i64) -> Self {
        Self(vec![id])
    }

    /// Path of a new reply to the post owning this path.
    pub fn child(&self, id: i64) -> Self {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(id);
        Self(ids)
    }

    /// Id of the root post of this subtree, `path[0]`.
    pub fn root_id(&self) -> Option<i64> {
        self.0.first().copied()
    }

    /// Id of the post owning this path.
    pub fn leaf_id(&self) -> Option<i64> {
        self.0.last().copied()
    }

    /// Id of the direct parent, if this is not a root.
    pub fn parent_id(&self) -> Option<i64> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(self.0[n - 2]),
        }
    }

    /// Roots sit at depth 1.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// True when `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &AncestryPath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<i64> {
        self.0
    }
}

impl From<Vec<i64>> for AncestryPath {
    fn from(ids: Vec<i64>) -> Self {
        Self(ids)
    }
}

impl From<AncestryPath> for Vec<i64> {
    fn from(path: AncestryPath) -> Self {
        path.0
    }
}

impl fmt::Display for AncestryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for id in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", id)?;
            first = false;
        }
        Ok(())
    }
}
