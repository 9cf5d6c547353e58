//! Joint, hard and soft constraint records and their ordered collections.

use taskqp_core::BuildError;
use taskqp_expr::Expr;

/// Bounds and cost weight on one controlled joint's velocity.
#[derive(Debug, Clone)]
pub struct JointConstraint {
    pub lower: Expr,
    pub upper: Expr,
    pub weight: Expr,
}

impl JointConstraint {
    pub fn new(lower: impl Into<Expr>, upper: impl Into<Expr>, weight: impl Into<Expr>) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
            weight: weight.into(),
        }
    }
}

/// Bounds on the rate of an expression over controlled joints. No slack.
#[derive(Debug, Clone)]
pub struct HardConstraint {
    pub lower: Expr,
    pub upper: Expr,
    pub expression: Expr,
}

impl HardConstraint {
    pub fn new(lower: impl Into<Expr>, upper: impl Into<Expr>, expression: impl Into<Expr>) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
            expression: expression.into(),
        }
    }
}

/// Bounds on the rate of an expression, relaxed by a slack penalized with `weight`.
#[derive(Debug, Clone)]
pub struct SoftConstraint {
    pub lower: Expr,
    pub upper: Expr,
    pub weight: Expr,
    pub expression: Expr,
}

impl SoftConstraint {
    pub fn new(
        lower: impl Into<Expr>,
        upper: impl Into<Expr>,
        weight: impl Into<Expr>,
        expression: impl Into<Expr>,
    ) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
            weight: weight.into(),
            expression: expression.into(),
        }
    }
}

/// Named constraints in insertion order.
///
/// The order fixes row and column indices of the assembled QP, so this is a
/// list rather than a hash map. Names are unique.
#[derive(Debug, Clone)]
pub struct ConstraintMap<C> {
    entries: Vec<(String, C)>,
}

impl<C> Default for ConstraintMap<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C> ConstraintMap<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constraint. A name already present is rejected.
    pub fn insert(&mut self, name: impl Into<String>, constraint: C) -> Result<(), BuildError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(BuildError::DuplicateConstraint(name));
        }
        self.entries.push((name, constraint));
        Ok(())
    }

    /// Append every entry of `other`, in order.
    pub fn extend(&mut self, other: Self) -> Result<(), BuildError> {
        for (name, c) in other.entries {
            self.insert(name, c)?;
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&C> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &C> {
        self.entries.iter().map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &C)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Build from `(name, constraint)` pairs, failing on the first duplicate.
    pub fn try_from_iter<N, I>(iter: I) -> Result<Self, BuildError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, C)>,
    {
        let mut map = Self::new();
        for (name, c) in iter {
            map.insert(name, c)?;
        }
        Ok(map)
    }
}
