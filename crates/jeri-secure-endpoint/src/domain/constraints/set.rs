use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use super::types::{Constraint, ConstraintKind};
use crate::domain::errors::NegotiationError;
use crate::domain::time::Timestamp;

/// Requirements and preferences for one call.
///
/// Requirements must all hold or negotiation fails. Preferences are honored
/// best-effort, ranked by declaration order. After normalization a constraint is
/// never both a requirement and a preference, and no preference contradicts a
/// requirement.
///
/// Equality and hashing treat both collections as sets, so combining in either
/// order yields equal sets.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    requirements: BTreeSet<Constraint>,
    preferences: Vec<Constraint>,
}

impl ConstraintSet {
    /// No requirements, no preferences.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build and normalize a set.
    ///
    /// Fails with [`NegotiationError::Conflict`] if two requirements contradict
    /// each other.
    pub fn new(
        requirements: impl IntoIterator<Item = Constraint>,
        preferences: impl IntoIterator<Item = Constraint>,
    ) -> Result<Self, NegotiationError> {
        let requirements: BTreeSet<Constraint> = requirements.into_iter().collect();
        check_conflicts(&requirements)?;

        let mut kept: Vec<Constraint> = Vec::new();
        for preference in preferences {
            if requirements.contains(&preference)
                || kept.contains(&preference)
                || requirements.iter().any(|r| r.conflicts_with(&preference))
            {
                continue;
            }
            kept.push(preference);
        }

        Ok(Self {
            requirements,
            preferences: kept,
        })
    }

    /// Requirements only.
    pub fn requiring(
        requirements: impl IntoIterator<Item = Constraint>,
    ) -> Result<Self, NegotiationError> {
        Self::new(requirements, std::iter::empty())
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Constraint> {
        self.requirements.iter()
    }

    /// Preferences in declaration order.
    pub fn preferences(&self) -> impl Iterator<Item = &Constraint> {
        self.preferences.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.preferences.is_empty()
    }

    pub fn requires(&self, constraint: &Constraint) -> bool {
        self.requirements.contains(constraint)
    }

    pub fn prefers(&self, constraint: &Constraint) -> bool {
        self.preferences.contains(constraint)
    }

    pub fn requirements_of(&self, kind: ConstraintKind) -> impl Iterator<Item = &Constraint> {
        self.requirements.iter().filter(move |c| c.kind() == kind)
    }

    pub fn preferences_of(&self, kind: ConstraintKind) -> impl Iterator<Item = &Constraint> {
        self.preferences.iter().filter(move |c| c.kind() == kind)
    }

    /// Union with `other`. See [`combine`].
    pub fn combine(&self, other: &ConstraintSet) -> Result<ConstraintSet, NegotiationError> {
        Self::new(
            self.requirements
                .iter()
                .chain(other.requirements.iter())
                .cloned(),
            self.preferences
                .iter()
                .chain(other.preferences.iter())
                .cloned(),
        )
    }

    /// Latest instant by which a connection must be established.
    ///
    /// Minimum of every `ConnectionAbsoluteTime`, `now` plus every
    /// `ConnectionRelativeTime`, and `now + timeout`. Preferences tighten the
    /// deadline too.
    pub fn connect_deadline(&self, now: Timestamp, timeout: Duration) -> Timestamp {
        let mut deadline = now.saturating_add(timeout);
        for constraint in self.requirements.iter().chain(self.preferences.iter()) {
            let candidate = match constraint {
                Constraint::ConnectionAbsoluteTime(at) => *at,
                Constraint::ConnectionRelativeTime(d) => now.saturating_add(*d),
                _ => continue,
            };
            deadline = deadline.min(candidate);
        }
        deadline
    }
}

fn check_conflicts(requirements: &BTreeSet<Constraint>) -> Result<(), NegotiationError> {
    for (i, first) in requirements.iter().enumerate() {
        for second in requirements.iter().skip(i + 1) {
            if first.conflicts_with(second) {
                return Err(NegotiationError::Conflict {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Union of requirements, union of preferences minus any that duplicate or
/// contradict a requirement.
///
/// Commutative and idempotent under set equality. Fails with
/// [`NegotiationError::Conflict`] if the combined requirements contradict.
pub fn combine(a: &ConstraintSet, b: &ConstraintSet) -> Result<ConstraintSet, NegotiationError> {
    a.combine(b)
}

impl PartialEq for ConstraintSet {
    fn eq(&self, other: &Self) -> bool {
        self.requirements == other.requirements
            && self.preferences.len() == other.preferences.len()
            && self.preferences.iter().all(|p| other.preferences.contains(p))
    }
}

impl Eq for ConstraintSet {}

impl Hash for ConstraintSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.requirements.hash(state);
        let sorted: BTreeSet<&Constraint> = self.preferences.iter().collect();
        sorted.hash(state);
    }
}
