use super::set::ConstraintSet;
use super::types::Constraint;
use crate::domain::errors::NegotiationError;

/// Something that can realize constraints: a provider's support matrix, or the
/// properties of an already established session.
pub trait ConstraintSupport {
    /// Whether `constraint` can hold, given the rest of `context`.
    ///
    /// Never called with [`Constraint::Alternatives`]; [`reduce`] expands those.
    fn supports(&self, constraint: &Constraint, context: &ConstraintSet) -> bool;

    /// Name used in error messages.
    fn describe(&self) -> String {
        "provider".to_string()
    }
}

/// Project `set` onto what `support` can realize.
///
/// Every requirement must be supported, otherwise the call fails with
/// [`NegotiationError::UnsupportedConstraint`] naming it. Unsupported
/// preferences are dropped. Alternatives resolve to their first supported
/// element.
pub fn reduce(
    set: &ConstraintSet,
    support: &dyn ConstraintSupport,
) -> Result<ConstraintSet, NegotiationError> {
    let mut requirements = Vec::new();
    for requirement in set.requirements() {
        match resolve(requirement, set, support) {
            Some(chosen) => requirements.push(chosen),
            None => {
                return Err(NegotiationError::unsupported(
                    requirement,
                    format!("not supported by {}", support.describe()),
                ))
            }
        }
    }

    let preferences: Vec<Constraint> = set
        .preferences()
        .filter_map(|p| resolve(p, set, support))
        .collect();

    ConstraintSet::new(requirements, preferences)
}

fn resolve(
    constraint: &Constraint,
    context: &ConstraintSet,
    support: &dyn ConstraintSupport,
) -> Option<Constraint> {
    constraint
        .elements()
        .iter()
        .find(|element| support.supports(element, context))
        .cloned()
}
