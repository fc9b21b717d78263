use super::{Actor, Role};

/// The row filter an actor's list, count and group-by queries run under.
///
/// Every aggregate in the dashboard is computed under the same `Scope` as
/// the customer list, so the numbers always add up to what the list shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// No filter.
    All,
    /// Rows whose owning AM belongs to the department.
    Department(String),
    /// Rows owned by this user.
    Owner(String),
    /// Matches nothing. A GM without a department lands here.
    Nothing,
}

/// Deterministic in the actor: the same actor always gets the same scope.
pub fn scope_for(actor: &Actor) -> Scope {
    match actor.role {
        Role::Admin => Scope::All,
        Role::Gm => match &actor.department_id {
            Some(department) => Scope::Department(department.clone()),
            None => Scope::Nothing,
        },
        Role::Am => Scope::Owner(actor.id.clone()),
    }
}

impl Scope {
    /// Whether a row owned by `owner_id`, whose owner sits in
    /// `owner_department`, passes the filter.
    pub fn admits(&self, owner_id: &str, owner_department: Option<&str>) -> bool {
        match self {
            Scope::All => true,
            Scope::Department(department) => owner_department == Some(department.as_str()),
            Scope::Owner(id) => id == owner_id,
            Scope::Nothing => false,
        }
    }

    /// Narrowing an existing scope to a single owner, used when an AM id is
    /// given as an extra filter.
    pub fn restrict_to_owner(self, owner_id: &str, owner_department: Option<&str>) -> Scope {
        op::ternary!(self.admits(owner_id, owner_department) => Scope::Owner(owner_id.to_owned()); Scope::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_follows_role() {
        assert_eq!(scope_for(&Actor::new("a", Role::Admin, None)), Scope::All);
        assert_eq!(
            scope_for(&Actor::new("g", Role::Gm, Some("d1"))),
            Scope::Department("d1".into())
        );
        assert_eq!(
            scope_for(&Actor::new("m", Role::Am, Some("d1"))),
            Scope::Owner("m".into())
        );
    }

    #[test]
    fn gm_without_department_sees_nothing() {
        let scope = scope_for(&Actor::new("g", Role::Gm, None));
        assert_eq!(scope, Scope::Nothing);
        assert!(!scope.admits("am1", None));
        assert!(!scope.admits("am1", Some("d1")));
    }

    #[test]
    fn scoping_is_deterministic() {
        let gm = Actor::new("g", Role::Gm, Some("d1"));
        assert_eq!(scope_for(&gm), scope_for(&gm.clone()));
    }

    #[test]
    fn department_scope_checks_owner_department() {
        let scope = Scope::Department("d1".into());
        assert!(scope.admits("am1", Some("d1")));
        assert!(!scope.admits("am2", Some("d2")));
        assert!(!scope.admits("am3", None));
    }

    #[test]
    fn restricting_outside_scope_yields_nothing() {
        let scope = Scope::Department("d1".into());
        assert_eq!(
            scope.clone().restrict_to_owner("am1", Some("d1")),
            Scope::Owner("am1".into())
        );
        assert_eq!(scope.restrict_to_owner("am2", Some("d2")), Scope::Nothing);
    }
}
