use serde::{Deserialize, Serialize};

/// Caller role resolved by the authorization collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Pet owner: sees only their own appointments.
    Owner,
    Clinician,
    Staff,
}

impl Role {
    pub fn is_clinic_side(self) -> bool {
        matches!(self, Role::Clinician | Role::Staff)
    }
}

/// Resolved access context for one request/session.
///
/// Constructed once at the boundary by the authorization collaborator and
/// passed explicitly into every ledger query and mutation. Core logic never
/// reads ambient session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    identity: String,
    role: Role,
}

impl AccessContext {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    /// Contact identity of the caller (email for owners, staff login otherwise).
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Record-visibility policy applied at the query boundary.
    ///
    /// Owners see only appointments whose contact email matches their
    /// identity; clinic-side roles see everything. Pure policy check, no IO.
    pub fn can_view(&self, owner_email: &str) -> bool {
        match self.role {
            Role::Owner => self.identity.eq_ignore_ascii_case(owner_email),
            Role::Clinician | Role::Staff => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_sees_only_their_own_records() {
        let ctx = AccessContext::new("jo@example.com", Role::Owner);
        assert!(ctx.can_view("jo@example.com"));
        assert!(ctx.can_view("JO@example.com"));
        assert!(!ctx.can_view("other@example.com"));
    }

    #[test]
    fn clinic_roles_see_everything() {
        for role in [Role::Clinician, Role::Staff] {
            let ctx = AccessContext::new("frontdesk", role);
            assert!(ctx.can_view("anyone@example.com"));
        }
    }
}
