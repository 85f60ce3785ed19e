//! Explicit per-call request context.

/// Who is acting, and whether authorization checks apply.
///
/// The acting user is resolved as: explicit parameter on the call, then
/// [`ActionContext::user`], then the configured system user (for crediting
/// only; an absent user is anonymous for authorization).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionContext {
    /// Id or name of the acting user. `None` is anonymous.
    pub user: Option<String>,
    /// Skip authorization checks (bootstrap and internal calls).
    pub ignore_auth: bool,
}

impl ActionContext {
    /// An anonymous caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A caller acting as the given user.
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ignore_auth: false,
        }
    }

    /// An internal caller that bypasses authorization.
    pub fn system() -> Self {
        Self {
            user: None,
            ignore_auth: true,
        }
    }

    /// Same context with authorization checks skipped.
    pub fn with_ignore_auth(mut self) -> Self {
        self.ignore_auth = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(ActionContext::anonymous().user, None);
        assert!(!ActionContext::anonymous().ignore_auth);

        let ctx = ActionContext::user("alice");
        assert_eq!(ctx.user.as_deref(), Some("alice"));
        assert!(ctx.with_ignore_auth().ignore_auth);

        assert!(ActionContext::system().ignore_auth);
    }
}
