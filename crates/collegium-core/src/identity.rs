//! Caller identity.
//!
//! Authentication itself happens upstream of the pipeline. By the time a
//! request reaches the filters, the caller is either anonymous or a user with
//! a set of role claims.

use serde::{Deserialize, Serialize};

/// Well-known role names.
pub mod roles {
    /// Administrative staff.
    pub const ADMIN: &str = "Admin";
    /// Enrolled students.
    pub const STUDENT: &str = "Student";
    /// Teaching staff.
    pub const INSTRUCTOR: &str = "Instructor";
}

/// The identity of the caller making a request.
///
/// # Example
///
/// ```
/// use collegium_core::{roles, CallerIdentity};
///
/// let identity = CallerIdentity::user("u-17").with_role(roles::ADMIN);
/// assert!(identity.has_any_role(&["admin"]));
/// assert_eq!(identity.log_id(), "user:u-17");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No credentials were presented.
    #[default]
    Anonymous,
    /// An authenticated user.
    User {
        /// Stable user identifier.
        user_id: String,
        /// Display name, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Role claims.
        #[serde(default)]
        roles: Vec<String>,
    },
}

impl CallerIdentity {
    /// Creates a user identity with no roles.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User {
            user_id: user_id.into(),
            name: None,
            roles: Vec::new(),
        }
    }

    /// Adds a role claim. No-op for anonymous callers.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        if let Self::User { roles, .. } = &mut self {
            roles.push(role.into());
        }
        self
    }

    /// Sets the display name. No-op for anonymous callers.
    #[must_use]
    pub fn with_name(mut self, display_name: impl Into<String>) -> Self {
        if let Self::User { name, .. } = &mut self {
            *name = Some(display_name.into());
        }
        self
    }

    /// Returns `true` for anonymous callers.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::User { user_id, .. } => format!("user:{user_id}"),
        }
    }

    /// Role claims held by the caller.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        match self {
            Self::Anonymous => &[],
            Self::User { roles, .. } => roles,
        }
    }

    /// Returns `true` when the caller holds at least one of `required`.
    ///
    /// Role names compare case-insensitively.
    #[must_use]
    pub fn has_any_role<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.roles().iter().any(|held| {
            required
                .iter()
                .any(|wanted| held.eq_ignore_ascii_case(wanted.as_ref()))
        })
    }
}
