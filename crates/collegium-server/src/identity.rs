//! Caller identity from gateway headers.
//!
//! Token validation happens upstream; the gateway forwards the result as
//! plain headers. Only trust them when the gateway strips client-supplied
//! copies.

use collegium_core::CallerIdentity;
use http::HeaderMap;

/// Authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Comma-separated role claims.
pub const USER_ROLES_HEADER: &str = "x-user-roles";
/// Display name.
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Reads the caller identity; anonymous when no user id is present.
///
/// ```
/// use collegium_server::identity_from_headers;
/// use http::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-user-id", "u-7".parse().unwrap());
/// headers.insert("x-user-roles", "Admin, Instructor".parse().unwrap());
///
/// let identity = identity_from_headers(&headers);
/// assert!(identity.has_any_role(&["instructor"]));
/// ```
#[must_use]
pub fn identity_from_headers(headers: &HeaderMap) -> CallerIdentity {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let Some(user_id) = header(USER_ID_HEADER) else {
        return CallerIdentity::Anonymous;
    };

    let mut identity = CallerIdentity::user(user_id);
    if let Some(name) = header(USER_NAME_HEADER) {
        identity = identity.with_name(name);
    }
    for role in header(USER_ROLES_HEADER)
        .into_iter()
        .flat_map(|roles| roles.split(','))
        .map(str::trim)
        .filter(|r| !r.is_empty())
    {
        identity = identity.with_role(role);
    }
    identity
}
