//! Campus location allow-list.
//!
//! A single [`LocationPolicy`] is shared by every component that checks a
//! department's location, so the gate, the lookup logger, and the body
//! validator always agree.

use serde::{Deserialize, Serialize};

/// Default set of campuses allowed through the location gate.
pub const DEFAULT_ALLOWED_LOCATIONS: [&str; 2] = ["smart", "fayoum"];

/// Normalizes a location for comparison: trimmed and lowercased.
#[must_use]
pub fn normalize_location(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Ordered, normalized allow-list of department locations.
///
/// # Example
///
/// ```
/// use collegium_core::LocationPolicy;
///
/// let policy = LocationPolicy::default();
/// assert!(policy.allows("  Smart "));
/// assert!(!policy.allows("alexandria"));
/// assert_eq!(policy.describe(), "smart, fayoum");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LocationPolicy {
    allowed: Vec<String>,
}

impl LocationPolicy {
    /// Builds a policy; entries are normalized and deduplicated, order kept.
    pub fn new<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed: Vec<String> = Vec::new();
        for location in locations {
            let normalized = normalize_location(location.as_ref());
            if !normalized.is_empty() && !allowed.contains(&normalized) {
                allowed.push(normalized);
            }
        }
        Self { allowed }
    }

    /// Returns `true` when the normalized `location` is in the list.
    #[must_use]
    pub fn allows(&self, location: &str) -> bool {
        let normalized = normalize_location(location);
        self.allowed.iter().any(|allowed| *allowed == normalized)
    }

    /// The normalized entries, in configuration order.
    #[must_use]
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Comma-separated list for messages.
    #[must_use]
    pub fn describe(&self) -> String {
        self.allowed.join(", ")
    }
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_LOCATIONS)
    }
}

impl From<Vec<String>> for LocationPolicy {
    fn from(locations: Vec<String>) -> Self {
        Self::new(locations)
    }
}

impl From<LocationPolicy> for Vec<String> {
    fn from(policy: LocationPolicy) -> Self {
        policy.allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let policy = LocationPolicy::new([" Smart", "FAYOUM ", "smart", ""]);
        assert_eq!(policy.allowed(), ["smart", "fayoum"]);
        assert!(policy.allows("FaYoUm"));
    }

    #[test]
    fn test_rejects_unknown() {
        let policy = LocationPolicy::default();
        assert!(!policy.allows("cairo"));
        assert!(!policy.allows(""));
    }

    #[test]
    fn test_serde_as_list() {
        let policy: LocationPolicy = serde_json::from_str(r#"["Smart","Cairo"]"#).unwrap();
        assert!(policy.allows("cairo"));
        assert_eq!(serde_json::to_string(&policy).unwrap(), r#"["smart","cairo"]"#);
    }
}
