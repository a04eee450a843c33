use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings attached to roles (e.g. `"public.deals:select"`).
/// The wildcard `"*"` is granted to a tenant's owner role and covers every
/// other permission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the first requested permission not covered by `held`, if any.
pub fn first_uncovered<'a>(
    held: &BTreeSet<Permission>,
    requested: impl IntoIterator<Item = &'a Permission>,
) -> Option<&'a Permission> {
    if held.contains(&Permission::WILDCARD) {
        return None;
    }
    requested.into_iter().find(|p| !held.contains(*p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&'static str]) -> BTreeSet<Permission> {
        items.iter().map(|p| Permission::new(*p)).collect()
    }

    #[test]
    fn wildcard_covers_everything() {
        let held = set(&["*"]);
        let requested = set(&["public.deals:select", "public.deals:update"]);
        assert!(first_uncovered(&held, &requested).is_none());
    }

    #[test]
    fn reports_missing_permission() {
        let held = set(&["public.deals:select"]);
        let requested = set(&["public.deals:select", "public.deals:update"]);
        let missing = first_uncovered(&held, &requested).unwrap();
        assert_eq!(missing.as_str(), "public.deals:update");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Permission::new("a:b")).unwrap();
        assert_eq!(json, "\"a:b\"");
    }
}
