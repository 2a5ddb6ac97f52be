//! Cache key definitions.
//!
//! Keys are hierarchical: `[domain, resourceId?, ...]`. The same type doubles
//! as an invalidation pattern, matching every key it is a prefix of.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one cached read (or, used as a pattern, a family of reads).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// Root key for a read domain such as `orders`.
    pub fn domain(domain: impl Into<String>) -> Self {
        Self(vec![domain.into()])
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Pattern matching every key.
    pub fn everything() -> Self {
        Self(Vec::new())
    }

    /// Extend the key with one more segment (e.g. a resource id).
    pub fn child(&self, segment: impl ToString) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// True when `self`, read as a pattern, covers `key`.
    pub fn matches(&self, key: &CacheKey) -> bool {
        key.0.len() >= self.0.len() && self.0.iter().zip(&key.0).all(|(p, k)| p == k)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn domain_pattern_matches_children() {
        let pattern = CacheKey::domain("orders");
        let detail = pattern.child(Uuid::nil());

        assert!(pattern.matches(&pattern));
        assert!(pattern.matches(&detail));
        assert!(!detail.matches(&pattern));
    }

    #[test]
    fn sibling_domains_do_not_match() {
        let orders = CacheKey::domain("orders");
        let items = CacheKey::domain("order-items");
        assert!(!orders.matches(&items));
        assert!(!orders.matches(&CacheKey::from_segments(["order"])));
    }

    #[test]
    fn everything_matches_all_keys() {
        assert!(CacheKey::everything().matches(&CacheKey::domain("team")));
        assert!(CacheKey::everything().matches(&CacheKey::everything()));
    }

    #[test]
    fn display_lists_segments() {
        let key = CacheKey::from_segments(["orders", "42", "items"]);
        assert_eq!(key.to_string(), "[orders, 42, items]");
        assert_eq!(key.root(), Some("orders"));
    }

    #[test]
    fn builders_agree() {
        let a = CacheKey::domain("products").child("7");
        let b = CacheKey::from_segments(["products", "7"]);
        assert_eq!(a, b);
    }

    #[test]
    fn serializes_as_array() {
        let key = CacheKey::from_segments(["customers", "9"]);
        assert_eq!(serde_json::to_string(&key).unwrap(), r#"["customers","9"]"#);
    }
}
