//! Invalidation rule table.
//!
//! Maps each domain write-event to the ordered cache-key patterns it makes
//! stale. Specific views come first, broad aggregates last; applying the keys
//! in any order has the same effect.

use std::fmt;

use crate::domain::events::DomainEvent;

use super::error::CacheError;
use super::keys::CacheKey;

type Patterns = &'static [&'static [&'static str]];

const CUSTOMER_KEYS: Patterns = &[
    &["customers"],
    &["customer-contacts"],
    &["organizations"],
    &["orders"],
    &["dashboard"],
];

const CATALOG_KEYS: Patterns = &[
    &["products"],
    &["product-variants"],
    &["categories"],
    &["catalog"],
    &["dashboard"],
];

const ORDER_KEYS: Patterns = &[
    &["orders"],
    &["order-items"],
    &["order-audit-logs"],
    &["production"],
    &["design-jobs"],
    &["dashboard"],
];

const TEAM_KEYS: Patterns = &[
    &["users"],
    &["salespeople"],
    &["designers"],
    &["manufacturers"],
    &["team"],
    &["dashboard"],
];

/// One row of the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationRule {
    pub event: DomainEvent,
    pub keys: Patterns,
}

impl InvalidationRule {
    pub fn patterns(&self) -> Vec<CacheKey> {
        self.keys
            .iter()
            .map(|segments| CacheKey::from_segments(segments.iter().copied()))
            .collect()
    }
}

impl fmt::Display for InvalidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.patterns().iter().map(ToString::to_string).collect();
        write!(f, "{} => {}", self.event, rendered.join(", "))
    }
}

/// Pure, deterministic resolver from domain events to cache-key patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvalidationKeyResolver;

impl InvalidationKeyResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn rule(&self, event: DomainEvent) -> InvalidationRule {
        let keys = match event {
            DomainEvent::CustomerChange => CUSTOMER_KEYS,
            DomainEvent::CatalogChange => CATALOG_KEYS,
            DomainEvent::OrderChange => ORDER_KEYS,
            DomainEvent::TeamChange => TEAM_KEYS,
        };
        InvalidationRule { event, keys }
    }

    /// Ordered patterns to invalidate after `event`.
    pub fn resolve(&self, event: DomainEvent) -> Vec<CacheKey> {
        self.rule(event).patterns()
    }

    /// Resolve an event by its wire name (`onOrderChange`, ...).
    pub fn resolve_named(&self, name: &str) -> Result<Vec<CacheKey>, CacheError> {
        let event: DomainEvent = name
            .parse()
            .map_err(|_| CacheError::unknown_event(name))?;
        Ok(self.resolve(event))
    }

    /// The complete table, in declaration order of the events.
    pub fn rules(&self) -> Vec<InvalidationRule> {
        DomainEvent::ALL
            .into_iter()
            .map(|event| self.rule(event))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_deterministic() {
        let resolver = InvalidationKeyResolver::new();
        for event in DomainEvent::ALL {
            assert_eq!(resolver.resolve(event), resolver.resolve(event));
        }
    }

    #[test]
    fn customer_change_starts_specific_and_ends_broad() {
        let keys = InvalidationKeyResolver::new().resolve(DomainEvent::CustomerChange);
        assert_eq!(keys.first(), Some(&CacheKey::domain("customers")));
        assert_eq!(keys.last(), Some(&CacheKey::domain("dashboard")));
        assert!(keys.contains(&CacheKey::domain("orders")));
    }

    #[test]
    fn every_event_has_keys_without_duplicates() {
        let resolver = InvalidationKeyResolver::new();
        for rule in resolver.rules() {
            let keys = rule.patterns();
            assert!(!keys.is_empty(), "{} has no keys", rule.event);
            let mut deduped = keys.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(deduped.len(), keys.len(), "{} repeats a key", rule.event);
        }
    }

    #[test]
    fn named_resolution_matches_typed() {
        let resolver = InvalidationKeyResolver::new();
        assert_eq!(
            resolver.resolve_named("onOrderChange").unwrap(),
            resolver.resolve(DomainEvent::OrderChange)
        );
    }

    #[test]
    fn unknown_event_name_fails_loudly() {
        let err = InvalidationKeyResolver::new()
            .resolve_named("onInvoiceChange")
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::UnknownDomainEvent { ref name } if name == "onInvoiceChange"
        ));
    }

    #[test]
    fn rule_table_snapshot() {
        let table: Vec<String> = InvalidationKeyResolver::new()
            .rules()
            .iter()
            .map(ToString::to_string)
            .collect();
        insta::assert_snapshot!(table.join("\n"), @r"
        onCustomerChange => [customers], [customer-contacts], [organizations], [orders], [dashboard]
        onCatalogChange => [products], [product-variants], [categories], [catalog], [dashboard]
        onOrderChange => [orders], [order-items], [order-audit-logs], [production], [design-jobs], [dashboard]
        onTeamChange => [users], [salespeople], [designers], [manufacturers], [team], [dashboard]
        ");
    }
}
