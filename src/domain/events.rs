//! Domain write events that drive cache invalidation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Class of business mutation that makes cached views stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainEvent {
    #[serde(rename = "onCustomerChange")]
    CustomerChange,
    #[serde(rename = "onCatalogChange")]
    CatalogChange,
    #[serde(rename = "onOrderChange")]
    OrderChange,
    #[serde(rename = "onTeamChange")]
    TeamChange,
}

impl DomainEvent {
    pub const ALL: [DomainEvent; 4] = [
        DomainEvent::CustomerChange,
        DomainEvent::CatalogChange,
        DomainEvent::OrderChange,
        DomainEvent::TeamChange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DomainEvent::CustomerChange => "onCustomerChange",
            DomainEvent::CatalogChange => "onCatalogChange",
            DomainEvent::OrderChange => "onOrderChange",
            DomainEvent::TeamChange => "onTeamChange",
        }
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when an event name has no entry in the closed event set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEvent(pub String);

impl FromStr for DomainEvent {
    type Err = UnknownEvent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DomainEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == value)
            .ok_or_else(|| UnknownEvent(value.to_string()))
    }
}
