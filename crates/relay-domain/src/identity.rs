//! Node identity: tier, zone, subzone, node.
//!
//! Every process in the fabric belongs to exactly one tier and carries an
//! identity `(tier, zone, subzone, node)` that never changes after start.

use crate::errors::DomainError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").unwrap());

/// Sentinel subzone value used when a node has no subzone.
pub const NO_SUBZONE: &str = "none";

/// Sentinel node value used on `down` subjects to address a broadcast scope.
pub const ALL_NODES: &str = "all";

/// One of the four tiers a node can operate at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Leaf,
    Subzone,
    Zone,
    Central,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Leaf => "leaf",
            Tier::Subzone => "subzone",
            Tier::Zone => "zone",
            Tier::Central => "central",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "leaf" => Some(Tier::Leaf),
            "subzone" => Some(Tier::Subzone),
            "zone" => Some(Tier::Zone),
            "central" => Some(Tier::Central),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated identity token: `^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$`.
///
/// Every position in a canonical subject other than `direction` and
/// `origin_tier` is a `Token`, including the business domain/entity/event
/// tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if TOKEN_RE.is_match(&raw) {
            Ok(Token(raw))
        } else {
            Err(DomainError::InvalidToken {
                token: raw,
                reason: "must match ^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$".to_owned(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide, immutable-after-start identity of a relay fabric node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub tier: Tier,
    pub zone: Token,
    /// The literal token `"none"` when this node has no subzone.
    pub subzone: Token,
    pub node: Token,
}

impl Identity {
    /// Build an identity, defaulting `subzone` to `"none"` when `None`.
    pub fn new(
        tier: Tier,
        zone: impl Into<String>,
        subzone: Option<String>,
        node: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Ok(Identity {
            tier,
            zone: Token::new(zone)?,
            subzone: Token::new(subzone.unwrap_or_else(|| NO_SUBZONE.to_owned()))?,
            node: Token::new(node)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_accepts_valid_values() {
        assert!(Token::new("desk1").is_ok());
        assert!(Token::new("unit_1-a").is_ok());
        assert!(Token::new("A").is_ok());
    }

    #[test]
    fn token_rejects_invalid_values() {
        assert!(Token::new("").is_err());
        assert!(Token::new("-leading-dash").is_err());
        assert!(Token::new("has a space").is_err());
        assert!(Token::new("has.dot").is_err());
        assert!(Token::new("x".repeat(65)).is_err());
    }

    #[test]
    fn identity_defaults_subzone_to_none() {
        let id = Identity::new(Tier::Zone, "snc", None, "zone-a").unwrap();
        assert_eq!(id.subzone.as_str(), NO_SUBZONE);
    }

    #[test]
    fn tier_round_trips_through_strings() {
        for t in [Tier::Leaf, Tier::Subzone, Tier::Zone, Tier::Central] {
            assert_eq!(Tier::parse(t.as_str()), Some(t));
        }
        assert_eq!(Tier::parse("bogus"), None);
    }
}
