//! The canonical 8-token subject and its codec.
//!
//! ```text
//! <direction>.<origin_tier>.<zone>.<subzone>.<node>.<domain>.<entity>.<event>
//! ```
//!
//! `direction` and `origin_tier` are closed enumerations; the remaining six
//! positions are [`Token`](crate::identity::Token)s. `subzone` carries the
//! literal `none` sentinel when the originating node has no subzone, and
//! `node` carries `all` on a handful of broadcast `down` subjects.

use crate::identity::{Tier, Token};
use std::fmt;

const TOKEN_COUNT: usize = 8;

/// Direction of travel through the fabric: towards `central` or away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully-formed canonical subject: always 8 dot-separated tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalSubject {
    pub direction: Direction,
    pub origin_tier: Tier,
    pub zone: Token,
    pub subzone: Token,
    pub node: Token,
    pub domain: Token,
    pub entity: Token,
    pub event: Token,
}

/// The result of a successful parse. Identical shape to [`CanonicalSubject`];
/// kept as a distinct name so call sites read "I parsed untrusted wire data"
/// rather than "I built this subject myself".
pub type ParsedSubject = CanonicalSubject;

impl CanonicalSubject {
    /// Construct a canonical subject from its eight parts. Infallible once
    /// the caller already holds validated `Tier`/`Token` values.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        direction: Direction,
        origin_tier: Tier,
        zone: Token,
        subzone: Token,
        node: Token,
        domain: Token,
        entity: Token,
        event: Token,
    ) -> Self {
        CanonicalSubject {
            direction,
            origin_tier,
            zone,
            subzone,
            node,
            domain,
            entity,
            event,
        }
    }

    /// Parse a wire subject string into its eight typed parts.
    ///
    /// Never panics and never errors in the `Result` sense: a subject that
    /// doesn't fit the grammar simply yields `None`, letting a caller such as
    /// the relay engine `nak`/`term` the offending message rather than take
    /// down the poll loop.
    pub fn try_parse(raw: &str) -> Option<ParsedSubject> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != TOKEN_COUNT {
            return None;
        }
        let direction = Direction::parse(parts[0])?;
        let origin_tier = Tier::parse(parts[1])?;
        let zone = Token::new(parts[2]).ok()?;
        let subzone = Token::new(parts[3]).ok()?;
        let node = Token::new(parts[4]).ok()?;
        let domain = Token::new(parts[5]).ok()?;
        let entity = Token::new(parts[6]).ok()?;
        let event = Token::new(parts[7]).ok()?;
        Some(CanonicalSubject {
            direction,
            origin_tier,
            zone,
            subzone,
            node,
            domain,
            entity,
            event,
        })
    }

    /// Re-route a subject at a hop boundary: replace `direction`,
    /// `origin_tier`, `zone`, `subzone` and `node`, while preserving
    /// `domain`, `entity` and `event` unchanged.
    ///
    /// This is the one operation the relay engine calls on every forwarded
    /// message; the business payload's identity (domain/entity/event) must
    /// never drift as a message crosses tiers.
    pub fn rewrite(
        &self,
        direction: Direction,
        origin_tier: Tier,
        zone: Token,
        subzone: Token,
        node: Token,
    ) -> CanonicalSubject {
        CanonicalSubject {
            direction,
            origin_tier,
            zone,
            subzone,
            node,
            domain: self.domain.clone(),
            entity: self.entity.clone(),
            event: self.event.clone(),
        }
    }
}

impl fmt::Display for CanonicalSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}.{}.{}",
            self.direction,
            self.origin_tier,
            self.zone,
            self.subzone,
            self.node,
            self.domain,
            self.entity,
            self.event
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CanonicalSubject {
        CanonicalSubject::build(
            Direction::Up,
            Tier::Leaf,
            Token::new("snc").unwrap(),
            Token::new("none").unwrap(),
            Token::new("desk1").unwrap(),
            Token::new("orders").unwrap(),
            Token::new("order").unwrap(),
            Token::new("created").unwrap(),
        )
    }

    #[test]
    fn build_then_display_round_trips_through_try_parse() {
        let subject = sample();
        let wire = subject.to_string();
        assert_eq!(wire, "up.leaf.snc.none.desk1.orders.order.created");
        let parsed = CanonicalSubject::try_parse(&wire).unwrap();
        assert_eq!(parsed, subject);
    }

    #[test]
    fn try_parse_rejects_wrong_token_count() {
        assert!(CanonicalSubject::try_parse("up.leaf.snc.none.desk1.orders.order").is_none());
        assert!(
            CanonicalSubject::try_parse("up.leaf.snc.none.desk1.orders.order.created.extra")
                .is_none()
        );
    }

    #[test]
    fn try_parse_rejects_unknown_direction_and_tier() {
        assert!(
            CanonicalSubject::try_parse("sideways.leaf.snc.none.desk1.orders.order.created")
                .is_none()
        );
        assert!(
            CanonicalSubject::try_parse("up.planet.snc.none.desk1.orders.order.created")
                .is_none()
        );
    }

    #[test]
    fn try_parse_rejects_invalid_tokens() {
        assert!(
            CanonicalSubject::try_parse("up.leaf. .none.desk1.orders.order.created").is_none()
        );
    }

    #[test]
    fn rewrite_preserves_domain_entity_event() {
        let subject = sample();
        let rewritten = subject.rewrite(
            Direction::Up,
            Tier::Zone,
            Token::new("snc").unwrap(),
            Token::new("none").unwrap(),
            Token::new("zone-a").unwrap(),
        );
        assert_eq!(rewritten.domain, subject.domain);
        assert_eq!(rewritten.entity, subject.entity);
        assert_eq!(rewritten.event, subject.event);
        assert_eq!(rewritten.origin_tier, Tier::Zone);
        assert_eq!(rewritten.node.as_str(), "zone-a");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn token_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9_-]{0,15}"
    }

    fn direction_strategy() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Direction::Up), Just(Direction::Down)]
    }

    fn tier_strategy() -> impl Strategy<Value = Tier> {
        prop_oneof![
            Just(Tier::Leaf),
            Just(Tier::Subzone),
            Just(Tier::Zone),
            Just(Tier::Central),
        ]
    }

    proptest! {
        #[test]
        fn any_canonical_subject_round_trips(
            direction in direction_strategy(),
            origin_tier in tier_strategy(),
            zone in token_strategy(),
            subzone in token_strategy(),
            node in token_strategy(),
            domain in token_strategy(),
            entity in token_strategy(),
            event in token_strategy(),
        ) {
            let subject = CanonicalSubject::build(
                direction,
                origin_tier,
                Token::new(zone).unwrap(),
                Token::new(subzone).unwrap(),
                Token::new(node).unwrap(),
                Token::new(domain).unwrap(),
                Token::new(entity).unwrap(),
                Token::new(event).unwrap(),
            );
            let wire = subject.to_string();
            let parsed = CanonicalSubject::try_parse(&wire).unwrap();
            prop_assert_eq!(parsed, subject);
        }

        #[test]
        fn try_parse_never_panics_on_arbitrary_input(raw in ".*") {
            let _ = CanonicalSubject::try_parse(&raw);
        }

        #[test]
        fn rewrite_never_changes_trailing_three_tokens(
            direction in direction_strategy(),
            origin_tier in tier_strategy(),
            zone in token_strategy(),
            subzone in token_strategy(),
            node in token_strategy(),
            domain in token_strategy(),
            entity in token_strategy(),
            event in token_strategy(),
            new_zone in token_strategy(),
            new_subzone in token_strategy(),
            new_node in token_strategy(),
        ) {
            let subject = CanonicalSubject::build(
                direction,
                origin_tier,
                Token::new(zone).unwrap(),
                Token::new(subzone).unwrap(),
                Token::new(node).unwrap(),
                Token::new(domain).unwrap(),
                Token::new(entity.clone()).unwrap(),
                Token::new(event).unwrap(),
            );
            let rewritten = subject.rewrite(
                Direction::Down,
                Tier::Central,
                Token::new(new_zone).unwrap(),
                Token::new(new_subzone).unwrap(),
                Token::new(new_node).unwrap(),
            );
            prop_assert_eq!(rewritten.domain, subject.domain);
            prop_assert_eq!(rewritten.entity, subject.entity);
            prop_assert_eq!(rewritten.event, subject.event);
        }
    }
}
