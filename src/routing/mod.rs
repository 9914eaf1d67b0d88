//! Routing key resolution
//!
//! Maps a logical destination (a party name) to a broker routing key.
//! Registered parties route to their own key; anything else falls back to a
//! single processing key.

use std::collections::HashSet;

/// Routing key used for unregistered destinations unless configured otherwise
pub const DEFAULT_FALLBACK_ROUTING_KEY: &str = "processing";

/// Allow-list backed routing key resolver
#[derive(Debug, Clone)]
pub struct RoutingKeyResolver {
    known: HashSet<String>,
    fallback: String,
}

impl RoutingKeyResolver {
    pub fn new<I, S>(destinations: I, fallback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: destinations.into_iter().map(Into::into).collect(),
            fallback: fallback.into(),
        }
    }

    /// Routing key for `destination`; total, never fails
    pub fn resolve<'a>(&'a self, destination: &'a str) -> &'a str {
        if self.is_known(destination) {
            destination
        } else {
            &self.fallback
        }
    }

    /// Whether `destination` is registered (case-sensitive)
    pub fn is_known(&self, destination: &str) -> bool {
        self.known.contains(destination)
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}

/// Whether `token` can be used as a single NATS subject token
pub fn is_valid_subject_token(token: &str) -> bool {
    !token.is_empty()
        && !token
            .chars()
            .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> RoutingKeyResolver {
        RoutingKeyResolver::new(["bankB", "bankC"], DEFAULT_FALLBACK_ROUTING_KEY)
    }

    #[test]
    fn test_known_destination_routes_to_itself() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("bankB"), "bankB");
        assert!(resolver.is_known("bankC"));
    }

    #[test]
    fn test_unknown_destination_falls_back() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("unregistered-party"), "processing");
        assert!(!resolver.is_known("unregistered-party"));
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("BANKB"), "processing");
    }

    #[test]
    fn test_subject_tokens() {
        assert!(is_valid_subject_token("bankB"));
        assert!(is_valid_subject_token("duplicate_contract_queue"));
        assert!(!is_valid_subject_token("bank.B"));
        assert!(!is_valid_subject_token("bank B"));
        assert!(!is_valid_subject_token("*"));
        assert!(!is_valid_subject_token(""));
    }
}
