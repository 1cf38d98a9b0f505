// ABOUTME: Network exposure policy for an environment.
// ABOUTME: Supports public, private, and private-egress.

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkPolicy {
    /// Reachable from the internet through a public load balancer.
    Public,
    /// No inbound or outbound internet access.
    #[default]
    Private,
    /// No inbound internet access; outbound through a NAT gateway.
    PrivateEgress,
}

impl FromStr for NetworkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(NetworkPolicy::Public),
            "private" => Ok(NetworkPolicy::Private),
            "private-egress" => Ok(NetworkPolicy::PrivateEgress),
            _ => Err(format!("unknown network policy: {}", s)),
        }
    }
}

impl fmt::Display for NetworkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkPolicy::Public => write!(f, "public"),
            NetworkPolicy::Private => write!(f, "private"),
            NetworkPolicy::PrivateEgress => write!(f, "private-egress"),
        }
    }
}

impl<'de> Deserialize<'de> for NetworkPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Serialize for NetworkPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_policies() {
        assert_eq!("public".parse(), Ok(NetworkPolicy::Public));
        assert_eq!("private".parse(), Ok(NetworkPolicy::Private));
        assert_eq!("private-egress".parse(), Ok(NetworkPolicy::PrivateEgress));
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = "open".parse::<NetworkPolicy>().unwrap_err();
        assert!(err.contains("open"));
    }

    #[test]
    fn display_round_trips() {
        for policy in [
            NetworkPolicy::Public,
            NetworkPolicy::Private,
            NetworkPolicy::PrivateEgress,
        ] {
            assert_eq!(policy.to_string().parse(), Ok(policy));
        }
    }
}
