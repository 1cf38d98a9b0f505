// ABOUTME: Explicit mapping from source-control refs to target environments.
// ABOUTME: Supports exact branch names and trailing-wildcard patterns like release/*.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::types::EnvironmentName;

/// Maps a branch or tag to the environment it deploys to.
///
/// Exact entries win over patterns; among patterns the longest prefix wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TriggerMap {
    entries: BTreeMap<String, EnvironmentName>,
}

impl TriggerMap {
    pub fn new(entries: impl IntoIterator<Item = (String, EnvironmentName)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, EnvironmentName)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Every environment some trigger points at.
    pub fn targets(&self) -> impl Iterator<Item = EnvironmentName> + '_ {
        self.entries.values().copied()
    }

    /// Resolve a ref such as `main`, `refs/heads/main` or `refs/tags/v1.2`.
    pub fn resolve(&self, branch_or_tag: &str) -> Option<EnvironmentName> {
        let name = normalize_ref(branch_or_tag);

        if let Some(env) = self.entries.get(name) {
            return Some(*env);
        }

        self.entries
            .iter()
            .filter_map(|(pattern, env)| {
                let prefix = pattern.strip_suffix('*')?;
                name.starts_with(prefix).then_some((prefix.len(), *env))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, env)| env)
    }
}

fn normalize_ref(input: &str) -> &str {
    let input = input.trim();
    input
        .strip_prefix("refs/heads/")
        .or_else(|| input.strip_prefix("refs/tags/"))
        .unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> TriggerMap {
        TriggerMap::new([
            ("develop".to_string(), EnvironmentName::Dev),
            ("main".to_string(), EnvironmentName::Staging),
            ("release/*".to_string(), EnvironmentName::Prod),
            ("release/hotfix-*".to_string(), EnvironmentName::Staging),
        ])
    }

    #[test]
    fn exact_match() {
        assert_eq!(map().resolve("develop"), Some(EnvironmentName::Dev));
        assert_eq!(map().resolve("main"), Some(EnvironmentName::Staging));
    }

    #[test]
    fn strips_git_ref_prefixes() {
        assert_eq!(
            map().resolve("refs/heads/main"),
            Some(EnvironmentName::Staging)
        );
        assert_eq!(
            map().resolve("refs/tags/release/1.0"),
            Some(EnvironmentName::Prod)
        );
    }

    #[test]
    fn longest_pattern_wins() {
        assert_eq!(map().resolve("release/1.4"), Some(EnvironmentName::Prod));
        assert_eq!(
            map().resolve("release/hotfix-12"),
            Some(EnvironmentName::Staging)
        );
    }

    #[test]
    fn unmapped_branch_is_none() {
        assert_eq!(map().resolve("feature/login"), None);
        assert_eq!(map().resolve("mainline"), None);
    }
}
