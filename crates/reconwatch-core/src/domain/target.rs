//! Target entity and its scope policy.

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::ids::TargetId;

/// Ordered union of three allow-lists. A candidate string is in scope iff
/// at least one entry in any list matches it; there are no deny rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopePolicy {
    /// DNS suffixes, matched as exact tail labels (`b.c` matches `a.b.c`).
    pub dns_suffixes: Vec<String>,
    /// Allowed IP CIDR ranges.
    #[serde(default)]
    pub cidrs: Vec<IpNet>,
    /// Allowed URL prefixes (scheme+host[:port] or scheme+host+path prefix).
    pub url_prefixes: Vec<String>,
}

impl ScopePolicy {
    pub fn new(dns_suffixes: Vec<String>, cidrs: Vec<IpNet>, url_prefixes: Vec<String>) -> Self {
        Self {
            dns_suffixes,
            cidrs,
            url_prefixes,
        }
    }

    pub fn for_root_domain(root: &str) -> Self {
        Self {
            dns_suffixes: vec![root.to_ascii_lowercase()],
            cidrs: Vec::new(),
            url_prefixes: Vec::new(),
        }
    }
}

/// A named root of scope: the unit of monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub display_name: String,
    pub root_domain: String,
    pub scope: ScopePolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Target {
    pub fn new(display_name: impl Into<String>, root_domain: impl Into<String>) -> Self {
        let root_domain = root_domain.into();
        let now = Utc::now();
        Self {
            id: TargetId::new(),
            display_name: display_name.into(),
            scope: ScopePolicy::for_root_domain(&root_domain),
            root_domain,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_seeds_root_domain_suffix() {
        let t = Target::new("Example", "example.com");
        assert_eq!(t.scope.dns_suffixes, vec!["example.com".to_string()]);
    }
}
