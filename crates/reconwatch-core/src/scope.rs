//! Scope Enforcer (C2): authorizes a candidate string against a target's
//! scope policy.
//!
//! The policy is a closed-world, ordered union of three allow-lists
//! (§4.2): there are no deny rules, so evaluation is "does anything match",
//! not first-match-wins — unlike the tool-policy engine this is modeled
//! on, a scope policy has only one verdict family to reach.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::domain::target::ScopePolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeVerdict {
    Allowed { matched_rule: String },
    Denied { reason: String },
}

impl ScopeVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ScopeVerdict::Allowed { .. })
    }
}

/// Evaluate a candidate hostname, IP, or URL against the scope policy.
pub fn evaluate_scope(policy: &ScopePolicy, candidate: &str) -> ScopeVerdict {
    if let Ok(addr) = candidate.parse::<IpAddr>() {
        return evaluate_ip(policy, addr, candidate);
    }

    if candidate.contains("://") {
        return evaluate_url(policy, candidate);
    }

    evaluate_host(policy, candidate)
}

fn evaluate_ip(policy: &ScopePolicy, addr: IpAddr, candidate: &str) -> ScopeVerdict {
    for cidr in &policy.cidrs {
        if cidr.contains(&addr) {
            return ScopeVerdict::Allowed {
                matched_rule: format!("cidr:{cidr}"),
            };
        }
    }
    ScopeVerdict::Denied {
        reason: format!("`{candidate}` matches no allowed CIDR"),
    }
}

fn evaluate_url(policy: &ScopePolicy, candidate: &str) -> ScopeVerdict {
    for prefix in &policy.url_prefixes {
        if candidate.starts_with(prefix.as_str()) {
            return ScopeVerdict::Allowed {
                matched_rule: format!("url_prefix:{prefix}"),
            };
        }
    }
    // A URL whose host falls within an allowed DNS suffix is also in
    // scope — the suffix list gates the host regardless of surface form.
    if let Some(host) = extract_host(candidate) {
        if let ScopeVerdict::Allowed { matched_rule } = evaluate_host(policy, &host) {
            return ScopeVerdict::Allowed { matched_rule };
        }
    }
    ScopeVerdict::Denied {
        reason: format!("`{candidate}` matches no allowed URL prefix or DNS suffix"),
    }
}

fn extract_host(url: &str) -> Option<String> {
    let after_scheme = url.split_once("://")?.1;
    let authority = after_scheme.split(['/', '?', '#']).next()?;
    let host = authority.split(':').next()?;
    Some(host.to_ascii_lowercase())
}

fn evaluate_host(policy: &ScopePolicy, candidate: &str) -> ScopeVerdict {
    let candidate_lower = candidate.to_ascii_lowercase();
    for suffix in &policy.dns_suffixes {
        if matches_dns_suffix(&candidate_lower, suffix) {
            return ScopeVerdict::Allowed {
                matched_rule: format!("dns_suffix:{suffix}"),
            };
        }
    }
    ScopeVerdict::Denied {
        reason: format!("`{candidate}` matches no allowed DNS suffix"),
    }
}

/// Exact tail-label match: `a.b.c` matches suffix `b.c` but not `bc`.
/// No wildcard expansion.
fn matches_dns_suffix(candidate: &str, suffix: &str) -> bool {
    if candidate == suffix {
        return true;
    }
    candidate
        .strip_suffix(suffix)
        .map(|prefix| prefix.ends_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ScopePolicy {
        ScopePolicy {
            dns_suffixes: vec!["example.com".to_string()],
            cidrs: vec!["203.0.113.0/24".parse().unwrap()],
            url_prefixes: vec!["https://shop.example.com/".to_string()],
        }
    }

    #[test]
    fn exact_tail_label_match_allows() {
        assert!(evaluate_scope(&policy(), "a.example.com").is_allowed());
    }

    #[test]
    fn partial_label_match_denies() {
        // "notexample.com" ends with "example.com" as a substring but the
        // preceding label boundary is not a dot.
        assert!(!evaluate_scope(&policy(), "notexample.com").is_allowed());
    }

    #[test]
    fn cidr_match_allows_ip() {
        assert!(evaluate_scope(&policy(), "203.0.113.5").is_allowed());
    }

    #[test]
    fn out_of_scope_ip_denied() {
        assert!(!evaluate_scope(&policy(), "8.8.8.8").is_allowed());
    }

    #[test]
    fn url_prefix_match_allows() {
        assert!(evaluate_scope(&policy(), "https://shop.example.com/cart").is_allowed());
    }

    #[test]
    fn url_with_in_scope_host_allowed_even_without_prefix_match() {
        assert!(evaluate_scope(&policy(), "https://other.example.com/x").is_allowed());
    }

    #[test]
    fn no_wildcard_support() {
        let p = ScopePolicy {
            dns_suffixes: vec!["*.example.com".to_string()],
            cidrs: vec![],
            url_prefixes: vec![],
        };
        // The literal suffix "*.example.com" does not tail-match "a.example.com".
        assert!(!evaluate_scope(&p, "a.example.com").is_allowed());
    }
}
