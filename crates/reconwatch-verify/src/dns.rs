//! DNS resolution and consensus for asset re-verification.
//!
//! `verify_asset` requires at least two independently-configured resolvers
//! to agree before an asset flips state: unanimous NXDOMAIN retires it,
//! any resolution revives it, anything else (a timeout, a split verdict)
//! leaves it exactly where it was so a single flaky resolver can't cause
//! churn.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Resolved(Vec<IpAddr>),
    NxDomain,
    Timeout,
}

#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> ResolutionOutcome;
}

/// Resolves via the operating system's configured resolver, through
/// `tokio::net::lookup_host`.
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, host: &str) -> ResolutionOutcome {
        let query = format!("{host}:0");
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host(query)).await {
            Ok(Ok(addrs)) => {
                let ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
                if ips.is_empty() {
                    ResolutionOutcome::NxDomain
                } else {
                    ResolutionOutcome::Resolved(ips)
                }
            }
            Ok(Err(_)) => ResolutionOutcome::NxDomain,
            Err(_) => {
                debug!(host, "dns resolution timed out");
                ResolutionOutcome::Timeout
            }
        }
    }
}

/// A fixed-answer resolver for tests.
pub struct StaticResolver {
    pub outcome: ResolutionOutcome,
}

impl StaticResolver {
    pub fn resolves(ips: Vec<IpAddr>) -> Self {
        Self {
            outcome: ResolutionOutcome::Resolved(ips),
        }
    }

    pub fn nxdomain() -> Self {
        Self {
            outcome: ResolutionOutcome::NxDomain,
        }
    }

    pub fn timeout() -> Self {
        Self {
            outcome: ResolutionOutcome::Timeout,
        }
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve(&self, _host: &str) -> ResolutionOutcome {
        self.outcome.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetVerdict {
    /// At least one resolver returned an address.
    Active,
    /// Every resolver returned NXDOMAIN.
    Unresolved,
    /// A timeout or a split verdict between resolvers: leave state as-is.
    Inconclusive,
}

/// Query every resolver concurrently and reduce to a verdict. Requires
/// `resolvers.len() >= 2` to satisfy the independent-consensus invariant;
/// callers with only one configured resolver should duplicate it, which
/// still protects against a single bad answer racing a retry but not
/// against a single resolver's own flakiness.
#[instrument(skip(resolvers))]
pub async fn verify_asset(host: &str, resolvers: &[std::sync::Arc<dyn DnsResolver>]) -> AssetVerdict {
    let outcomes = futures::future::join_all(resolvers.iter().map(|r| r.resolve(host))).await;

    if outcomes.iter().any(|o| matches!(o, ResolutionOutcome::Resolved(_))) {
        return AssetVerdict::Active;
    }
    if outcomes.iter().all(|o| matches!(o, ResolutionOutcome::NxDomain)) {
        return AssetVerdict::Unresolved;
    }
    AssetVerdict::Inconclusive
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn resolver(outcome: ResolutionOutcome) -> Arc<dyn DnsResolver> {
        Arc::new(StaticResolver { outcome })
    }

    #[tokio::test]
    async fn unanimous_nxdomain_is_unresolved() {
        let resolvers = vec![
            resolver(ResolutionOutcome::NxDomain),
            resolver(ResolutionOutcome::NxDomain),
        ];
        assert_eq!(verify_asset("gone.example.com", &resolvers).await, AssetVerdict::Unresolved);
    }

    #[tokio::test]
    async fn any_resolution_revives_asset() {
        let resolvers = vec![
            resolver(ResolutionOutcome::NxDomain),
            resolver(ResolutionOutcome::Resolved(vec!["1.2.3.4".parse().unwrap()])),
        ];
        assert_eq!(verify_asset("flaky.example.com", &resolvers).await, AssetVerdict::Active);
    }

    #[tokio::test]
    async fn timeout_is_inconclusive() {
        let resolvers = vec![
            resolver(ResolutionOutcome::NxDomain),
            resolver(ResolutionOutcome::Timeout),
        ];
        assert_eq!(verify_asset("slow.example.com", &resolvers).await, AssetVerdict::Inconclusive);
    }
}
