//! ReconWatch Verify
//!
//! Re-verification of candidate-stale assets and services: independent DNS
//! resolver consensus for assets, TCP/UDP probes for services.

pub mod dns;
pub mod probe;

pub use dns::{verify_asset, AssetVerdict, DnsResolver, ResolutionOutcome, StaticResolver, SystemResolver};
pub use probe::{verify_tcp_service, verify_udp_service, ServiceVerdict};
