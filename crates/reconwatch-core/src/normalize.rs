//! Normalizer (C1): canonicalizes raw scanner/user strings so that
//! `(target, type, normalized)` is stable across runs and scanners.
//!
//! Pure functions, no I/O — invalid input yields a typed `CoreError`; the
//! caller (ingestion) is responsible for skipping the record and auditing
//! the failure.

use std::net::IpAddr;

use crate::domain::target::ScopePolicy;
use crate::domain::service::Proto;
use crate::error::{CoreError, CoreResult};

/// Lowercase, strip trailing dot, strip scheme/port, validate as a DNS name.
pub fn normalize_host(raw: &str) -> CoreResult<String> {
    let mut s = raw.trim().to_ascii_lowercase();

    if let Some(idx) = s.find("://") {
        s = s[idx + 3..].to_string();
    }
    if let Some(idx) = s.find('/') {
        s.truncate(idx);
    }
    if let Some(idx) = s.rfind(':') {
        // Only strip if what follows looks like a port (all digits), to
        // avoid mangling IPv6 literals passed in by mistake.
        if s[idx + 1..].chars().all(|c| c.is_ascii_digit()) && !s[idx + 1..].is_empty() {
            s.truncate(idx);
        }
    }
    while s.ends_with('.') {
        s.pop();
    }

    if is_valid_dns_name(&s) {
        Ok(s)
    } else {
        Err(CoreError::InvalidHostname(raw.to_string()))
    }
}

fn is_valid_dns_name(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Parse and canonicalize an IP address. Private/loopback ranges are
/// rejected unless `scope` contains a CIDR that covers the address
/// (an operator who explicitly scoped an internal range meant it).
pub fn normalize_ip(raw: &str, scope: Option<&ScopePolicy>) -> CoreResult<String> {
    let addr: IpAddr = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidIpAddress(raw.to_string()))?;

    if is_private_or_loopback(&addr) {
        let explicitly_allowed = scope
            .map(|s| s.cidrs.iter().any(|c| c.contains(&addr)))
            .unwrap_or(false);
        if !explicitly_allowed {
            return Err(CoreError::PrivateIpNotAllowed(raw.to_string()));
        }
    }

    // `IpAddr`'s Display already produces the zero-compressed canonical
    // textual form for IPv6 and dotted-quad for IPv4.
    Ok(addr.to_string())
}

fn is_private_or_loopback(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Lowercase scheme/host, elide the default port, normalize the path.
/// Query and fragment are preserved verbatim.
pub fn normalize_url(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    let scheme_end = trimmed
        .find("://")
        .ok_or_else(|| CoreError::InvalidUrl(raw.to_string(), "missing scheme".to_string()))?;
    let scheme = trimmed[..scheme_end].to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(CoreError::InvalidUrl(raw.to_string(), format!("unsupported scheme `{scheme}`")));
    }
    let rest = &trimmed[scheme_end + 3..];

    let (authority, after_authority) = match rest.find(['/', '?', '#']) {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(CoreError::InvalidUrl(raw.to_string(), "missing host".to_string()));
    }

    let (host, explicit_port) = match authority.rfind(':') {
        Some(idx) if authority[idx + 1..].chars().all(|c| c.is_ascii_digit()) && !authority[idx + 1..].is_empty() => {
            (&authority[..idx], Some(&authority[idx + 1..]))
        }
        _ => (authority, None),
    };
    let host = host.to_ascii_lowercase();
    let default_port = if scheme == "https" { "443" } else { "80" };
    let port_suffix = match explicit_port {
        Some(p) if p != default_port => format!(":{p}"),
        _ => String::new(),
    };

    let (path_and_rest, query_and_fragment) = match after_authority.find(['?', '#']) {
        Some(idx) => (&after_authority[..idx], &after_authority[idx..]),
        None => (after_authority, ""),
    };
    let normalized_path = normalize_path(path_and_rest);

    Ok(format!(
        "{scheme}://{host}{port_suffix}{normalized_path}{query_and_fragment}"
    ))
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Normalize a `(host, port, proto)` service tuple.
pub fn normalize_service(host: &str, port: i64, proto: &str) -> CoreResult<(String, u16, Proto)> {
    let normalized_host = normalize_host(host)?;
    if !(1..=65535).contains(&port) {
        return Err(CoreError::InvalidPort(port));
    }
    let proto = match proto.to_ascii_lowercase().as_str() {
        "tcp" => Proto::Tcp,
        "udp" => Proto::Udp,
        other => return Err(CoreError::InvalidUrl(host.to_string(), format!("unknown proto `{other}`"))),
    };
    Ok((normalized_host, port as u16, proto))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_lowercased_and_trailing_dot_stripped() {
        assert_eq!(normalize_host("A.Example.COM.").unwrap(), "a.example.com");
    }

    #[test]
    fn host_strips_scheme_and_port() {
        assert_eq!(
            normalize_host("https://a.example.com:8443/path").unwrap(),
            "a.example.com"
        );
    }

    #[test]
    fn host_rejects_invalid_labels() {
        assert!(normalize_host("-bad.example.com").is_err());
        assert!(normalize_host("").is_err());
    }

    #[test]
    fn normalizing_a_normalized_host_is_a_fixed_point() {
        let once = normalize_host("A.Example.com.").unwrap();
        let twice = normalize_host(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn ip_rejects_loopback_by_default() {
        assert!(normalize_ip("127.0.0.1", None).is_err());
        assert!(normalize_ip("10.0.0.5", None).is_err());
    }

    #[test]
    fn ip_allows_private_when_scope_covers_it() {
        let scope = ScopePolicy {
            dns_suffixes: vec![],
            cidrs: vec!["10.0.0.0/8".parse().unwrap()],
            url_prefixes: vec![],
        };
        assert_eq!(normalize_ip("10.0.0.5", Some(&scope)).unwrap(), "10.0.0.5");
    }

    #[test]
    fn ip_canonicalizes_ipv6() {
        assert_eq!(
            normalize_ip("2001:0db8:0000:0000:0000:0000:0000:0001", None).unwrap(),
            "2001:db8::1"
        );
    }

    #[test]
    fn url_elides_default_port_and_lowercases_host() {
        assert_eq!(
            normalize_url("HTTP://Example.COM:80/Path/").unwrap(),
            "http://example.com/Path"
        );
    }

    #[test]
    fn url_keeps_non_default_port() {
        assert_eq!(
            normalize_url("https://example.com:8443/").unwrap(),
            "https://example.com:8443/"
        );
    }

    #[test]
    fn url_collapses_dot_dot_segments() {
        assert_eq!(
            normalize_url("http://example.com/a/b/../c").unwrap(),
            "http://example.com/a/c"
        );
    }

    #[test]
    fn url_preserves_query_and_fragment_verbatim() {
        assert_eq!(
            normalize_url("http://example.com/a?Foo=Bar#Frag").unwrap(),
            "http://example.com/a?Foo=Bar#Frag"
        );
    }

    #[test]
    fn normalizing_a_normalized_url_is_a_fixed_point() {
        let once = normalize_url("HTTP://Example.com:80/a/../b/").unwrap();
        let twice = normalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn service_rejects_out_of_range_port() {
        assert!(normalize_service("example.com", 0, "tcp").is_err());
        assert!(normalize_service("example.com", 70000, "tcp").is_err());
    }

    #[test]
    fn service_normalizes_host_and_proto() {
        let (h, p, proto) = normalize_service("Example.COM", 80, "TCP").unwrap();
        assert_eq!(h, "example.com");
        assert_eq!(p, 80);
        assert_eq!(proto, Proto::Tcp);
    }
}
