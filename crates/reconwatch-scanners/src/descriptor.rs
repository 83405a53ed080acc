//! Scanner descriptors: which binary runs for which pipeline stage, with
//! what arguments and timeout.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    Subfinder,
    Nmap,
    Httpx,
    Nuclei,
}

impl ScannerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScannerKind::Subfinder => "subfinder",
            ScannerKind::Nmap => "nmap",
            ScannerKind::Httpx => "httpx",
            ScannerKind::Nuclei => "nuclei",
        }
    }

    /// Whether a failure of this stage aborts the rest of the pipeline.
    /// Only `dns_resolve` is critical; the httpx/nmap/nuclei external
    /// scanners are best-effort and never block later stages.
    pub fn is_critical(&self) -> bool {
        false
    }
}

/// A scanner invocation ready to execute: binary args and a per-stage
/// timeout. `targets` is the scanner's input (one root domain for
/// subfinder, a list of IPs for nmap, a list of `host:port` for httpx,
/// a list of URLs for nuclei).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerDescriptor {
    pub kind: ScannerKind,
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl ScannerDescriptor {
    pub fn subfinder(root_domain: &str, timeout_secs: u64) -> Self {
        Self {
            kind: ScannerKind::Subfinder,
            command: vec![
                "subfinder".to_string(),
                "-silent".to_string(),
                "-d".to_string(),
                root_domain.to_string(),
            ],
            timeout_secs,
        }
    }

    pub fn nmap(ips: &[String], timeout_secs: u64) -> Self {
        let mut command = vec![
            "nmap".to_string(),
            "-Pn".to_string(),
            "-oG".to_string(),
            "-".to_string(),
        ];
        command.extend(ips.iter().cloned());
        Self {
            kind: ScannerKind::Nmap,
            command,
            timeout_secs,
        }
    }

    pub fn httpx(targets: &[String], timeout_secs: u64) -> Self {
        let mut command = vec!["httpx".to_string(), "-silent".to_string(), "-u".to_string()];
        command.push(targets.join(","));
        Self {
            kind: ScannerKind::Httpx,
            command,
            timeout_secs,
        }
    }

    pub fn nuclei(urls: &[String], timeout_secs: u64) -> Self {
        let mut command = vec![
            "nuclei".to_string(),
            "-silent".to_string(),
            "-jsonl".to_string(),
            "-u".to_string(),
        ];
        command.push(urls.join(","));
        Self {
            kind: ScannerKind::Nuclei,
            command,
            timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subfinder_command_carries_root_domain() {
        let d = ScannerDescriptor::subfinder("example.com", 120);
        assert!(d.command.contains(&"example.com".to_string()));
        assert_eq!(d.kind.name(), "subfinder");
    }

    #[test]
    fn httpx_joins_targets_into_one_arg() {
        let d = ScannerDescriptor::httpx(&["a.example.com:443".to_string(), "b.example.com:80".to_string()], 60);
        assert!(d.command.last().unwrap().contains(','));
    }
}
