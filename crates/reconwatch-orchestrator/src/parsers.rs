//! Per-scanner output line parsers. Each scanner descriptor has a fixed
//! output shape; adding a scanner means adding a parser function alongside
//! its descriptor constructor.

use serde::Deserialize;

/// One open port found by nmap's grepable (`-oG -`) output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmapPort {
    pub ip: String,
    pub port: u16,
    pub proto: String,
    pub service_name: Option<String>,
}

/// Parses a single `-oG -` line, e.g.:
/// `Host: 1.2.3.4 ()  Ports: 80/open/tcp//http///, 443/closed/tcp///`
pub fn parse_nmap_grepable_line(line: &str) -> Vec<NmapPort> {
    let Some(host_idx) = line.find("Host: ") else {
        return Vec::new();
    };
    let Some(ports_idx) = line.find("Ports: ") else {
        return Vec::new();
    };
    let ip = line[host_idx + "Host: ".len()..]
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();
    if ip.is_empty() {
        return Vec::new();
    }

    let ports_section = &line[ports_idx + "Ports: ".len()..];
    ports_section
        .split(", ")
        .filter_map(|entry| parse_port_entry(&ip, entry))
        .collect()
}

fn parse_port_entry(ip: &str, entry: &str) -> Option<NmapPort> {
    let fields: Vec<&str> = entry.trim().split('/').collect();
    // port/state/proto/owner/service/rpcinfo/version
    if fields.len() < 3 {
        return None;
    }
    let port: u16 = fields[0].parse().ok()?;
    let state = fields[1];
    if state != "open" {
        return None;
    }
    let proto = fields[2].to_string();
    let service_name = fields.get(4).filter(|s| !s.is_empty()).map(|s| s.to_string());
    Some(NmapPort {
        ip: ip.to_string(),
        port,
        proto,
        service_name,
    })
}

/// httpx `-silent` output: one probed URL per line, optionally followed by
/// a bracketed status code ReconWatch's descriptor does not request, so a
/// bare URL is the expected shape; tolerate a trailing `[code]` anyway.
pub fn parse_httpx_line(line: &str) -> Option<String> {
    let url = line.split_whitespace().next()?;
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct NucleiInfo {
    name: Option<String>,
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NucleiLine {
    #[serde(rename = "template-id")]
    template_id: Option<String>,
    #[serde(rename = "matched-at")]
    matched_at: Option<String>,
    host: Option<String>,
    info: Option<NucleiInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NucleiMatch {
    pub template_id: String,
    pub matched_at: String,
    pub title: String,
    pub severity: String,
}

/// nuclei `-jsonl` output: one finding per line. Malformed lines (banner
/// noise, blank lines) are skipped rather than failing the scan.
pub fn parse_nuclei_line(line: &str) -> Option<NucleiMatch> {
    let parsed: NucleiLine = serde_json::from_str(line.trim()).ok()?;
    let matched_at = parsed.matched_at.or(parsed.host)?;
    let info = parsed.info.unwrap_or(NucleiInfo { name: None, severity: None });
    Some(NucleiMatch {
        template_id: parsed.template_id.unwrap_or_else(|| "unknown".to_string()),
        matched_at,
        title: info.name.unwrap_or_else(|| "unnamed finding".to_string()),
        severity: info.severity.unwrap_or_else(|| "info".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmap_line_extracts_open_port_and_service() {
        let ports = parse_nmap_grepable_line(
            "Host: 1.2.3.4 ()\tPorts: 80/open/tcp//http///, 443/closed/tcp///",
        );
        assert_eq!(
            ports,
            vec![NmapPort {
                ip: "1.2.3.4".to_string(),
                port: 80,
                proto: "tcp".to_string(),
                service_name: Some("http".to_string()),
            }]
        );
    }

    #[test]
    fn httpx_line_is_bare_url() {
        assert_eq!(
            parse_httpx_line("http://a.example.com/"),
            Some("http://a.example.com/".to_string())
        );
    }

    #[test]
    fn nuclei_line_parses_jsonl_match() {
        let line = r#"{"template-id":"tech-detect","matched-at":"http://a.example.com/","info":{"name":"Tech Detect","severity":"info"}}"#;
        let m = parse_nuclei_line(line).unwrap();
        assert_eq!(m.template_id, "tech-detect");
        assert_eq!(m.severity, "info");
    }

    #[test]
    fn nuclei_skips_malformed_lines() {
        assert!(parse_nuclei_line("not json").is_none());
    }
}
