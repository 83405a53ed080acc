//! Stage handlers. Each implements `JobHandler` and is registered under its
//! `JobType::label()` dispatch key in the worker pool. Chaining is
//! enqueue-next-on-completion (§9): a handler that finishes successfully
//! enqueues the next DAG stage itself rather than returning control to an
//! awaiting coroutine.

use std::sync::Arc;

use async_trait::async_trait;
use reconwatch_core::domain::{
    AssetType, EdgeRelType, Job, JobType, Proto, RunEventKind, RunId, Scan, TargetId,
};
use reconwatch_core::{evaluate_scope, normalize_host, normalize_url, ArtifactStatus, ScopeVerdict};
use reconwatch_queue::{HandlerOutcome, JobHandler};
use reconwatch_scanners::{ScanOutcome, ScannerDescriptor, ScannerRunner};
use reconwatch_store::{NewJob, ServiceFingerprint};
use reconwatch_verify::{
    verify_asset, verify_tcp_service, verify_udp_service, AssetVerdict, ServiceVerdict, SystemResolver,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::change_detector::run_change_detection;
use crate::context::OrchestratorContext;
use crate::parsers::{parse_httpx_line, parse_nmap_grepable_line, parse_nuclei_line};

const RETAIN_OUTPUT_BYTES: usize = 64 * 1024;

/// Splits `candidates` by scope, publishing a `scope_denied` audit event for
/// every rejected one. Scope is always checked before a scanner process is
/// spawned, never after.
async fn partition_by_scope(
    ctx: &OrchestratorContext,
    run_id: RunId,
    target: &reconwatch_core::domain::Target,
    candidates: Vec<String>,
) -> Vec<String> {
    let mut allowed = Vec::new();
    for candidate in candidates {
        match evaluate_scope(&target.scope, &candidate) {
            ScopeVerdict::Allowed { .. } => allowed.push(candidate),
            ScopeVerdict::Denied { reason } => {
                warn!(candidate = %candidate, reason = %reason, "scope denied");
                ctx.events
                    .publish(
                        run_id,
                        RunEventKind::ScopeDenied {
                            target_string: candidate,
                        },
                    )
                    .await;
            }
        }
    }
    allowed
}

/// Runs `descriptor`, persisting a `Scan` row and streaming redacted lines
/// both to `ScanStore::append_output` and the event bus. Returns the
/// outcome and the collected (redacted) lines so the caller's parser can
/// consume them.
async fn run_and_record(
    ctx: &OrchestratorContext,
    run_id: RunId,
    target_id: TargetId,
    scanner_name: &str,
    target_string: &str,
    descriptor: &ScannerDescriptor,
) -> anyhow::Result<(ScanOutcome, Vec<String>)> {
    let scan = Scan::start(run_id, target_id, scanner_name, target_string);
    let scan_id = scan.id;
    ctx.scans.start_scan(scan).await?;
    ctx.events
        .publish(
            run_id,
            RunEventKind::ScanStarted {
                scan_id: scan_id.to_string(),
                scanner_name: scanner_name.to_string(),
            },
        )
        .await;

    let mut lines = Vec::new();
    let outcome_result = ScannerRunner::execute(descriptor, |line| {
        lines.push(line.to_string());
    })
    .await;

    let mut joined = lines.join("\n");
    joined.push('\n');
    ctx.scans
        .append_output(scan_id, &joined, RETAIN_OUTPUT_BYTES)
        .await?;
    for line in &lines {
        ctx.events
            .publish(
                run_id,
                RunEventKind::ScanLine {
                    scan_id: scan_id.to_string(),
                    line: line.clone(),
                },
            )
            .await;
    }

    match &outcome_result {
        Ok(outcome) if outcome.success => {
            ctx.scans.complete_scan(scan_id).await?;
        }
        _ => {
            ctx.scans.fail_scan(scan_id).await?;
        }
    }
    ctx.events
        .publish(
            run_id,
            RunEventKind::ScanCompleted {
                scan_id: scan_id.to_string(),
            },
        )
        .await;

    Ok((outcome_result?, lines))
}

// ---------------------------------------------------------------------------
// Pipeline (kicks off the DAG)
// ---------------------------------------------------------------------------

pub struct PipelineHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for PipelineHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let Some(run_id) = job.run_id else {
            return HandlerOutcome::Fatal("pipeline job missing run_id".to_string());
        };
        if let Err(err) = self.ctx.runs.mark_running(run_id).await {
            return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}"));
        }
        self.ctx.events.publish(run_id, RunEventKind::RunStarted).await;

        let enqueued = self
            .ctx
            .jobs
            .enqueue(NewJob::now(
                job.target_id,
                Some(run_id),
                JobType::Scanner {
                    name: "subfinder".to_string(),
                },
                serde_json::json!({}),
                job.priority,
            ))
            .await;
        match enqueued {
            Ok(_) => HandlerOutcome::Success,
            Err(err) => HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        }
    }
}

// ---------------------------------------------------------------------------
// subfinder -> dns_resolve
// ---------------------------------------------------------------------------

pub struct SubfinderHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for SubfinderHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let Some(run_id) = job.run_id else {
            return HandlerOutcome::Fatal("subfinder job missing run_id".to_string());
        };
        let target = match self.ctx.targets.get_target(job.target_id).await {
            Ok(t) => t,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };

        let descriptor = ScannerDescriptor::subfinder(&target.root_domain, self.ctx.config.scanner_timeout_seconds);
        let (_, lines) = match run_and_record(&self.ctx, run_id, job.target_id, "subfinder", &target.root_domain, &descriptor).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "subfinder run failed; proceeding best-effort");
                (ScanOutcome { exit_code: -1, duration_ms: 0, success: false }, Vec::new())
            }
        };

        for line in &lines {
            let Ok(host) = normalize_host(line) else { continue };
            if let Err(err) = self
                .ctx
                .inventory
                .upsert_asset_seen(job.target_id, run_id, AssetType::Subdomain, line, &host)
                .await
            {
                warn!(error = %err, "failed to upsert subdomain asset");
            }
        }

        enqueue_next(&self.ctx, job, run_id, "dns_resolve").await
    }
}

// ---------------------------------------------------------------------------
// dns_resolve -> nmap (critical: gates host->ip edges the rest depend on)
// ---------------------------------------------------------------------------

pub struct DnsResolveHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for DnsResolveHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let Some(run_id) = job.run_id else {
            return HandlerOutcome::Fatal("dns_resolve job missing run_id".to_string());
        };
        let hosts = match self
            .ctx
            .inventory
            .list_assets_by_type(job.target_id, AssetType::Subdomain)
            .await
        {
            Ok(assets) => assets,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };

        let resolver = Arc::new(SystemResolver::new(Duration::from_secs(5)));
        for host_asset in hosts.into_iter().filter(|a| a.last_seen_run_id == run_id) {
            // A single resolver here, not `verify_asset`'s multi-resolver
            // consensus: that machinery is reserved for re-verifying assets
            // already flagged candidate-stale (C9). Discovery-time lookups
            // take whatever one resolver reports; an NXDOMAIN here just
            // means no IP asset this round, not a state transition.
            let resolved = resolver.resolve(&host_asset.normalized_value).await;
            if let reconwatch_verify::ResolutionOutcome::Resolved(ips) = resolved {
                for ip in ips {
                    let ip_str = ip.to_string();
                    let ip_asset = match self
                        .ctx
                        .inventory
                        .upsert_asset_seen(job.target_id, run_id, AssetType::Ip, &ip_str, &ip_str)
                        .await
                    {
                        Ok(a) => a,
                        Err(err) => {
                            warn!(error = %err, "failed to upsert ip asset");
                            continue;
                        }
                    };
                    if let Err(err) = self
                        .ctx
                        .inventory
                        .upsert_edge_seen(
                            job.target_id,
                            run_id,
                            host_asset.id,
                            ip_asset.id,
                            EdgeRelType::ResolvesTo,
                        )
                        .await
                    {
                        warn!(error = %err, "failed to upsert resolves_to edge");
                    }
                }
            }
            // NXDOMAIN/timeout: no IP asset or edge this round. Not an
            // error — the subdomain asset itself remains active.
        }

        enqueue_next(&self.ctx, job, run_id, "nmap").await
    }
}

// ---------------------------------------------------------------------------
// nmap -> httpx
// ---------------------------------------------------------------------------

pub struct NmapHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for NmapHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let Some(run_id) = job.run_id else {
            return HandlerOutcome::Fatal("nmap job missing run_id".to_string());
        };
        let target = match self.ctx.targets.get_target(job.target_id).await {
            Ok(t) => t,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };
        let ip_assets = match self
            .ctx
            .inventory
            .list_assets_by_type(job.target_id, AssetType::Ip)
            .await
        {
            Ok(assets) => assets,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };
        let candidates: Vec<String> = ip_assets
            .iter()
            .filter(|a| a.last_seen_run_id == run_id)
            .map(|a| a.normalized_value.clone())
            .collect();
        let ips = partition_by_scope(&self.ctx, run_id, &target, candidates.clone()).await;

        if ips.is_empty() && !candidates.is_empty() {
            // Every candidate was denied: nothing left to scan this stage.
            return HandlerOutcome::Fatal("scope_denied".to_string());
        }
        if !ips.is_empty() {
            let descriptor = ScannerDescriptor::nmap(&ips, self.ctx.config.scanner_timeout_seconds);
            let lines = match run_and_record(&self.ctx, run_id, job.target_id, "nmap", &ips.join(","), &descriptor).await {
                Ok((_, lines)) => lines,
                Err(err) => {
                    warn!(error = %err, "nmap run failed; proceeding best-effort");
                    Vec::new()
                }
            };

            let ip_asset_by_value: std::collections::HashMap<String, _> = ip_assets
                .into_iter()
                .map(|a| (a.normalized_value.clone(), a))
                .collect();

            for line in &lines {
                for port in parse_nmap_grepable_line(line) {
                    let Some(asset) = ip_asset_by_value.get(&port.ip) else { continue };
                    let proto = if port.proto == "udp" { Proto::Udp } else { Proto::Tcp };
                    let mut fingerprint = ServiceFingerprint::default();
                    fingerprint.name = port.service_name;
                    if let Err(err) = self
                        .ctx
                        .inventory
                        .upsert_service_seen(job.target_id, run_id, asset.id, port.port, proto, fingerprint)
                        .await
                    {
                        warn!(error = %err, "failed to upsert service");
                    }
                }
            }
        }

        enqueue_next(&self.ctx, job, run_id, "httpx").await
    }
}

// ---------------------------------------------------------------------------
// httpx -> nuclei
// ---------------------------------------------------------------------------

pub struct HttpxHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for HttpxHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let Some(run_id) = job.run_id else {
            return HandlerOutcome::Fatal("httpx job missing run_id".to_string());
        };
        let target = match self.ctx.targets.get_target(job.target_id).await {
            Ok(t) => t,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };
        let services = match self.ctx.inventory.list_services(job.target_id).await {
            Ok(s) => s,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };

        let mut targets_by_service = Vec::new();
        for service in services.iter().filter(|s| s.last_seen_run_id == run_id && s.looks_like_http()) {
            let asset = match self.ctx.inventory.get_asset(service.asset_id).await {
                Ok(a) => a,
                Err(_) => continue,
            };
            targets_by_service.push((asset, service.port));
        }

        let candidates: Vec<String> = targets_by_service
            .iter()
            .map(|(asset, port)| format!("{}:{}", asset.normalized_value, port))
            .collect();
        let allowed = partition_by_scope(&self.ctx, run_id, &target, candidates.clone()).await;

        if allowed.is_empty() && !candidates.is_empty() {
            return HandlerOutcome::Fatal("scope_denied".to_string());
        }

        if !allowed.is_empty() {
            let descriptor = ScannerDescriptor::httpx(&allowed, self.ctx.config.scanner_timeout_seconds);
            let lines = match run_and_record(&self.ctx, run_id, job.target_id, "httpx", &allowed.join(","), &descriptor).await {
                Ok((_, lines)) => lines,
                Err(err) => {
                    warn!(error = %err, "httpx run failed; proceeding best-effort");
                    Vec::new()
                }
            };

            for line in &lines {
                let Some(url) = parse_httpx_line(line) else { continue };
                let Ok(normalized) = normalize_url(&url) else { continue };
                let Some(host) = extract_host(&normalized) else { continue };
                let Some((serving_asset, _)) = targets_by_service
                    .iter()
                    .find(|(asset, _)| asset.normalized_value == host)
                else {
                    continue;
                };
                let url_asset = match self
                    .ctx
                    .inventory
                    .upsert_asset_seen(job.target_id, run_id, AssetType::Url, &url, &normalized)
                    .await
                {
                    Ok(a) => a,
                    Err(err) => {
                        warn!(error = %err, "failed to upsert url asset");
                        continue;
                    }
                };
                if let Err(err) = self
                    .ctx
                    .inventory
                    .upsert_edge_seen(job.target_id, run_id, serving_asset.id, url_asset.id, EdgeRelType::Serves)
                    .await
                {
                    warn!(error = %err, "failed to upsert serves edge");
                }
            }
        }

        enqueue_next(&self.ctx, job, run_id, "nuclei").await
    }
}

fn extract_host(url: &str) -> Option<String> {
    let after_scheme = url.split_once("://")?.1;
    let authority = after_scheme.split(['/', '?', '#']).next()?;
    Some(authority.split(':').next()?.to_string())
}

// ---------------------------------------------------------------------------
// nuclei -> change detector -> run completion
// ---------------------------------------------------------------------------

pub struct NucleiHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for NucleiHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let Some(run_id) = job.run_id else {
            return HandlerOutcome::Fatal("nuclei job missing run_id".to_string());
        };
        let target = match self.ctx.targets.get_target(job.target_id).await {
            Ok(t) => t,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };
        let urls = match self.ctx.inventory.list_assets_by_type(job.target_id, AssetType::Url).await {
            Ok(assets) => assets,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };
        let candidates: Vec<String> = urls
            .iter()
            .filter(|a| a.last_seen_run_id == run_id)
            .map(|a| a.normalized_value.clone())
            .collect();
        let allowed = partition_by_scope(&self.ctx, run_id, &target, candidates.clone()).await;

        if !allowed.is_empty() {
            let descriptor = ScannerDescriptor::nuclei(&allowed, self.ctx.config.scanner_timeout_seconds);
            let run_result = run_and_record(&self.ctx, run_id, job.target_id, "nuclei", &allowed.join(","), &descriptor).await;
            let (scan_outcome, lines) = match run_result {
                Ok(r) => r,
                Err(err) => {
                    warn!(error = %err, "nuclei run failed; proceeding best-effort");
                    (ScanOutcome { exit_code: -1, duration_ms: 0, success: false }, Vec::new())
                }
            };
            let _ = scan_outcome;

            let url_asset_by_value: std::collections::HashMap<String, _> =
                urls.iter().map(|a| (a.normalized_value.clone(), a.clone())).collect();

            for line in &lines {
                let Some(m) = parse_nuclei_line(line) else { continue };
                let asset_id = url_asset_by_value.get(&m.matched_at).map(|a| a.id);
                let severity = parse_severity(&m.severity);
                let scan_id = reconwatch_core::domain::ScanId::new();
                let finding = reconwatch_core::domain::Finding {
                    id: reconwatch_core::domain::FindingId::new(),
                    target_id: job.target_id,
                    run_id,
                    scan_id,
                    asset_id,
                    service_id: None,
                    severity,
                    title: m.title.clone(),
                    description: format!("template {} matched {}", m.template_id, m.matched_at),
                    impact: None,
                    remediation: None,
                    cve: None,
                    cvss: None,
                    discovered_at: chrono::Utc::now(),
                };
                let finding_id = finding.id;
                if let Err(err) = self.ctx.findings.record_finding(finding).await {
                    warn!(error = %err, "failed to record finding");
                    continue;
                }
                self.ctx
                    .events
                    .publish(
                        run_id,
                        RunEventKind::FindingDiscovered {
                            finding_id: finding_id.to_string(),
                        },
                    )
                    .await;
            }
        }

        match run_change_detection(&self.ctx, job.target_id, run_id).await {
            Ok(summary) => {
                info!(?summary, "change detection complete");
            }
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        }

        match self.ctx.runs.complete_run(run_id).await {
            Ok(_) => {
                self.ctx.events.publish(run_id, RunEventKind::RunCompleted).await;
                HandlerOutcome::Success
            }
            Err(err) => HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        }
    }
}

fn parse_severity(raw: &str) -> reconwatch_core::domain::Severity {
    use reconwatch_core::domain::Severity;
    match raw.to_ascii_lowercase().as_str() {
        "low" => Severity::Low,
        "medium" => Severity::Medium,
        "high" => Severity::High,
        "critical" => Severity::Critical,
        _ => Severity::Info,
    }
}

/// Enqueues the next scanner stage job for `run_id`, carrying the run's
/// priority forward unchanged.
async fn enqueue_next(
    ctx: &Arc<OrchestratorContext>,
    job: &Job,
    run_id: RunId,
    next_scanner: &str,
) -> HandlerOutcome {
    let enqueued = ctx
        .jobs
        .enqueue(NewJob::now(
            job.target_id,
            Some(run_id),
            JobType::Scanner {
                name: next_scanner.to_string(),
            },
            serde_json::json!({}),
            job.priority,
        ))
        .await;
    match enqueued {
        Ok(_) => HandlerOutcome::Success,
        Err(err) => HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
    }
}

// ---------------------------------------------------------------------------
// Verification jobs (C9), triggered by the change detector
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct VerifyAssetPayload {
    asset_id: String,
}

#[derive(Deserialize)]
struct VerifyServicePayload {
    service_id: String,
}

pub struct VerifyAssetHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for VerifyAssetHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let payload: VerifyAssetPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => return HandlerOutcome::Fatal(format!("malformed verify_asset payload: {err}")),
        };
        let Ok(uuid) = payload.asset_id.parse() else {
            return HandlerOutcome::Fatal("malformed asset id".to_string());
        };
        let asset_id = reconwatch_core::domain::AssetId(uuid);
        let asset = match self.ctx.inventory.get_asset(asset_id).await {
            Ok(a) => a,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };

        let resolvers: Vec<Arc<dyn reconwatch_verify::DnsResolver>> = vec![
            Arc::new(SystemResolver::new(Duration::from_secs(5))),
            Arc::new(SystemResolver::new(Duration::from_secs(5))),
        ];
        let verdict = verify_asset(&asset.normalized_value, &resolvers).await;

        match verdict {
            AssetVerdict::Active => {
                if let Err(err) = self
                    .ctx
                    .inventory
                    .set_asset_status(asset_id, ArtifactStatus::Active, None, true)
                    .await
                {
                    return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}"));
                }
                HandlerOutcome::Success
            }
            AssetVerdict::Unresolved => {
                if let Err(err) = self
                    .ctx
                    .inventory
                    .set_asset_status(
                        asset_id,
                        ArtifactStatus::Unresolved,
                        Some("all resolvers returned NXDOMAIN".to_string()),
                        true,
                    )
                    .await
                {
                    return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}"));
                }
                if let Some(run_id) = job.run_id {
                    self.ctx
                        .events
                        .publish(
                            run_id,
                            RunEventKind::AssetStateChanged {
                                asset_id: asset_id.to_string(),
                                from: "stale".to_string(),
                                to: "unresolved".to_string(),
                            },
                        )
                        .await;
                }
                HandlerOutcome::Success
            }
            AssetVerdict::Inconclusive => {
                HandlerOutcome::Retryable("verification_inconclusive".to_string())
            }
        }
    }
}

pub struct VerifyServiceHandler {
    pub ctx: Arc<OrchestratorContext>,
}

#[async_trait]
impl JobHandler for VerifyServiceHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        let payload: VerifyServicePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => return HandlerOutcome::Fatal(format!("malformed verify_service payload: {err}")),
        };
        let Ok(uuid) = payload.service_id.parse() else {
            return HandlerOutcome::Fatal("malformed service id".to_string());
        };
        let service_id = reconwatch_core::domain::ServiceId(uuid);

        let services = match self.ctx.inventory.list_services(job.target_id).await {
            Ok(s) => s,
            Err(err) => return HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        };
        let Some(service) = services.into_iter().find(|s| s.id == service_id) else {
            return HandlerOutcome::Fatal("service not found".to_string());
        };
        let Ok(asset) = self.ctx.inventory.get_asset(service.asset_id).await else {
            return HandlerOutcome::Retryable("dependency_unreachable: asset lookup failed".to_string());
        };
        let Ok(ip) = asset.normalized_value.parse() else {
            return HandlerOutcome::Fatal("service's asset is not an ip".to_string());
        };

        let verdict = match service.proto {
            Proto::Tcp => verify_tcp_service(ip, service.port, Duration::from_secs(5)).await,
            Proto::Udp => verify_udp_service(ip, service.port, Duration::from_secs(5)).await,
        };

        let (status, reason) = match verdict {
            ServiceVerdict::Active => (ArtifactStatus::Active, None),
            ServiceVerdict::Closed => (ArtifactStatus::Closed, Some("port no longer reachable".to_string())),
        };
        match self
            .ctx
            .inventory
            .set_service_status(service_id, status, reason, true)
            .await
        {
            Ok(_) => HandlerOutcome::Success,
            Err(err) => HandlerOutcome::Retryable(format!("dependency_unreachable: {err}")),
        }
    }
}
