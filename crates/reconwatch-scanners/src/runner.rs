//! Scanner execution with line streaming.
//!
//! "Spawn, stream redacted lines to the caller as they arrive, then wait",
//! since a scan's raw output needs to be both persisted incrementally
//! (`ScanStore::append_output`) and published on the event bus line-by-line
//! (`scan_line` events).

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::descriptor::ScannerDescriptor;
use crate::redact::redact_line;

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub exit_code: i32,
    pub duration_ms: u64,
    pub success: bool,
}

pub struct ScannerRunner;

impl ScannerRunner {
    /// Run `descriptor`'s command, calling `on_line` with each redacted
    /// stdout/stderr line as it's produced (interleaved, in arrival order).
    pub async fn execute<F>(descriptor: &ScannerDescriptor, mut on_line: F) -> anyhow::Result<ScanOutcome>
    where
        F: FnMut(&str),
    {
        let start = Instant::now();

        if descriptor.command.is_empty() {
            anyhow::bail!("scanner {} has empty command", descriptor.kind.name());
        }
        let exe = &descriptor.command[0];
        let args = &descriptor.command[1..];

        let mut child = Command::new(exe)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let tx_out = tx.clone();
        let out_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx_out.send(line);
            }
        });
        let err_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(line);
            }
        });

        let wait_result = async {
            if descriptor.timeout_secs > 0 {
                match tokio::time::timeout(Duration::from_secs(descriptor.timeout_secs), child.wait()).await {
                    Ok(status) => Ok(status?),
                    Err(_) => {
                        let _ = child.start_kill();
                        anyhow::bail!(
                            "scanner {} timed out after {}s",
                            descriptor.kind.name(),
                            descriptor.timeout_secs
                        )
                    }
                }
            } else {
                Ok(child.wait().await?)
            }
        };
        tokio::pin!(wait_result);

        let status = loop {
            tokio::select! {
                biased;
                Some(line) = rx.recv() => {
                    on_line(&redact_line(&line));
                }
                status = &mut wait_result => {
                    break status?;
                }
            }
        };

        let _ = out_task.await;
        let _ = err_task.await;
        while let Some(line) = rx.recv().await {
            on_line(&redact_line(&line));
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);

        Ok(ScanOutcome {
            exit_code,
            duration_ms,
            success: status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ScannerKind;

    #[tokio::test]
    async fn streams_lines_and_reports_success() {
        let descriptor = ScannerDescriptor {
            kind: ScannerKind::Subfinder,
            command: vec!["printf".to_string(), "a.example.com\\nb.example.com\\n".to_string()],
            timeout_secs: 10,
        };
        let mut lines = Vec::new();
        let outcome = ScannerRunner::execute(&descriptor, |line| lines.push(line.to_string()))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(lines, vec!["a.example.com", "b.example.com"]);
    }

    #[tokio::test]
    async fn reports_failure_exit_code() {
        let descriptor = ScannerDescriptor {
            kind: ScannerKind::Nmap,
            command: vec!["false".to_string()],
            timeout_secs: 10,
        };
        let outcome = ScannerRunner::execute(&descriptor, |_| {}).await.unwrap();
        assert!(!outcome.success);
        assert_ne!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn times_out_long_running_command() {
        let descriptor = ScannerDescriptor {
            kind: ScannerKind::Httpx,
            command: vec!["sleep".to_string(), "5".to_string()],
            timeout_secs: 1,
        };
        let result = ScannerRunner::execute(&descriptor, |_| {}).await;
        assert!(result.is_err());
    }
}
