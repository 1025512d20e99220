//! Best-effort accelerator diagnostics for the health endpoint.
//!
//! The memory figures reported here are informational, not contractual: the
//! probe shells out to `nvidia-smi` and treats any hiccup — no binary, no
//! device, unparseable output — as "no accelerator available". Nothing in
//! the request path depends on this module.

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

/// Snapshot of accelerator availability and memory, in MiB.
#[derive(Debug, Clone, Serialize)]
pub struct GpuStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_mib: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_mib: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_mib: Option<u64>,
}

impl GpuStatus {
    fn unavailable() -> Self {
        Self {
            available: false,
            total_mib: None,
            used_mib: None,
            free_mib: None,
        }
    }
}

/// Query the first accelerator's memory figures.
pub async fn probe() -> GpuStatus {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=memory.total,memory.used,memory.free",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            parse_memory_line(stdout.lines().next().unwrap_or("")).unwrap_or_else(|| {
                debug!("unexpected nvidia-smi output: {stdout}");
                GpuStatus::unavailable()
            })
        }
        Ok(out) => {
            debug!(code = ?out.status.code(), "nvidia-smi exited nonzero");
            GpuStatus::unavailable()
        }
        Err(e) => {
            debug!("nvidia-smi not runnable: {e}");
            GpuStatus::unavailable()
        }
    }
}

fn parse_memory_line(line: &str) -> Option<GpuStatus> {
    let mut fields = line.split(',').map(|f| f.trim().parse::<u64>().ok());
    let total = fields.next()??;
    let used = fields.next()??;
    let free = fields.next()??;
    Some(GpuStatus {
        available: true,
        total_mib: Some(total),
        used_mib: Some(used),
        free_mib: Some(free),
    })
}
