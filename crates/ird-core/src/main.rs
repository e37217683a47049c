//! incidentd — incident report collection and privacy-redaction daemon.

use clap::Parser;
use ird_broadcast::{BroadcastOutcome, ConsentAuthority, CrashReportSink, PendingApproval};
use ird_common::{ReportId, ReportIdentity};
use ird_core::config::DaemonConfig;
use ird_core::logging::{init_logging, LogConfig, LogFormat};
use ird_core::sections::default_sections;
use ird_core::service::{IncidentService, ReportRequestSpec};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "incidentd", about = "Incident report collection and redaction daemon")]
struct Cli {
    /// Path to the daemon configuration file (JSON).
    #[arg(long, env = "IRD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured work directory.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Collect one local report, queue it for the outbox, and exit.
    #[arg(long)]
    once: bool,

    /// Log output format: human or jsonl.
    #[arg(long)]
    log_format: Option<String>,
}

/// Consent front door for deployments without an interactive authority:
/// requests are logged and wait for an operator decision over the control
/// surface; nothing is auto-approved.
struct LogOnlyAuthority {
    next_handle: AtomicU64,
}

impl ConsentAuthority for LogOnlyAuthority {
    fn request_approval(
        &self,
        identity: &ReportIdentity,
        uri: &str,
    ) -> ird_broadcast::Result<PendingApproval> {
        info!(identity = %identity, %uri, "consent pending operator decision");
        Ok(PendingApproval(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    fn notify_ready(&self, identity: &ReportIdentity) -> ird_broadcast::Result<()> {
        info!(identity = %identity, "report ready for pickup");
        Ok(())
    }
}

/// Local diagnostics sink: finished reports land as files in an outbox
/// directory next to the work directory.
struct OutboxSink {
    dir: PathBuf,
}

impl CrashReportSink for OutboxSink {
    fn deliver(&self, identity: &ReportIdentity, data: &[u8]) -> ird_broadcast::Result<()> {
        let path = self.dir.join(format!(
            "{}-{}.bin",
            identity.package, identity.report_id
        ));
        std::fs::write(&path, data)
            .map_err(|e| ird_broadcast::BroadcastError::Sink(e.to_string()))?;
        info!(path = %path.display(), bytes = data.len(), "report written to outbox");
        Ok(())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = cli.log_format.as_deref().and_then(LogFormat::parse_str);
    init_logging(&LogConfig::from_env(format));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "incidentd failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ird_core::Result<()> {
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }
    config.validate()?;

    let outbox = config
        .work_dir
        .parent()
        .map(|p| p.join("outbox"))
        .unwrap_or_else(|| PathBuf::from("outbox"));
    std::fs::create_dir_all(&outbox)?;

    let tick_interval = Duration::from_millis(config.tick_interval_ms);
    let service = IncidentService::new(
        config,
        default_sections(),
        Box::new(LogOnlyAuthority {
            next_handle: AtomicU64::new(1),
        }),
        Box::new(OutboxSink { dir: outbox }),
    )?;

    info!(
        started_at = %chrono::Utc::now().to_rfc3339(),
        "incidentd starting"
    );

    if cli.once {
        let identity = ReportIdentity::new(ReportId::new(), "shell", "cli");
        let timestamp_ns = service.run_report(&[ReportRequestSpec::local(identity)], None)?;
        service.broadcast_round();
        println!("{}", timestamp_ns);
        service.shutdown();
        return Ok(());
    }

    info!("incidentd entering daemon loop");
    loop {
        let delay = match service.tick() {
            BroadcastOutcome::Repeat => Duration::ZERO,
            BroadcastOutcome::Finished => tick_interval,
            BroadcastOutcome::Backoff => tick_interval * 2,
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}
