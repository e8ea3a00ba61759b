//! Panic reporting
//!
//! A panic inside a worker is logged through tracing and appended to
//! `crash.log` in the log directory, with a short colored notice on stderr.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::error;

pub const CRASH_LOG_FILE: &str = "crash.log";

/// 一次 panic 的完整记录
struct CrashReport {
    at: DateTime<Utc>,
    message: String,
    location: String,
    thread: String,
    backtrace: String,
}

impl CrashReport {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown>".to_string());

        Self {
            at: Utc::now(),
            message,
            location,
            thread: std::thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_string(),
            backtrace: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }

    fn append_to(&self, log_dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(CRASH_LOG_FILE);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", self)?;
        Ok(path)
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- panic at {} ----", self.at.to_rfc3339())?;
        writeln!(f, "thread:   {}", self.thread)?;
        writeln!(f, "location: {}", self.location)?;
        writeln!(f, "message:  {}", self.message)?;
        writeln!(f, "backtrace:")?;
        write!(f, "{}", self.backtrace)
    }
}

/// Install the process-wide panic hook
pub fn install_panic_hook(log_dir: PathBuf) {
    panic::set_hook(Box::new(move |info| {
        let report = CrashReport::capture(info);
        error!(
            "Panic in thread '{}' at {}: {}",
            report.thread, report.location, report.message
        );

        let saved = report.append_to(&log_dir);
        notify(&report, saved.as_deref().ok());
        if let Err(e) = saved {
            eprintln!("Failed to write crash report: {}", e);
        }
    }));
}

fn notify(report: &CrashReport, saved_to: Option<&Path>) {
    use colored::Colorize;

    eprintln!();
    eprintln!("{} {}", "PANIC".red().bold(), report.message.white());
    eprintln!("{} {}", "at".yellow().bold(), report.location);
    if let Some(path) = saved_to {
        eprintln!("{}", format!("Crash report appended to {}", path.display()).cyan());
    }
    eprintln!();
}
