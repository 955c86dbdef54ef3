use std::io::{self, Write};

use serde::Serialize;
use tracing::{debug, info};

use crate::app::{
    PrepareResult, ProgressEvent, ProgressSink, RecordReport, StatusResult, VerifyResult,
};
use crate::catalog::CatalogEntry;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_prepare(results: &[PrepareResult]) -> io::Result<()> {
        Self::print_json(&results)
    }

    pub fn print_records(report: &RecordReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_status(result: &StatusResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_verify(result: &VerifyResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_catalog(entries: &[CatalogEntry]) -> io::Result<()> {
        Self::print_json(&entries)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to `tracing`; phase changes at info, counters at debug.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.progress {
            Some(progress) => debug!(
                done = progress.done,
                total = progress.total,
                "{}",
                event.message
            ),
            None => info!("{}", event.message),
        }
    }
}
