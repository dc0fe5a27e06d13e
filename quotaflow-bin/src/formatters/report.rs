use anyhow::{Context, Result};
use std::time::Duration;

use crate::commands::simulate::SimulationReport;
use crate::options::ReportFormat;

pub(crate) trait ReportFormatter {
    /// Format the outcome of a simulation for stdout
    fn format(&self, report: &SimulationReport) -> Result<String>;
}

pub(crate) struct Compact;

impl ReportFormatter for Compact {
    fn format(&self, report: &SimulationReport) -> Result<String> {
        let elapsed = Duration::from_millis(u64::try_from(report.elapsed_ms).unwrap_or(u64::MAX));
        Ok(format!(
            "{}/{} pages done, {} failed, in {}: {}",
            report.completed_pages,
            report.documents * report.pages_per_document,
            report.failed_pages,
            humantime::format_duration(elapsed),
            report.stats.summary()
        ))
    }
}

pub(crate) struct Json;

impl ReportFormatter for Json {
    /// Format the report as JSON object
    fn format(&self, report: &SimulationReport) -> Result<String> {
        serde_json::to_string_pretty(report).context("Cannot format report as JSON")
    }
}

pub(crate) fn get_report_formatter(format: ReportFormat) -> Box<dyn ReportFormatter> {
    match format {
        ReportFormat::Compact => Box::new(Compact),
        ReportFormat::Json => Box::new(Json),
    }
}
