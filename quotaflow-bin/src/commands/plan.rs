use anyhow::{Context, Result};
use quotaflow_lib::QuotaConfig;
use quotaflow_lib::validate::recommend_plan;

/// Print the recommended settings for a batch as JSON
pub(crate) fn plan(config: &QuotaConfig, documents: usize, pages: usize) -> Result<()> {
    let plan = recommend_plan(documents, pages, config.rpm_limit);
    let json = serde_json::to_string_pretty(&plan).context("Cannot format plan as JSON")?;
    println!("{json}");
    Ok(())
}
