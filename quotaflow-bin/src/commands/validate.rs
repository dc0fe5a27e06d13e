use log::error;
use quotaflow_lib::QuotaConfig;
use quotaflow_lib::validate::{safe_concurrency, validate_config};

use crate::ExitCode;

/// Check a batch of `documents` documents against `config` and print the
/// findings
pub(crate) fn validate(config: &QuotaConfig, documents: usize, pages: Option<usize>) -> ExitCode {
    let proposed = config.proposed(documents, pages);
    let validation = validate_config(&proposed);

    for warning in &validation.warnings {
        println!("warning: {warning}");
    }

    let (page_concurrency, _) = safe_concurrency(
        proposed.page_concurrency,
        proposed.document_count,
        proposed.rpm_limit,
        proposed.global_limit,
    );
    if page_concurrency < proposed.page_concurrency {
        println!("Suggested page concurrency: {page_concurrency}");
    }

    match validation.into_result() {
        Ok(_) => {
            println!("Configuration is valid");
            ExitCode::Success
        }
        Err(e) => {
            error!("{e}");
            ExitCode::ConfigFile
        }
    }
}
