use crate::verbosity::Verbosity;
use anyhow::{Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand, builder::TypedValueParser};
use quotaflow_lib::QuotaConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString, VariantNames};

pub(crate) const QUOTAFLOW_CONFIG_FILE: &str = "quotaflow.toml";

/// Output format of the simulation report
#[derive(Debug, Default, Clone, Copy, Display, EnumString, VariantNames, PartialEq, Eq)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub(crate) enum ReportFormat {
    /// Single summary line
    Compact,
    /// Pretty-printed JSON object
    #[default]
    Json,
}

/// Plan, validate and simulate quota-limited fan-out workloads
#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct QuotaflowOptions {
    /// Configuration file to use
    ///
    /// Defaults to `quotaflow.toml` in the current directory if that file
    /// exists.
    #[arg(short, long = "config", global = true)]
    pub(crate) config_file: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) verbose: Verbosity,

    #[command(flatten)]
    pub(crate) overrides: LimitOverrides,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Check whether a batch fits the configured limits
    ///
    /// Exits with code 3 if the configuration is unsafe to run.
    Validate {
        /// Number of documents in the batch
        #[arg(long)]
        documents: usize,

        /// Average pages per document [default: 50]
        #[arg(long)]
        pages: Option<usize>,
    },

    /// Recommend concurrency settings for a batch
    Plan {
        /// Number of documents in the batch
        #[arg(long)]
        documents: usize,

        /// Average pages per document
        #[arg(long)]
        pages: usize,
    },

    /// Run a synthetic batch against a fake remote service
    Simulate {
        /// Number of documents in the batch
        #[arg(long)]
        documents: usize,

        /// Pages per document
        #[arg(long)]
        pages: usize,

        /// Latency of a single fake call
        #[arg(long, default_value = "50ms", value_parser = humantime::parse_duration)]
        latency: Duration,

        /// Estimated token cost of a single call
        /// [default: estimate for an average page]
        #[arg(long)]
        cost: Option<i64>,

        /// Let every n-th fake call fail with a retryable error
        #[arg(long)]
        fail_every: Option<u64>,

        /// Output format of the report
        #[arg(
            long,
            default_value_t = ReportFormat::default(),
            value_parser = PossibleValuesParser::new(ReportFormat::VARIANTS)
                .map(|s| s.parse::<ReportFormat>().unwrap_or_default()),
        )]
        format: ReportFormat,
    },
}

/// Limits given on the command line.
///
/// Each one takes precedence over the configuration file.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LimitOverrides {
    /// Maximum number of concurrent calls across all documents
    #[arg(long, global = true)]
    pub(crate) global_limit: Option<usize>,

    /// Maximum number of concurrent calls per document
    #[arg(long, global = true)]
    pub(crate) page_concurrency: Option<usize>,

    /// Maximum number of documents processed side by side
    #[arg(long, global = true)]
    pub(crate) max_parallel_documents: Option<usize>,

    /// Requests per minute allowed by the remote service
    #[arg(long, global = true)]
    pub(crate) rpm_limit: Option<u64>,

    /// Tokens per minute allowed by the remote service
    #[arg(long, global = true)]
    pub(crate) tpm_budget: Option<u64>,

    /// Requests per day allowed by the remote service
    #[arg(long, global = true)]
    pub(crate) rpd_limit: Option<u64>,

    /// Retries of a failed call
    #[arg(long, global = true)]
    pub(crate) max_retries: Option<u64>,

    /// Wait before the first retry of a failed call
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub(crate) retry_wait_time: Option<Duration>,
}

impl LimitOverrides {
    /// Apply all given limits on top of `config`
    pub(crate) fn merge_into(&self, config: &mut QuotaConfig) {
        macro_rules! fold_in {
            ( $cli:ident, $config:ident; $( $field:ident ),* $(,)? ) => {
                $(
                    if let Some(value) = $cli.$field {
                        $config.$field = value;
                    }
                )*
            };
        }

        fold_in!(
            self, config;
            global_limit,
            page_concurrency,
            max_parallel_documents,
            rpm_limit,
            tpm_budget,
            rpd_limit,
            max_retries,
            retry_wait_time,
        );
    }
}

impl QuotaflowOptions {
    /// Build the effective configuration.
    ///
    /// Starts from the configuration file, or from the defaults if there is
    /// none, and applies the command-line limits on top.
    pub(crate) fn config(&self) -> Result<QuotaConfig> {
        let mut config = match &self.config_file {
            Some(path) => load(path)?,
            None => {
                let default_config = Path::new(QUOTAFLOW_CONFIG_FILE);
                if default_config.is_file() {
                    load(default_config)?
                } else {
                    QuotaConfig::default()
                }
            }
        };
        self.overrides.merge_into(&mut config);
        Ok(config)
    }
}

fn load(path: &Path) -> Result<QuotaConfig> {
    QuotaConfig::load_from_file(path)
        .with_context(|| format!("Cannot load configuration file `{}`", path.display()))
}
