#[cfg(test)]
mod cli {
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::PredicateBooleanExt;
    use predicates::str::contains;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::error::Error;
    use std::io::Write;
    use tempfile::NamedTempFile;

    type Result<T> = std::result::Result<T, Box<dyn Error>>;

    fn config_file(contents: &str) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        write!(file, "{contents}")?;
        Ok(file)
    }

    #[test]
    fn test_validate_oversubscribed_batch_is_ok() {
        cargo_bin_cmd!("quotaflow")
            .args(["validate", "--documents", "10"])
            .assert()
            .success()
            .stdout(contains(
                "warning: Theoretical maximum concurrency (500) exceeds the global limit (200)",
            ))
            .stdout(contains("Suggested page concurrency: 7"))
            .stdout(contains("Configuration is valid"));
    }

    #[test]
    fn test_validate_daily_budget_exceeded() {
        cargo_bin_cmd!("quotaflow")
            .args(["--rpd-limit", "100", "validate", "--documents", "5", "--pages", "20"])
            .assert()
            .failure()
            .code(3)
            .stdout(contains("close to the daily limit (100)"));
    }

    #[test]
    fn test_validate_reads_config_file() -> Result<()> {
        let config = config_file("page_concurrency = 10\n")?;

        cargo_bin_cmd!("quotaflow")
            .arg("--config")
            .arg(config.path())
            .args(["validate", "--documents", "4"])
            .assert()
            .success()
            .stdout(contains("warning").not());

        Ok(())
    }

    #[test]
    fn test_invalid_config_file() -> Result<()> {
        let config = config_file("unknown_key = 1\n")?;

        cargo_bin_cmd!("quotaflow")
            .arg("--config")
            .arg(config.path())
            .args(["plan", "--documents", "1", "--pages", "1"])
            .assert()
            .failure()
            .code(3)
            .stderr(contains("Error while loading config"));

        Ok(())
    }

    #[test]
    fn test_plan_prints_json() -> Result<()> {
        let output = cargo_bin_cmd!("quotaflow")
            .args(["plan", "--documents", "10", "--pages", "100"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let plan: Value = serde_json::from_slice(&output)?;
        assert_eq!(plan["workload"], "large");
        assert_eq!(plan["per_document_limit"], 20);
        assert_eq!(plan["max_parallel_documents"], 2);
        assert_eq!(plan["global_limit"], 40);

        Ok(())
    }

    #[test]
    fn test_simulate_reports_stats() -> Result<()> {
        let output = cargo_bin_cmd!("quotaflow")
            .args([
                "--global-limit",
                "3",
                "simulate",
                "--documents",
                "4",
                "--pages",
                "5",
                "--latency",
                "1ms",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let report: Value = serde_json::from_slice(&output)?;
        assert_eq!(report["completed_pages"], 20);
        assert_eq!(report["stats"]["total_requests"], 20);
        assert_eq!(report["stats"]["current_requests"], 0);
        assert!(report["stats"]["peak_requests"].as_u64().unwrap() <= 3);

        Ok(())
    }

    #[test]
    fn test_simulate_compact() {
        cargo_bin_cmd!("quotaflow")
            .args([
                "simulate",
                "--documents",
                "1",
                "--pages",
                "2",
                "--latency",
                "1ms",
                "--format",
                "compact",
            ])
            .assert()
            .success()
            .stdout(contains("2/2 pages done, 0 failed"))
            .stdout(contains("2 requests (0 in flight, peak"));
    }

    #[test]
    fn test_simulate_rejects_zero_limit() {
        cargo_bin_cmd!("quotaflow")
            .args([
                "--page-concurrency",
                "0",
                "simulate",
                "--documents",
                "1",
                "--pages",
                "1",
            ])
            .assert()
            .failure()
            .code(3);
    }
}
