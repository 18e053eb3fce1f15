use crate::output::{print_json, print_summary, print_table};
use anyhow::{bail, Context};
use folio_core::config::{ConfigIssue, OrchestratorConfig, WarnLevel};
use folio_core::driver::{config_root, Driver, RunOptions};
use folio_core::tools::SystemResolver;
use std::path::Path;

pub fn run(file: &Path, simulate: bool, json: bool) -> anyhow::Result<()> {
    let config = OrchestratorConfig::read(file)
        .with_context(|| format!("could not read {}", file.display()))?;
    let issues = config.validate();
    let errors = issues.iter().filter(|i| i.is_error()).count();

    let simulation = if simulate && errors == 0 {
        let driver = Driver::new(config, config_root(file));
        let opts = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        Some(driver.run(&SystemResolver::new(), &opts)?)
    } else {
        None
    };

    if json {
        print_json(&serde_json::json!({
            "valid": errors == 0,
            "issues": issues,
            "simulation": simulation,
        }))?;
    } else {
        print_issues(&issues);
        if let Some(summary) = &simulation {
            println!();
            print_summary(summary, false)?;
        }
    }

    if errors > 0 {
        bail!("{} has {errors} configuration error(s)", file.display());
    }
    if !json {
        println!("{} is valid", file.display());
    }
    Ok(())
}

fn print_issues(issues: &[ConfigIssue]) {
    if issues.is_empty() {
        return;
    }
    let rows = issues
        .iter()
        .map(|i| {
            let level = match i.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            vec![level.to_string(), i.field.clone(), i.message.clone()]
        })
        .collect();
    print_table(&["LEVEL", "FIELD", "MESSAGE"], rows);
}
