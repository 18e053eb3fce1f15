use crate::output::print_json;
use anyhow::Context;
use folio_core::config::OrchestratorConfig;
use folio_core::types::BracketStyle;
use std::path::Path;

pub fn run(
    file: &Path,
    title: &str,
    publisher: &str,
    credit: &str,
    email: &str,
    bracket: BracketStyle,
    json: bool,
) -> anyhow::Result<()> {
    let config = OrchestratorConfig::template(title, publisher, credit, email, bracket);
    config
        .create(file)
        .with_context(|| format!("could not generate {}", file.display()))?;

    if json {
        print_json(&serde_json::json!({
            "created": file,
            "actions": config.action_names(),
        }))?;
    } else {
        println!("Created {}", file.display());
        println!("Edit the volumes and actions, then run: folio validate {}", file.display());
    }
    Ok(())
}
