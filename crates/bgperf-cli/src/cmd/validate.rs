use std::path::Path;

use anyhow::{bail, Context, Result};
use bgperf_core::script::Script;
use serde::Serialize;

use crate::output::{print_json, print_table};

#[derive(Debug, Serialize)]
struct EntryReport {
    index: usize,
    action: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Decode every entry of a script (or of a scenario's embedded script) and
/// report the result. Fails if any entry would abort a run.
pub fn run(path: &Path, json: bool) -> Result<()> {
    let script =
        Script::load(path).with_context(|| format!("failed to load {}", path.display()))?;

    let reports: Vec<EntryReport> = script
        .decode_all()
        .into_iter()
        .enumerate()
        .map(|(index, (action, spec))| EntryReport {
            index,
            action,
            ok: spec.is_ok(),
            error: spec.err().map(|e| e.to_string()),
        })
        .collect();

    if json {
        print_json(&reports)?;
    } else if reports.is_empty() {
        println!("{}: script is empty", path.display());
    } else {
        let rows: Vec<Vec<String>> = reports
            .iter()
            .map(|r| {
                vec![
                    r.index.to_string(),
                    r.action.clone(),
                    r.error.clone().unwrap_or_else(|| "ok".to_string()),
                ]
            })
            .collect();
        print_table(&["#", "ACTION", "STATUS"], &rows);
    }

    if let Some(bad) = reports.iter().find(|r| !r.ok) {
        bail!(
            "{}",
            bad.error.as_deref().unwrap_or("invalid script entry")
        );
    }
    Ok(())
}
