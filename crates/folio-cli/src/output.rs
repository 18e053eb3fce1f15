use folio_core::driver::{RunSummary, VolumeStatus};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{cell:w$}")
            })
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    line(headers.iter().map(|h| h.to_string()).collect());
    line(widths.iter().map(|&w| "-".repeat(w)).collect());
    for row in rows {
        line(row);
    }
}

fn status_label(status: &VolumeStatus) -> String {
    match status {
        VolumeStatus::NotStarted => "not started".to_string(),
        VolumeStatus::Running { index } => format!("running #{index}"),
        VolumeStatus::Completed => "completed".to_string(),
        VolumeStatus::Failed { action: Some(a), .. } => format!("failed at {a}"),
        VolumeStatus::Failed { action: None, .. } => "failed".to_string(),
        VolumeStatus::Halted { action } => format!("halted at {action}"),
    }
}

/// Per-volume, per-action counts as a table, or the whole summary as JSON.
pub fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(summary);
    }

    let mut rows = Vec::new();
    for volume in &summary.volumes {
        let status = status_label(&volume.status);
        if volume.actions.is_empty() {
            rows.push(vec![volume.number.to_string(), status.clone(), "-".into()]);
        }
        for (i, action) in volume.actions.iter().enumerate() {
            let mut row = vec![
                if i == 0 { volume.number.to_string() } else { String::new() },
                if i == 0 { status.clone() } else { String::new() },
                action.name.clone(),
            ];
            match &action.report {
                Some(r) => row.extend(
                    [r.processed, r.copied, r.moved, r.ignored, r.already_done, r.failed]
                        .iter()
                        .map(usize::to_string),
                ),
                None => row.push("skipped".into()),
            }
            rows.push(row);
        }
    }
    print_table(
        &["VOLUME", "STATUS", "ACTION", "PROCESSED", "COPIED", "MOVED", "IGNORED", "DONE", "FAILED"],
        rows,
    );

    for volume in &summary.volumes {
        if let VolumeStatus::Failed { error, .. } = &volume.status {
            println!("volume {}: {error}", volume.number);
        }
    }
    if summary.dry_run {
        println!("(dry run, nothing was written)");
    }
    Ok(())
}
