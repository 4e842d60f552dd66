use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use citenorm_core::{IssnL, ReferenceDatabase, RunStats, StatusCode};
use citenorm_refdb::DatabaseInfo;
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print a warning line (progress bar safe when written through `pb.println`).
pub fn format_warning(pid: &str, message: &str, color: ColorMode) -> String {
    if color.enabled() {
        format!("{} {}: {}", "warning".yellow().bold(), pid.dimmed(), message)
    } else {
        format!("warning {pid}: {message}")
    }
}

/// Print the end-of-run summary.
pub fn print_summary(
    w: &mut dyn Write,
    stats: &RunStats,
    store: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "═══ Standardization summary ═══".bold())?;
    } else {
        writeln!(w, "=== Standardization summary ===")?;
    }
    writeln!(w, "Documents:              {}", stats.documents)?;
    writeln!(w, "Article citations:      {}", stats.citations)?;
    if color.enabled() {
        writeln!(w, "Standardized:           {}", stats.standardized.green().bold())?;
        writeln!(w, "Not normalized:         {}", stats.not_normalized.red())?;
    } else {
        writeln!(w, "Standardized:           {}", stats.standardized)?;
        writeln!(w, "Not normalized:         {}", stats.not_normalized)?;
    }
    writeln!(w, "  of which ambiguous:   {}", stats.ambiguous)?;
    writeln!(w, "Already standardized:   {}", stats.already_standardized)?;
    writeln!(w, "Empty titles:           {}", stats.empty_title)?;
    if stats.not_attempted > 0 {
        writeln!(w, "Not attempted:          {}", stats.not_attempted)?;
    }

    if !stats.by_status.is_empty() {
        writeln!(w)?;
        writeln!(w, "By status:")?;
        for (status, count) in &stats.by_status {
            let label = format!("{:>2} {}", status.code(), status.label());
            if color.enabled() && *status == StatusCode::NotNormalized {
                writeln!(w, "  {:<28} {}", label.dimmed(), count)?;
            } else {
                writeln!(w, "  {:<28} {}", label, count)?;
            }
        }
    }

    writeln!(w)?;
    writeln!(w, "Records written:        {} ({})", stats.records_written, store)?;
    if stats.write_failures > 0 {
        let msg = format!("{} document batch(es) could not be written", stats.write_failures);
        if color.enabled() {
            writeln!(w, "{}", msg.red().bold())?;
        } else {
            writeln!(w, "{msg}")?;
        }
    }
    if stats.cancelled {
        if color.enabled() {
            writeln!(w, "{}", "Run interrupted; remaining documents were not processed.".yellow())?;
        } else {
            writeln!(w, "Run interrupted; remaining documents were not processed.")?;
        }
    }
    Ok(())
}

/// Print table sizes of a loaded snapshot.
pub fn print_db_info(
    w: &mut dyn Write,
    path: &Path,
    info: &DatabaseInfo,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "Snapshot:".bold(), path.display())?;
    } else {
        writeln!(w, "Snapshot: {}", path.display())?;
    }
    writeln!(w, "  format version:          {}", info.format_version)?;
    writeln!(
        w,
        "  created:                 {}",
        info.created.as_deref().unwrap_or("unknown")
    )?;
    writeln!(w, "  titles:                  {}", info.titles)?;
    writeln!(w, "  ISSN-Ls:                 {}", info.issnls)?;
    writeln!(w, "  ISSNs:                   {}", info.issns)?;
    writeln!(w, "  year/volume keys:        {}", info.keys_default)?;
    writeln!(w, "  year/volume keys (lr):   {}", info.keys_lr)?;
    writeln!(w, "  year/volume keys (lr±1): {}", info.keys_lr_ml1)?;
    writeln!(w, "  volume equations:        {}", info.equations)?;
    Ok(())
}

/// Print the candidates found for one title by each matching mode.
pub fn print_match(
    w: &mut dyn Write,
    raw: &str,
    cleaned: &str,
    exact: &BTreeSet<IssnL>,
    fuzzy: &BTreeSet<IssnL>,
    db: &ReferenceDatabase,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Title:   {raw}")?;
    if color.enabled() {
        writeln!(w, "Cleaned: {}", cleaned.bold())?;
    } else {
        writeln!(w, "Cleaned: {cleaned}")?;
    }

    for (mode, set) in [("exact", exact), ("fuzzy", fuzzy)] {
        writeln!(w)?;
        writeln!(w, "{mode} candidates: {}", set.len())?;
        for issnl in set {
            let title = db
                .journal(issnl)
                .and_then(|j| j.main_title.first().cloned())
                .unwrap_or_default();
            if color.enabled() {
                writeln!(w, "  {}  {}", issnl.hyphenated().cyan(), title)?;
            } else {
                writeln!(w, "  {}  {}", issnl.hyphenated(), title)?;
            }
        }
    }
    Ok(())
}
