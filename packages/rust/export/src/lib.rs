//! CSV export of ranked jobs.
//!
//! Rows are written in the order given; this crate never reorders, filters
//! or rescores. Quoting follows RFC 4180: fields containing a comma, quote,
//! CR or LF are wrapped in double quotes with inner quotes doubled.

use std::path::Path;

use chrono::SecondsFormat;
use tracing::{info, instrument};

use jobpulse_shared::{Job, JobPulseError, Result};

/// Column order of every export.
pub const CSV_HEADERS: [&str; 9] = [
    "PostedAt", "Score", "Title", "Company", "Location", "Remote", "Source", "URL", "Tags",
];

const LINE_END: &str = "\r\n";

/// Render `jobs` as CSV, header first. An empty slice yields the header only.
pub fn to_csv(jobs: &[Job]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADERS.iter().copied());

    for job in jobs {
        let posted_at = job
            .posted_at
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let score = job.score.to_string();
        let tags = job.tags.join(", ");

        push_row(
            &mut out,
            [
                posted_at.as_str(),
                score.as_str(),
                job.title.as_str(),
                job.company.as_str(),
                job.location.as_deref().unwrap_or(""),
                if job.remote { "Yes" } else { "No" },
                job.source.as_str(),
                job.url.as_deref().unwrap_or(""),
                tags.as_str(),
            ],
        );
    }
    out
}

/// Write `jobs` to `path`, replacing any existing file.
///
/// The content goes to a sibling temp file first and is renamed into place,
/// so a failed write never leaves a truncated export behind.
#[instrument(skip_all, fields(path = %path.display(), jobs = jobs.len()))]
pub fn write_csv(path: &Path, jobs: &[Job]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| JobPulseError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| JobPulseError::Export(format!("not a file path: {}", path.display())))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".tmp");
    let temp = path.with_file_name(temp_name);

    std::fs::write(&temp, to_csv(jobs)).map_err(|e| JobPulseError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| JobPulseError::io(path, e))?;

    info!("csv written");
    Ok(())
}

fn push_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str(LINE_END);
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
