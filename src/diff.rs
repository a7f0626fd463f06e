//! Content Diffing
//!
//! Binary-content detection and the two diff renderings the conflict
//! resolver can show: a summary table for binary files and a line diff for
//! text.

use chrono::{DateTime, Local};
use comfy_table::Table;
use std::io::Read;
use std::path::Path;

/// How many leading bytes each side contributes to binary classification.
const HEADER_LEN: usize = 512;

/// Heuristic binary classifier over a leading chunk of content.
///
/// A NUL byte is decisive; otherwise a high share of control bytes outside
/// the usual whitespace set marks the content binary.
pub fn looks_binary(header: &[u8]) -> bool {
    if header.is_empty() {
        return false;
    }
    if header.contains(&0) {
        return true;
    }
    let suspicious = header
        .iter()
        .filter(|&&b| b < 0x09 || (b > 0x0d && b < 0x20) || b == 0x7f)
        .count();
    suspicious * 10 > header.len()
}

/// Whether either side of a pending write should be treated as binary.
///
/// Reads the leading bytes of the existing file and inspects the head of the
/// proposed contents.
pub fn is_binary(existing_path: &Path, proposed: &[u8]) -> std::io::Result<bool> {
    let mut header = vec![0u8; HEADER_LEN];
    let mut file = std::fs::File::open(existing_path)?;
    let read = file.read(&mut header)?;
    header.truncate(read);

    let proposed_head = &proposed[..proposed.len().min(HEADER_LEN)];
    Ok(looks_binary(&header) || looks_binary(proposed_head))
}

/// Render a size/mtime summary table comparing the existing file with the
/// proposed replacement. Used instead of a textual diff when either side is
/// binary.
pub fn binary_summary(existing_path: &Path, proposed: &[u8]) -> std::io::Result<String> {
    let stat = std::fs::metadata(existing_path)?;

    let existing_size = stat.len();
    let proposed_size = proposed.len() as u64;
    let sign = if existing_size > proposed_size { "-" } else { "+" };
    let delta = existing_size.abs_diff(proposed_size);

    let modified = stat
        .modified()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();

    let mut table = Table::new();
    table.set_header(vec!["", "Existing", "Replacement", "Diff"]);
    table.add_row(vec![
        "Size".to_string(),
        format_size(existing_size),
        format_size(proposed_size),
        format!("{sign}{}", format_size(delta)),
    ]);
    table.add_row(vec!["Last modified".to_string(), modified, String::new(), String::new()]);

    Ok(table.to_string())
}

/// Human-readable decimal size, e.g. `1.35 kB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Line-based diff between the old and new contents.
///
/// Lines removed from `old` are prefixed `-`, lines added in `new` are
/// prefixed `+`, common lines keep a two-space margin. The alignment comes
/// from a longest-common-subsequence walk over whole lines.
pub fn text_diff(old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    // LCS length table.
    let mut lcs = vec![vec![0usize; new_lines.len() + 1]; old_lines.len() + 1];
    for i in (0..old_lines.len()).rev() {
        for j in (0..new_lines.len()).rev() {
            lcs[i][j] = if old_lines[i] == new_lines[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::new();
    let (mut i, mut j) = (0, 0);
    while i < old_lines.len() && j < new_lines.len() {
        if old_lines[i] == new_lines[j] {
            out.push_str("  ");
            out.push_str(old_lines[i]);
            out.push('\n');
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push_str("- ");
            out.push_str(old_lines[i]);
            out.push('\n');
            i += 1;
        } else {
            out.push_str("+ ");
            out.push_str(new_lines[j]);
            out.push('\n');
            j += 1;
        }
    }
    for line in &old_lines[i..] {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    for line in &new_lines[j..] {
        out.push_str("+ ");
        out.push_str(line);
        out.push('\n');
    }
    out
}
