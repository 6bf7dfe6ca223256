//! Recorded fix logs for offline replay.
//!
//! Two layouts are accepted, optionally gzip-compressed (`.gz`):
//! a JSON document `{ "fixes": [ ... ] }` or JSON Lines with one fix per line.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::Context;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::types::RawFix;

/// One fix as delivered by the ranging collaborator, with its receive time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedFix {
    /// Receive time [s]
    pub timestamp: f64,
    pub position: [f64; 3],
    #[serde(default)]
    pub acceleration: [f64; 3],
    #[serde(default)]
    pub quality_factor: u8,
}

impl RecordedFix {
    pub fn raw(&self) -> RawFix {
        RawFix::new(self.position, self.acceleration)
    }
}

#[derive(Debug, Deserialize)]
struct FixLog {
    fixes: Vec<RecordedFix>,
}

/// Load a fix log, sorted by timestamp.
pub fn load_fixes(path: &Path) -> anyhow::Result<Vec<RecordedFix>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut contents = String::new();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        GzDecoder::new(file).read_to_string(&mut contents)?;
    } else {
        BufReader::new(file).read_to_string(&mut contents)?;
    }
    parse_fixes(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// Parse either layout from an in-memory string.
pub fn parse_fixes(contents: &str) -> anyhow::Result<Vec<RecordedFix>> {
    let mut fixes = if contents.trim_start().starts_with('{') && is_document(contents) {
        serde_json::from_str::<FixLog>(contents)?.fixes
    } else {
        parse_lines(contents.as_bytes())?
    };
    fixes.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(fixes)
}

/// Predict-only steps needed to bridge `gap` seconds at step `dt`, leaving
/// the last step to the tick of the fix that ends the gap.
pub fn gap_steps(gap: f64, dt: f64) -> u64 {
    if !gap.is_finite() || !dt.is_finite() || gap <= 0.0 || dt <= 0.0 {
        return 0;
    }
    // Decimal timestamps divide to just off the integer (0.6 / 0.1 < 6)
    ((gap / dt).round() as u64).saturating_sub(1)
}

fn is_document(contents: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(contents)
        .map(|v| v.get("fixes").is_some())
        .unwrap_or(false)
}

fn parse_lines(reader: impl BufRead) -> anyhow::Result<Vec<RecordedFix>> {
    let mut fixes = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fix: RecordedFix =
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        fixes.push(fix);
    }
    Ok(fixes)
}
