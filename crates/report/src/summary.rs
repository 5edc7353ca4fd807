use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::{Classification, Verdict};

/// The exit code of a run where every compared case matched.
pub const SUCCESS_EXIT_CODE: i32 = 0;
/// The exit code of a run with mismatches, or with flakes in strict mode.
pub const DIVERGENCE_EXIT_CODE: i32 = 1;

/// The aggregated result of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    pub total: usize,
    pub matched: usize,
    pub skipped: usize,
    pub flaked: usize,
    pub mismatched: usize,
    /// The mismatched verdicts in catalog order.
    pub mismatches: Vec<Verdict>,
    /// Every verdict in catalog order.
    pub cases: Vec<Verdict>,
}

/// Aggregates the verdicts into a summary. The verdicts may be given in any order, the summary
/// always lists them in catalog order.
pub fn summarize(verdicts: impl IntoIterator<Item = Verdict>) -> RunSummary {
    let mut cases = verdicts.into_iter().collect::<Vec<_>>();
    cases.sort_by_key(|verdict| verdict.case_idx);

    let count = |classification: Classification| {
        cases
            .iter()
            .filter(|verdict| verdict.classification == classification)
            .count()
    };

    RunSummary {
        catalog: None,
        total: cases.len(),
        matched: count(Classification::Match),
        skipped: count(Classification::Skipped),
        flaked: count(Classification::Flake),
        mismatched: count(Classification::Mismatch),
        mismatches: cases
            .iter()
            .filter(|verdict| verdict.classification == Classification::Mismatch)
            .cloned()
            .collect(),
        cases,
    }
}

/// The process exit code for the summary: non-zero iff there are mismatches or, in strict mode,
/// flakes.
pub fn exit_code(summary: &RunSummary, strict: bool) -> i32 {
    if summary.mismatched > 0 || (strict && summary.flaked > 0) {
        DIVERGENCE_EXIT_CODE
    } else {
        SUCCESS_EXIT_CODE
    }
}

impl RunSummary {
    pub fn with_catalog_name(mut self, name: Option<String>) -> Self {
        self.catalog = name;
        self
    }

    pub fn exit_code(&self, strict: bool) -> i32 {
        exit_code(self, strict)
    }

    /// Writes the summary as pretty JSON to the given path, replacing any existing file.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| {
            format!("Failed to open report file for writing: {}", path.display())
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to serialize report JSON to {}", path.display()))
    }
}
