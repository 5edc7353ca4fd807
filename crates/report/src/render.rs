//! Rendering of the run summary in the supported output formats.

use std::{collections::BTreeMap, fmt::Write as _};

use ansi_term::{ANSIString, Color};
use anyhow::{Context as _, Result};
use rpc_dt_common::types::NodeRole;
use rpc_dt_config::{OutputFormat, ReportConfiguration};
use rpc_dt_node_interaction::{CallOutcome, CallResponse};
use tabled::{builder::Builder, settings::Style};

use crate::{Classification, RunSummary, SUCCESS_EXIT_CODE, Verdict};

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_REQUEST: i64 = -32600;
const INVALID_PARAMS: i64 = -32602;

/// Renders the summary in the configured format. Every format lists each mismatch with its method,
/// its parameters and both responses.
pub fn render(summary: &RunSummary, configuration: &ReportConfiguration) -> Result<String> {
    match configuration.output_format {
        OutputFormat::Human => Ok(render_human(summary, configuration.strict)),
        OutputFormat::Markdown => Ok(render_markdown(summary)),
        OutputFormat::Json => {
            serde_json::to_string_pretty(summary).context("Failed to serialize the run summary")
        }
    }
}

/// The one line status of a verdict as shown by the cargo-test-like output.
pub fn status_line(verdict: &Verdict) -> String {
    format!(
        "test case #{} {} ... {}",
        verdict.case_idx,
        verdict.method(),
        status(verdict)
    )
}

fn status(verdict: &Verdict) -> ANSIString<'static> {
    let diagnostic = verdict.diagnostic.as_deref().unwrap_or_default().trim();
    match verdict.classification {
        Classification::Match => Color::Green.paint("ok"),
        Classification::Skipped => Color::Yellow.paint(format!("skipped, {diagnostic}")),
        Classification::Flake => Color::Purple.paint(format!("FLAKE, {diagnostic}")),
        Classification::Mismatch => Color::Red.paint("MISMATCH"),
    }
}

fn render_human(summary: &RunSummary, strict: bool) -> String {
    let mut buf = String::new();

    let _ = writeln!(buf, "running {} cases", summary.total);
    for verdict in summary.cases.iter() {
        let _ = writeln!(buf, "{}", status_line(verdict));
    }
    let _ = writeln!(buf);

    if !summary.mismatches.is_empty() {
        let _ = writeln!(buf, "mismatches:");
        for verdict in summary.mismatches.iter() {
            let _ = writeln!(buf);
            write_mismatch_details(&mut buf, verdict);
        }
        let _ = writeln!(buf);
    }

    let result = if summary.exit_code(strict) != SUCCESS_EXIT_CODE {
        Color::Red.paint("FAILED")
    } else {
        Color::Green.paint("ok")
    };
    let _ = writeln!(
        buf,
        "test result: {}. {} matched; {} mismatched; {} flaked; {} skipped",
        result, summary.matched, summary.mismatched, summary.flaked, summary.skipped
    );
    buf
}

fn write_mismatch_details(buf: &mut String, verdict: &Verdict) {
    let _ = writeln!(
        buf,
        "---- case #{} {} ----",
        verdict.case_idx,
        verdict.method()
    );
    let _ = writeln!(buf, "policy: {}", verdict.case.policy);
    let _ = writeln!(
        buf,
        "params: {}",
        serde_json::Value::Array(verdict.case.params.clone())
    );
    if let Some(diagnostic) = verdict.diagnostic.as_deref() {
        let _ = writeln!(buf, "divergence: {diagnostic}");
    }
    for (role, outcome) in [
        (NodeRole::Reference, verdict.reference.as_ref()),
        (NodeRole::Candidate, verdict.candidate.as_ref()),
    ] {
        match outcome {
            Some(outcome) => {
                let _ = writeln!(
                    buf,
                    "{role} ({} attempt{}):",
                    outcome.attempts,
                    if outcome.attempts == 1 { "" } else { "s" }
                );
                let _ = writeln!(buf, "{}", verbatim(&outcome.response));
            }
            None => {
                let _ = writeln!(buf, "{role}: not dispatched");
            }
        }
    }
}

fn verbatim(response: &CallResponse) -> String {
    match response {
        CallResponse::Success(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        CallResponse::ApplicationError(error) => serde_json::to_string_pretty(error)
            .unwrap_or_else(|_| error.to_string()),
        CallResponse::TransportError(description) => format!("transport error: {description}"),
    }
}

fn render_markdown(summary: &RunSummary) -> String {
    let mut rows = BTreeMap::<(&str, &'static str, &'static str), usize>::new();
    for verdict in summary.cases.iter() {
        let key = (
            verdict.method(),
            endpoint_status(verdict, verdict.reference.as_ref()),
            endpoint_status(verdict, verdict.candidate.as_ref()),
        );
        *rows.entry(key).or_default() += 1;
    }

    let mut builder = Builder::default();
    builder.push_record(["RPC Method", "Reference", "Candidate"]);
    for ((method, reference, candidate), count) in rows {
        builder.push_record([
            if count > 1 {
                format!("{method} ({count})")
            } else {
                method.to_string()
            },
            reference.to_string(),
            candidate.to_string(),
        ]);
    }

    let mut buf = builder.build().with(Style::markdown()).to_string();
    let _ = writeln!(buf);

    for verdict in summary.mismatches.iter() {
        let _ = writeln!(buf);
        let _ = writeln!(buf, "```");
        write_mismatch_details(&mut buf, verdict);
        let _ = writeln!(buf, "```");
    }

    let _ = writeln!(buf);
    let _ = writeln!(
        buf,
        "{} cases: {} matched, {} mismatched, {} flaked, {} skipped",
        summary.total, summary.matched, summary.mismatched, summary.flaked, summary.skipped
    );
    buf
}

/// A coarse description of how a node responded, used to group cases in the markdown table.
fn endpoint_status(verdict: &Verdict, outcome: Option<&CallOutcome>) -> &'static str {
    let Some(outcome) = outcome else {
        return "Skipped";
    };
    match &outcome.response {
        CallResponse::TransportError(_) => "Unreachable",
        CallResponse::ApplicationError(error) => match error.code {
            METHOD_NOT_FOUND => "MissingMethod",
            INVALID_REQUEST | INVALID_PARAMS => "InvalidRequest",
            _ => "InternalServerError",
        },
        CallResponse::Success(_)
            if outcome.origin == NodeRole::Candidate
                && verdict.classification == Classification::Mismatch =>
        {
            "InvalidResponse"
        }
        CallResponse::Success(_) => "Valid",
    }
}
