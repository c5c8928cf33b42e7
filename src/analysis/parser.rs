use super::prompt::{SUMMARY_LABEL, TOPIC_LABEL};
use super::DocumentAnalysis;
use crate::error::{DocAnalyzerError, Result};

/// Value of the first line that starts with `label`, trimmed.
fn labeled_value<'a>(raw: &'a str, label: &str) -> Option<&'a str> {
    raw.lines()
        .find_map(|line| line.strip_prefix(label))
        .map(str::trim)
}

fn required_value(raw: &str, label: &str) -> Result<String> {
    match labeled_value(raw, label) {
        None => Err(DocAnalyzerError::AnalysisParse(format!("missing '{}' line", label))),
        Some("") => Err(DocAnalyzerError::AnalysisParse(format!("empty '{}' value", label))),
        Some(value) => Ok(value.to_string()),
    }
}

/// Parse a raw model response into a topic and summary.
///
/// Looks for the first line starting with `Topic:` and the first starting
/// with `Summary:` (exact, case-sensitive prefix). Both must be present with
/// a non-empty value; nothing is filled in by default.
pub fn parse_analysis(raw: &str) -> Result<DocumentAnalysis> {
    let topic = required_value(raw, TOPIC_LABEL)?;
    let summary = required_value(raw, SUMMARY_LABEL)?;
    Ok(DocumentAnalysis { topic, summary })
}
