//! Rendering scan results for humans and for tools.

use std::fmt::Write as _;

use locator_core::{HighlightOutcome, ScanResponse};

use crate::config::{OutputConfig, OutputFormat};
use crate::Result;

/// Drop records whose best locator scores below `min_confidence`.
/// Statistics still describe the whole scan.
pub fn filter(mut response: ScanResponse, min_confidence: f64) -> ScanResponse {
    if min_confidence > 0.0 {
        if let Some(ref mut result) = response.result {
            result.elements.retain(|r| r.confidence >= min_confidence);
        }
    }
    response
}

/// Render a scan response in the configured format.
pub fn render(response: &ScanResponse, output: &OutputConfig) -> Result<String> {
    match output.format {
        OutputFormat::Json => json(response, output.pretty),
        OutputFormat::Text => Ok(text(response)),
    }
}

pub fn json(response: &ScanResponse, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    })
}

/// One line per element with its best locator.
pub fn text(response: &ScanResponse) -> String {
    let mut out = String::new();
    let Some(ref result) = response.result else {
        let error = response.error.as_deref().unwrap_or("unknown error");
        let _ = writeln!(out, "✗ Scan failed: {}", error);
        return out;
    };

    if let Some(ref url) = result.url {
        let _ = writeln!(out, "{}", url);
    }
    for record in &result.elements {
        let _ = writeln!(out, "{}", record);
    }
    let stats = &result.stats;
    let _ = writeln!(
        out,
        "\n{} elements ({} primary, {} secondary, {} shadow) in {}ms",
        stats.total_elements,
        stats.primary_elements,
        stats.secondary_elements,
        stats.shadow_elements,
        stats.scan_duration
    );
    if result.elements.len() < stats.total_elements {
        let _ = writeln!(
            out,
            "{} shown after confidence filter",
            result.elements.len()
        );
    }
    out
}

/// Summary line for a highlight request.
pub fn highlight(selector: &str, outcome: &HighlightOutcome) -> String {
    match (outcome.success, outcome.found) {
        (true, true) => format!("✓ {} matched {} element(s)", selector, outcome.count),
        (true, false) => format!("✗ {} matched nothing", selector),
        (false, _) => format!(
            "✗ {}: {}",
            selector,
            outcome.error.as_deref().unwrap_or("highlight failed")
        ),
    }
}
