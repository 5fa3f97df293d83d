//! Extraction-method trust table for the source priority strategy.

/// Priority for methods missing from the table.
pub const UNKNOWN_METHOD_PRIORITY: u32 = 40;

// Higher is more trusted. Human entry outranks every automated pass.
const METHOD_PRIORITIES: &[(&str, u32)] = &[
    ("manual_entry", 100),
    ("human_review", 95),
    ("api_integration", 90),
    ("structured_data", 85),
    ("ai_extraction", 75),
    ("ocr_enhanced", 70),
    ("nlp_extraction", 60),
    ("ocr_standard", 50),
    ("pattern_matching", 45),
    ("heuristic", 30),
    ("fallback", 10),
];

/// Looks up the priority of an extraction method (case-insensitive).
#[must_use]
pub fn method_priority(method: &str) -> u32 {
    let method = method.trim();
    METHOD_PRIORITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(method))
        .map_or(UNKNOWN_METHOD_PRIORITY, |(_, p)| *p)
}

/// `0.6 · priority + 40 · confidence`.
#[must_use]
pub(crate) fn composite_score(method: &str, confidence: f64) -> f64 {
    0.6 * f64::from(method_priority(method)) + 40.0 * confidence
}
