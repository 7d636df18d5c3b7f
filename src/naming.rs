//! Naming Parser: infer a segment pattern from sample names, generate new
//! names from it, and validate names against it, per spec §4.5.

use crate::types::EntityKind;
use std::collections::{HashMap, HashSet};

const SEPARATOR_CANDIDATES: &[&str] = &[" - ", " | ", " > ", " / ", " : ", "_", "."];
const MIN_SEPARATOR_SCORE: f64 = 0.5;

/// Well-known leading-token prefixes for each entity kind, used as a
/// supplementary entry point alongside the full separator/segment
/// algorithm (spec §4.5). Keys are matched case-insensitively against a
/// name's leading token.
fn baseline_prefixes(kind: EntityKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        EntityKind::Tag => &[
            ("ga4", "GA4"),
            ("ua", "Universal Analytics"),
            ("gtag", "gtag"),
            ("fb", "Facebook"),
            ("linkedin", "LinkedIn"),
            ("html", "Custom HTML"),
            ("pixel", "Pixel"),
            ("conversion", "Conversion"),
        ],
        EntityKind::Trigger => &[
            ("click", "Click"),
            ("form", "Form"),
            ("page", "Page View"),
            ("scroll", "Scroll"),
            ("custom", "Custom Event"),
            ("timer", "Timer"),
            ("history", "History Change"),
        ],
        EntityKind::Variable => &[
            ("dlv", "Data Layer Variable"),
            ("const", "Constant"),
            ("lookup", "Lookup Table"),
            ("js", "Custom JavaScript"),
            ("url", "URL"),
            ("cookie", "First-Party Cookie"),
        ],
        EntityKind::Template => &[],
    }
}

/// Extract a name's leading token: the segment before the first separator
/// candidate that appears in it, or its first whitespace-delimited word if
/// none do.
pub fn leading_token(name: &str) -> &str {
    let mut best: Option<&str> = None;
    for separator in SEPARATOR_CANDIDATES {
        if let Some((head, _)) = name.split_once(separator) {
            if best.map(|b| head.len() < b.len()).unwrap_or(true) {
                best = Some(head);
            }
        }
    }
    best.unwrap_or_else(|| name.split_whitespace().next().unwrap_or(name))
        .trim()
}

/// Supplementary type-inference entry point (spec §4.5): classify a name by
/// its leading token against the baseline prefix table for `kind`, without
/// running the full separator/segment algorithm. Returns `None` when the
/// leading token matches nothing known.
pub fn infer_category_from_leading_token(kind: EntityKind, name: &str) -> Option<&'static str> {
    let token = leading_token(name).to_lowercase();
    baseline_prefixes(kind)
        .iter()
        .find(|(prefix, _)| token == *prefix || token.starts_with(*prefix))
        .map(|(_, category)| *category)
}

/// One slot of a naming pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Variable {
        name: String,
        possible_values: Vec<String>,
    },
}

/// An inferred naming pattern over a sample of existing names.
#[derive(Debug, Clone, PartialEq)]
pub struct NamingPattern {
    pub separator: String,
    pub segments: Vec<Segment>,
    pub confidence: f64,
    pub examples: Vec<String>,
}

/// Score how well `separator` fits `names`, weighting the fraction of names
/// containing it by a shape-plausibility term favoring 2-6 parts per name.
fn score_separator(separator: &str, names: &[String]) -> f64 {
    if names.is_empty() {
        return 0.0;
    }
    let containing = names.iter().filter(|n| n.contains(separator)).count() as f64;
    let fraction = containing / names.len() as f64;

    let shape_scores: Vec<f64> = names
        .iter()
        .map(|n| {
            let parts = n.split(separator).count();
            if (2..=6).contains(&parts) { 1.0 } else { 0.3 }
        })
        .collect();
    let shape_plausibility = shape_scores.iter().sum::<f64>() / shape_scores.len() as f64;

    fraction * shape_plausibility
}

fn choose_separator(names: &[String]) -> Option<String> {
    SEPARATOR_CANDIDATES
        .iter()
        .map(|sep| (*sep, score_separator(sep, names)))
        .filter(|(_, score)| *score >= MIN_SEPARATOR_SCORE)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(sep, _)| sep.to_string())
}

/// Guess a human-meaningful variable name from a slot's first sampled
/// value, per spec §4.5 step 3.
fn infer_variable_name(sample: &str, slot_index: usize) -> String {
    const PLATFORM_TOKENS: &[&str] = &["ga4", "ua", "gtag", "gtm"];
    const ACTION_TOKENS: &[&str] = &["click", "view", "submit", "scroll", "load"];

    let lower = sample.to_lowercase();
    if PLATFORM_TOKENS.contains(&lower.as_str()) {
        return "platform".to_string();
    }
    if ACTION_TOKENS.contains(&lower.as_str()) {
        return "action".to_string();
    }
    if lower.contains('_') || lower.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return "event".to_string();
    }
    format!("segment{slot_index}")
}

/// Infer a [`NamingPattern`] from a list of existing names.
pub fn extract_pattern(names: &[String]) -> NamingPattern {
    let Some(separator) = choose_separator(names) else {
        // No separator scores well enough: fall back to a single literal
        // segment per spec §4.5 step 1 ("prefix/suffix template").
        return NamingPattern {
            separator: String::new(),
            segments: vec![Segment::Variable {
                name: "segment0".to_string(),
                possible_values: names.iter().take(10).cloned().collect(),
            }],
            confidence: 0.0,
            examples: names.to_vec(),
        };
    };

    let split_names: Vec<Vec<&str>> = names.iter().map(|n| n.split(separator.as_str()).collect()).collect();
    let slot_count = split_names.iter().map(|parts| parts.len()).max().unwrap_or(0);

    let mut segments = Vec::with_capacity(slot_count);
    for slot in 0..slot_count {
        let values: Vec<&str> = split_names.iter().filter_map(|parts| parts.get(slot).copied()).collect();
        let unique: HashSet<&str> = values.iter().copied().collect();

        if unique.len() == 1 {
            segments.push(Segment::Literal(unique.into_iter().next().unwrap().to_string()));
            continue;
        }

        let is_variable_slot = unique.len() <= 5 && (unique.len() as f64) < 0.5 * values.len() as f64;
        let sample_values: Vec<String> = if is_variable_slot {
            unique.iter().map(|s| s.to_string()).collect()
        } else {
            values.iter().take(10).map(|s| s.to_string()).collect()
        };

        let var_name = sample_values
            .first()
            .map(|sample| infer_variable_name(sample, slot))
            .unwrap_or_else(|| format!("segment{slot}"));

        segments.push(Segment::Variable {
            name: var_name,
            possible_values: sample_values,
        });
    }

    let confidence = {
        let regenerated_count = names
            .iter()
            .filter(|name| {
                let parts: Vec<&str> = name.split(separator.as_str()).collect();
                parts.len() == segments.len()
            })
            .count();
        regenerated_count as f64 / names.len().max(1) as f64
    };

    NamingPattern {
        separator,
        segments,
        confidence,
        examples: names.to_vec(),
    }
}

/// Generate a name from `pattern`, substituting `params` for variable
/// segments (missing params fall back to `{name}` placeholders).
pub fn generate_name(pattern: &NamingPattern, params: &HashMap<String, String>) -> String {
    if pattern.separator.is_empty() {
        if let Some(Segment::Variable { name, .. }) = pattern.segments.first() {
            return params.get(name).cloned().unwrap_or_else(|| format!("{{{name}}}"));
        }
    }

    pattern
        .segments
        .iter()
        .map(|segment| match segment {
            Segment::Literal(value) => value.clone(),
            Segment::Variable { name, .. } => params
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("{{{name}}}")),
        })
        .collect::<Vec<_>>()
        .join(&pattern.separator)
}

/// The result of validating a candidate name against a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub issues: Vec<String>,
    pub suggested_correction: Option<String>,
}

/// Validate `name` against `pattern`: the part count must match the
/// pattern's segment count and every literal segment must match exactly.
pub fn validate(name: &str, pattern: &NamingPattern) -> ValidationOutcome {
    if pattern.separator.is_empty() {
        return ValidationOutcome {
            valid: true,
            issues: Vec::new(),
            suggested_correction: None,
        };
    }

    let parts: Vec<&str> = name.split(pattern.separator.as_str()).collect();
    let mut issues = Vec::new();

    if parts.len() != pattern.segments.len() {
        issues.push(format!(
            "expected {} segments separated by '{}', found {}",
            pattern.segments.len(),
            pattern.separator,
            parts.len()
        ));
    } else {
        for (part, segment) in parts.iter().zip(pattern.segments.iter()) {
            if let Segment::Literal(expected) = segment {
                if part != expected {
                    issues.push(format!("expected literal segment '{expected}', found '{part}'"));
                }
            }
        }
    }

    let valid = issues.is_empty();
    let suggested_correction = if valid {
        None
    } else {
        let mut params = HashMap::new();
        for (part, segment) in parts.iter().zip(pattern.segments.iter()) {
            if let Segment::Variable { name, .. } = segment {
                params.insert(name.clone(), part.to_string());
            }
        }
        Some(generate_name(pattern, &params))
    };

    ValidationOutcome {
        valid,
        issues,
        suggested_correction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_names() -> Vec<String> {
        vec![
            "GA4 - Click".to_string(),
            "GA4 - Submit".to_string(),
            "GA4 - Scroll".to_string(),
            "UA - Click".to_string(),
        ]
    }

    #[test]
    fn extract_pattern_chooses_dash_separator() {
        let pattern = extract_pattern(&sample_names());
        assert_eq!(pattern.separator, " - ");
        assert_eq!(pattern.segments.len(), 2);
    }

    #[test]
    fn round_trip_reproduces_name_when_confidence_is_full() {
        let names = vec!["A - X".to_string(), "A - Y".to_string(), "A - Z".to_string()];
        let pattern = extract_pattern(&names);
        assert_eq!(pattern.confidence, 1.0);

        for name in &names {
            let parts: Vec<&str> = name.split(pattern.separator.as_str()).collect();
            let mut params = HashMap::new();
            for (part, segment) in parts.iter().zip(pattern.segments.iter()) {
                if let Segment::Variable { name: var_name, .. } = segment {
                    params.insert(var_name.clone(), part.to_string());
                }
            }
            assert_eq!(&generate_name(&pattern, &params), name);
        }
    }

    #[test]
    fn validate_flags_wrong_segment_count() {
        let pattern = extract_pattern(&sample_names());
        let outcome = validate("JustOneWord", &pattern);
        assert!(!outcome.valid);
        assert!(!outcome.issues.is_empty());
    }

    #[test]
    fn validate_accepts_well_formed_name() {
        let pattern = extract_pattern(&sample_names());
        let outcome = validate("GA4 - PageView", &pattern);
        assert!(outcome.valid);
    }

    #[test]
    fn leading_token_splits_on_first_separator() {
        assert_eq!(leading_token("GA4 - Click"), "GA4");
        assert_eq!(leading_token("DLV.userId"), "DLV");
        assert_eq!(leading_token("Click"), "Click");
    }

    #[test]
    fn infer_category_from_leading_token_matches_baseline_prefixes() {
        assert_eq!(
            infer_category_from_leading_token(EntityKind::Tag, "GA4 - Click"),
            Some("GA4")
        );
        assert_eq!(
            infer_category_from_leading_token(EntityKind::Trigger, "Click - All Buttons"),
            Some("Click")
        );
        assert_eq!(
            infer_category_from_leading_token(EntityKind::Variable, "DLV - userId"),
            Some("Data Layer Variable")
        );
    }

    #[test]
    fn infer_category_from_leading_token_is_none_for_unknown_prefix() {
        assert_eq!(infer_category_from_leading_token(EntityKind::Tag, "Zzz Unknown"), None);
    }
}
