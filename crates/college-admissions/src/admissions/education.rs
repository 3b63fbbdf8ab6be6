//! Extraction of the metric education record.
//!
//! Clients send the same four values in three shapes: bracket-notation keys
//! from urlencoded/multipart forms, a nested `education` object (or the JSON
//! text of one), and flat top-level fields. Each shape is one pure strategy;
//! they run in priority order and the first complete record wins.

use serde_json::Value;

use super::domain::MetricRecord;
use super::form::{scalar_text, RawFields};
use super::intake::ValidationError;

type Strategy = fn(&RawFields) -> Option<MetricRecord>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("bracket", from_bracket_keys),
    ("nested", from_nested_object),
    ("flat", from_flat_fields),
];

/// Run the strategies in order, returning the first complete record.
pub fn extract_metric(fields: &RawFields) -> Option<MetricRecord> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let record = strategy(fields)?;
        tracing::debug!(strategy = *name, "education record extracted");
        Some(record)
    })
}

/// Like [`extract_metric`], failing when no strategy yields all four values.
pub fn extract_education(fields: &RawFields) -> Result<MetricRecord, ValidationError> {
    extract_metric(fields).ok_or(ValidationError::MissingEducation)
}

fn from_bracket_keys(fields: &RawFields) -> Option<MetricRecord> {
    Some(MetricRecord {
        year: fields.text("education[metric][year]")?,
        roll_number: fields.text("education[metric][rollNumber]")?,
        marks: fields.text("education[metric][marks]")?,
        school: fields.text("education[metric][school]")?,
    })
}

fn from_nested_object(fields: &RawFields) -> Option<MetricRecord> {
    let education = match fields.get("education")? {
        Value::String(raw) => serde_json::from_str::<Value>(raw).ok()?,
        Value::Array(items) => items.iter().find(|item| item.is_object())?.clone(),
        other => other.clone(),
    };
    let metric = education.get("metric")?;
    let field = |name: &str| metric.get(name).and_then(scalar_text);

    Some(MetricRecord {
        year: field("year")?,
        roll_number: field("rollNumber")?,
        marks: field("marks")?,
        school: field("school")?,
    })
}

fn from_flat_fields(fields: &RawFields) -> Option<MetricRecord> {
    Some(MetricRecord {
        year: fields.first_text(&["metricYear", "year"])?,
        roll_number: fields.first_text(&["metricRollNumber", "rollNumber"])?,
        marks: fields.first_text(&["metricMarks", "marks"])?,
        school: fields.first_text(&["metricSchool", "school"])?,
    })
}
