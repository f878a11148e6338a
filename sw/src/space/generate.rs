//! Per-parameter value generation
//!
//! `values_of` is a pure function of the spec: deterministic, finite and
//! restartable. Anything malformed yields fewer (possibly zero) values.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::recipe::{Exclusion, GenerationMode, NumericRange, ParamKind, ParamValue, ParameterSpec, Scalar};

use super::time::{format_window, parse_hhmm, parse_window, time_candidates};

/// Tolerance for the inclusive upper bound of a range
const RANGE_EPSILON: f64 = 1e-9;

/// Guard against runaway ranges (tiny increments over wide bounds)
pub const MAX_VALUES_PER_PARAMETER: usize = 1_000_000;

/// Generate the ordered value sequence for one parameter
pub fn values_of(spec: &ParameterSpec) -> Vec<ParamValue> {
    debug!(name = %spec.name, kind = ?spec.kind, mode = ?spec.mode, "values_of: called");
    let values = match spec.kind {
        ParamKind::Integer | ParamKind::Float => numeric_values(spec),
        ParamKind::Flag => flag_values(spec),
        ParamKind::Choice => choice_values(spec),
        ParamKind::TimeRange => time_values(spec),
    };
    if values.is_empty() {
        debug!(name = %spec.name, "values_of: parameter yields no values");
    }
    values
}

/// Points start, start+inc, ... up to end inclusive
///
/// Computed as start + k*inc so error does not accumulate across steps.
fn range_points(range: &NumericRange) -> Vec<f64> {
    let Some((start, end, increment)) = range.bounds() else {
        debug!(?range, "range_points: unparsable bounds");
        return Vec::new();
    };
    if !(increment > 0.0) || end < start {
        debug!(?range, "range_points: empty range");
        return Vec::new();
    }

    let mut points = Vec::new();
    let mut k: u64 = 0;
    loop {
        let v = start + k as f64 * increment;
        if v > end + RANGE_EPSILON {
            break;
        }
        if points.len() >= MAX_VALUES_PER_PARAMETER {
            warn!(?range, limit = MAX_VALUES_PER_PARAMETER, "Range truncated");
            break;
        }
        points.push(v);
        k += 1;
    }
    points
}

fn round_to_kind(kind: ParamKind, v: f64) -> ParamValue {
    match kind {
        ParamKind::Integer => ParamValue::Int(v.round() as i64),
        _ => ParamValue::Float((v * 10_000.0).round() / 10_000.0),
    }
}

/// Drop repeats, keeping the first occurrence
fn dedup_stable(values: Vec<ParamValue>) -> Vec<ParamValue> {
    let mut seen = HashSet::with_capacity(values.len());
    values.into_iter().filter(|v| seen.insert(v.to_string())).collect()
}

fn numeric_values(spec: &ParameterSpec) -> Vec<ParamValue> {
    if spec.mode == GenerationMode::Locked {
        // Locked constants are never excluded
        return spec
            .constant
            .as_ref()
            .and_then(Scalar::as_f64)
            .map(|v| vec![round_to_kind(spec.kind, v)])
            .unwrap_or_default();
    }

    let Some(exclusions) = spec.exclusions.iter().map(Exclusion::bounds).collect::<Option<Vec<_>>>() else {
        warn!(name = %spec.name, "Unparsable exclusion, parameter yields no values");
        return Vec::new();
    };

    let raw: Vec<f64> = match spec.mode {
        GenerationMode::Clusters => spec.clusters.iter().flat_map(range_points).collect(),
        GenerationMode::List => spec.values.iter().filter_map(Scalar::as_f64).collect(),
        _ => spec.single_range().map(|r| range_points(&r)).unwrap_or_default(),
    };

    let kept: Vec<ParamValue> = raw
        .into_iter()
        .map(|v| round_to_kind(spec.kind, v))
        .filter(|v| {
            let n = v.as_f64().unwrap_or(f64::NAN);
            !exclusions.iter().any(|(from, to)| n >= *from && n <= *to)
        })
        .collect();

    if spec.mode == GenerationMode::Clusters {
        let mut sorted = kept;
        sorted.sort_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        });
        sorted.dedup();
        sorted
    } else {
        dedup_stable(kept)
    }
}

fn flag_values(spec: &ParameterSpec) -> Vec<ParamValue> {
    if spec.mode == GenerationMode::Locked {
        let picked = match &spec.constant {
            Some(c) => c.as_bool(),
            None => spec.choices.iter().find_map(Scalar::as_bool),
        };
        return picked.map(|b| vec![ParamValue::Flag(b)]).unwrap_or_default();
    }
    dedup_stable(spec.choices.iter().filter_map(Scalar::as_bool).map(ParamValue::Flag).collect())
}

fn choice_values(spec: &ParameterSpec) -> Vec<ParamValue> {
    if spec.mode == GenerationMode::Locked {
        let picked = spec.constant.as_ref().or_else(|| spec.choices.first()).map(Scalar::as_text);
        return picked
            .filter(|s| !s.is_empty())
            .map(|s| vec![ParamValue::Choice(s)])
            .unwrap_or_default();
    }
    dedup_stable(spec.choices.iter().map(|c| ParamValue::Choice(c.as_text())).collect())
}

fn time_values(spec: &ParameterSpec) -> Vec<ParamValue> {
    match spec.mode {
        GenerationMode::Locked => spec
            .constant
            .as_ref()
            .and_then(|c| parse_window(&c.as_text()))
            .map(|(s, e)| vec![ParamValue::Time(format_window(s, e))])
            .unwrap_or_default(),
        GenerationMode::List => dedup_stable(
            spec.values
                .iter()
                .filter_map(|v| parse_window(&v.as_text()))
                .map(|(s, e)| ParamValue::Time(format_window(s, e)))
                .collect(),
        ),
        _ => cartesian_windows(spec),
    }
}

/// Whole minutes, at least one
fn parse_minutes(scalar: &Scalar) -> Option<u32> {
    scalar
        .as_f64()
        .filter(|v| *v >= 1.0 && v.fract() == 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v as u32)
}

/// Missing stays `Some(None)`; present but unparsable is `None`
fn optional<T>(field: Option<&Scalar>, parse: impl FnOnce(&Scalar) -> Option<T>) -> Option<Option<T>> {
    match field {
        None => Some(None),
        Some(scalar) => parse(scalar).map(Some),
    }
}

fn candidates(from: Option<&Scalar>, to: Option<&Scalar>, increment: Option<&Scalar>) -> Vec<u32> {
    let hhmm = |s: &Scalar| parse_hhmm(&s.as_text());
    let (Some(from), Some(to), Some(increment)) =
        (optional(from, hhmm), optional(to, hhmm), optional(increment, parse_minutes))
    else {
        debug!("candidates: unparsable time bound");
        return Vec::new();
    };
    match (from, to, increment) {
        (Some(f), Some(t), Some(i)) => time_candidates(f, t, i),
        // A lone bound with no step is a single candidate
        (Some(f), None, _) | (Some(f), _, None) => vec![f],
        _ => Vec::new(),
    }
}

/// Every start x end pairing where start strictly precedes end
fn cartesian_windows(spec: &ParameterSpec) -> Vec<ParamValue> {
    let starts = candidates(spec.start_from.as_ref(), spec.start_to.as_ref(), spec.start_increment.as_ref());
    let ends = candidates(spec.end_from.as_ref(), spec.end_to.as_ref(), spec.end_increment.as_ref());
    debug!(name = %spec.name, starts = starts.len(), ends = ends.len(), "cartesian_windows: candidates");

    starts
        .iter()
        .flat_map(|s| ends.iter().filter(move |e| s < *e).map(move |e| ParamValue::Time(format_window(*s, *e))))
        .collect()
}
