//! Summary statistics, frequency tables and group medians.

use crate::linalg::faer_ndarray::KahanSum;
use ndarray::ArrayView1;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptiveError {
    #[error("cannot summarize an empty column")]
    Empty,

    #[error("non-finite value at index {0}")]
    NonFinite(usize),

    #[error("grouping has {groups} labels for {values} values")]
    LengthMismatch { groups: usize, values: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n − 1 denominator); NaN for a single value.
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub summary: Summary,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrequencyRow {
    pub category: String,
    pub count: usize,
    pub proportion: f64,
}

/// Linear-interpolation quantile of sorted data.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn sorted_finite(values: impl Iterator<Item = f64>) -> Result<Vec<f64>, DescriptiveError> {
    let mut out = Vec::new();
    for (i, v) in values.enumerate() {
        if !v.is_finite() {
            return Err(DescriptiveError::NonFinite(i));
        }
        out.push(v);
    }
    if out.is_empty() {
        return Err(DescriptiveError::Empty);
    }
    out.sort_by(f64::total_cmp);
    Ok(out)
}

pub fn describe(values: ArrayView1<'_, f64>) -> Result<Summary, DescriptiveError> {
    let sorted = sorted_finite(values.iter().copied())?;
    let n = sorted.len();
    let mean = sorted.iter().copied().collect::<KahanSum>().sum() / n as f64;
    let std = if n > 1 {
        let ss = sorted
            .iter()
            .map(|v| (v - mean).powi(2))
            .collect::<KahanSum>()
            .sum();
        (ss / (n - 1) as f64).sqrt()
    } else {
        f64::NAN
    };
    Ok(Summary {
        count: n,
        mean,
        std,
        min: sorted[0],
        q25: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        q75: quantile_sorted(&sorted, 0.75),
        max: sorted[n - 1],
    })
}

fn group_indices<'a>(
    groups: &'a [String],
    n_values: usize,
) -> Result<BTreeMap<&'a str, Vec<usize>>, DescriptiveError> {
    if groups.len() != n_values {
        return Err(DescriptiveError::LengthMismatch {
            groups: groups.len(),
            values: n_values,
        });
    }
    let mut map: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, g) in groups.iter().enumerate() {
        map.entry(g.as_str()).or_default().push(i);
    }
    Ok(map)
}

/// Per-group summaries in sorted group order.
pub fn describe_by_group(
    groups: &[String],
    values: ArrayView1<'_, f64>,
) -> Result<Vec<GroupSummary>, DescriptiveError> {
    group_indices(groups, values.len())?
        .into_iter()
        .map(|(group, idx)| {
            let sorted = sorted_finite(idx.iter().map(|&i| values[i]))?;
            let subset = ndarray::Array1::from_vec(sorted);
            Ok(GroupSummary {
                group: group.to_string(),
                summary: describe(subset.view())?,
            })
        })
        .collect()
}

/// Counts per category, most frequent first; ties in label order.
pub fn frequency_table(values: &[String]) -> Vec<FrequencyRow> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v.as_str()).or_default() += 1;
    }
    let total = values.len() as f64;
    let mut rows: Vec<FrequencyRow> = counts
        .into_iter()
        .map(|(category, count)| FrequencyRow {
            category: category.to_string(),
            count,
            proportion: count as f64 / total,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    rows
}

/// Median of `values` for each distinct key, in ascending key order.
pub fn group_median(
    keys: ArrayView1<'_, f64>,
    values: ArrayView1<'_, f64>,
) -> Result<Vec<(f64, f64)>, DescriptiveError> {
    if keys.len() != values.len() {
        return Err(DescriptiveError::LengthMismatch {
            groups: keys.len(),
            values: values.len(),
        });
    }
    let mut order = sorted_finite(keys.iter().copied())?;
    order.dedup();
    order
        .into_iter()
        .map(|key| {
            let sorted = sorted_finite(
                keys.iter()
                    .zip(values.iter())
                    .filter(|(k, _)| **k == key)
                    .map(|(_, v)| *v),
            )?;
            Ok((key, quantile_sorted(&sorted, 0.5)))
        })
        .collect()
}
