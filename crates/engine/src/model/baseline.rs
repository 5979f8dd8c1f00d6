//! Per-field reference statistics frozen at training time.

use serde::Serialize;
use simdecide_core::{FeatureSchema, FeatureValue, FieldSpec};
pub(crate) use simdecide_synthetic::sampling::mean_std;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldBaseline {
    pub field: String,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Typical value: the (rounded) mean for numeric fields, the mode otherwise.
    pub reference: FeatureValue,
    /// Pearson correlation of the encoded field with the training label.
    pub label_correlation: f64,
    numeric: bool,
    reference_encoded: f64,
}

impl FieldBaseline {
    /// Standardized distance from the training mean (0 for constant fields).
    pub fn z_score(&self, encoded: f64) -> f64 {
        if self.std_dev > 0.0 {
            (encoded - self.mean) / self.std_dev
        } else {
            0.0
        }
    }

    /// `|z|` for numeric fields, 1/0 for "differs from the mode" otherwise.
    pub fn deviation(&self, encoded: f64) -> f64 {
        if self.numeric {
            self.z_score(encoded).abs()
        } else if (encoded - self.reference_encoded).abs() > 0.5 {
            1.0
        } else {
            0.0
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    pub fn reference_encoded(&self) -> f64 {
        self.reference_encoded
    }

    /// Outside the range observed in training.
    pub fn is_extrapolated(&self, encoded: f64) -> bool {
        self.numeric && (encoded < self.min || encoded > self.max)
    }

    /// Sign of the label correlation; `+1` when uncorrelated.
    pub fn correlation_sign(&self) -> f64 {
        if self.label_correlation < 0.0 { -1.0 } else { 1.0 }
    }
}

/// Statistics of `rows` (encoded, schema order) against `labels`.
pub fn compute(schema: &FeatureSchema, rows: &[Vec<f64>], labels: &[f64]) -> Vec<FieldBaseline> {
    schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, spec)| {
            let column: Vec<f64> = rows.iter().map(|r| r[idx]).collect();
            field_baseline(spec, &column, labels)
        })
        .collect()
}

fn field_baseline(spec: &FieldSpec, column: &[f64], labels: &[f64]) -> FieldBaseline {
    let (mean, std_dev) = mean_std(column);
    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let numeric = spec.kind.is_numeric();

    let reference_encoded = if numeric { mean } else { mode(column) };
    FieldBaseline {
        field: spec.name.clone(),
        mean,
        std_dev,
        min,
        max,
        reference: spec.decode(reference_encoded),
        label_correlation: pearson(column, labels),
        numeric,
        reference_encoded,
    }
}

/// Most frequent encoded value; ties go to the smallest.
fn mode(column: &[f64]) -> f64 {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for x in column {
        let key = x.round() as i64;
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, c)) => *c += 1,
            None => counts.push((key, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    counts.first().map(|(k, _)| *k as f64).unwrap_or(0.0)
}

pub(crate) fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let (mx, sx) = mean_std(xs);
    let (my, sy) = mean_std(ys);
    if sx == 0.0 || sy == 0.0 {
        return 0.0;
    }
    let cov = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum::<f64>() / xs.len() as f64;
    cov / (sx * sy)
}
