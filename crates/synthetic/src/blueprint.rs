//! Declarative generation recipes.
//!
//! A [`Blueprint`] pairs a [`FeatureSchema`] with one [`FieldRecipe`] per
//! field, optional latent correlations, weighted regimes and a label model.
//! [`BlueprintBuilder::build`] checks the recipe against the schema, so the
//! generator only ever sees a consistent blueprint.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use simdecide_core::{EngineError, EngineResult, FeatureSchema, FeatureValue, FieldKind};

/// Marginal distribution of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marginal {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    /// `sigmoid(mu + sigma * z)`; lands in (0, 1).
    LogitNormal { mu: f64, sigma: f64 },
    Uniform { low: f64, high: f64 },
    Poisson { lambda: f64 },
    /// Weights follow the schema's category order.
    Categorical { weights: Vec<f64> },
    Bernoulli { p: f64 },
    /// `offset + (record index mod period)`. Ignores the latent draw.
    Cycle { period: u32, offset: i64 },
}

impl Marginal {
    /// Whether the marginal consumes a latent normal and can be correlated.
    pub fn is_latent(&self) -> bool {
        !matches!(self, Self::Cycle { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Normal { .. } => "normal",
            Self::LogNormal { .. } => "log_normal",
            Self::LogitNormal { .. } => "logit_normal",
            Self::Uniform { .. } => "uniform",
            Self::Poisson { .. } => "poisson",
            Self::Categorical { .. } => "categorical",
            Self::Bernoulli { .. } => "bernoulli",
            Self::Cycle { .. } => "cycle",
        }
    }
}

/// Multiplicative seasonal swing: `1 + amplitude * sin(2π·i/period + phase)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub period: u32,
    pub amplitude: f64,
    pub phase: f64,
}

impl Seasonality {
    pub fn factor(&self, index: usize) -> f64 {
        let cycle = (index % self.period as usize) as f64 / f64::from(self.period);
        1.0 + self.amplitude * (std::f64::consts::TAU * cycle + self.phase).sin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecipe {
    pub field: String,
    pub marginal: Marginal,
    /// Clamp out-of-range draws instead of redrawing the record.
    #[serde(default)]
    pub clip: bool,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub seasonality: Option<Seasonality>,
}

impl FieldRecipe {
    pub fn new(field: impl Into<String>, marginal: Marginal) -> Self {
        Self {
            field: field.into(),
            marginal,
            clip: false,
            decimals: None,
            seasonality: None,
        }
    }

    pub fn clipped(mut self) -> Self {
        self.clip = true;
        self
    }

    pub fn decimals(mut self, places: u32) -> Self {
        self.decimals = Some(places);
        self
    }

    pub fn seasonal(mut self, period: u32, amplitude: f64, phase: f64) -> Self {
        self.seasonality = Some(Seasonality {
            period,
            amplitude,
            phase,
        });
        self
    }
}

/// Latent correlation between two fields. `source` must precede `target`
/// in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub source: String,
    pub target: String,
    pub rho: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FieldShift {
    Add(f64),
    Scale(f64),
}

impl FieldShift {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Self::Add(d) => x + d,
            Self::Scale(k) => x * k,
        }
    }
}

/// A latent population state (e.g. expansion vs. downturn).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub shifts: Vec<(String, FieldShift)>,
    #[serde(default)]
    pub label_shift: f64,
}

impl Regime {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            shifts: Vec::new(),
            label_shift: 0.0,
        }
    }

    pub fn shift(mut self, field: impl Into<String>, shift: FieldShift) -> Self {
        self.shifts.push((field.into(), shift));
        self
    }

    pub fn label_shift(mut self, shift: f64) -> Self {
        self.label_shift = shift;
        self
    }
}

/// One additive contribution to the label's latent score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LabelTerm {
    /// `weight * z`, with `z` the field standardized over the dataset.
    Linear { field: String, weight: f64 },
    /// `weight` when the field equals `value`.
    Indicator {
        field: String,
        value: FeatureValue,
        weight: f64,
    },
    /// `weight` when the field is strictly above `above`.
    Threshold { field: String, above: f64, weight: f64 },
}

impl LabelTerm {
    pub fn field(&self) -> &str {
        match self {
            Self::Linear { field, .. } | Self::Indicator { field, .. } | Self::Threshold { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LabelModel {
    /// Rare-event classification. Exactly `round(count * target_rate)`
    /// records with the highest latent score are positive.
    Binary {
        target_rate: f64,
        #[serde(default)]
        intercept: f64,
        terms: Vec<LabelTerm>,
        /// Scale of the logistic noise added to the latent score.
        noise: f64,
    },
    /// Regression target, clipped to `[min, max]`.
    Continuous {
        intercept: f64,
        terms: Vec<LabelTerm>,
        noise_std: f64,
        min: f64,
        max: f64,
        #[serde(default)]
        decimals: Option<u32>,
    },
}

impl LabelModel {
    pub fn terms(&self) -> &[LabelTerm] {
        match self {
            Self::Binary { terms, .. } | Self::Continuous { terms, .. } => terms,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary { .. })
    }
}

/// Validated generation recipe. Recipes are stored in schema order.
#[derive(Debug, Clone)]
pub struct Blueprint {
    schema: Arc<FeatureSchema>,
    recipes: Vec<FieldRecipe>,
    /// `mixing[target]` lists `(source index, rho)`.
    mixing: Vec<Vec<(usize, f64)>>,
    regimes: Vec<Regime>,
    label: LabelModel,
    label_name: String,
}

impl Blueprint {
    pub fn builder(schema: Arc<FeatureSchema>) -> BlueprintBuilder {
        BlueprintBuilder {
            schema,
            recipes: Vec::new(),
            correlations: Vec::new(),
            regimes: Vec::new(),
            label: None,
            label_name: "label".to_string(),
        }
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn recipes(&self) -> &[FieldRecipe] {
        &self.recipes
    }

    pub(crate) fn mixing(&self) -> &[Vec<(usize, f64)>] {
        &self.mixing
    }

    pub fn regimes(&self) -> &[Regime] {
        &self.regimes
    }

    pub fn label(&self) -> &LabelModel {
        &self.label
    }

    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    /// Same blueprint with a different rare-event rate. No-op for
    /// continuous labels.
    pub fn with_target_rate(&self, rate: f64) -> EngineResult<Self> {
        let mut next = self.clone();
        if let LabelModel::Binary { target_rate, .. } = &mut next.label {
            check_rate(rate)?;
            *target_rate = rate;
        }
        Ok(next)
    }
}

#[derive(Debug, Clone)]
pub struct BlueprintBuilder {
    schema: Arc<FeatureSchema>,
    recipes: Vec<FieldRecipe>,
    correlations: Vec<Correlation>,
    regimes: Vec<Regime>,
    label: Option<LabelModel>,
    label_name: String,
}

impl BlueprintBuilder {
    pub fn recipe(mut self, recipe: FieldRecipe) -> Self {
        self.recipes.push(recipe);
        self
    }

    pub fn correlate(mut self, source: impl Into<String>, target: impl Into<String>, rho: f64) -> Self {
        self.correlations.push(Correlation {
            source: source.into(),
            target: target.into(),
            rho,
        });
        self
    }

    pub fn regime(mut self, regime: Regime) -> Self {
        self.regimes.push(regime);
        self
    }

    pub fn label(mut self, name: impl Into<String>, model: LabelModel) -> Self {
        self.label_name = name.into();
        self.label = Some(model);
        self
    }

    pub fn build(self) -> EngineResult<Blueprint> {
        let schema = self.schema;
        let violation = |field: &str, reason: String| EngineError::schema_violation(field, reason);

        // Recipes: exactly one per schema field, compatible with its kind.
        let mut slots: Vec<Option<FieldRecipe>> = vec![None; schema.len()];
        for recipe in self.recipes {
            let Some(idx) = schema.index_of(&recipe.field) else {
                return Err(violation(&recipe.field, "field is not declared by the schema".into()));
            };
            if slots[idx].is_some() {
                return Err(violation(&recipe.field, "more than one recipe".into()));
            }
            check_recipe(&schema.fields()[idx].kind, &recipe)?;
            slots[idx] = Some(recipe);
        }
        let mut recipes = Vec::with_capacity(schema.len());
        for (field, slot) in schema.fields().iter().zip(slots) {
            match slot {
                Some(r) => recipes.push(r),
                None => return Err(violation(&field.name, "no recipe for field".into())),
            }
        }

        let mut mixing: Vec<Vec<(usize, f64)>> = vec![Vec::new(); schema.len()];
        for c in &self.correlations {
            let (Some(s), Some(t)) = (schema.index_of(&c.source), schema.index_of(&c.target)) else {
                return Err(violation(
                    &c.target,
                    format!("correlation references unknown field ({} -> {})", c.source, c.target),
                ));
            };
            if s >= t {
                return Err(EngineError::configuration(format!(
                    "correlation source `{}` must precede target `{}`",
                    c.source, c.target
                )));
            }
            if !c.rho.is_finite() || c.rho.abs() >= 1.0 {
                return Err(EngineError::configuration(format!(
                    "correlation {} -> {} needs |rho| < 1",
                    c.source, c.target
                )));
            }
            if !recipes[s].marginal.is_latent() || !recipes[t].marginal.is_latent() {
                return Err(violation(&c.target, "cycle fields cannot be correlated".into()));
            }
            mixing[t].push((s, c.rho));
        }
        for (t, sources) in mixing.iter().enumerate() {
            let explained: f64 = sources.iter().map(|(_, r)| r * r).sum();
            if explained >= 1.0 {
                return Err(EngineError::configuration(format!(
                    "correlations into `{}` explain more than all of its variance",
                    schema.fields()[t].name
                )));
            }
        }

        for regime in &self.regimes {
            if !(regime.weight.is_finite() && regime.weight > 0.0) {
                return Err(EngineError::configuration(format!(
                    "regime `{}` needs a positive weight",
                    regime.name
                )));
            }
            for (field, shift) in &regime.shifts {
                let Some(spec) = schema.field(field) else {
                    return Err(violation(field, format!("regime `{}` shifts an unknown field", regime.name)));
                };
                if !spec.kind.is_numeric() {
                    return Err(violation(field, format!("regime `{}` shifts a non-numeric field", regime.name)));
                }
                let (FieldShift::Add(x) | FieldShift::Scale(x)) = shift;
                if !x.is_finite() {
                    return Err(EngineError::configuration(format!(
                        "regime `{}` has a non-finite shift",
                        regime.name
                    )));
                }
            }
        }

        let Some(label) = self.label else {
            return Err(EngineError::configuration(format!(
                "blueprint for `{}` has no label model",
                schema.domain()
            )));
        };
        check_label(&schema, &label)?;

        Ok(Blueprint {
            schema,
            recipes,
            mixing,
            regimes: self.regimes,
            label,
            label_name: self.label_name,
        })
    }
}

fn check_rate(rate: f64) -> EngineResult<()> {
    if rate.is_finite() && rate > 0.0 && rate < 1.0 {
        Ok(())
    } else {
        Err(EngineError::configuration(format!("target rate {rate} must lie in (0, 1)")))
    }
}

fn check_recipe(kind: &FieldKind, recipe: &FieldRecipe) -> EngineResult<()> {
    let mismatch = || {
        EngineError::schema_violation(
            &recipe.field,
            format!("{} marginal does not fit this field kind", recipe.marginal.name()),
        )
    };
    let bad = |what: &str| {
        EngineError::configuration(format!("recipe for `{}`: {what}", recipe.field))
    };

    match (&recipe.marginal, kind) {
        (Marginal::Normal { mean, std_dev }, FieldKind::Continuous { .. } | FieldKind::Ordinal { .. }) => {
            if !(mean.is_finite() && std_dev.is_finite() && *std_dev > 0.0) {
                return Err(bad("normal needs a finite mean and positive std_dev"));
            }
        }
        (
            Marginal::LogNormal { mu, sigma } | Marginal::LogitNormal { mu, sigma },
            FieldKind::Continuous { .. } | FieldKind::Ordinal { .. },
        ) => {
            if !(mu.is_finite() && sigma.is_finite() && *sigma > 0.0) {
                return Err(bad("needs a finite mu and positive sigma"));
            }
        }
        (Marginal::Uniform { low, high }, FieldKind::Continuous { .. } | FieldKind::Ordinal { .. }) => {
            if !(low.is_finite() && high.is_finite() && low < high) {
                return Err(bad("uniform needs low < high"));
            }
        }
        (Marginal::Poisson { lambda }, FieldKind::Ordinal { .. }) => {
            if !(lambda.is_finite() && *lambda > 0.0 && *lambda < 500.0) {
                return Err(bad("poisson needs 0 < lambda < 500"));
            }
        }
        (Marginal::Cycle { period, .. }, FieldKind::Ordinal { .. }) => {
            if *period == 0 {
                return Err(bad("cycle period must be positive"));
            }
        }
        (Marginal::Categorical { weights }, FieldKind::Categorical { categories }) => {
            if weights.len() != categories.len() {
                return Err(EngineError::schema_violation(
                    &recipe.field,
                    format!("{} weights for {} categories", weights.len(), categories.len()),
                ));
            }
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
                return Err(bad("category weights must be non-negative with a positive sum"));
            }
        }
        (Marginal::Bernoulli { p }, FieldKind::Boolean) => {
            if !(p.is_finite() && *p > 0.0 && *p < 1.0) {
                return Err(bad("bernoulli needs 0 < p < 1"));
            }
        }
        _ => return Err(mismatch()),
    }

    if let Some(season) = &recipe.seasonality {
        if !kind.is_numeric() {
            return Err(mismatch());
        }
        if season.period == 0 || !season.amplitude.is_finite() || season.amplitude.abs() >= 1.0 {
            return Err(bad("seasonality needs a positive period and |amplitude| < 1"));
        }
    }
    Ok(())
}

fn check_label(schema: &FeatureSchema, label: &LabelModel) -> EngineResult<()> {
    for term in label.terms() {
        let Some(spec) = schema.field(term.field()) else {
            return Err(EngineError::schema_violation(
                term.field(),
                "label term references an unknown field",
            ));
        };
        match term {
            LabelTerm::Linear { weight, .. } | LabelTerm::Threshold { weight, .. } if !weight.is_finite() => {
                return Err(EngineError::configuration("label term weight must be finite"));
            }
            LabelTerm::Threshold { above, .. } => {
                if !spec.kind.is_numeric() || !above.is_finite() {
                    return Err(EngineError::schema_violation(
                        term.field(),
                        "threshold term needs a numeric field and a finite cut-off",
                    ));
                }
            }
            LabelTerm::Indicator { value, weight, .. } => {
                if !weight.is_finite() {
                    return Err(EngineError::configuration("label term weight must be finite"));
                }
                spec.validate(value)
                    .map_err(|reason| EngineError::schema_violation(term.field(), reason))?;
            }
            LabelTerm::Linear { .. } => {}
        }
    }

    match label {
        LabelModel::Binary {
            target_rate,
            intercept,
            noise,
            ..
        } => {
            check_rate(*target_rate)?;
            if !intercept.is_finite() || !noise.is_finite() || *noise < 0.0 {
                return Err(EngineError::configuration("binary label needs a finite intercept and noise >= 0"));
            }
        }
        LabelModel::Continuous {
            intercept,
            noise_std,
            min,
            max,
            ..
        } => {
            if !(intercept.is_finite() && noise_std.is_finite() && *noise_std >= 0.0) {
                return Err(EngineError::configuration(
                    "continuous label needs a finite intercept and noise_std >= 0",
                ));
            }
            if !(min.is_finite() && max.is_finite() && min < max) {
                return Err(EngineError::configuration("continuous label needs min < max"));
            }
        }
    }
    Ok(())
}
