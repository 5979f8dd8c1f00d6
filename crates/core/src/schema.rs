//! Feature schema: the per-domain declaration of input fields.
//!
//! A schema is pure data. Every [`FeatureVector`](crate::FeatureVector) is
//! validated against exactly one schema, and the schema also fixes the numeric
//! encoding models are trained on.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::vector::FeatureValue;

/// Semantic type and valid range of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Real-valued, inclusive bounds.
    Continuous { min: f64, max: f64 },
    /// Integer-valued, inclusive bounds.
    Ordinal { min: i64, max: i64 },
    /// One of an ordered category set. Encoded as the category index.
    Categorical { categories: Vec<String> },
    /// Encoded as 0/1.
    Boolean,
}

impl FieldKind {
    /// Continuous and ordinal fields accept arithmetic perturbations.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Continuous { .. } | Self::Ordinal { .. })
    }

    /// Bounds of the encoded representation.
    pub fn encoded_bounds(&self) -> (f64, f64) {
        match self {
            Self::Continuous { min, max } => (*min, *max),
            Self::Ordinal { min, max } => (*min as f64, *max as f64),
            Self::Categorical { categories } => (0.0, categories.len().saturating_sub(1) as f64),
            Self::Boolean => (0.0, 1.0),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Continuous { .. } => "continuous",
            Self::Ordinal { .. } => "ordinal",
            Self::Categorical { .. } => "categorical",
            Self::Boolean => "boolean",
        }
    }
}

/// How values are rendered in natural-language explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Decimal(u8),
    Percent,
    Currency,
    Integer,
}

/// One named field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub groups: Vec<String>,
    pub format: ValueFormat,
}

impl FieldSpec {
    fn new(name: impl Into<String>, kind: FieldKind, format: ValueFormat) -> Self {
        let name = name.into();
        Self {
            label: humanize(&name),
            name,
            kind,
            groups: Vec::new(),
            format,
        }
    }

    pub fn continuous(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(name, FieldKind::Continuous { min, max }, ValueFormat::Decimal(2))
    }

    pub fn ordinal(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(name, FieldKind::Ordinal { min, max }, ValueFormat::Integer)
    }

    pub fn categorical(name: impl Into<String>, categories: &[&str]) -> Self {
        let categories = categories.iter().map(|c| c.to_string()).collect();
        Self::new(name, FieldKind::Categorical { categories }, ValueFormat::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean, ValueFormat::Integer)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    pub fn belongs_to(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Check a raw value against this field and return its canonical form.
    ///
    /// Integers are accepted for continuous fields and integral numbers for
    /// ordinal fields; nothing else is converted.
    pub fn validate(&self, value: &FeatureValue) -> Result<FeatureValue, String> {
        match (&self.kind, value) {
            (FieldKind::Continuous { min, max }, FeatureValue::Number(_) | FeatureValue::Integer(_)) => {
                let v = value.as_f64().unwrap_or(f64::NAN);
                if !v.is_finite() {
                    return Err(format!("`{}` must be a finite number", self.name));
                }
                if v < *min || v > *max {
                    return Err(format!("`{}` = {v} is outside [{min}, {max}]", self.name));
                }
                Ok(FeatureValue::Number(v))
            }
            (FieldKind::Ordinal { min, max }, FeatureValue::Integer(i)) => {
                if i < min || i > max {
                    return Err(format!("`{}` = {i} is outside [{min}, {max}]", self.name));
                }
                Ok(FeatureValue::Integer(*i))
            }
            (FieldKind::Ordinal { .. }, FeatureValue::Number(n)) if n.is_finite() && n.fract() == 0.0 => {
                self.validate(&FeatureValue::Integer(*n as i64))
            }
            (FieldKind::Categorical { categories }, FeatureValue::Category(c)) => {
                if categories.iter().any(|k| k == c) {
                    Ok(FeatureValue::Category(c.clone()))
                } else {
                    Err(format!(
                        "`{}` = {c:?} is not one of [{}]",
                        self.name,
                        categories.join(", ")
                    ))
                }
            }
            (FieldKind::Boolean, FeatureValue::Boolean(b)) => Ok(FeatureValue::Boolean(*b)),
            (kind, other) => Err(format!(
                "`{}` expects a value of type {}, got {}",
                self.name,
                kind.type_name(),
                other.type_name()
            )),
        }
    }

    /// Numeric encoding of a canonical value.
    pub fn encode(&self, value: &FeatureValue) -> f64 {
        match (&self.kind, value) {
            (FieldKind::Categorical { categories }, FeatureValue::Category(c)) => categories
                .iter()
                .position(|k| k == c)
                .map(|i| i as f64)
                .unwrap_or(f64::NAN),
            (_, FeatureValue::Boolean(b)) => f64::from(u8::from(*b)),
            (_, other) => other.as_f64().unwrap_or(f64::NAN),
        }
    }

    /// Inverse of [`encode`](Self::encode), saturating at the field bounds.
    pub fn decode(&self, encoded: f64) -> FeatureValue {
        let (lo, hi) = self.kind.encoded_bounds();
        let x = encoded.clamp(lo, hi);
        match &self.kind {
            FieldKind::Continuous { .. } => FeatureValue::Number(x),
            FieldKind::Ordinal { .. } => FeatureValue::Integer(x.round() as i64),
            FieldKind::Categorical { categories } => {
                FeatureValue::Category(categories[x.round() as usize].clone())
            }
            FieldKind::Boolean => FeatureValue::Boolean(x >= 0.5),
        }
    }

    /// Render a value for explanations.
    pub fn render(&self, value: &FeatureValue) -> String {
        match value {
            FeatureValue::Category(c) => c.replace('_', " "),
            FeatureValue::Boolean(true) => "yes".to_string(),
            FeatureValue::Boolean(false) => "no".to_string(),
            other => self.render_number(other.as_f64().unwrap_or(f64::NAN)),
        }
    }

    /// Render an encoded number using this field's format.
    pub fn render_number(&self, x: f64) -> String {
        match &self.kind {
            FieldKind::Categorical { .. } | FieldKind::Boolean => self.render(&self.decode(x)),
            _ => match self.format {
                ValueFormat::Decimal(places) => format!("{x:.*}", places as usize),
                ValueFormat::Percent => format!("{:.1}%", x * 100.0),
                ValueFormat::Currency => format!("${}", group_thousands(x.round() as i64)),
                ValueFormat::Integer => format!("{}", x.round() as i64),
            },
        }
    }
}

/// Ordered declaration of a domain's input fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    domain: String,
    version: u32,
    fields: Vec<FieldSpec>,
}

impl FeatureSchema {
    pub fn builder(domain: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            domain: domain.into(),
            version: 1,
            fields: Vec::new(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Group names in order of first appearance.
    pub fn groups(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for g in self.fields.iter().flat_map(|f| f.groups.iter()) {
            if !out.contains(&g.as_str()) {
                out.push(g);
            }
        }
        out
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.fields.iter().any(|f| f.belongs_to(group))
    }

    /// Field-for-field equality by name and order.
    pub fn same_layout(&self, other: &FeatureSchema) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a.name == b.name)
    }
}

/// Builder for [`FeatureSchema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    domain: String,
    version: u32,
    fields: Vec<FieldSpec>,
}

impl SchemaBuilder {
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> EngineResult<FeatureSchema> {
        if self.domain.trim().is_empty() {
            return Err(EngineError::configuration("schema domain must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(EngineError::configuration(format!(
                "schema `{}` declares no fields",
                self.domain
            )));
        }

        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(EngineError::configuration(format!("field #{i} has an empty name")));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(EngineError::configuration(format!(
                    "duplicate field `{}` in schema `{}`",
                    field.name, self.domain
                )));
            }
            match &field.kind {
                FieldKind::Continuous { min, max } => {
                    if !(min.is_finite() && max.is_finite() && min < max) {
                        return Err(EngineError::configuration(format!(
                            "field `{}` needs finite bounds with min < max",
                            field.name
                        )));
                    }
                }
                FieldKind::Ordinal { min, max } => {
                    if min >= max {
                        return Err(EngineError::configuration(format!(
                            "field `{}` needs min < max",
                            field.name
                        )));
                    }
                }
                FieldKind::Categorical { categories } => {
                    if categories.len() < 2 {
                        return Err(EngineError::configuration(format!(
                            "field `{}` needs at least two categories",
                            field.name
                        )));
                    }
                    for (j, c) in categories.iter().enumerate() {
                        if categories[..j].contains(c) {
                            return Err(EngineError::configuration(format!(
                                "field `{}` repeats category {c:?}",
                                field.name
                            )));
                        }
                    }
                }
                FieldKind::Boolean => {}
            }
        }

        Ok(FeatureSchema {
            domain: self.domain,
            version: self.version,
            fields: self.fields,
        })
    }
}

fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 { format!("-{out}") } else { out }
}
