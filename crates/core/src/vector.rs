//! Feature vectors: validated, immutable field values.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::{EngineError, EngineResult};
use crate::schema::{FeatureSchema, FieldSpec};

/// A single field value.
///
/// Untagged so that a plain JSON object (`{"income": 50000, "band": "good"}`)
/// maps directly onto values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Category(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::Category(_) => "string",
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        Self::Category(value.to_string())
    }
}

/// Field values aligned with a schema.
///
/// Only the validating constructors can build one, so a `FeatureVector` always
/// satisfies its schema. There are no setters: transforms derive new vectors,
/// which keeps the pre-transform input available for explanations.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    schema: Arc<FeatureSchema>,
    values: Vec<FeatureValue>,
}

impl FeatureVector {
    /// Build from `(field, value)` pairs in any order.
    ///
    /// Every problem (unknown, duplicate, missing, invalid) is collected into a
    /// single [`EngineError::Validation`].
    pub fn from_pairs<I, K>(schema: Arc<FeatureSchema>, pairs: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (K, FeatureValue)>,
        K: Into<String>,
    {
        let mut slots: Vec<Option<FeatureValue>> = vec![None; schema.len()];
        let mut issues = Vec::new();

        for (name, value) in pairs {
            let name = name.into();
            let Some(idx) = schema.index_of(&name) else {
                issues.push(format!("unknown field `{name}`"));
                continue;
            };
            if slots[idx].is_some() {
                issues.push(format!("field `{name}` given more than once"));
                continue;
            }
            match schema.fields()[idx].validate(&value) {
                Ok(v) => slots[idx] = Some(v),
                Err(msg) => issues.push(msg),
            }
        }

        for (field, slot) in schema.fields().iter().zip(&slots) {
            if slot.is_none() && !issues.iter().any(|m| m.contains(&format!("`{}`", field.name))) {
                issues.push(format!("missing field `{}`", field.name));
            }
        }

        if !issues.is_empty() {
            return Err(EngineError::Validation(issues));
        }

        let values = slots.into_iter().flatten().collect();
        Ok(Self { schema, values })
    }

    /// Build from a JSON object keyed by field name.
    pub fn from_json(schema: Arc<FeatureSchema>, json: &JsonValue) -> EngineResult<Self> {
        let Some(object) = json.as_object() else {
            return Err(EngineError::validation("features must be a JSON object"));
        };

        let mut pairs = Vec::with_capacity(object.len());
        let mut issues = Vec::new();
        for (name, raw) in object {
            match serde_json::from_value::<FeatureValue>(raw.clone()) {
                Ok(v) => pairs.push((name.clone(), v)),
                Err(_) => issues.push(format!("`{name}` has an unsupported JSON value: {raw}")),
            }
        }
        if !issues.is_empty() {
            return Err(EngineError::Validation(issues));
        }
        Self::from_pairs(schema, pairs)
    }

    /// Build from values already in schema order.
    pub fn from_values(schema: Arc<FeatureSchema>, values: Vec<FeatureValue>) -> EngineResult<Self> {
        if values.len() != schema.len() {
            return Err(EngineError::validation(format!(
                "expected {} values, got {}",
                schema.len(),
                values.len()
            )));
        }
        let pairs: Vec<(String, FeatureValue)> = schema.field_names().into_iter().zip(values).collect();
        Self::from_pairs(schema, pairs)
    }

    /// Derive a vector with one field replaced. The result is validated.
    pub fn with_value(&self, idx: usize, value: FeatureValue) -> EngineResult<Self> {
        let field = self.schema.fields().get(idx).ok_or_else(|| {
            EngineError::validation(format!("field index {idx} out of range"))
        })?;
        let value = field.validate(&value).map_err(EngineError::validation)?;
        let mut values = self.values.clone();
        values[idx] = value;
        Ok(Self {
            schema: Arc::clone(&self.schema),
            values,
        })
    }

    /// Derive a vector from encoded numbers (saturating at field bounds).
    pub fn from_encoded(schema: Arc<FeatureSchema>, encoded: &[f64]) -> EngineResult<Self> {
        if encoded.len() != schema.len() {
            return Err(EngineError::validation(format!(
                "expected {} encoded values, got {}",
                schema.len(),
                encoded.len()
            )));
        }
        if let Some(pos) = encoded.iter().position(|x| !x.is_finite()) {
            return Err(EngineError::validation(format!(
                "`{}` encoded value is not finite",
                schema.fields()[pos].name
            )));
        }
        let values = schema
            .fields()
            .iter()
            .zip(encoded)
            .map(|(f, x)| f.decode(*x))
            .collect();
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn value_at(&self, idx: usize) -> &FeatureValue {
        &self.values[idx]
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldSpec, &FeatureValue)> {
        self.schema.fields().iter().zip(&self.values)
    }

    /// Numeric encoding in schema order.
    pub fn encode(&self) -> Vec<f64> {
        self.iter().map(|(f, v)| f.encode(v)).collect()
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl PartialEq for FeatureVector {
    fn eq(&self, other: &Self) -> bool {
        self.schema.same_layout(&other.schema) && self.values == other.values
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(&field.name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(
            FeatureSchema::builder("lending")
                .field(FieldSpec::continuous("income", 0.0, 1_000_000.0))
                .field(FieldSpec::continuous("debt_ratio", 0.0, 1.0))
                .field(FieldSpec::ordinal("open_loans", 0, 20))
                .field(FieldSpec::categorical("band", &["poor", "fair", "good"]))
                .field(FieldSpec::boolean("prior_default"))
                .build()
                .unwrap(),
        )
    }

    fn valid_json() -> JsonValue {
        json!({
            "income": 50000,
            "debt_ratio": 0.3,
            "open_loans": 2,
            "band": "fair",
            "prior_default": false
        })
    }

    #[test]
    fn from_json_builds_canonical_values_in_schema_order() {
        let v = FeatureVector::from_json(schema(), &valid_json()).unwrap();
        assert_eq!(v.value_at(0), &FeatureValue::Number(50_000.0));
        assert_eq!(v.get("open_loans"), Some(&FeatureValue::Integer(2)));
        assert_eq!(v.encode(), vec![50_000.0, 0.3, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn every_issue_is_reported_and_nothing_is_coerced() {
        let err = FeatureVector::from_json(
            schema(),
            &json!({
                "income": 50000,
                "debt_ratio": 1.7,
                "open_loans": 2.5,
                "band": "excellent",
                "surprise": 1
            }),
        )
        .unwrap_err();

        let EngineError::Validation(issues) = err else {
            panic!("expected validation error");
        };
        assert!(issues.iter().any(|m| m.contains("debt_ratio")));
        assert!(issues.iter().any(|m| m.contains("open_loans")));
        assert!(issues.iter().any(|m| m.contains("band")));
        assert!(issues.iter().any(|m| m.contains("unknown field `surprise`")));
        assert!(issues.iter().any(|m| m.contains("missing field `prior_default`")));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = FeatureVector::from_json(schema(), &json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn with_value_derives_a_new_vector() {
        let original = FeatureVector::from_json(schema(), &valid_json()).unwrap();
        let changed = original.with_value(1, FeatureValue::Number(0.42)).unwrap();
        assert_eq!(original.get("debt_ratio"), Some(&FeatureValue::Number(0.3)));
        assert_eq!(changed.get("debt_ratio"), Some(&FeatureValue::Number(0.42)));
        assert!(original.with_value(1, FeatureValue::Number(2.0)).is_err());
    }

    #[test]
    fn serializes_as_an_object_keyed_by_field_name() {
        let v = FeatureVector::from_json(schema(), &valid_json()).unwrap();
        assert_eq!(
            v.to_json(),
            json!({
                "income": 50000.0,
                "debt_ratio": 0.3,
                "open_loans": 2,
                "band": "fair",
                "prior_default": false
            })
        );
    }

    #[test]
    fn from_encoded_saturates_at_bounds() {
        let v = FeatureVector::from_encoded(schema(), &[50_000.0, 1.4, 25.0, 1.2, 1.0]).unwrap();
        assert_eq!(v.get("debt_ratio"), Some(&FeatureValue::Number(1.0)));
        assert_eq!(v.get("open_loans"), Some(&FeatureValue::Integer(20)));
        assert_eq!(v.get("band"), Some(&FeatureValue::Category("fair".into())));
    }
}
