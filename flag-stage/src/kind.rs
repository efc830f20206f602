use crate::context::EvaluationContext;
use crate::errors::{EvaluationError, StageError};
use crate::evaluator::{FlagEvaluator, ObjectValue};
use http::HeaderName;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Declared value type of a flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Int,
    Float,
    String,
    Bool,
    Object,
}

impl FlagKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int" => Some(FlagKind::Int),
            "float" => Some(FlagKind::Float),
            "string" => Some(FlagKind::String),
            "bool" => Some(FlagKind::Bool),
            "object" => Some(FlagKind::Object),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Int => "int",
            FlagKind::Float => "float",
            FlagKind::String => "string",
            FlagKind::Bool => "bool",
            FlagKind::Object => "object",
        }
    }

    /// Zero value passed as the evaluation default and used on failure.
    pub fn default_value(&self) -> FlagValue {
        match self {
            FlagKind::Int => FlagValue::Int(0),
            FlagKind::Float => FlagValue::Float(0.0),
            FlagKind::String => FlagValue::String(String::new()),
            FlagKind::Bool => FlagValue::Bool(false),
            FlagKind::Object => FlagValue::Object(ObjectValue::new()),
        }
    }

    /// Evaluates `key` with the typed operation matching this kind.
    pub async fn evaluate(
        &self,
        evaluator: &dyn FlagEvaluator,
        key: &str,
        ctx: &EvaluationContext,
    ) -> Result<FlagValue, EvaluationError> {
        let value = match self {
            FlagKind::Int => FlagValue::Int(evaluator.evaluate_int(key, 0, ctx).await?),
            FlagKind::Float => FlagValue::Float(evaluator.evaluate_float(key, 0.0, ctx).await?),
            FlagKind::String => {
                FlagValue::String(evaluator.evaluate_string(key, String::new(), ctx).await?)
            }
            FlagKind::Bool => FlagValue::Bool(evaluator.evaluate_bool(key, false, ctx).await?),
            FlagKind::Object => {
                FlagValue::Object(evaluator.evaluate_object(key, ObjectValue::new(), ctx).await?)
            }
        };
        Ok(value)
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed flag value as returned by an evaluator.
#[derive(Clone, Debug, PartialEq)]
pub enum FlagValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Object(ObjectValue),
}

impl FlagValue {
    /// Canonical string form used as the header value.
    pub fn encode(&self) -> String {
        match self {
            FlagValue::Int(v) => v.to_string(),
            // Display for f64 is the shortest text that round-trips
            FlagValue::Float(v) => v.to_string(),
            FlagValue::String(v) => v.clone(),
            FlagValue::Bool(v) => v.to_string(),
            FlagValue::Object(v) => serde_json::Value::Object(v.clone()).to_string(),
        }
    }
}

/// A configured flag with its precomputed header name.
#[derive(Clone, Debug)]
pub struct FlagDef {
    pub key: String,
    pub kind: FlagKind,
    pub header: HeaderName,
}

/// The set of flags evaluated on every request. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct FlagSpec {
    flags: Vec<FlagDef>,
}

impl FlagSpec {
    /// Builds the flag set from the configured key to kind mapping.
    ///
    /// Unknown kinds are skipped so that they produce no header.
    pub fn from_config(flags: &HashMap<String, String>, prefix: &str) -> Result<Self, StageError> {
        let mut defs = Vec::with_capacity(flags.len());

        for (key, kind) in flags {
            let Some(kind) = FlagKind::parse(kind) else {
                tracing::warn!(flag = %key, %kind, "Skipping flag with unknown kind");
                continue;
            };

            let header_name = format!("{prefix}{key}");
            let header = HeaderName::try_from(header_name.as_str())
                .map_err(|_| StageError::InvalidHeaderName(key.clone(), header_name.clone()))?;

            defs.push(FlagDef {
                key: key.clone(),
                kind,
                header,
            });
        }

        // Stable order keeps logs and task spawning deterministic
        defs.sort_by(|a, b| a.key.cmp(&b.key));

        // Header names are case-insensitive, so distinct keys can still collide
        let mut seen = HashSet::with_capacity(defs.len());
        for def in &defs {
            if !seen.insert(&def.header) {
                return Err(StageError::DuplicateHeaderName(
                    def.key.clone(),
                    def.header.to_string(),
                ));
            }
        }

        Ok(Self { flags: defs })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagDef> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(kind: FlagKind, s: &str) -> FlagValue {
        match kind {
            FlagKind::Int => FlagValue::Int(s.parse().unwrap()),
            FlagKind::Float => FlagValue::Float(s.parse().unwrap()),
            FlagKind::String => FlagValue::String(s.to_string()),
            FlagKind::Bool => FlagValue::Bool(s.parse().unwrap()),
            FlagKind::Object => match serde_json::from_str(s).unwrap() {
                serde_json::Value::Object(map) => FlagValue::Object(map),
                other => panic!("not an object: {other}"),
            },
        }
    }

    #[test]
    fn test_parse_kind() {
        for kind in [
            FlagKind::Int,
            FlagKind::Float,
            FlagKind::String,
            FlagKind::Bool,
            FlagKind::Object,
        ] {
            assert_eq!(FlagKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FlagKind::parse("boolean"), None);
        assert_eq!(FlagKind::parse("Int"), None);
        assert_eq!(FlagKind::parse(""), None);
    }

    #[test]
    fn test_default_encoding() {
        assert_eq!(FlagKind::Int.default_value().encode(), "0");
        assert_eq!(FlagKind::Float.default_value().encode(), "0");
        assert_eq!(FlagKind::String.default_value().encode(), "");
        assert_eq!(FlagKind::Bool.default_value().encode(), "false");
        assert_eq!(FlagKind::Object.default_value().encode(), "{}");
    }

    #[test]
    fn test_encoding() {
        assert_eq!(FlagValue::Int(-17).encode(), "-17");
        assert_eq!(FlagValue::Float(1.5).encode(), "1.5");
        assert_eq!(FlagValue::Float(0.1).encode(), "0.1");
        assert_eq!(FlagValue::Float(1e21).encode(), "1000000000000000000000");
        assert_eq!(FlagValue::Bool(true).encode(), "true");
        assert_eq!(FlagValue::String("v2 beta".into()).encode(), "v2 beta");

        let serde_json::Value::Object(obj) = json!({"b": [1, 2], "a": {"c": null}}) else {
            unreachable!()
        };
        assert_eq!(
            FlagValue::Object(obj).encode(),
            r#"{"a":{"c":null},"b":[1,2]}"#
        );
    }

    #[test]
    fn test_encoding_round_trips() {
        let serde_json::Value::Object(obj) = json!({"tier": "gold", "limit": 10}) else {
            unreachable!()
        };
        let values = [
            (FlagKind::Int, FlagValue::Int(i64::MIN)),
            (FlagKind::Int, FlagValue::Int(42)),
            (FlagKind::Float, FlagValue::Float(std::f64::consts::PI)),
            (FlagKind::Float, FlagValue::Float(-2.5e-8)),
            (FlagKind::String, FlagValue::String("línea".into())),
            (FlagKind::Bool, FlagValue::Bool(true)),
            (FlagKind::Object, FlagValue::Object(obj)),
        ];

        for (kind, value) in values {
            assert_eq!(decode(kind, &value.encode()), value);
            let default = kind.default_value();
            assert_eq!(decode(kind, &default.encode()), default);
        }
    }

    #[test]
    fn test_flag_spec_from_config() {
        let flags = HashMap::from([
            ("api_v2".to_string(), "bool".to_string()),
            ("index".to_string(), "int".to_string()),
            ("legacy".to_string(), "enum".to_string()),
        ]);

        let spec = FlagSpec::from_config(&flags, "openfeature_").unwrap();
        assert_eq!(spec.len(), 2);

        let defs: Vec<_> = spec.iter().collect();
        assert_eq!(defs[0].key, "api_v2");
        assert_eq!(defs[0].kind, FlagKind::Bool);
        assert_eq!(defs[0].header, "openfeature_api_v2");
        assert_eq!(defs[1].key, "index");
    }

    #[test]
    fn test_flag_spec_invalid_header_name() {
        let flags = HashMap::from([("has space".to_string(), "bool".to_string())]);

        assert!(matches!(
            FlagSpec::from_config(&flags, "openfeature_"),
            Err(StageError::InvalidHeaderName(..))
        ));
    }

    #[test]
    fn test_flag_spec_case_insensitive_collision() {
        let flags = HashMap::from([
            ("Beta".to_string(), "bool".to_string()),
            ("beta".to_string(), "bool".to_string()),
        ]);

        let err = FlagSpec::from_config(&flags, "openfeature_").unwrap_err();
        assert!(matches!(
            err,
            StageError::DuplicateHeaderName(ref key, ref header)
                if key == "beta" && header == "openfeature_beta"
        ));

        // Skipped kinds never claim a header name
        let flags = HashMap::from([
            ("Beta".to_string(), "bool".to_string()),
            ("beta".to_string(), "enum".to_string()),
        ]);
        assert_eq!(FlagSpec::from_config(&flags, "openfeature_").unwrap().len(), 1);
    }
}
