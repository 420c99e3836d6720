//! Cell values
//!
//! A reference cell carries a literal, a perceptual sign, a dict keyed by
//! parameter name, a nested reference, or a runtime-only callable. Callables
//! exist only between function perception and actuation; they are never
//! persisted, so canonical serialization rejects them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::error::ReferenceError;
use super::sign::PerceptualSign;
use super::tensor::Reference;
use crate::body::ToolError;

/// Named arguments passed to a callable, keyed by parameter name
pub type CallableArgs = BTreeMap<String, CellValue>;

type CallableFn = dyn Fn(CallableArgs) -> BoxFuture<'static, Result<Vec<CellValue>, ToolError>> + Send + Sync;

/// An executable function handle produced by function perception.
///
/// Invocation returns a collection of cell values: a single-element vector
/// keeps the result axis singleton, a longer one grows it.
#[derive(Clone)]
pub struct Callable {
    name: String,
    func: Arc<CallableFn>,
}

impl Callable {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(CallableArgs) -> BoxFuture<'static, Result<Vec<CellValue>, ToolError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// A callable from a synchronous pure function (tests, formatting steps)
    pub fn from_sync<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(CallableArgs) -> Result<Vec<CellValue>, ToolError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, move |args| {
            let func = Arc::clone(&func);
            Box::pin(async move { func(args) })
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn invoke(&self, args: CallableArgs) -> Result<Vec<CellValue>, ToolError> {
        (self.func)(args).await
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("name", &self.name).finish()
    }
}

/// The tagged cell variant
#[derive(Debug, Clone)]
pub enum CellValue {
    /// A primitive or structured JSON value
    Literal(Value),
    /// A perceptual sign awaiting perception
    Sign(PerceptualSign),
    /// A dict keyed by parameter name (argument bundles, relation elements)
    Dict(BTreeMap<String, CellValue>),
    /// A nested reference (relations of relations)
    Reference(Box<Reference>),
    /// A runtime-only executable handle
    Callable(Callable),
}

impl CellValue {
    /// A string literal
    pub fn string(s: impl Into<String>) -> Self {
        CellValue::Literal(Value::String(s.into()))
    }

    /// A null literal (skip sentinel)
    pub fn null() -> Self {
        CellValue::Literal(Value::Null)
    }

    /// Build from a raw JSON leaf: strings with sign shape become signs
    pub fn from_leaf(value: Value) -> Self {
        if let Value::String(s) = &value {
            if let Some(sign) = PerceptualSign::try_parse(s) {
                return CellValue::Sign(sign);
            }
        }
        CellValue::Literal(value)
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            CellValue::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_sign(&self) -> Option<&PerceptualSign> {
        match self {
            CellValue::Sign(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, CellValue>> {
        match self {
            CellValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            CellValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            CellValue::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Literal(Value::Null))
    }

    /// Canonical tagged JSON encoding; callables are rejected
    pub fn to_json(&self) -> Result<Value, ReferenceError> {
        Ok(match self {
            CellValue::Literal(v) => serde_json::json!({"kind": "literal", "value": v}),
            CellValue::Sign(s) => serde_json::json!({
                "kind": "sign",
                "norm": s.norm.name(),
                "id": s.id,
                "payload": s.payload,
            }),
            CellValue::Dict(d) => {
                let mut entries = serde_json::Map::new();
                for (k, v) in d {
                    entries.insert(k.clone(), v.to_json()?);
                }
                serde_json::json!({"kind": "dict", "entries": entries})
            }
            CellValue::Reference(r) => serde_json::json!({"kind": "reference", "value": r.to_canonical()?}),
            CellValue::Callable(_) => return Err(ReferenceError::NotSerializable),
        })
    }

    /// Decode the canonical tagged encoding
    pub fn from_json(value: &Value) -> Result<Self, ReferenceError> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| ReferenceError::BadCanonical("cell missing kind".into()))?;
        match kind {
            "literal" => Ok(CellValue::Literal(
                value.get("value").cloned().unwrap_or(Value::Null),
            )),
            "sign" => {
                let norm = value
                    .get("norm")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ReferenceError::BadCanonical("sign missing norm".into()))?;
                let norm = super::sign::SignNorm::parse(norm)?;
                let id = value.get("id").and_then(Value::as_str).unwrap_or("");
                let payload = value.get("payload").and_then(Value::as_str).unwrap_or("");
                Ok(CellValue::Sign(PerceptualSign::new(norm, id, payload)))
            }
            "dict" => {
                let entries = value
                    .get("entries")
                    .and_then(Value::as_object)
                    .ok_or_else(|| ReferenceError::BadCanonical("dict missing entries".into()))?;
                let mut dict = BTreeMap::new();
                for (k, v) in entries {
                    dict.insert(k.clone(), CellValue::from_json(v)?);
                }
                Ok(CellValue::Dict(dict))
            }
            "reference" => {
                let inner = value
                    .get("value")
                    .ok_or_else(|| ReferenceError::BadCanonical("reference missing value".into()))?;
                Ok(CellValue::Reference(Box::new(Reference::from_canonical(inner)?)))
            }
            other => Err(ReferenceError::BadCanonical(format!("unknown cell kind: {other}"))),
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Literal(a), CellValue::Literal(b)) => a == b,
            (CellValue::Sign(a), CellValue::Sign(b)) => a == b,
            (CellValue::Dict(a), CellValue::Dict(b)) => a == b,
            (CellValue::Reference(a), CellValue::Reference(b)) => a == b,
            (CellValue::Callable(a), CellValue::Callable(b)) => Arc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_leaf_detects_signs() {
        let cell = CellValue::from_leaf(Value::String("%{truth_value}(true)".into()));
        assert!(matches!(cell, CellValue::Sign(_)));

        let cell = CellValue::from_leaf(Value::String("plain".into()));
        assert!(matches!(cell, CellValue::Literal(_)));

        let cell = CellValue::from_leaf(serde_json::json!(42));
        assert_eq!(cell.as_literal(), Some(&serde_json::json!(42)));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut dict = BTreeMap::new();
        dict.insert("a".to_string(), CellValue::string("x"));
        dict.insert("b".to_string(), CellValue::Sign(PerceptualSign::truth(false)));
        let cell = CellValue::Dict(dict);

        let json = cell.to_json().unwrap();
        let back = CellValue::from_json(&json).unwrap();
        assert_eq!(cell, back);
    }

    #[test]
    fn test_callable_not_serializable() {
        let c = CellValue::Callable(Callable::from_sync("id", |_| Ok(vec![CellValue::null()])));
        assert!(matches!(c.to_json(), Err(ReferenceError::NotSerializable)));
    }

    #[tokio::test]
    async fn test_callable_invoke() {
        let c = Callable::from_sync("double", |args| {
            let n = args
                .get("input_1")
                .and_then(|v| v.as_literal())
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Ok(vec![CellValue::Literal(serde_json::json!(n * 2))])
        });

        let mut args = BTreeMap::new();
        args.insert("input_1".to_string(), CellValue::Literal(serde_json::json!(21)));
        let out = c.invoke(args).await.unwrap();
        assert_eq!(out[0].as_literal(), Some(&serde_json::json!(42)));
    }
}
