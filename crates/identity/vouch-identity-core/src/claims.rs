//! Provider-sourced claim values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Claims copied from the provider's ID token or userinfo payload, keyed by claim name.
pub type CustomClaims = BTreeMap<String, ClaimValue>;

/// A single claim value as delivered by the upstream provider.
///
/// Only the shapes that can be projected into a response header get their own
/// variant; everything else lands in [`ClaimValue::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    String(String),
    Bool(bool),
    Number(serde_json::Number),
    List(Vec<String>),
    Other(serde_json::Value),
}

impl ClaimValue {
    /// Render the value for use as an HTTP header value.
    ///
    /// Lists become a comma separated sequence of double-quoted elements,
    /// scalars their plain string form. Returns `None` for any other shape.
    pub fn header_value(&self) -> Option<String> {
        match self {
            ClaimValue::String(s) => Some(s.clone()),
            ClaimValue::Bool(b) => Some(b.to_string()),
            ClaimValue::Number(n) => Some(n.to_string()),
            ClaimValue::List(items) => Some(
                items
                    .iter()
                    .map(|item| format!("\"{}\"", item))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ClaimValue::Other(_) => None,
        }
    }

    /// The string elements of the value, if it is a string or a list of strings.
    pub fn as_strings(&self) -> Vec<String> {
        match self {
            ClaimValue::String(s) => vec![s.clone()],
            ClaimValue::List(items) => items.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<serde_json::Value> for ClaimValue {
    fn from(value: serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(ClaimValue::Other(value))
    }
}

/// Convert a JSON object into [`CustomClaims`], ignoring non-object input.
pub fn claims_from_json(value: &serde_json::Value) -> CustomClaims {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), ClaimValue::from(v.clone())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claim_shapes_are_sniffed() {
        assert_eq!(
            ClaimValue::from(json!("admin")),
            ClaimValue::String("admin".into())
        );
        assert_eq!(ClaimValue::from(json!(true)), ClaimValue::Bool(true));
        assert!(matches!(ClaimValue::from(json!(42)), ClaimValue::Number(_)));
        assert_eq!(
            ClaimValue::from(json!(["a", "b"])),
            ClaimValue::List(vec!["a".into(), "b".into()])
        );
        assert!(matches!(
            ClaimValue::from(json!({"nested": 1})),
            ClaimValue::Other(_)
        ));
        assert!(matches!(
            ClaimValue::from(json!(["a", 1])),
            ClaimValue::Other(_)
        ));
    }

    #[test]
    fn test_list_header_value_is_quoted() {
        let value = ClaimValue::List(vec!["a".into(), "b".into()]);
        assert_eq!(value.header_value().as_deref(), Some("\"a\",\"b\""));
    }

    #[test]
    fn test_scalar_header_values() {
        assert_eq!(
            ClaimValue::String("x".into()).header_value().as_deref(),
            Some("x")
        );
        assert_eq!(
            ClaimValue::from(json!(3.5)).header_value().as_deref(),
            Some("3.5")
        );
        assert_eq!(
            ClaimValue::Bool(false).header_value().as_deref(),
            Some("false")
        );
        assert_eq!(ClaimValue::from(json!(null)).header_value(), None);
    }

    #[test]
    fn test_claims_from_json() {
        let claims = claims_from_json(&json!({
            "groups": ["dev", "ops"],
            "email_verified": true
        }));
        assert_eq!(claims.len(), 2);
        assert_eq!(claims["groups"].as_strings(), vec!["dev", "ops"]);

        assert!(claims_from_json(&json!("not an object")).is_empty());
    }
}
