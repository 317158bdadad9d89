//! Ordered condition set and placeholder parsing.
//!
//! Conditions are keyed by [`ParamKey`], whose ordering is driven by the
//! sequence number assigned when the condition was added. Iterating a
//! [`Conditions`] therefore yields predicates, and their bound values, in the
//! exact order the caller supplied them.

use std::collections::BTreeMap;

use crate::{ModelError, Value};

/// Marker standing for a bound value inside a condition.
pub const PLACEHOLDER: char = '?';

const OPERATORS: &[&str] = &[
    "=", "!=", "<>", ">", ">=", "<", "<=", "LIKE", "NOT LIKE", "ILIKE", "NOT ILIKE",
];

/// Key of a pending WHERE predicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamKey {
    sequence: usize,
    column: String,
    operator: String,
}

impl ParamKey {
    /// Equality predicate on `column`.
    pub fn new(sequence: usize, column: impl Into<String>) -> Self {
        Self::with_operator(sequence, column, "=")
    }

    pub fn with_operator(
        sequence: usize,
        column: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            sequence,
            column: column.into(),
            operator: operator.into(),
        }
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }
}

/// Pending WHERE predicates in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    params: BTreeMap<ParamKey, Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next condition will receive.
    pub fn next_sequence(&self) -> usize {
        self.params.len() + 1
    }

    /// Append a predicate after every existing one.
    pub fn push(
        &mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let key = ParamKey::with_operator(self.next_sequence(), column, operator);
        self.params.insert(key, value.into());
    }

    pub fn insert(&mut self, key: ParamKey, value: Value) {
        self.params.insert(key, value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.params.keys()
    }

    /// Bound values in predicate order.
    pub fn values(&self) -> Vec<Value> {
        self.params.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &Value)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }
}

/// Normalize an operator and check it against the supported set.
pub fn normalize_operator(operator: &str) -> Result<String, ModelError> {
    let normalized = operator
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        return Ok("=".to_string());
    }
    if OPERATORS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(ModelError::malformed(format!(
            "unsupported operator '{}'",
            operator.trim()
        )))
    }
}

/// Split `"age > ?"` into `("age", ">")`.
///
/// A name without a placeholder is an equality on the whole (trimmed) name.
pub fn parse_inline_operator(name: &str) -> Result<(String, String), ModelError> {
    let name = name.trim();
    let Some(marker) = name.find(PLACEHOLDER) else {
        return Ok((name.to_string(), "=".to_string()));
    };
    if marker != name.len() - 1 {
        return Err(ModelError::malformed(format!(
            "placeholder must close the condition: '{}'",
            name
        )));
    }

    let body = name[..marker].trim();
    let split = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(body.len());
    let (column, operator) = body.split_at(split);
    if column.is_empty() {
        return Err(ModelError::malformed(format!(
            "missing column in condition '{}'",
            name
        )));
    }

    Ok((column.to_string(), normalize_operator(operator)?))
}

/// Parse `"age > ? AND age < ?"` into one key per placeholder.
///
/// Sequences are assigned left to right starting at `start`.
pub fn parse_template(start: usize, template: &str) -> Result<Vec<ParamKey>, ModelError> {
    let mut segments: Vec<Vec<&str>> = vec![Vec::new()];
    for token in template.split_whitespace() {
        if token.eq_ignore_ascii_case("and") {
            segments.push(Vec::new());
        } else if let Some(current) = segments.last_mut() {
            current.push(token);
        }
    }

    let mut keys = Vec::with_capacity(segments.len());
    for (offset, segment) in segments.iter().enumerate() {
        let segment = segment.join(" ");
        if !segment.contains(PLACEHOLDER) {
            return Err(ModelError::malformed(format!(
                "condition '{}' in '{}' has no placeholder",
                segment, template
            )));
        }
        let (column, operator) = parse_inline_operator(&segment)?;
        keys.push(ParamKey::with_operator(start + offset, column, operator));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_operator_defaults_to_equality() {
        assert_eq!(
            parse_inline_operator("name").unwrap(),
            ("name".to_string(), "=".to_string())
        );
        assert_eq!(
            parse_inline_operator("name ?").unwrap(),
            ("name".to_string(), "=".to_string())
        );
    }

    #[test]
    fn inline_operator_with_and_without_spaces() {
        assert_eq!(
            parse_inline_operator("age >= ?").unwrap(),
            ("age".to_string(), ">=".to_string())
        );
        assert_eq!(
            parse_inline_operator("age<?").unwrap(),
            ("age".to_string(), "<".to_string())
        );
        assert_eq!(
            parse_inline_operator("u.name not  like ?").unwrap(),
            ("u.name".to_string(), "NOT LIKE".to_string())
        );
    }

    #[test]
    fn inline_operator_rejects_bad_syntax() {
        assert!(matches!(
            parse_inline_operator("? = age"),
            Err(ModelError::MalformedCondition(_))
        ));
        assert!(matches!(
            parse_inline_operator("age ~~ ?"),
            Err(ModelError::MalformedCondition(_))
        ));
        assert!(matches!(
            parse_inline_operator("> ?"),
            Err(ModelError::MalformedCondition(_))
        ));
    }

    #[test]
    fn template_yields_keys_in_order() {
        let keys = parse_template(1, "age > ? AND age < ?").unwrap();
        assert_eq!(
            keys,
            vec![
                ParamKey::with_operator(1, "age", ">"),
                ParamKey::with_operator(2, "age", "<"),
            ]
        );
    }

    #[test]
    fn template_numbering_starts_at_offset() {
        let keys = parse_template(4, "name like ? and status = ?").unwrap();
        assert_eq!(keys[0].sequence(), 4);
        assert_eq!(keys[0].operator(), "LIKE");
        assert_eq!(keys[1].sequence(), 5);
        assert_eq!(keys[1].column(), "status");
    }

    #[test]
    fn template_without_marker_is_malformed() {
        assert!(parse_template(1, "age > 3").is_err());
        assert!(parse_template(1, "age > ? AND active").is_err());
    }

    #[test]
    fn conditions_iterate_in_call_order() {
        let mut conditions = Conditions::new();
        conditions.push("zeta", "=", 1i64);
        conditions.push("alpha", ">", 2i64);
        conditions.push("mid", "LIKE", "x%");

        let columns: Vec<&str> = conditions.keys().map(ParamKey::column).collect();
        assert_eq!(columns, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            conditions.values(),
            vec![Value::from(1i64), Value::from(2i64), Value::from("x%")]
        );
    }
}
