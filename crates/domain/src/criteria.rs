//! Turns raw list parameters into a filter predicate.
//!
//! Every non-reserved key becomes one condition and all conditions are
//! AND-combined. Operators are written either qs-style in the key
//! (`views[gte]=10`) or as a prefix of the value (`views=gte:10`).

use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};

pub const RESERVED_KEYS: [&str; 5] = ["page", "limit", "sort", "search", "populate"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    fn push(self, value: String) -> Self {
        match self {
            ParamValue::One(first) => ParamValue::Many(vec![first, value]),
            ParamValue::Many(mut values) => {
                values.push(value);
                ParamValue::Many(values)
            }
        }
    }

    pub fn first(&self) -> &str {
        match self {
            ParamValue::One(v) => v,
            ParamValue::Many(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }
}

/// Query-string parameters grouped by key; repeated keys collapse into `Many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: BTreeMap<String, ParamValue> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            let next = match map.remove(&key) {
                Some(existing) => existing.push(value),
                None => ParamValue::One(value),
            };
            map.insert(key, next);
        }
        Self(map)
    }

    /// First value of `key`, with blank values treated as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(ParamValue::first)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn filters(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    IsNull,
}

impl Operator {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            "in" => Some(Operator::In),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    /// `raw` is the literal as sent; a JSON string field only equals that.
    Number { value: f64, raw: String },
    Bool(bool),
}

impl Scalar {
    /// Short decimal literals become numbers; ids and other text stay text.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => return Scalar::Bool(true),
            "false" => return Scalar::Bool(false),
            _ => {}
        }
        if raw.len() <= 15 && looks_numeric(raw) {
            if let Ok(n) = raw.parse::<f64>() {
                return Scalar::Number {
                    value: n,
                    raw: raw.to_string(),
                };
            }
        }
        Scalar::Text(raw.to_string())
    }

    /// Text form of the value, for matching fields stored as strings.
    pub fn literal(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number { raw, .. } => raw.clone(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn looks_numeric(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let mut parts = digits.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_ok = parts
        .next()
        .map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
    !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit()) && frac_ok
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub values: Vec<Scalar>,
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: Operator::Eq,
            values: vec![Scalar::Text(value.into())],
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: Operator::IsNull,
            values: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub conditions: Vec<Condition>,
}

impl Criteria {
    pub fn is_unconstrained(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Field names end up in JSON paths, so only identifier-like names pass.
pub fn check_field_name(field: &str) -> AppResult<()> {
    let mut chars = field.chars();
    let head_ok = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if head_ok && rest_ok && !field.ends_with('.') && !field.contains("..") {
        Ok(())
    } else {
        Err(AppError::validation(format!("invalid field name '{}'", field)))
    }
}

pub fn compile(params: &QueryParams) -> AppResult<Criteria> {
    let conditions = params
        .filters()
        .map(|(key, value)| compile_condition(key, value))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Criteria { conditions })
}

fn compile_condition(key: &str, value: &ParamValue) -> AppResult<Condition> {
    let (field, key_op) = split_key(key)?;
    check_field_name(field)?;

    let raw: Vec<&str> = match value {
        ParamValue::One(v) => vec![v.as_str()],
        ParamValue::Many(values) => values.iter().map(String::as_str).collect(),
    };

    let (op, operands) = match key_op {
        Some(op) => (op, raw),
        None if raw.len() == 1 => match split_value(raw[0]) {
            Some((op, rest)) => (op, vec![rest]),
            None => (Operator::Eq, raw),
        },
        None => (Operator::In, raw),
    };

    let values = match op {
        Operator::In => operands
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Scalar::parse)
            .collect::<Vec<_>>(),
        _ => match operands.as_slice() {
            [single] if !single.trim().is_empty() || op == Operator::Eq => {
                vec![Scalar::parse(single.trim())]
            }
            [_] => {
                return Err(AppError::validation(format!(
                    "operator on '{}' needs an operand",
                    field
                )))
            }
            _ => {
                return Err(AppError::validation(format!(
                    "'{}' takes a single value",
                    key
                )))
            }
        },
    };

    if values.is_empty() {
        return Err(AppError::validation(format!(
            "'{}' needs at least one value",
            key
        )));
    }

    Ok(Condition {
        field: field.to_string(),
        op,
        values,
    })
}

fn split_key(key: &str) -> AppResult<(&str, Option<Operator>)> {
    match key.split_once('[') {
        None => Ok((key, None)),
        Some((field, rest)) => {
            let token = rest.strip_suffix(']').ok_or_else(|| {
                AppError::validation(format!("malformed filter key '{}'", key))
            })?;
            let op = Operator::from_token(token).ok_or_else(|| {
                AppError::validation(format!("unknown operator '{}' in '{}'", token, key))
            })?;
            Ok((field, Some(op)))
        }
    }
}

fn split_value(value: &str) -> Option<(Operator, &str)> {
    let (token, rest) = value.split_once(':')?;
    Operator::from_token(token.trim()).map(|op| (op, rest))
}
