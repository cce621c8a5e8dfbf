use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison predicate applied to an image property
/// Same set as the `ee.Filter` comparison constructors (eq, neq, lt, lte, gt, gte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FilterOp {
    /// Operator as written in a catalog filter expression
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "!=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
        }
    }
}

impl FromStr for FilterOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" | "==" => Ok(FilterOp::Eq),
            "neq" | "!=" => Ok(FilterOp::Neq),
            "lt" | "<" => Ok(FilterOp::Lt),
            "lte" | "<=" => Ok(FilterOp::Lte),
            "gt" | ">" => Ok(FilterOp::Gt),
            "gte" | ">=" => Ok(FilterOp::Gte),
            other => anyhow::bail!("Unknown filter operator: {}", other),
        }
    }
}

/// Threshold compared against the property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Number(value as f64)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Text(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub property: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// Attribute filters keyed by property name
/// At most one predicate per property: adding a property again replaces its
/// predicate and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFilters {
    filters: Vec<PropertyFilter>,
}

impl CustomFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, property: &str, op: FilterOp, value: impl Into<FilterValue>) {
        let value = value.into();
        match self.filters.iter_mut().find(|f| f.property == property) {
            Some(existing) => {
                existing.op = op;
                existing.value = value;
            }
            None => self.filters.push(PropertyFilter {
                property: property.to_string(),
                op,
                value,
            }),
        }
    }

    pub fn get(&self, property: &str) -> Option<&PropertyFilter> {
        self.filters.iter().find(|f| f.property == property)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyFilter> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Render as a catalog filter expression, e.g.
    /// `properties.CLOUDY_PIXEL_PERCENTAGE <= 30 AND properties.SPACECRAFT_NAME = "Sentinel-2A"`
    pub fn to_query(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }

        let clauses: Vec<String> = self
            .filters
            .iter()
            .map(|f| format!("properties.{} {} {}", f.property, f.op.symbol(), f.value))
            .collect();

        Some(clauses.join(" AND "))
    }

    /// Parse a `PROPERTY<op>VALUE` expression from the command line
    /// and add it. Numeric values become numbers, anything else is compared as text.
    pub fn add_expression(&mut self, expression: &str) -> Result<()> {
        let (property, op, value) = split_expression(expression)
            .with_context(|| format!("Invalid filter expression: {}", expression))?;

        let value = match value.parse::<f64>() {
            Ok(n) if n.is_finite() => FilterValue::Number(n),
            Ok(_) => anyhow::bail!(
                "Invalid filter expression: {}: {} is not a finite number",
                expression,
                value
            ),
            Err(_) => FilterValue::Text(unquote(value).to_string()),
        };
        self.add_filter(property, op, value);
        Ok(())
    }
}

/// Operators, longest first so "<=" is not read as "<"
const OPERATORS: [&str; 7] = ["<=", ">=", "!=", "==", "<", ">", "="];

/// Split on the leftmost operator; the property must be a plain identifier
fn split_expression(expression: &str) -> Result<(&str, FilterOp, &str)> {
    let idx = expression
        .find(['<', '>', '!', '='])
        .context("no comparison operator found")?;
    let rest = &expression[idx..];
    let symbol = OPERATORS
        .into_iter()
        .find(|symbol| rest.starts_with(*symbol))
        .with_context(|| format!("unknown operator at '{}'", rest))?;

    let property = expression[..idx].trim();
    let value = rest[symbol.len()..].trim();
    if property.is_empty() || value.is_empty() {
        anyhow::bail!("expected PROPERTY{}VALUE", symbol);
    }
    if !property
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        anyhow::bail!("invalid property name '{}'", property);
    }

    Ok((property, symbol.parse()?, value))
}

/// Strip one pair of matching single or double quotes
fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
