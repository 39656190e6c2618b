//! Request parameters and their normalization.
//!
//! Incoming payloads are loosely typed: keys are strings and page values may
//! be numbers or numeric strings. [`normalize`] turns them into [`Params`],
//! dropping every key the pipeline does not recognize.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{QueryError, QueryResult};
use crate::query::FilterValue;

/// Field name to filter value, in request order.
pub type FilterMap = IndexMap<String, FilterValue>;

/// Canonical request parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Page window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageParam>,

    /// Sort field, prefixed with `-` for descending order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// Equality filters (or custom rule input) per field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterMap>,
}

/// Page window in one of the two paginator styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageParam {
    /// `size` items per page, 1-based `number` (defaults to 1).
    Classic {
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        number: Option<u64>,
    },
    /// Raw `limit` and `offset` (defaults to 0).
    Raw {
        limit: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
    },
}

impl PageParam {
    pub fn classic(size: u64, number: u64) -> Self {
        PageParam::Classic {
            size,
            number: Some(number),
        }
    }

    pub fn raw(limit: u64, offset: u64) -> Self {
        PageParam::Raw {
            limit,
            offset: Some(offset),
        }
    }

    /// Items per page: `size` or `limit`.
    pub fn page_size(&self) -> u64 {
        match self {
            PageParam::Classic { size, .. } => *size,
            PageParam::Raw { limit, .. } => *limit,
        }
    }

    /// Offset of the first item in the window.
    pub fn offset(&self) -> u64 {
        match self {
            PageParam::Classic { size, number } => {
                number.unwrap_or(1).saturating_sub(1).saturating_mul(*size)
            }
            PageParam::Raw { offset, .. } => offset.unwrap_or(0),
        }
    }
}

/// Recognized top-level parameter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey {
    Page,
    Sort,
    Filter,
}

impl FromStr for ParamKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(ParamKey::Page),
            "sort" => Ok(ParamKey::Sort),
            "filter" => Ok(ParamKey::Filter),
            other => Err(QueryError::unknown_identifier(other)),
        }
    }
}

/// Recognized page sub-keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKey {
    Number,
    Size,
    Offset,
    Limit,
}

impl PageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PageKey::Number => "number",
            PageKey::Size => "size",
            PageKey::Offset => "offset",
            PageKey::Limit => "limit",
        }
    }
}

impl FromStr for PageKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(PageKey::Number),
            "size" => Ok(PageKey::Size),
            "offset" => Ok(PageKey::Offset),
            "limit" => Ok(PageKey::Limit),
            other => Err(QueryError::unknown_identifier(other)),
        }
    }
}

/// Parameters as received, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawParams {
    /// A loosely typed JSON object.
    Loose(Map<String, Value>),
    /// Already-canonical parameters; normalization returns them unchanged.
    Canonical(Params),
}

impl RawParams {
    /// Build loose parameters from a JSON value.
    ///
    /// Anything other than an object is rejected.
    pub fn from_json(value: Value) -> QueryResult<Self> {
        match value {
            Value::Object(map) => Ok(RawParams::Loose(map)),
            other => Err(QueryError::InvalidParams(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Build loose parameters from URL query pairs.
    ///
    /// Understands `sort=-foo`, `page[size]=5`, and `filter[bar]=1`. Values
    /// stay strings; pairs with any other key shape are dropped. A repeated
    /// key keeps its last value.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut map = Map::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = Value::String(value.into());

            match split_bracket_key(key) {
                Some((outer, inner)) => {
                    let entry = map
                        .entry(outer.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(nested) = entry {
                        nested.insert(inner.to_string(), value);
                    }
                }
                None if !key.contains('[') && !key.contains(']') => {
                    map.insert(key.to_string(), value);
                }
                None => {
                    tracing::debug!(key = key, "dropping malformed query parameter");
                }
            }
        }

        RawParams::Loose(map)
    }
}

impl From<Params> for RawParams {
    fn from(params: Params) -> Self {
        RawParams::Canonical(params)
    }
}

impl From<Map<String, Value>> for RawParams {
    fn from(map: Map<String, Value>) -> Self {
        RawParams::Loose(map)
    }
}

/// Split `outer[inner]` into its two parts.
fn split_bracket_key(key: &str) -> Option<(&str, &str)> {
    let (outer, rest) = key.split_once('[')?;
    let inner = rest.strip_suffix(']')?;
    if outer.is_empty() || inner.is_empty() || inner.contains(['[', ']']) {
        return None;
    }
    Some((outer, inner))
}

/// Normalize raw parameters into their canonical form.
///
/// Absence is preserved: `None` stays `None`. Unrecognized top-level and
/// page keys are dropped; values of recognized keys must have the right
/// shape.
pub fn normalize(raw: Option<RawParams>) -> QueryResult<Option<Params>> {
    match raw {
        None => Ok(None),
        Some(RawParams::Canonical(params)) => Ok(Some(params)),
        Some(RawParams::Loose(map)) => normalize_map(map).map(Some),
    }
}

fn normalize_map(map: Map<String, Value>) -> QueryResult<Params> {
    let mut params = Params::default();

    for (key, value) in map {
        let Ok(param_key) = key.parse::<ParamKey>() else {
            tracing::debug!(key = %key, "dropping unrecognized parameter");
            continue;
        };

        match param_key {
            ParamKey::Page => params.page = normalize_page(value)?,
            ParamKey::Sort => params.sort = normalize_sort(value)?,
            ParamKey::Filter => params.filter = normalize_filter(value)?,
        }
    }

    Ok(params)
}

fn normalize_sort(value: Value) -> QueryResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(QueryError::InvalidParams(format!(
            "sort must be a string, got {}",
            json_kind(&other)
        ))),
    }
}

fn normalize_filter(value: Value) -> QueryResult<Option<FilterMap>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(entries) => Ok(Some(
            entries
                .into_iter()
                .map(|(field, value)| (field, FilterValue::from(value)))
                .collect(),
        )),
        other => Err(QueryError::InvalidParams(format!(
            "filter must be an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn normalize_page(value: Value) -> QueryResult<Option<PageParam>> {
    let entries = match value {
        Value::Null => return Ok(None),
        Value::Object(entries) => entries,
        other => {
            return Err(QueryError::InvalidPageParam(format!(
                "page must be an object, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut number = None;
    let mut size = None;
    let mut offset = None;
    let mut limit = None;

    for (key, value) in entries {
        let Ok(page_key) = key.parse::<PageKey>() else {
            tracing::debug!(key = %key, "dropping unrecognized page parameter");
            continue;
        };
        let parsed = page_value(page_key, value)?;
        match page_key {
            PageKey::Number => number = parsed,
            PageKey::Size => size = parsed,
            PageKey::Offset => offset = parsed,
            PageKey::Limit => limit = parsed,
        }
    }

    match (size, limit) {
        (Some(size), raw_limit) => {
            if raw_limit.is_some() || offset.is_some() {
                tracing::warn!(
                    "page mixes size/number with limit/offset; using size/number"
                );
            }
            Ok(Some(PageParam::Classic { size, number }))
        }
        (None, Some(limit)) => {
            if number.is_some() {
                tracing::warn!("page mixes limit/offset with number; using limit/offset");
            }
            Ok(Some(PageParam::Raw { limit, offset }))
        }
        (None, None) if number.is_none() && offset.is_none() => Ok(None),
        (None, None) => Err(QueryError::InvalidPageParam(
            "page requires either 'size' or 'limit'".to_string(),
        )),
    }
}

/// Coerce a page value: a non-negative integer or a numeric string.
fn page_value(key: PageKey, value: Value) -> QueryResult<Option<u64>> {
    let invalid = |shown: &str| {
        QueryError::InvalidPageParam(format!(
            "'{}' must be a non-negative integer, got {shown}",
            key.as_str()
        ))
    };

    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_u64().map(Some).ok_or_else(|| invalid(&n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(&format!("'{}'", truncate(&s)))),
        other => Err(invalid(json_kind(&other))),
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
