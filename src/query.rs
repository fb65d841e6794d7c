//! Request parameter resolution
//!
//! Turns raw request parameters (JSON body, flat form keys or a raw query
//! string) into a normalized [`QuerySpec`]. Resolution is pure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sort direction; anything other than `desc` reads as ascending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Column and direction; an empty column means "unsorted"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn is_set(&self) -> bool {
        !self.column.is_empty()
    }
}

/// Normalized, request-scoped search/sort/filter/page intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub search: String,
    pub sort: Sort,
    pub filters: BTreeMap<String, Value>,
    pub page: u32,
    /// Explicit page size from the request, clamped at execution
    pub per_page: Option<u32>,
    /// Selected view key
    pub view: Option<String>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort: Sort::default(),
            filters: BTreeMap::new(),
            page: 1,
            per_page: None,
            view: None,
        }
    }
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = term.into();
        self
    }

    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Sort::new(column, direction);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn view(mut self, key: impl Into<String>) -> Self {
        self.view = Some(key.into());
        self
    }

    /// Resolve raw request parameters
    pub fn resolve(params: &RequestParams) -> Self {
        let root = &params.0;

        let search = root.get("search").map(text).unwrap_or_default();

        let sort = match root.get("sort") {
            Some(Value::Object(sort)) => Sort::new(
                sort.get("column").map(text).unwrap_or_default(),
                SortDirection::parse(&sort.get("direction").map(text).unwrap_or_default()),
            ),
            Some(column) => Sort::new(
                text(column),
                SortDirection::parse(&root.get("direction").map(text).unwrap_or_default()),
            ),
            None => Sort::default(),
        };

        let filters = match root.get("filters") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => BTreeMap::new(),
        };

        let page = root
            .get("page")
            .and_then(positive_int)
            .unwrap_or(1);

        let per_page = root.get("per_page").and_then(positive_int);

        let view = root
            .get("view")
            .map(text)
            .filter(|key| !key.is_empty());

        Self {
            search,
            sort,
            filters,
            page,
            per_page,
            view,
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn positive_int(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if n <= 0 {
        return None;
    }
    Some(u32::try_from(n).unwrap_or(u32::MAX))
}

// ============================================================================
// Raw Request Parameters
// ============================================================================

/// Raw request parameters as a nested JSON object
///
/// Flat keys are expanded on the way in: `sort[column]` and `sort.column`
/// both land under `{"sort": {"column": ..}}`; `filters[tags][]` collects a
/// list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams(Map<String, Value>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters from a JSON body; non-object bodies read as empty
    pub fn from_json(value: Value) -> Self {
        let mut params = Self::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                params.insert(&key, value);
            }
        }
        params
    }

    /// Parameters from a raw, percent-encoded query string
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(&key, Value::String(value.into_owned()));
        }
        params
    }

    /// Parameters from flat key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key.as_ref(), value.into());
        }
        params
    }

    /// Insert one parameter, expanding bracketed or dotted keys
    pub fn insert(&mut self, key: &str, value: Value) {
        let path = split_key(key);
        if path.is_empty() {
            return;
        }
        insert_path(&mut self.0, &path, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// `filters[status][]` -> `["filters", "status", ""]`,
/// `filters.user.name` -> `["filters", "user.name"]`
fn split_key(key: &str) -> Vec<String> {
    if let Some(open) = key.find('[') {
        let mut path = vec![key[..open].to_string()];
        let mut rest = &key[open..];
        while let Some(stripped) = rest.strip_prefix('[') {
            match stripped.find(']') {
                Some(close) => {
                    path.push(stripped[..close].to_string());
                    rest = &stripped[close + 1..];
                }
                None => {
                    path.push(stripped.to_string());
                    break;
                }
            }
        }
        return path;
    }

    match key.split_once('.') {
        Some((head, tail)) if matches!(head, "sort" | "filters") && !tail.is_empty() => {
            vec![head.to_string(), tail.to_string()]
        }
        _ if key.is_empty() => Vec::new(),
        _ => vec![key.to_string()],
    }
}

fn insert_path(map: &mut Map<String, Value>, path: &[String], value: Value) {
    let (head, rest) = match path.split_first() {
        Some(split) => split,
        None => return,
    };

    if rest.is_empty() {
        match (map.get_mut(head), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    insert_path(existing, &[k], v);
                }
            }
            (_, value) => {
                map.insert(head.clone(), value);
            }
        }
        return;
    }

    if rest == [String::new()] {
        let slot = map
            .entry(head.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
        return;
    }

    let slot = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(child) = slot {
        insert_path(child, rest, value);
    }
}
