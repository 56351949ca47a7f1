//! Query descriptions for the row API
//!
//! A [`Select`] is a plain value: the REST gateway renders it into
//! PostgREST query parameters and the in-memory gateway evaluates it over
//! local tables. Both must agree on the semantics encoded here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A single row as returned by the gateway
pub type Row = serde_json::Map<String, Value>;

/// Named collections exposed by the hosted backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Profiles,
    Posts,
    Likes,
    Comments,
    Followers,
    Notifications,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Profiles => "profiles",
            Collection::Posts => "posts",
            Collection::Likes => "likes",
            Collection::Comments => "comments",
            Collection::Followers => "followers",
            Collection::Notifications => "notifications",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row filter
///
/// Values are compared as text, which covers every column the client filters
/// on (ids, handles, flags).
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    In(String, Vec<String>),
    /// Case-insensitive LIKE; `%` matches any run, `_` one character
    ILike(String, String),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl ToString) -> Self {
        Filter::Eq(column.to_string(), value.to_string())
    }

    pub fn neq(column: &str, value: impl ToString) -> Self {
        Filter::Neq(column.to_string(), value.to_string())
    }

    pub fn in_list<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Filter::In(
            column.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    /// `column ILIKE %term%`
    pub fn contains(column: &str, term: &str) -> Self {
        Filter::ILike(column.to_string(), format!("%{}%", term))
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Render as a top-level query pair, e.g. `("species", "ilike.*Cat*")`
    pub fn to_query_pair(&self) -> (String, String) {
        match self {
            Filter::Eq(col, v) => (col.clone(), format!("eq.{}", v)),
            Filter::Neq(col, v) => (col.clone(), format!("neq.{}", v)),
            Filter::In(col, values) => (col.clone(), format!("in.({})", render_list(values))),
            Filter::ILike(col, pattern) => (col.clone(), format!("ilike.{}", pattern.replace('%', "*"))),
            Filter::Or(filters) => ("or".to_string(), format!("({})", render_inline_list(filters))),
        }
    }

    /// Render inside a logical group, e.g. `username.ilike.*luna*`
    fn to_inline(&self) -> String {
        match self {
            Filter::Eq(col, v) => format!("{}.eq.{}", col, quote(v)),
            Filter::Neq(col, v) => format!("{}.neq.{}", col, quote(v)),
            Filter::In(col, values) => format!("{}.in.({})", col, render_list(values)),
            Filter::ILike(col, pattern) => {
                format!("{}.ilike.{}", col, quote(&pattern.replace('%', "*")))
            }
            Filter::Or(filters) => format!("or({})", render_inline_list(filters)),
        }
    }

    /// Evaluate against a row. Missing or null columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(col, v) => text_of(row.get(col)).is_some_and(|t| t == *v),
            Filter::Neq(col, v) => text_of(row.get(col)).is_some_and(|t| t != *v),
            Filter::In(col, values) => {
                text_of(row.get(col)).is_some_and(|t| values.iter().any(|v| *v == t))
            }
            Filter::ILike(col, pattern) => {
                text_of(row.get(col)).is_some_and(|t| ilike(pattern, &t))
            }
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }
}

fn render_list(values: &[String]) -> String {
    values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(",")
}

fn render_inline_list(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(Filter::to_inline)
        .collect::<Vec<_>>()
        .join(",")
}

/// Reserved characters inside PostgREST lists must be double-quoted
fn quote(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ':']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Case-insensitive SQL LIKE
fn ilike(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= dp[j];
                    next[j] = seen;
                }
            }
            '_' => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1];
                }
            }
            c => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && text[j - 1] == *c;
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}

/// Related row pulled in through a foreign key, rendered as `alias:fk(cols)`
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub alias: String,
    pub foreign_key: String,
    pub collection: Collection,
    pub columns: Vec<String>,
}

impl Embed {
    pub fn new(alias: &str, foreign_key: &str, collection: Collection, columns: &[&str]) -> Self {
        Self {
            alias: alias.to_string(),
            foreign_key: foreign_key.to_string(),
            collection,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn render(&self) -> String {
        format!("{}:{}({})", self.alias, self.foreign_key, self.columns.join(","))
    }
}

/// Columns and embedded relations to return
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// Empty means every column
    pub columns: Vec<String>,
    pub embeds: Vec<Embed>,
}

impl Projection {
    pub fn columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            embeds: Vec::new(),
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    /// Value of the `select` query parameter
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = if self.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            self.columns.clone()
        };
        parts.extend(self.embeds.iter().map(Embed::render));
        parts.join(",")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn render(&self) -> String {
        format!(
            "{}.{}",
            self.column,
            if self.ascending { "asc" } else { "desc" }
        )
    }

    /// Compare two rows on this column. Nulls sort last in either direction.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let left = a.get(&self.column).filter(|v| !v.is_null());
        let right = b.get(&self.column).filter(|v| !v.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r);
                if self.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            }
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

/// Row lookup: filters, ordering, limit and projection
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub collection: Collection,
    pub projection: Projection,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            projection: Projection::default(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.projection.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.projection.embeds.push(embed);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// PostgREST query parameters, in a stable order
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.projection.render())];
        pairs.extend(self.filters.iter().map(Filter::to_query_pair));
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(Order::render)
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}
