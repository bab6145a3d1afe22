//! PostgREST query description.
//!
//! A [`Query`] names a table plus the projection, row filters, ordering and window of a
//! read or update. It renders to the query-string pairs understood by PostgREST
//! (`select=`, `col=eq.value`, `col=in.(a,b)`, `order=col.desc`, `limit=`, `offset=`) and can
//! also evaluate itself against a JSON row, which is how [`crate::InMemoryStore`] answers
//! queries with the same semantics as the remote store.

use serde_json::Value;
use std::cmp::Ordering;

/// A single row predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    Gt(String, String),
    Gte(String, String),
    Lt(String, String),
    Lte(String, String),
    In(String, Vec<String>),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c)
            | Filter::NotNull(c) => c,
        }
    }

    fn render_value(&self) -> String {
        match self {
            Filter::Eq(_, v) => format!("eq.{v}"),
            Filter::Neq(_, v) => format!("neq.{v}"),
            Filter::Gt(_, v) => format!("gt.{v}"),
            Filter::Gte(_, v) => format!("gte.{v}"),
            Filter::Lt(_, v) => format!("lt.{v}"),
            Filter::Lte(_, v) => format!("lte.{v}"),
            Filter::In(_, values) => {
                let items: Vec<String> = values.iter().map(|v| quote_in_value(v)).collect();
                format!("in.({})", items.join(","))
            }
            Filter::IsNull(_) => "is.null".to_string(),
            Filter::NotNull(_) => "not.is.null".to_string(),
        }
    }

    fn matches(&self, row: &Value) -> bool {
        let field = row.get(self.column()).filter(|v| !v.is_null());
        match self {
            Filter::IsNull(_) => field.is_none(),
            Filter::NotNull(_) => field.is_some(),
            Filter::Eq(_, v) => field.is_some_and(|f| scalar_text(f) == *v),
            // SQL semantics: NULL <> x is not true.
            Filter::Neq(_, v) => field.is_some_and(|f| scalar_text(f) != *v),
            Filter::In(_, values) => {
                field.is_some_and(|f| values.iter().any(|v| scalar_text(f) == *v))
            }
            Filter::Gt(_, v) => field.is_some_and(|f| compare_scalar(f, v) == Ordering::Greater),
            Filter::Gte(_, v) => field.is_some_and(|f| compare_scalar(f, v) != Ordering::Less),
            Filter::Lt(_, v) => field.is_some_and(|f| compare_scalar(f, v) == Ordering::Less),
            Filter::Lte(_, v) => field.is_some_and(|f| compare_scalar(f, v) != Ordering::Greater),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// Read/update description for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    select: Option<String>,
    filters: Vec<Filter>,
    order: Vec<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Eq(column.into(), value.to_string()))
    }

    pub fn neq(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Neq(column.into(), value.to_string()))
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Gte(column.into(), value.to_string()))
    }

    pub fn lt(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::Lt(column.into(), value.to_string()))
    }

    pub fn in_list<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.filter(Filter::In(column.into(), values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::IsNull(column.into()))
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(Filter::NotNull(column.into()))
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction: Direction::Asc,
        });
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction: Direction::Desc,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Renders the PostgREST query-string pairs for this query.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(select) = &self.select {
            pairs.push(("select".to_string(), select.clone()));
        }
        for filter in &self.filters {
            pairs.push((filter.column().to_string(), filter.render_value()));
        }
        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| match o.direction {
                    Direction::Asc => format!("{}.asc", o.column),
                    Direction::Desc => format!("{}.desc", o.column),
                })
                .collect();
            pairs.push(("order".to_string(), order.join(",")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }

    /// Whether `row` satisfies every filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Applies ordering, offset, limit and projection to rows that already passed
    /// [`Query::matches`].
    pub fn shape(&self, mut rows: Vec<Value>) -> Vec<Value> {
        if !self.order.is_empty() {
            rows.sort_by(|a, b| self.compare_rows(a, b));
        }

        let offset = self.offset.unwrap_or(0);
        let rows = rows.into_iter().skip(offset);
        let rows: Vec<Value> = match self.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        };

        match self.projected_columns() {
            Some(columns) => rows.into_iter().map(|r| project(r, &columns)).collect(),
            None => rows,
        }
    }

    fn compare_rows(&self, a: &Value, b: &Value) -> Ordering {
        for o in &self.order {
            let left = a.get(&o.column).filter(|v| !v.is_null());
            let right = b.get(&o.column).filter(|v| !v.is_null());
            // PostgreSQL default: NULLS LAST for ascending, NULLS FIRST for descending.
            let ord = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(l), Some(r)) => compare_scalar(l, &scalar_text(r)),
            };
            let ord = match o.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn projected_columns(&self) -> Option<Vec<&str>> {
        let select = self.select.as_deref()?;
        let columns: Vec<&str> = select.split(',').map(str::trim).collect();
        if columns.iter().any(|c| *c == "*") {
            return None;
        }
        Some(columns)
    }
}

fn project(row: Value, columns: &[&str]) -> Value {
    match row {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| columns.contains(&k.as_str()))
                .collect(),
        ),
        other => other,
    }
}

/// Text form of a scalar JSON value as PostgREST would compare it.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_scalar(value: &Value, other: &str) -> Ordering {
    let text = scalar_text(value);
    match (text.parse::<f64>(), other.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => text.as_str().cmp(other),
    }
}

fn quote_in_value(value: &str) -> String {
    if value.chars().any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\' | ' ')) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}
