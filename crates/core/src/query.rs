//! Immutable queryable builder and its SeaQuery rendering.
//!
//! A [`Queryable`] accumulates predicates, order clauses, and a limit/offset
//! window for one schema. Each builder method consumes the value and returns
//! a new one, so engines can be chained without sharing mutable state:
//! - Predicates are AND-ed in insertion order
//! - Order clauses are applied in insertion order
//! - Rendering targets PostgreSQL via SeaQuery

use indexmap::IndexMap;
use sea_query::{
    Alias, Asterisk, Cond, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::QueryResult;
use crate::schema::{Ident, Schema};

/// Filter value types.
///
/// Deserializes through [`serde_json::Value`], so numbers follow the same
/// conversion as `From<serde_json::Value>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "serde_json::Value")]
pub enum FilterValue {
    /// Explicit null.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// List of values.
    List(Vec<FilterValue>),
    /// Nested object. Only meaningful to custom filter rules.
    Map(IndexMap<String, FilterValue>),
}

impl FilterValue {
    /// Convert to string representation if the value is a scalar.
    pub fn as_string(&self) -> Option<String> {
        match self {
            FilterValue::String(s) => Some(s.clone()),
            FilterValue::Integer(i) => Some(i.to_string()),
            FilterValue::Float(f) => Some(f.to_string()),
            FilterValue::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Convert to integer if possible.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FilterValue::Integer(i) => Some(*i),
            FilterValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            FilterValue::Null | FilterValue::List(_) | FilterValue::Map(_)
        )
    }

    /// SeaQuery value for scalars; `None` for null, lists, and maps.
    fn to_sea_value(&self) -> Option<sea_query::Value> {
        match self {
            FilterValue::Boolean(b) => Some((*b).into()),
            FilterValue::Integer(i) => Some((*i).into()),
            FilterValue::Float(f) => Some((*f).into()),
            FilterValue::String(s) => Some(s.clone().into()),
            FilterValue::Null | FilterValue::List(_) | FilterValue::Map(_) => None,
        }
    }
}

impl From<serde_json::Value> for FilterValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => FilterValue::Null,
            Value::Bool(b) => FilterValue::Boolean(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => FilterValue::Integer(i),
                // Integers past i64 keep their exact digits.
                (None, _) if n.is_u64() => FilterValue::String(n.to_string()),
                (None, Some(f)) => FilterValue::Float(f),
                (None, None) => FilterValue::String(n.to_string()),
            },
            Value::String(s) => FilterValue::String(s),
            Value::Array(items) => {
                FilterValue::List(items.into_iter().map(FilterValue::from).collect())
            }
            Value::Object(map) => FilterValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, FilterValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl From<SortDirection> for Order {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// One condition on a queryable. Conditions on the same queryable are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field <op> value` for a scalar value.
    Compare {
        field: Ident,
        op: CompareOp,
        value: FilterValue,
    },
    /// `field [NOT] IN (values)`.
    In {
        field: Ident,
        values: Vec<FilterValue>,
        negated: bool,
    },
    /// `field IS [NOT] NULL`.
    Null { field: Ident, negated: bool },
    /// Substring match (`LIKE %needle%`).
    Contains { field: Ident, needle: String },
    /// Any of the nested predicates holds (OR).
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Equality. A null value becomes `IS NULL` and a list becomes `IN (...)`.
    pub fn eq(field: Ident, value: impl Into<FilterValue>) -> Self {
        match value.into() {
            FilterValue::Null => Predicate::Null {
                field,
                negated: false,
            },
            FilterValue::List(values) => Predicate::In {
                field,
                values,
                negated: false,
            },
            value => Predicate::Compare {
                field,
                op: CompareOp::Eq,
                value,
            },
        }
    }

    /// Inequality. A null value becomes `IS NOT NULL` and a list becomes `NOT IN (...)`.
    pub fn ne(field: Ident, value: impl Into<FilterValue>) -> Self {
        match value.into() {
            FilterValue::Null => Predicate::Null {
                field,
                negated: true,
            },
            FilterValue::List(values) => Predicate::In {
                field,
                values,
                negated: true,
            },
            value => Predicate::Compare {
                field,
                op: CompareOp::Ne,
                value,
            },
        }
    }

    pub fn compare(field: Ident, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        Predicate::Compare {
            field,
            op,
            value: value.into(),
        }
    }

    pub fn gt(field: Ident, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn gte(field: Ident, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    pub fn lt(field: Ident, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn lte(field: Ident, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    pub fn contains(field: Ident, needle: impl Into<String>) -> Self {
        Predicate::Contains {
            field,
            needle: needle.into(),
        }
    }

    pub fn any(predicates: Vec<Predicate>) -> Self {
        Predicate::Any(predicates)
    }

    /// Build the SQL condition for this predicate against `table`.
    fn to_expr(&self, table: &Ident) -> SimpleExpr {
        match self {
            Predicate::Compare { field, op, value } => {
                let Some(value) = value.to_sea_value() else {
                    tracing::error!(
                        field = %field,
                        "comparison against a non-scalar value; restricting results"
                    );
                    // Return FALSE to restrict rather than widen query results
                    return Expr::cust("FALSE");
                };
                let col = column(table, field);
                match op {
                    CompareOp::Eq => col.eq(value),
                    CompareOp::Ne => col.ne(value),
                    CompareOp::Gt => col.gt(value),
                    CompareOp::Gte => col.gte(value),
                    CompareOp::Lt => col.lt(value),
                    CompareOp::Lte => col.lte(value),
                }
            }
            Predicate::In {
                field,
                values,
                negated,
            } => {
                if values.iter().any(|v| !v.is_scalar() && *v != FilterValue::Null) {
                    tracing::error!(
                        field = %field,
                        "membership test against nested values; restricting results"
                    );
                    return Expr::cust("FALSE");
                }

                let with_null = values.contains(&FilterValue::Null);
                let scalars: Vec<sea_query::Value> =
                    values.iter().filter_map(FilterValue::to_sea_value).collect();

                // A null member matches NULL cells, which IN never does.
                let mut parts = Vec::new();
                if !scalars.is_empty() {
                    let col = column(table, field);
                    parts.push(if *negated {
                        col.is_not_in(scalars)
                    } else {
                        col.is_in(scalars)
                    });
                }
                if with_null {
                    let col = column(table, field);
                    parts.push(if *negated {
                        col.is_not_null()
                    } else {
                        col.is_null()
                    });
                }

                match (parts.len(), *negated) {
                    // Nothing is IN an empty set; everything is NOT IN it.
                    (0, negated) => Expr::cust(if negated { "TRUE" } else { "FALSE" }),
                    (1, _) => parts.remove(0),
                    (_, negated) => {
                        let cond = if negated { Cond::all() } else { Cond::any() };
                        parts
                            .into_iter()
                            .fold(cond, |cond, part| cond.add(part))
                            .into()
                    }
                }
            }
            Predicate::Null { field, negated } => {
                let col = column(table, field);
                if *negated {
                    col.is_not_null()
                } else {
                    col.is_null()
                }
            }
            Predicate::Contains { field, needle } => {
                column(table, field).like(format!("%{}%", escape_like_wildcards(needle)))
            }
            Predicate::Any(predicates) => {
                if predicates.is_empty() {
                    return Expr::cust("FALSE");
                }
                let mut cond = Cond::any();
                for predicate in predicates {
                    cond = cond.add(predicate.to_expr(table));
                }
                cond.into()
            }
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub field: Ident,
    pub direction: SortDirection,
}

/// An in-progress query: the schema it targets plus accumulated clauses.
#[derive(Debug, Clone)]
pub struct Queryable {
    schema: Arc<Schema>,
    predicates: Vec<Predicate>,
    orderings: Vec<OrderClause>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Queryable {
    /// An unconstrained query over the whole table.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            predicates: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Coerce a name to one of the target schema's fields.
    pub fn field(&self, name: &str) -> QueryResult<Ident> {
        self.schema.field(name)
    }

    /// Add a predicate, AND-ed with the existing ones.
    #[must_use]
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Append an ORDER BY clause after the existing ones.
    #[must_use]
    pub fn order_by(mut self, field: Ident, direction: SortDirection) -> Self {
        self.orderings.push(OrderClause { field, direction });
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn orderings(&self) -> &[OrderClause] {
        &self.orderings
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Build the SELECT statement with filters, ordering, and window.
    pub fn to_select(&self) -> SelectStatement {
        let table = Alias::new(self.schema.table().as_str());
        let mut query = Query::select();

        query.column((table.clone(), Asterisk));
        query.from(table.clone());

        self.add_filters(&mut query);

        for ordering in &self.orderings {
            query.order_by(
                (table.clone(), Alias::new(ordering.field.as_str())),
                Order::from(ordering.direction),
            );
        }

        if let Some(limit) = self.limit {
            query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query.offset(offset);
        }

        query
    }

    /// Build a distinct COUNT over the primary key. Ordering and window are ignored.
    pub fn to_count_select(&self) -> SelectStatement {
        let mut query = Query::select();

        // Both names passed identifier validation when the schema was built.
        query.expr(Expr::cust(format!(
            r#"COUNT(DISTINCT "{}"."{}")"#,
            self.schema.table(),
            self.schema.primary_key()
        )));
        query.from(Alias::new(self.schema.table().as_str()));

        self.add_filters(&mut query);

        query
    }

    pub fn to_sql(&self) -> String {
        self.to_select().to_string(PostgresQueryBuilder)
    }

    pub fn to_count_sql(&self) -> String {
        self.to_count_select().to_string(PostgresQueryBuilder)
    }

    fn add_filters(&self, query: &mut SelectStatement) {
        for predicate in &self.predicates {
            query.and_where(predicate.to_expr(self.schema.table()));
        }
    }
}

fn column(table: &Ident, field: &Ident) -> SimpleExpr {
    Expr::col((Alias::new(table.as_str()), Alias::new(field.as_str()))).into()
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new("items", "id", ["foo", "bar", "title"]).unwrap())
    }

    #[test]
    fn base_query_selects_whole_table() {
        let sql = Queryable::new(schema()).to_sql();
        assert_eq!(sql, r#"SELECT "items".* FROM "items""#);
    }

    #[test]
    fn builder_returns_new_values() {
        let base = Queryable::new(schema());
        let foo = base.field("foo").unwrap();
        let filtered = base.clone().and_where(Predicate::eq(foo, "x"));

        assert!(base.predicates().is_empty());
        assert_eq!(filtered.predicates().len(), 1);
    }

    #[test]
    fn predicates_render_in_insertion_order() {
        let q = Queryable::new(schema());
        let foo = q.field("foo").unwrap();
        let bar = q.field("bar").unwrap();
        let sql = q
            .and_where(Predicate::ne(foo, "baz"))
            .and_where(Predicate::eq(bar, 1))
            .to_sql();

        let foo_at = sql.find(r#""items"."foo" <> 'baz'"#).expect(&sql);
        let bar_at = sql.find(r#""items"."bar" = 1"#).expect(&sql);
        assert!(foo_at < bar_at, "predicate order not preserved: {sql}");
        assert!(sql.contains(" AND "), "predicates should be AND-ed: {sql}");
    }

    #[test]
    fn ordering_and_window_render() {
        let q = Queryable::new(schema());
        let foo = q.field("foo").unwrap();
        let sql = q
            .order_by(foo, SortDirection::Desc)
            .with_limit(5)
            .with_offset(10)
            .to_sql();

        assert!(sql.contains(r#"ORDER BY "items"."foo" DESC"#), "{sql}");
        assert!(sql.contains("LIMIT 5"), "{sql}");
        assert!(sql.contains("OFFSET 10"), "{sql}");
    }

    #[test]
    fn count_ignores_ordering_and_window() {
        let q = Queryable::new(schema());
        let bar = q.field("bar").unwrap();
        let sql = q
            .clone()
            .and_where(Predicate::eq(bar.clone(), 1))
            .order_by(bar, SortDirection::Asc)
            .with_limit(5)
            .to_count_sql();

        assert!(sql.contains(r#"COUNT(DISTINCT "items"."id")"#), "{sql}");
        assert!(sql.contains(r#""items"."bar" = 1"#), "{sql}");
        assert!(!sql.contains("ORDER BY"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn equality_special_cases() {
        let q = Queryable::new(schema());
        let foo = q.field("foo").unwrap();

        assert_eq!(
            Predicate::eq(foo.clone(), FilterValue::Null),
            Predicate::Null {
                field: foo.clone(),
                negated: false
            }
        );

        let sql = q
            .and_where(Predicate::eq(foo, vec!["a", "b"]))
            .to_sql();
        assert!(sql.contains(r#""items"."foo" IN ('a', 'b')"#), "{sql}");
    }

    #[test]
    fn empty_in_list_restricts() {
        let q = Queryable::new(schema());
        let foo = q.field("foo").unwrap();
        let sql = q
            .and_where(Predicate::eq(foo, Vec::<String>::new()))
            .to_sql();
        assert!(sql.contains("FALSE"), "{sql}");
    }

    #[test]
    fn any_renders_or() {
        let q = Queryable::new(schema());
        let foo = q.field("foo").unwrap();
        let bar = q.field("bar").unwrap();
        let sql = q
            .and_where(Predicate::any(vec![
                Predicate::eq(foo, "a"),
                Predicate::gt(bar, 3),
            ]))
            .to_sql();
        assert!(sql.contains(" OR "), "{sql}");
        assert!(sql.contains(r#""items"."bar" > 3"#), "{sql}");
    }

    #[test]
    fn contains_escapes_wildcards() {
        let q = Queryable::new(schema());
        let title = q.field("title").unwrap();
        let sql = q
            .and_where(Predicate::contains(title, "100%_done"))
            .to_sql();

        assert!(sql.contains("LIKE"), "{sql}");
        assert!(
            !sql.contains("%100%_done%"),
            "raw wildcard chars should NOT appear unescaped: {sql}"
        );
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }

    #[test]
    fn filter_value_from_json() {
        let value = FilterValue::from(serde_json::json!([1, "two", null, 1.5, true]));
        assert_eq!(
            value,
            FilterValue::List(vec![
                FilterValue::Integer(1),
                FilterValue::String("two".to_string()),
                FilterValue::Null,
                FilterValue::Float(1.5),
                FilterValue::Boolean(true),
            ])
        );

        let nested = FilterValue::from(serde_json::json!({"gte": 10}));
        assert!(matches!(nested, FilterValue::Map(_)));
        assert!(!nested.is_scalar());
    }

    #[test]
    fn list_with_null_matches_null_cells() {
        let q = Queryable::new(schema());
        let foo = q.field("foo").unwrap();

        let sql = q
            .clone()
            .and_where(Predicate::eq(foo.clone(), FilterValue::from(serde_json::json!([null]))))
            .to_sql();
        assert!(sql.contains(r#""items"."foo" IS NULL"#), "{sql}");
        assert!(!sql.contains("FALSE"), "{sql}");

        let sql = q
            .and_where(Predicate::ne(foo, FilterValue::from(serde_json::json!([null, "a"]))))
            .to_sql();
        assert!(sql.contains(r#""items"."foo" NOT IN ('a')"#), "{sql}");
        assert!(sql.contains(r#""items"."foo" IS NOT NULL"#), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn oversized_integers_keep_their_digits() {
        let value = FilterValue::from(serde_json::json!(18446744073709551615u64));
        assert_eq!(value, FilterValue::String("18446744073709551615".to_string()));

        let parsed: FilterValue = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(parsed, value);

        let parsed: FilterValue = serde_json::from_str("-7").unwrap();
        assert_eq!(parsed, FilterValue::Integer(-7));
        let parsed: FilterValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(parsed, FilterValue::Float(2.5));
    }

    #[test]
    fn filter_value_serde_untagged() {
        let parsed: FilterValue = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, FilterValue::Integer(42));
        let parsed: FilterValue = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, FilterValue::Null);
        let parsed: FilterValue = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(parsed.as_i64(), Some(42));
    }

    #[test]
    fn sort_direction_serialization() {
        let json = serde_json::to_string(&SortDirection::Desc).unwrap();
        assert_eq!(json, "\"desc\"");
        assert_eq!(SortDirection::default(), SortDirection::Asc);
    }
}
