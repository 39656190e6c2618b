//! Override rules for sort and filter dispatch.
//!
//! Applications register handlers for fields that need custom semantics (a
//! derived column, a composite ordering, a range filter). Handlers are tried
//! in registration order; the first one that matches is applied. When none
//! matches, the generic rule runs: `ORDER BY field` for sorts and
//! `field = value` for filters.

use std::fmt;

use crate::error::{QueryError, QueryResult};
use crate::query::{FilterValue, Predicate, Queryable, SortDirection};
use crate::schema::Ident;

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// Handler for custom sort semantics.
pub trait SortHandler: Send + Sync {
    /// Whether this handler answers to `name` as a derived field the schema
    /// does not have. Names declared here pass identifier coercion.
    fn declares(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Whether this handler takes over the `(field, direction)` pair.
    fn matches(&self, field: &Ident, direction: SortDirection) -> bool;

    /// Apply the custom ordering.
    fn apply(
        &self,
        query: Queryable,
        field: &Ident,
        direction: SortDirection,
    ) -> QueryResult<Queryable>;
}

/// Handler for custom filter semantics.
pub trait FilterHandler: Send + Sync {
    /// Whether this handler answers to `name` as a derived field the schema
    /// does not have. Names declared here pass identifier coercion.
    fn declares(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Whether this handler takes over the `(field, value)` pair.
    fn matches(&self, field: &Ident, value: &FilterValue) -> bool;

    /// Apply the custom constraint. May add any number of predicates.
    fn apply(
        &self,
        query: Queryable,
        field: &Ident,
        value: &FilterValue,
    ) -> QueryResult<Queryable>;
}

// ---------------------------------------------------------------------------
// Closure-backed rules
// ---------------------------------------------------------------------------

type SortMatchFn = dyn Fn(&Ident, SortDirection) -> bool + Send + Sync;
type SortApplyFn = dyn Fn(Queryable, &Ident, SortDirection) -> QueryResult<Queryable> + Send + Sync;
type FilterMatchFn = dyn Fn(&Ident, &FilterValue) -> bool + Send + Sync;
type FilterApplyFn =
    dyn Fn(Queryable, &Ident, &FilterValue) -> QueryResult<Queryable> + Send + Sync;

/// A sort handler built from closures.
pub struct SortRule {
    declared: Option<String>,
    matcher: Box<SortMatchFn>,
    apply: Box<SortApplyFn>,
}

impl SortRule {
    /// Handle every sort on `name`, in either direction.
    ///
    /// `name` is declared, so it may be a derived field.
    pub fn field<F>(name: &str, apply: F) -> Self
    where
        F: Fn(Queryable, SortDirection) -> QueryResult<Queryable> + Send + Sync + 'static,
    {
        let owned = name.to_string();
        Self {
            declared: Some(name.to_string()),
            matcher: Box::new(move |field: &Ident, _: SortDirection| *field == owned.as_str()),
            apply: Box::new(move |query: Queryable, _: &Ident, direction: SortDirection| {
                apply(query, direction)
            }),
        }
    }

    /// Handle sorts on `name` in one direction only.
    pub fn field_direction<F>(name: &str, direction: SortDirection, apply: F) -> Self
    where
        F: Fn(Queryable) -> QueryResult<Queryable> + Send + Sync + 'static,
    {
        let owned = name.to_string();
        Self {
            declared: Some(name.to_string()),
            matcher: Box::new(move |field: &Ident, dir: SortDirection| {
                *field == owned.as_str() && dir == direction
            }),
            apply: Box::new(move |query: Queryable, _: &Ident, _: SortDirection| apply(query)),
        }
    }

    /// Handle any pair accepted by `matcher`. Declares no derived names.
    pub fn when<M, F>(matcher: M, apply: F) -> Self
    where
        M: Fn(&Ident, SortDirection) -> bool + Send + Sync + 'static,
        F: Fn(Queryable, &Ident, SortDirection) -> QueryResult<Queryable> + Send + Sync + 'static,
    {
        Self {
            declared: None,
            matcher: Box::new(matcher),
            apply: Box::new(apply),
        }
    }
}

impl SortHandler for SortRule {
    fn declares(&self, name: &str) -> bool {
        self.declared.as_deref() == Some(name)
    }

    fn matches(&self, field: &Ident, direction: SortDirection) -> bool {
        (self.matcher)(field, direction)
    }

    fn apply(
        &self,
        query: Queryable,
        field: &Ident,
        direction: SortDirection,
    ) -> QueryResult<Queryable> {
        (self.apply)(query, field, direction)
    }
}

/// A filter handler built from closures.
pub struct FilterRule {
    declared: Option<String>,
    matcher: Box<FilterMatchFn>,
    apply: Box<FilterApplyFn>,
}

impl FilterRule {
    /// Handle every filter on `name`, whatever the value.
    ///
    /// `name` is declared, so it may be a derived field.
    pub fn field<F>(name: &str, apply: F) -> Self
    where
        F: Fn(Queryable, &FilterValue) -> QueryResult<Queryable> + Send + Sync + 'static,
    {
        let owned = name.to_string();
        Self {
            declared: Some(name.to_string()),
            matcher: Box::new(move |field: &Ident, _: &FilterValue| *field == owned.as_str()),
            apply: Box::new(move |query: Queryable, _: &Ident, value: &FilterValue| {
                apply(query, value)
            }),
        }
    }

    /// Handle filters on `name` whose value is accepted by `matcher`.
    pub fn field_when<M, F>(name: &str, matcher: M, apply: F) -> Self
    where
        M: Fn(&FilterValue) -> bool + Send + Sync + 'static,
        F: Fn(Queryable, &FilterValue) -> QueryResult<Queryable> + Send + Sync + 'static,
    {
        let owned = name.to_string();
        Self {
            declared: Some(name.to_string()),
            matcher: Box::new(move |field: &Ident, value: &FilterValue| {
                *field == owned.as_str() && matcher(value)
            }),
            apply: Box::new(move |query: Queryable, _: &Ident, value: &FilterValue| {
                apply(query, value)
            }),
        }
    }

    /// Handle any pair accepted by `matcher`. Declares no derived names.
    pub fn when<M, F>(matcher: M, apply: F) -> Self
    where
        M: Fn(&Ident, &FilterValue) -> bool + Send + Sync + 'static,
        F: Fn(Queryable, &Ident, &FilterValue) -> QueryResult<Queryable> + Send + Sync + 'static,
    {
        Self {
            declared: None,
            matcher: Box::new(matcher),
            apply: Box::new(apply),
        }
    }
}

impl FilterHandler for FilterRule {
    fn declares(&self, name: &str) -> bool {
        self.declared.as_deref() == Some(name)
    }

    fn matches(&self, field: &Ident, value: &FilterValue) -> bool {
        (self.matcher)(field, value)
    }

    fn apply(
        &self,
        query: Queryable,
        field: &Ident,
        value: &FilterValue,
    ) -> QueryResult<Queryable> {
        (self.apply)(query, field, value)
    }
}

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

/// Ordered sort handlers with the generic ordering as fallback.
#[derive(Default)]
pub struct SortRules {
    handlers: Vec<Box<dyn SortHandler>>,
}

impl SortRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Earlier handlers take priority.
    pub fn register(&mut self, handler: impl SortHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    #[must_use]
    pub fn with_rule(mut self, handler: impl SortHandler + 'static) -> Self {
        self.register(handler);
        self
    }

    /// Whether any handler declares `name` as a derived field.
    pub fn declares(&self, name: &str) -> bool {
        self.handlers.iter().any(|h| h.declares(name))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Apply the first matching handler, or order by the field directly.
    ///
    /// The generic ordering only applies to schema columns; a derived name
    /// no handler takes fails with `UnknownIdentifier`.
    pub fn dispatch(
        &self,
        query: Queryable,
        field: &Ident,
        direction: SortDirection,
    ) -> QueryResult<Queryable> {
        if let Some(handler) = self.handlers.iter().find(|h| h.matches(field, direction)) {
            tracing::debug!(
                field = %field,
                direction = direction.as_str(),
                "applying sort override"
            );
            return handler.apply(query, field, direction);
        }

        if !query.schema().has_field(field.as_str()) {
            return Err(QueryError::unknown_identifier(field.as_str()));
        }

        Ok(query.order_by(field.clone(), direction))
    }
}

impl fmt::Debug for SortRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortRules")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Ordered filter handlers with equality as fallback.
#[derive(Default)]
pub struct FilterRules {
    handlers: Vec<Box<dyn FilterHandler>>,
}

impl FilterRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Earlier handlers take priority.
    pub fn register(&mut self, handler: impl FilterHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    #[must_use]
    pub fn with_rule(mut self, handler: impl FilterHandler + 'static) -> Self {
        self.register(handler);
        self
    }

    /// Whether any handler declares `name` as a derived field.
    pub fn declares(&self, name: &str) -> bool {
        self.handlers.iter().any(|h| h.declares(name))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Apply the first matching handler, or constrain `field = value`.
    ///
    /// Nested map values, and lists holding lists or maps, have no generic
    /// meaning and are rejected unless a handler takes them. Like sorts, the
    /// generic equality only applies to schema columns.
    pub fn dispatch(
        &self,
        query: Queryable,
        field: &Ident,
        value: &FilterValue,
    ) -> QueryResult<Queryable> {
        if let Some(handler) = self.handlers.iter().find(|h| h.matches(field, value)) {
            tracing::debug!(field = %field, "applying filter override");
            return handler.apply(query, field, value);
        }

        if !query.schema().has_field(field.as_str()) {
            return Err(QueryError::unknown_identifier(field.as_str()));
        }

        let nested = match value {
            FilterValue::Map(_) => true,
            FilterValue::List(items) => items
                .iter()
                .any(|v| matches!(v, FilterValue::List(_) | FilterValue::Map(_))),
            _ => false,
        };
        if nested {
            return Err(QueryError::UnsupportedFilterValue {
                field: field.to_string(),
            });
        }

        Ok(query.and_where(Predicate::eq(field.clone(), value.clone())))
    }
}

impl fmt::Debug for FilterRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRules")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
