//! Canonical identifiers and the schema allow-list they are checked against.
//!
//! Field names arriving from a request are never used as column references
//! directly. They are coerced into an [`Ident`], which can only be obtained
//! from a [`Schema`] (or from a rule that explicitly declares a derived field).

use std::fmt;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};

/// Maximum identifier length (PostgreSQL limit).
const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a SQL identifier name (table/column names).
/// Allows only `[a-zA-Z_][a-zA-Z0-9_]*` with max 63 chars.
pub(crate) fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

/// A field or table name that has been validated against an allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(Arc<str>);

impl Ident {
    /// Wrap a name the caller has already validated.
    pub(crate) fn trusted(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Ident {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Ident {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// Table description supplied by the embedding application.
///
/// The schema is the allow-list for every field reference a request can
/// make. It is never created or migrated here.
#[derive(Debug, Clone)]
pub struct Schema {
    table: Ident,
    primary_key: Ident,
    fields: Vec<Ident>,
}

impl Schema {
    /// Describe a table, its primary key, and the columns requests may use.
    ///
    /// The primary key is always an allowed field. Every name must be a safe
    /// SQL identifier.
    pub fn new<I, S>(table: &str, primary_key: &str, fields: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = checked(table)?;
        let primary_key = checked(primary_key)?;

        let mut allowed = vec![primary_key.clone()];
        for field in fields {
            let field = checked(field.as_ref())?;
            if !allowed.contains(&field) {
                allowed.push(field);
            }
        }

        Ok(Self {
            table,
            primary_key,
            fields: allowed,
        })
    }

    pub fn table(&self) -> &Ident {
        &self.table
    }

    pub fn primary_key(&self) -> &Ident {
        &self.primary_key
    }

    /// Allowed fields, primary key first, then in declaration order.
    pub fn fields(&self) -> &[Ident] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    /// Coerce a name to one of this schema's fields.
    pub fn field(&self, name: &str) -> QueryResult<Ident> {
        self.fields
            .iter()
            .find(|f| *f == name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_identifier(name))
    }

    /// Coerce a name to a schema field, or to a derived field when a rule
    /// has declared it.
    pub(crate) fn coerce(&self, name: &str, declared: bool) -> QueryResult<Ident> {
        if let Some(field) = self.fields.iter().find(|f| *f == name) {
            return Ok(field.clone());
        }
        if declared && is_safe_identifier(name) {
            return Ok(Ident::trusted(name));
        }
        Err(QueryError::unknown_identifier(name))
    }
}

fn checked(name: &str) -> QueryResult<Ident> {
    if is_safe_identifier(name) {
        Ok(Ident::trusted(name))
    } else {
        let shown: String = name.chars().take(MAX_IDENTIFIER_LEN + 1).collect();
        Err(QueryError::InvalidSchema(format!(
            "'{shown}' is not a valid identifier"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new("items", "id", ["foo", "bar", "foo"]).unwrap()
    }

    #[test]
    fn primary_key_is_always_allowed() {
        let schema = schema();
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.fields()[0], "id");
        assert!(schema.has_field("id"));
    }

    #[test]
    fn field_coercion() {
        let schema = schema();
        assert_eq!(schema.field("foo").unwrap(), "foo");
        assert!(matches!(
            schema.field("password_hash"),
            Err(QueryError::UnknownIdentifier(name)) if name == "password_hash"
        ));
    }

    #[test]
    fn declared_names_are_accepted_only_when_safe() {
        let schema = schema();
        assert_eq!(schema.coerce("full_name", true).unwrap(), "full_name");
        assert!(schema.coerce("full_name", false).is_err());
        assert!(schema.coerce("x; DROP TABLE items", true).is_err());
    }

    #[test]
    fn unsafe_names_are_rejected() {
        assert!(matches!(
            Schema::new("items; --", "id", ["foo"]),
            Err(QueryError::InvalidSchema(_))
        ));
        assert!(Schema::new("items", "id", ["1st"]).is_err());
        assert!(Schema::new("items", "", Vec::<String>::new()).is_err());
    }

    #[test]
    fn safe_identifier_rules() {
        assert!(is_safe_identifier("items"));
        assert!(is_safe_identifier("_private"));
        assert!(is_safe_identifier("col_2"));

        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("2col"));
        assert!(!is_safe_identifier("has space"));
        assert!(!is_safe_identifier("dotted.name"));
        assert!(!is_safe_identifier(&"a".repeat(64)));
    }
}
