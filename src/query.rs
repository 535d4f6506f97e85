//! Request options for the query client
//!
//! Turns a field configuration tree and a filter list into the shape
//! the [`QueryClient`](crate::client::QueryClient) expects: which resource to
//! query, which fields to fetch and the composed query expression.

use crate::field::FieldSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One `(field, operator, value)` predicate
///
/// Written in configuration files as a three-element array:
/// `["State", "=", "Open"]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct Filter {
    /// Attribute name
    pub field: String,
    /// Comparison operator (`=`, `!=`, `contains`, `>`, ...)
    pub operator: String,
    /// Right-hand side
    pub value: String,
}

impl Filter {
    /// Create a predicate
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

impl From<(String, String, String)> for Filter {
    fn from((field, operator, value): (String, String, String)) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }
}

impl From<Filter> for (String, String, String) {
    fn from(filter: Filter) -> Self {
        (filter.field, filter.operator, filter.value)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.contains(char::is_whitespace) {
            write!(f, "({} {} \"{}\")", self.field, self.operator, self.value)
        } else {
            write!(f, "({} {} {})", self.field, self.operator, self.value)
        }
    }
}

/// A composed query expression
///
/// Renders in Rally query syntax, where every sub-expression is parenthesised:
/// `((State = Open) AND (Priority = High))`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    /// A single predicate
    Where(Filter),
    /// Both sides must hold
    And(Box<Query>, Box<Query>),
    /// Either side must hold
    Or(Box<Query>, Box<Query>),
}

impl Query {
    /// Start a query from one predicate
    pub fn with(filter: Filter) -> Self {
        Query::Where(filter)
    }

    /// Conjoin another predicate
    pub fn and(self, filter: Filter) -> Self {
        Query::And(Box::new(self), Box::new(Query::Where(filter)))
    }

    /// Disjoin another predicate
    pub fn or(self, filter: Filter) -> Self {
        Query::Or(Box::new(self), Box::new(Query::Where(filter)))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Where(filter) => fmt::Display::fmt(filter, f),
            Query::And(left, right) => write!(f, "({} AND {})", left, right),
            Query::Or(left, right) => write!(f, "({} OR {})", left, right),
        }
    }
}

/// Compose filters into one query, left to right
///
/// The first filter seeds the expression and every following one is conjoined.
/// No filters means no query.
///
/// # Examples
///
/// ```
/// use rally_export::query::{compose, Filter};
///
/// let query = compose(&[
///     Filter::new("State", "=", "Open"),
///     Filter::new("Priority", "=", "High"),
/// ]);
/// assert_eq!(
///     query.map(|q| q.to_string()).as_deref(),
///     Some("((State = Open) AND (Priority = High))")
/// );
/// assert!(compose(&[]).is_none());
/// ```
pub fn compose(filters: &[Filter]) -> Option<Query> {
    let mut filters = filters.iter().cloned();
    let seed = Query::with(filters.next()?);
    Some(filters.fold(seed, Query::and))
}

/// Field names to request for a set of field configs
pub fn fetch_fields(specs: &[FieldSpec]) -> Vec<String> {
    specs.iter().map(|spec| spec.key().to_string()).collect()
}

/// What a query is aimed at
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryTarget {
    /// All records of a type, e.g. `defect`
    Type(String),
    /// The resource behind a reference URL
    Ref(String),
}

/// Parameters of one query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    /// Type or reference to query
    pub target: QueryTarget,
    /// Fields to fetch (empty = let the client decide)
    pub fetch: Vec<String>,
    /// Filter expression
    pub query: Option<Query>,
}

impl QueryOptions {
    /// Options for listing the records of a type
    pub fn for_type(
        record_type: impl Into<String>,
        specs: &[FieldSpec],
        filters: &[Filter],
    ) -> Self {
        Self {
            target: QueryTarget::Type(record_type.into()),
            fetch: fetch_fields(specs),
            query: compose(filters),
        }
    }

    /// Options for following a reference
    pub fn for_ref(reference: impl Into<String>) -> Self {
        Self {
            target: QueryTarget::Ref(reference.into()),
            fetch: Vec::new(),
            query: None,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;

    fn render(filters: &[Filter]) -> Option<String> {
        compose(filters).map(|q| q.to_string())
    }

    #[test]
    fn two_filters_are_conjoined() {
        let filters = [
            Filter::new("State", "=", "Open"),
            Filter::new("Priority", "=", "High"),
        ];
        assert_eq!(
            compose(&filters),
            Some(Query::And(
                Box::new(Query::Where(filters[0].clone())),
                Box::new(Query::Where(filters[1].clone())),
            ))
        );
        assert_eq!(
            render(&filters).as_deref(),
            Some("((State = Open) AND (Priority = High))")
        );
    }

    #[test]
    fn single_filter_is_just_the_predicate() {
        assert_eq!(
            render(&[Filter::new("State", "=", "Open")]).as_deref(),
            Some("(State = Open)")
        );
    }

    #[test]
    fn no_filters_means_no_query() {
        assert_eq!(compose(&[]), None);
    }

    #[test]
    fn composition_folds_left() {
        let filters = [
            Filter::new("A", "=", "1"),
            Filter::new("B", "=", "2"),
            Filter::new("C", "=", "3"),
        ];
        assert_eq!(
            render(&filters).as_deref(),
            Some("(((A = 1) AND (B = 2)) AND (C = 3))")
        );
    }

    #[test]
    fn values_with_spaces_are_quoted() {
        assert_eq!(
            Filter::new("Name", "contains", "login page").to_string(),
            r#"(Name contains "login page")"#
        );
    }

    #[test]
    fn or_renders_with_or_keyword() {
        let query = Query::with(Filter::new("State", "=", "Open")).or(Filter::new(
            "State",
            "=",
            "Fixed",
        ));
        assert_eq!(query.to_string(), "((State = Open) OR (State = Fixed))");
    }

    #[test]
    fn filter_deserializes_from_triple() {
        let filter: Filter = serde_json::from_str(r#"["State", "=", "Open"]"#).unwrap();
        assert_eq!(filter, Filter::new("State", "=", "Open"));
        assert_eq!(
            serde_json::to_string(&filter).unwrap(),
            r#"["State","=","Open"]"#
        );
    }

    #[test]
    fn type_options_fetch_top_level_keys() {
        let collection = FieldConfig {
            field: "Tasks".into(),
            field_type: Some("collection".into()),
            children: vec![FieldConfig::string("Name")],
            ..Default::default()
        };
        let specs: Vec<FieldSpec> = [FieldConfig::string("FormattedID"), collection]
            .iter()
            .map(|c| FieldSpec::from_config(c).unwrap())
            .collect();

        let options =
            QueryOptions::for_type("defect", &specs, &[Filter::new("State", "=", "Open")]);

        assert_eq!(options.target, QueryTarget::Type("defect".into()));
        assert_eq!(options.fetch, vec!["FormattedID", "Tasks"]);
        assert_eq!(
            options.query.map(|q| q.to_string()).as_deref(),
            Some("(State = Open)")
        );
    }

    #[test]
    fn ref_options_carry_only_the_reference() {
        let options = QueryOptions::for_ref("https://rally/defect/1/Tasks");
        assert_eq!(
            options.target,
            QueryTarget::Ref("https://rally/defect/1/Tasks".into())
        );
        assert!(options.fetch.is_empty());
        assert!(options.query.is_none());
    }
}
