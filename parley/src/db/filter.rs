//! Keyword filters translated into SQL predicates.
//!
//! List endpoints accept Django-style lookups such as `name__istartswith=gen` or `id__in=1,2,3`.
//! A lookup is split on the first `__` into a field and an operator (no suffix means `equals`).
//! Fields are resolved against the whitelist a table declares through [`Filterable`], so column
//! names in the generated SQL never come from user input, and values are always bound.
//!
//! ```ignore
//! let filters = Filters::<ChatRoomDBResponse>::new().add("name__istartswith", "gen")?;
//! let mut query = QueryBuilder::new("SELECT * FROM chat_rooms WHERE TRUE");
//! filters.push_where(&mut query);
//! // SELECT * FROM chat_rooms WHERE TRUE AND chat_rooms.name ILIKE $1
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use std::{fmt, marker::PhantomData};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Model {model} does not have any field named: '{field}'.\nPlease retry with one of: ({available})")]
    UnknownField {
        model: &'static str,
        field: String,
        available: String,
    },

    #[error("Invalid value for field '{field}': {value}")]
    InvalidValue { field: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Text,
    Bool,
    Timestamp,
}

/// A filterable column.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn int(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Int }
    }

    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Text }
    }

    pub const fn bool(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Bool }
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Timestamp }
    }
}

/// Implemented by database records whose table can be filtered.
pub trait Filterable {
    /// Model name used in error messages
    const MODEL: &'static str;
    const TABLE: &'static str;
    const FIELDS: &'static [Field];

    fn field(name: &str) -> Result<&'static Field, FilterError> {
        Self::FIELDS
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| FilterError::UnknownField {
                model: Self::MODEL,
                field: name.to_string(),
                available: Self::FIELDS.iter().map(|f| f.name).collect::<Vec<_>>().join(", "),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    IContains,
    NotContains,
    NotIContains,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "contains" => Operator::Contains,
            "icontains" => Operator::IContains,
            "not_contains" => Operator::NotContains,
            "not_icontains" => Operator::NotIContains,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "startswith" => Operator::StartsWith,
            "istartswith" => Operator::IStartsWith,
            "endswith" => Operator::EndsWith,
            "iendswith" => Operator::IEndsWith,
            _ => return None,
        })
    }

    fn is_pattern(&self) -> bool {
        matches!(
            self,
            Operator::Contains
                | Operator::IContains
                | Operator::NotContains
                | Operator::NotIContains
                | Operator::StartsWith
                | Operator::IStartsWith
                | Operator::EndsWith
                | Operator::IEndsWith
        )
    }

    fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// SQL operator placed between the column and the bound value
    fn sql(&self) -> &'static str {
        match self {
            Operator::Equals => " = ",
            Operator::NotEquals => " <> ",
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => " LIKE ",
            Operator::IContains | Operator::IStartsWith | Operator::IEndsWith => " ILIKE ",
            Operator::NotContains => " NOT LIKE ",
            Operator::NotIContains => " NOT ILIKE ",
            Operator::In => " = ANY(",
            Operator::NotIn => " <> ALL(",
            Operator::Gt => " > ",
            Operator::Gte => " >= ",
            Operator::Lt => " < ",
            Operator::Lte => " <= ",
        }
    }

    /// Wrap an escaped value into the LIKE pattern for this operator
    fn pattern(&self, escaped: &str) -> String {
        match self {
            Operator::StartsWith | Operator::IStartsWith => format!("{escaped}%"),
            Operator::EndsWith | Operator::IEndsWith => format!("%{escaped}"),
            _ => format!("%{escaped}%"),
        }
    }
}

/// A parsed `field__operator` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub field: String,
    pub operator: Operator,
}

impl Lookup {
    pub fn parse(key: &str) -> Result<Self, FilterError> {
        match key.split_once("__") {
            None => Ok(Self {
                field: key.to_string(),
                operator: Operator::Equals,
            }),
            Some((_, "")) => Err(FilterError::InvalidOperator(key.to_string())),
            Some((field, op)) => {
                let operator = Operator::parse(op).ok_or_else(|| FilterError::InvalidOperator(op.to_string()))?;
                Ok(Self {
                    field: field.to_string(),
                    operator,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    List(Vec<FilterValue>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Int(v) => write!(f, "{v}"),
            FilterValue::Text(v) => write!(f, "{v}"),
            FilterValue::Bool(v) => write!(f, "{v}"),
            FilterValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            FilterValue::List(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::Timestamp(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

fn invalid(field: &Field, value: &FilterValue) -> FilterError {
    FilterError::InvalidValue {
        field: field.name.to_string(),
        value: value.to_string(),
    }
}

/// Coerce a single value to the column kind. Text is parsed for non-text columns.
fn coerce(field: &Field, value: FilterValue) -> Result<FilterValue, FilterError> {
    match (field.kind, value) {
        (FieldKind::Int, v @ FilterValue::Int(_)) => Ok(v),
        (FieldKind::Int, FilterValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(FilterValue::Int)
            .map_err(|_| invalid(field, &FilterValue::Text(s))),
        (FieldKind::Text, v @ FilterValue::Text(_)) => Ok(v),
        (FieldKind::Text, FilterValue::Int(i)) => Ok(FilterValue::Text(i.to_string())),
        (FieldKind::Bool, v @ FilterValue::Bool(_)) => Ok(v),
        (FieldKind::Bool, FilterValue::Text(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(FilterValue::Bool(true)),
            "false" | "0" => Ok(FilterValue::Bool(false)),
            _ => Err(invalid(field, &FilterValue::Text(s))),
        },
        (FieldKind::Timestamp, v @ FilterValue::Timestamp(_)) => Ok(v),
        (FieldKind::Timestamp, FilterValue::Text(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| FilterValue::Timestamp(dt.with_timezone(&Utc)))
            .map_err(|_| invalid(field, &FilterValue::Text(s))),
        (_, other) => Err(invalid(field, &other)),
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone)]
struct Predicate {
    column: &'static str,
    operator: Operator,
    value: FilterValue,
}

/// A conjunction of predicates over the table of `M`.
#[derive(Debug, Clone)]
pub struct Filters<M> {
    predicates: Vec<Predicate>,
    _model: PhantomData<M>,
}

impl<M> Default for Filters<M> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            _model: PhantomData,
        }
    }
}

impl<M: Filterable> Filters<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate from a `field__operator` key.
    pub fn add(mut self, key: &str, value: impl Into<FilterValue>) -> Result<Self, FilterError> {
        let lookup = Lookup::parse(key)?;
        let field = M::field(&lookup.field)?;
        let value = value.into();

        let value = if lookup.operator.is_list() {
            let items = match value {
                FilterValue::List(items) => items,
                // Query strings carry lists as comma separated text
                FilterValue::Text(s) => s.split(',').map(|item| FilterValue::Text(item.to_string())).collect(),
                single => vec![single],
            };
            FilterValue::List(items.into_iter().map(|item| coerce(field, item)).collect::<Result<_, _>>()?)
        } else if lookup.operator.is_pattern() {
            match value {
                FilterValue::Text(s) => FilterValue::Text(lookup.operator.pattern(&escape_like(&s))),
                other => FilterValue::Text(lookup.operator.pattern(&escape_like(&other.to_string()))),
            }
        } else {
            coerce(field, value)?
        };

        self.predicates.push(Predicate {
            column: field.name,
            operator: lookup.operator,
            value,
        });
        Ok(self)
    }

    /// Add every `(key, value)` pair, failing on the first invalid one.
    pub fn extend<K, V, I>(mut self, pairs: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        for (key, value) in pairs {
            self = self.add(key.as_ref(), value)?;
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Append `AND <column> <op> $n` for every predicate.
    pub fn push_where(&self, query: &mut QueryBuilder<'_, Postgres>) {
        for predicate in &self.predicates {
            query.push(" AND ");
            if predicate.operator.is_pattern() {
                query.push(format_args!("CAST({}.{} AS TEXT)", M::TABLE, predicate.column));
            } else {
                query.push(format_args!("{}.{}", M::TABLE, predicate.column));
            }
            query.push(predicate.operator.sql());
            push_value(query, &predicate.value);
            if predicate.operator.is_list() {
                query.push(")");
            }
        }
    }
}

fn push_value(query: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Int(v) => {
            query.push_bind(*v);
        }
        FilterValue::Text(v) => {
            query.push_bind(v.clone());
        }
        FilterValue::Bool(v) => {
            query.push_bind(*v);
        }
        FilterValue::Timestamp(v) => {
            query.push_bind(*v);
        }
        FilterValue::List(items) => match items.first() {
            Some(FilterValue::Int(_)) | None => {
                let ints: Vec<i64> = items
                    .iter()
                    .filter_map(|item| match item {
                        FilterValue::Int(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                query.push_bind(ints);
            }
            Some(FilterValue::Bool(_)) => {
                let bools: Vec<bool> = items
                    .iter()
                    .filter_map(|item| match item {
                        FilterValue::Bool(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                query.push_bind(bools);
            }
            Some(FilterValue::Timestamp(_)) => {
                let stamps: Vec<DateTime<Utc>> = items
                    .iter()
                    .filter_map(|item| match item {
                        FilterValue::Timestamp(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                query.push_bind(stamps);
            }
            Some(_) => {
                let texts: Vec<String> = items.iter().map(ToString::to_string).collect();
                query.push_bind(texts);
            }
        },
    }
}

/// `ORDER BY` clause over a whitelisted field. A leading `-` sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub fn parse<M: Filterable>(key: &str) -> Result<Self, FilterError> {
        let (name, descending) = match key.strip_prefix('-') {
            Some(name) => (name, true),
            None => (key, false),
        };
        let field = M::field(name)?;
        Ok(Self {
            column: field.name,
            descending,
        })
    }

    pub fn push<M: Filterable>(&self, query: &mut QueryBuilder<'_, Postgres>) {
        query.push(format_args!(
            " ORDER BY {}.{} {}",
            M::TABLE,
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Room;

    impl Filterable for Room {
        const MODEL: &'static str = "ChatRoom";
        const TABLE: &'static str = "chat_rooms";
        const FIELDS: &'static [Field] = &[
            Field::int("id"),
            Field::text("name"),
            Field::int("owner_id"),
            Field::timestamp("created_at"),
        ];
    }

    fn sql(filters: &Filters<Room>) -> String {
        let mut query = QueryBuilder::new("SELECT * FROM chat_rooms WHERE TRUE");
        filters.push_where(&mut query);
        query.sql().to_string()
    }

    #[test]
    fn test_lookup_defaults_to_equals() {
        let lookup = Lookup::parse("name").unwrap();
        assert_eq!(lookup.field, "name");
        assert_eq!(lookup.operator, Operator::Equals);

        let lookup = Lookup::parse("name__istartswith").unwrap();
        assert_eq!(lookup.operator, Operator::IStartsWith);
    }

    #[test]
    fn test_lookup_rejects_empty_and_unknown_operators() {
        let err = Lookup::parse("id__").unwrap_err();
        assert_eq!(err.to_string(), "Invalid operator: id__");

        let err = Lookup::parse("name__like").unwrap_err();
        assert_eq!(err.to_string(), "Invalid operator: like");
    }

    #[test]
    fn test_unknown_field_lists_alternatives() {
        let err = Filters::<Room>::new().add("title", "x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Model ChatRoom does not have any field named: 'title'.\nPlease retry with one of: (id, name, owner_id, created_at)"
        );
    }

    #[test]
    fn test_predicates_are_bound() {
        let filters = Filters::<Room>::new()
            .add("name__istartswith", "gen")
            .unwrap()
            .add("owner_id", "7")
            .unwrap()
            .add("id__in", vec![1_i64, 2, 3])
            .unwrap();

        assert_eq!(
            sql(&filters),
            "SELECT * FROM chat_rooms WHERE TRUE AND CAST(chat_rooms.name AS TEXT) ILIKE $1 \
             AND chat_rooms.owner_id = $2 AND chat_rooms.id = ANY($3)"
        );
    }

    #[test]
    fn test_negated_operators() {
        let filters = Filters::<Room>::new()
            .add("name__not_icontains", "spam")
            .unwrap()
            .add("id__not_in", "4,5")
            .unwrap()
            .add("id__gte", 2_i64)
            .unwrap();

        assert_eq!(
            sql(&filters),
            "SELECT * FROM chat_rooms WHERE TRUE AND CAST(chat_rooms.name AS TEXT) NOT ILIKE $1 \
             AND chat_rooms.id <> ALL($2) AND chat_rooms.id >= $3"
        );
    }

    #[test]
    fn test_patterns_escape_wildcards() {
        let filters = Filters::<Room>::new().add("name__contains", "50%_off\\").unwrap();
        assert_eq!(
            filters.predicates[0].value,
            FilterValue::Text("%50\\%\\_off\\\\%".to_string())
        );

        let filters = Filters::<Room>::new().add("name__endswith", "ops").unwrap();
        assert_eq!(filters.predicates[0].value, FilterValue::Text("%ops".to_string()));
    }

    #[test]
    fn test_extend_from_query_pairs() {
        let filters = Filters::<Room>::new()
            .extend([("name__startswith", "gen"), ("owner_id", "3")])
            .unwrap();
        assert_eq!(filters.predicates.len(), 2);

        let err = Filters::<Room>::new()
            .extend([("name", "general"), ("title", "x")])
            .unwrap_err();
        assert!(matches!(err, FilterError::UnknownField { .. }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Filters::<Room>::new().add("owner_id", "seven").unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));

        let err = Filters::<Room>::new().add("created_at__gt", "yesterday").unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));
    }

    #[test]
    fn test_order_by() {
        let order = OrderBy::parse::<Room>("-created_at").unwrap();
        assert!(order.descending);

        let mut query = QueryBuilder::new("SELECT * FROM chat_rooms");
        OrderBy::parse::<Room>("name").unwrap().push::<Room>(&mut query);
        assert_eq!(query.sql(), "SELECT * FROM chat_rooms ORDER BY chat_rooms.name ASC");

        assert!(OrderBy::parse::<Room>("-secret").is_err());
    }
}
