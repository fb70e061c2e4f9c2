use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, MySql};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Null,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(v as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// ===============================
/// Partial UPDATE builder
/// ===============================
/// Column names are always supplied by handler code, never by the payload.
#[derive(Debug)]
pub struct UpdateBuilder {
    table: &'static str,
    sets: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<SqlValue>) -> &mut Self {
        self.sets.push(column);
        self.values.push(value.into());
        self
    }

    /// Adds the column only when a value was provided.
    pub fn set_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.set(column, v);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn sql(&self) -> String {
        let set_clause = self
            .sets
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");

        format!("UPDATE {} SET {} WHERE id = ?", self.table, set_clause)
    }

    /// Executes the update for row `id` and returns the affected row count.
    pub async fn execute<'e, E>(self, db: E, id: u64) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = self.sql();
        let mut query = sqlx::query(&sql);

        for value in self.values {
            query = match value {
                SqlValue::String(v) => query.bind(v),
                SqlValue::U64(v) => query.bind(v),
                SqlValue::I64(v) => query.bind(v),
                SqlValue::Bool(v) => query.bind(v),
                SqlValue::Date(v) => query.bind(v),
                SqlValue::DateTime(v) => query.bind(v),
                SqlValue::Null => query.bind(None::<String>),
            };
        }

        let result = query.bind(id).execute(db).await?;
        Ok(result.rows_affected())
    }
}

/// Dynamic WHERE clause with its bind values, shared by the list endpoints.
#[derive(Debug, Default)]
pub struct Filter {
    conditions: Vec<String>,
    pub values: Vec<SqlValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        self.conditions.push(condition.into());
        self.values.push(value.into());
        self
    }

    /// Condition with several placeholders, values in placeholder order.
    pub fn push_many(&mut self, condition: impl Into<String>, values: Vec<SqlValue>) -> &mut Self {
        self.conditions.push(condition.into());
        self.values.extend(values);
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}

/// Binds filter values onto a `query_as` in order.
pub fn bind_values<'q, O>(
    mut query: sqlx::query::QueryAs<'q, MySql, O, sqlx::mysql::MySqlArguments>,
    values: &[SqlValue],
) -> sqlx::query::QueryAs<'q, MySql, O, sqlx::mysql::MySqlArguments> {
    for value in values {
        query = match value.clone() {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Same as [`bind_values`] for `query_scalar`.
pub fn bind_scalar_values<'q, O>(
    mut query: sqlx::query::QueryScalar<'q, MySql, O, sqlx::mysql::MySqlArguments>,
    values: &[SqlValue],
) -> sqlx::query::QueryScalar<'q, MySql, O, sqlx::mysql::MySqlArguments> {
    for value in values {
        query = match value.clone() {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}
