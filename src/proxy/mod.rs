//! Paged, sorted, filtered and counted listings over a base select.

mod metadata;
mod request;

pub use metadata::{FieldInfo, Metadata, PrimaryKey};
pub use request::{Filter, FilterOperator, ListingRequest, SortDirection, SortKey};

use serde::ser::{Error as _, SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;

use crate::ast::{count_star, render_sql, Expression, Literal, SelectItem, SelectQuery, SqlLayout, Statement};
use crate::db::{CallOptions, Connection, Executor, Params, Record};
use crate::error::{CompileError, Error, Result};
use crate::types::Value;
use metadata::{projected, resolve, Projected};

/// Rows of a listing, either as the connection returned them or as maps
/// keyed by the application facing column keys.
#[derive(Debug)]
pub enum Rows<R> {
    Native(Vec<R>),
    Maps(Vec<BTreeMap<String, Value>>),
}

impl<R> Rows<R> {
    pub fn len(&self) -> usize {
        match self {
            Rows::Native(rows) => rows.len(),
            Rows::Maps(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RecordRef<'a, R>(&'a R);

impl<R: Record> Serialize for RecordRef<'_, R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let names = self.0.column_names();
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for (index, name) in names.iter().enumerate() {
            let value = self.0.value_at(index).map_err(S::Error::custom)?;
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl<R: Record> Serialize for Rows<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Rows::Native(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(&RecordRef(row))?;
                }
                seq.end()
            }
            Rows::Maps(rows) => rows.serialize(serializer),
        }
    }
}

/// Result of a listing call. Only the parts that were asked for are set.
#[derive(Debug, Serialize)]
#[serde(bound(serialize = "R: Record"))]
pub struct ListingEnvelope<R> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Rows<R>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<R> Default for ListingEnvelope<R> {
    fn default() -> Self {
        Self {
            count: None,
            rows: None,
            metadata: None,
            success: None,
            message: None,
        }
    }
}

/// Wraps a base select so callers can page, sort, filter and count it
/// without touching its SQL.
#[derive(Debug, Clone)]
pub struct ListingProxy {
    base: SelectQuery,
}

impl ListingProxy {
    pub fn new(base: SelectQuery) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &SelectQuery {
        &self.base
    }

    /// The base query with the request filters applied.
    pub fn filtered(&self, request: &ListingRequest) -> Result<SelectQuery, CompileError> {
        let columns = projected(&self.base);
        let mut query = self.base.clone();
        for filter in &request.filters {
            query = query.filter(predicate(&columns, filter)?);
        }
        Ok(query)
    }

    /// `SELECT count(*)` over the filtered query, projected down to its
    /// first column.
    pub fn count_statement(&self, request: &ListingRequest) -> Result<Statement, CompileError> {
        let filtered = self.filtered(request)?;
        let pivot = filtered
            .inner_columns()
            .next()
            .cloned()
            .or_else(|| projected(&filtered).into_iter().next().map(|p| p.expr))
            .unwrap_or(Expression::Literal(Literal::Integer(1)));
        let simple = filtered.with_only_columns(vec![SelectItem::from(pivot)]);
        Ok(SelectQuery::new(vec![count_star().label("count_1")])
            .from_subquery(simple, "cnt")
            .into())
    }

    /// The filtered query sorted by the request keys ahead of its own
    /// ordering, then paged.
    pub fn rows_statement(&self, request: &ListingRequest) -> Result<Statement, CompileError> {
        let columns = projected(&self.base);
        let mut query = self.filtered(request)?;

        let mut order_by = Vec::with_capacity(request.sort.len() + query.order_by.len());
        for key in &request.sort {
            let target = resolve(&columns, &key.attribute)
                .ok_or_else(|| CompileError::UnknownColumn(key.attribute.clone()))?;
            order_by.push(match key.direction {
                SortDirection::Asc => target.expr.clone().asc(),
                SortDirection::Desc => target.expr.clone().desc(),
            });
        }
        order_by.append(&mut query.order_by);
        query.order_by = order_by;

        if let Some(start) = request.start.filter(|start| *start > 0) {
            query = query.offset(start);
        }
        if let Some(limit) = request.limit {
            query = query.limit(limit);
        }
        Ok(query.into())
    }

    pub fn metadata(&self, request: &ListingRequest) -> Metadata {
        let mut metadata = Metadata::describe(&self.base);
        if request.rows {
            metadata.root_slot = Some("rows".to_string());
        }
        if request.count {
            metadata.total_slot = Some("count".to_string());
        }
        if request.status {
            metadata.success_slot = Some("success".to_string());
        }
        metadata
    }

    /// Run the listing. Any failure aborts the whole call; failures the
    /// engine did not already report are logged with the statement that
    /// caused them.
    pub async fn invoke<C: Connection>(
        &self,
        executor: &Executor,
        conn: &C,
        request: &ListingRequest,
    ) -> Result<ListingEnvelope<C::Row>> {
        let mut current = Statement::from(self.base.clone());
        match self.run(executor, conn, request, &mut current).await {
            Ok(envelope) => Ok(envelope),
            Err(err) => {
                // A quiet engine has already logged driver failures at ERROR.
                let logged = err.as_driver_error().is_some() && !executor.config().is_verbose();
                if !logged {
                    let sql = render_sql(&current, SqlLayout::Compact, Some(&request.params))
                        .unwrap_or_else(|_| format!("{:?}", current));
                    error!("Error executing {}: {}", sql, err);
                }
                Err(err)
            }
        }
    }

    async fn run<C: Connection>(
        &self,
        executor: &Executor,
        conn: &C,
        request: &ListingRequest,
        current: &mut Statement,
    ) -> Result<ListingEnvelope<C::Row>> {
        let params = Params::named(&request.params);
        let options = CallOptions::default();
        let mut envelope = ListingEnvelope::default();

        if !request.metadata_only() {
            if request.count {
                *current = self.count_statement(request)?;
                let count = executor.fetch_scalar(conn, current, params, &options).await?;
                envelope.count = Some(count.and_then(|value| value.as_i64()).unwrap_or(0));
            }
            if request.rows {
                *current = self.rows_statement(request)?;
                let rows = executor.fetch_all(conn, current, params, &options).await?;
                envelope.rows = Some(if request.as_map {
                    Rows::Maps(to_maps(&projected(&self.base), rows)?)
                } else {
                    Rows::Native(rows)
                });
            }
        }

        if request.metadata {
            envelope.metadata = Some(self.metadata(request));
        }
        if request.status {
            envelope.success = Some(true);
            envelope.message = Some("Ok".to_string());
        }
        Ok(envelope)
    }
}

fn predicate(columns: &[Projected], filter: &Filter) -> Result<Expression, CompileError> {
    let target = resolve(columns, &filter.attribute)
        .ok_or_else(|| CompileError::UnknownColumn(filter.attribute.clone()))?;
    let value = match &target.column {
        Some(column) => request::coerce(&filter.value, column)?,
        None => Value::from_json(filter.value.clone()),
    };
    let expr = target.expr.clone();
    if value.is_null() {
        return match filter.operator {
            FilterOperator::Eq => Ok(expr.is_null()),
            FilterOperator::Ne => Ok(expr.is_not_null()),
            _ => Err(CompileError::InvalidValue {
                column: target.key.clone(),
                reason: "NULL can only be compared for equality".to_string(),
            }),
        };
    }
    Ok(match filter.operator {
        FilterOperator::Eq => expr.eq(value),
        FilterOperator::Ne => expr.ne(value),
        FilterOperator::Lt => expr.lt(value),
        FilterOperator::Le => expr.le(value),
        FilterOperator::Gt => expr.gt(value),
        FilterOperator::Ge => expr.ge(value),
        FilterOperator::Like => expr.like(value),
        FilterOperator::ILike => expr.ilike(value),
    })
}

fn to_maps<R: Record>(columns: &[Projected], rows: Vec<R>) -> Result<Vec<BTreeMap<String, Value>>> {
    rows.iter()
        .map(|row| -> Result<BTreeMap<String, Value>> {
            if columns.is_empty() {
                return row
                    .column_names()
                    .into_iter()
                    .enumerate()
                    .map(|(index, name)| Ok((name, row.value_at(index).map_err(Error::Driver)?)))
                    .collect();
            }
            columns
                .iter()
                .map(|p| Ok((p.key.clone(), row.value_of(&p.name).map_err(Error::Driver)?)))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{select, Column, Table};
    use crate::config::EngineConfig;
    use crate::testing::{capture_logs, MockConnection, MockResponse, MockRow};
    use crate::types::SqlType;
    use std::sync::Arc;
    use tracing::Level;

    const NAMES: [&str; 4] = ["admin", "secretary", "ceo", "inter"];

    fn users() -> Arc<Table> {
        Table::new("users")
            .column(Column::new("id", SqlType::Integer).primary_key())
            .column(Column::new("name", SqlType::Varchar(None)).not_null())
            .column(Column::new("email", SqlType::Varchar(None)).label("Email"))
            .build()
    }

    fn user_rows(names: &[&str]) -> Vec<MockRow> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                MockRow::new(&[
                    ("id", Value::Int32(i as i32 + 1)),
                    ("name", Value::from(*name)),
                    ("email", Value::from(format!("{}@example.com", name))),
                ])
            })
            .collect()
    }

    fn executor() -> Executor {
        Executor::new(EngineConfig {
            verbose: Some(false),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_plain_listing() {
        let users = users();
        let conn = MockConnection::new().respond(MockResponse::Rows(user_rows(&NAMES)));
        let proxy = ListingProxy::new(select(&users));
        let envelope = proxy
            .invoke(&executor(), &conn, &ListingRequest::new())
            .await
            .unwrap();
        assert_eq!(envelope.rows.map(|r| r.len()), Some(4));
        assert_eq!(envelope.count, None);
        assert!(envelope.metadata.is_none());
        assert_eq!(envelope.success, Some(true));
        assert_eq!(envelope.message.as_deref(), Some("Ok"));
        assert_eq!(
            conn.calls()[0].0,
            "SELECT users.id, users.name, users.email FROM users"
        );
    }

    #[tokio::test]
    async fn test_limit_and_start() {
        let users = users();
        let conn = MockConnection::new().respond(MockResponse::Rows(user_rows(&NAMES[..1])));
        let proxy = ListingProxy::new(select(&users));
        let request = ListingRequest::new().start(2).limit(1).as_map();
        let envelope = proxy.invoke(&executor(), &conn, &request).await.unwrap();

        let Some(Rows::Maps(rows)) = envelope.rows else {
            panic!("expected rows as maps");
        };
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains_key("id"));
        let (sql, args) = &conn.calls()[0];
        assert!(sql.ends_with("FROM users LIMIT $1::INTEGER OFFSET $2::INTEGER"));
        assert_eq!(args, &vec![Value::Int64(1), Value::Int64(2)]);
    }

    #[tokio::test]
    async fn test_sort_comes_before_base_ordering() {
        let users = users();
        let base = select(&users).order_by(users.col("id").unwrap().asc());
        let proxy = ListingProxy::new(base);
        let request: ListingRequest = serde_json::from_str(
            r#"{"sort": "[{\"property\":\"name\",\"direction\":\"DESC\"}]"}"#,
        )
        .unwrap();
        let conn = MockConnection::new();
        proxy.invoke(&executor(), &conn, &request).await.unwrap();
        assert!(conn.calls()[0].0.ends_with("ORDER BY users.name DESC, users.id ASC"));
    }

    #[tokio::test]
    async fn test_filter() {
        let users = users();
        let conn = MockConnection::new().respond(MockResponse::Rows(user_rows(&["ceo"])));
        let proxy = ListingProxy::new(select(&users));
        let request = ListingRequest::new().filter("name", FilterOperator::Eq, "ceo").as_map();
        let envelope = proxy.invoke(&executor(), &conn, &request).await.unwrap();

        let Some(Rows::Maps(rows)) = envelope.rows else {
            panic!("expected rows as maps");
        };
        assert_eq!(rows[0]["name"], Value::from("ceo"));
        let (sql, args) = &conn.calls()[0];
        assert!(sql.ends_with("FROM users WHERE users.name = $1::VARCHAR"));
        assert_eq!(args, &vec![Value::from("ceo")]);
    }

    #[tokio::test]
    async fn test_count_uses_filters_but_not_paging() {
        let users = users();
        let conn = MockConnection::new()
            .respond(MockResponse::Rows(vec![MockRow::new(&[("count_1", Value::Int64(3))])]))
            .respond(MockResponse::Rows(user_rows(&NAMES[1..2])));
        let proxy = ListingProxy::new(select(&users));
        let request = ListingRequest::new()
            .filter("id", FilterOperator::Gt, 1)
            .limit(1)
            .with_count();
        let envelope = proxy.invoke(&executor(), &conn, &request).await.unwrap();
        assert_eq!(envelope.count, Some(3));
        assert_eq!(envelope.rows.map(|r| r.len()), Some(1));

        let calls = conn.calls();
        assert_eq!(
            calls[0].0,
            "SELECT count(*) AS count_1 FROM (SELECT users.id FROM users WHERE users.id > $1::INTEGER) AS cnt"
        );
        assert_eq!(calls[0].1, vec![Value::Int32(1)]);
        assert!(calls[1].0.ends_with("WHERE users.id > $1::INTEGER LIMIT $2::INTEGER"));
    }

    #[tokio::test]
    async fn test_zero_limit_gives_metadata_only() {
        let users = users();
        let conn = MockConnection::new();
        let proxy = ListingProxy::new(select(&users));
        let request = ListingRequest::new().limit(0).with_count().with_metadata();
        let envelope = proxy.invoke(&executor(), &conn, &request).await.unwrap();
        assert!(conn.calls().is_empty());
        assert!(envelope.rows.is_none());
        assert!(envelope.count.is_none());

        let metadata = envelope.metadata.unwrap();
        assert_eq!(metadata.primary_key, Some(PrimaryKey::Single("id".into())));
        let email = metadata.fields.iter().find(|f| f.name == "email").unwrap();
        assert_eq!(email.label, "Email");
        assert_eq!(metadata.root_slot.as_deref(), Some("rows"));
        assert_eq!(metadata.total_slot.as_deref(), Some("count"));
    }

    #[tokio::test]
    async fn test_maps_use_column_keys() {
        let people = Table::new("people")
            .column(Column::new("id", SqlType::Integer).primary_key())
            .column(Column::new("full_name", SqlType::Text).key("name"))
            .build();
        let row = MockRow::new(&[("id", Value::Int32(7)), ("full_name", Value::from("Lele"))]);
        let conn = MockConnection::new().respond(MockResponse::Rows(vec![row]));
        let proxy = ListingProxy::new(select(&people));
        let request = ListingRequest::new().as_map().sort_by("name", SortDirection::Asc);
        let envelope = proxy.invoke(&executor(), &conn, &request).await.unwrap();

        let Some(Rows::Maps(rows)) = envelope.rows else {
            panic!("expected rows as maps");
        };
        assert_eq!(rows[0]["name"], Value::from("Lele"));
        assert!(!rows[0].contains_key("full_name"));
        assert!(conn.calls()[0].0.ends_with("ORDER BY people.full_name ASC"));
    }

    #[tokio::test]
    async fn test_unknown_attribute_fails_the_call() {
        let (logs, _guard) = capture_logs();
        let users = users();
        let conn = MockConnection::new();
        let proxy = ListingProxy::new(select(&users));
        let request = ListingRequest::new().with_count().filter("nope", FilterOperator::Eq, 1);
        let err = proxy.invoke(&executor(), &conn, &request).await.unwrap_err();
        assert!(matches!(err, Error::Compile(CompileError::UnknownColumn(ref name)) if name == "nope"));
        assert!(conn.calls().is_empty());
        assert_eq!(logs.count(Level::ERROR), 1);
        assert!(logs.events()[0].message.starts_with("Error executing SELECT users.id"));
    }

    #[tokio::test]
    async fn test_driver_failure_is_reported_once() {
        let (logs, _guard) = capture_logs();
        let users = users();
        let conn = MockConnection::new().respond(MockResponse::Failure("canceling statement".into()));
        let proxy = ListingProxy::new(select(&users));
        let err = proxy
            .invoke(&executor(), &conn, &ListingRequest::new().with_count())
            .await
            .unwrap_err();
        assert!(err.as_driver_error().is_some());
        assert_eq!(conn.calls().len(), 1);
        assert_eq!(logs.count(Level::ERROR), 1);
    }

    #[tokio::test]
    async fn test_verbose_driver_failure_is_logged_as_error() {
        let (logs, _guard) = capture_logs();
        let users = users();
        let conn = MockConnection::new().respond(MockResponse::Failure("canceling statement".into()));
        let proxy = ListingProxy::new(select(&users));
        let verbose = Executor::new(EngineConfig {
            verbose: Some(true),
            ..Default::default()
        });
        let err = proxy
            .invoke(&verbose, &conn, &ListingRequest::new())
            .await
            .unwrap_err();
        assert!(err.as_driver_error().is_some());
        assert_eq!(logs.count(Level::ERROR), 1);
        let events = logs.events();
        let record = events.iter().find(|e| e.level == Level::ERROR).unwrap();
        assert!(record.message.starts_with("Error executing SELECT"));
        assert!(record.message.ends_with("canceling statement"));
    }

    #[tokio::test]
    async fn test_envelope_serialization() {
        let users = users();
        let conn = MockConnection::new()
            .respond(MockResponse::Rows(vec![MockRow::new(&[("count_1", Value::Int64(1))])]))
            .respond(MockResponse::Rows(user_rows(&["admin"])));
        let proxy = ListingProxy::new(select(&users));
        let envelope = proxy
            .invoke(&executor(), &conn, &ListingRequest::new().with_count())
            .await
            .unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "count": 1,
                "rows": [{"id": 1, "name": "admin", "email": "admin@example.com"}],
                "success": true,
                "message": "Ok"
            })
        );
    }

    #[test]
    fn test_null_filter() {
        let users = users();
        let proxy = ListingProxy::new(select(&users));
        let request = ListingRequest::new().filter("email", FilterOperator::Eq, serde_json::Value::Null);
        let query = proxy.filtered(&request).unwrap();
        let sql = render_sql(&query.into(), SqlLayout::Compact, None).unwrap();
        assert!(sql.ends_with("WHERE users.email IS NULL"));

        let request = ListingRequest::new().filter("email", FilterOperator::Lt, serde_json::Value::Null);
        assert!(matches!(
            proxy.filtered(&request),
            Err(CompileError::InvalidValue { .. })
        ));
    }
}
