//! Shared fixture for the database backed tests.
//!
//! The tests run only when `PGCOMPOSE_TEST_DATABASE_URL` points at a
//! PostgreSQL server; every fixture lives in temporary tables of the test's
//! own session.

#![allow(dead_code)]

use chrono::NaiveDate;
use std::sync::Arc;
use tokio_postgres::Client;
use tracing_subscriber::EnvFilter;

use pgcompose::ast::{insert, Column, Table, ValueProducer};
use pgcompose::types::{Interval, Range, SqlType};
use pgcompose::db::{create_client, ConnectionConfig};
use pgcompose::{EngineConfig, Executor, Params, Statement, Value};

pub const NAMES: [&str; 4] = ["admin", "secretary", "ceo", "inter"];

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A connected client, or `None` when no test database is configured.
pub async fn connect() -> Option<Client> {
    init_logging();
    let Ok(url) = std::env::var("PGCOMPOSE_TEST_DATABASE_URL") else {
        eprintln!("PGCOMPOSE_TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let config = ConnectionConfig::from_url(&url).expect("valid test database URL");
    Some(create_client(&config).await.expect("test database is reachable"))
}

pub fn executor() -> Executor {
    Executor::new(EngineConfig {
        slow_query_threshold_ms: 10_000,
        ..Default::default()
    })
}

pub fn users() -> Arc<Table> {
    Table::new("users")
        .column(
            Column::new("id", SqlType::Integer)
                .primary_key()
                .default(ValueProducer::Server),
        )
        .column(Column::new("name", SqlType::Varchar(None)).not_null())
        .column(Column::new("email", SqlType::Varchar(None)).label("Email"))
        .column(Column::new("status", SqlType::Varchar(Some(10))).default(ValueProducer::constant("active")))
        .column(Column::new("validity", SqlType::DateRange))
        .column(Column::new("max_renew", SqlType::Interval))
        .build()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Create and fill the temporary `users` table.
pub async fn create_users(client: &Client) {
    client
        .batch_execute(
            "CREATE TEMPORARY TABLE users (
                 id serial PRIMARY KEY,
                 name varchar NOT NULL UNIQUE,
                 email varchar,
                 status varchar(10),
                 validity daterange,
                 max_renew interval
             )",
        )
        .await
        .expect("users table is created");

    let users = users();
    let exec = executor();
    let validity = [
        Range::new(Some(date(2016, 1, 1)), None),
        Range::new(Some(date(2017, 1, 1)), Some(date(2019, 1, 1))),
        Range::new(Some(date(2017, 11, 30)), None),
        Range::new(Some(date(2017, 6, 1)), Some(date(2017, 11, 30))),
    ];
    for (name, validity) in NAMES.iter().zip(validity) {
        let max_renew = match *name {
            "secretary" => Interval::new(14, 3, 0),
            _ => Interval::new(12, 0, 0),
        };
        let statement: Statement = insert(&users)
            .value("name", *name)
            .value("email", format!("{}@example.com", name))
            .value("validity", Value::from(validity))
            .value("max_renew", max_renew)
            .into();
        let status = exec
            .execute(client, &statement, Params::none(), &Default::default())
            .await
            .expect("fixture row is inserted");
        assert_eq!(status, "INSERT 0 1");
    }
}
