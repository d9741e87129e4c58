//! In-memory connection and log capture used by the unit tests.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::db::{Connection, Record, RowCursor};
use crate::error::DriverError;
use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct MockRow {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl MockRow {
    pub fn new(pairs: &[(&str, Value)]) -> Self {
        Self {
            columns: pairs.iter().map(|(name, _)| name.to_string()).collect(),
            values: pairs.iter().map(|(_, value)| value.clone()).collect(),
        }
    }
}

impl Record for MockRow {
    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn value_at(&self, index: usize) -> Result<Value, DriverError> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| format!("No column at index {}", index).into())
    }
}

#[derive(Debug, Clone)]
pub enum MockResponse {
    Status(String),
    Rows(Vec<MockRow>),
    Failure(String),
}

/// Replays queued responses in order and records every statement it runs.
/// With nothing queued, statements succeed with no rows.
#[derive(Default)]
pub struct MockConnection {
    responses: Mutex<VecDeque<MockResponse>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    delay: Option<Duration>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    async fn next(&self, sql: &str, args: &[Value]) -> Option<MockResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), args.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Connection for MockConnection {
    type Row = MockRow;
    type Prepared = String;

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<String, DriverError> {
        match self.next(sql, args).await {
            Some(MockResponse::Status(status)) => Ok(status),
            Some(MockResponse::Failure(message)) => Err(message.into()),
            Some(MockResponse::Rows(rows)) => Ok(format!("SELECT {}", rows.len())),
            None => Ok(crate::db::command_tag(sql, 0)),
        }
    }

    async fn prepare(&self, sql: &str) -> Result<String, DriverError> {
        match self.next(sql, &[]).await {
            Some(MockResponse::Failure(message)) => Err(message.into()),
            _ => Ok(sql.to_string()),
        }
    }

    async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<MockRow>, DriverError> {
        match self.next(sql, args).await {
            Some(MockResponse::Rows(rows)) => Ok(rows),
            Some(MockResponse::Failure(message)) => Err(message.into()),
            Some(MockResponse::Status(_)) | None => Ok(Vec::new()),
        }
    }

    async fn cursor(&self, sql: &str, args: &[Value]) -> Result<RowCursor<MockRow>, DriverError> {
        let rows = self.fetch(sql, args).await?;
        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    fn transaction_token(&self) -> String {
        "7e57".to_string()
    }
}

/// A log record seen by [`CaptureLayer`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Collects every event into a shared list.
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<Captured> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.events().iter().filter(|e| e.level == level).count()
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Install a capturing subscriber on the current thread for the lifetime
/// of the returned guard.
pub fn capture_logs() -> (CaptureLayer, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;

    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (layer, guard)
}
