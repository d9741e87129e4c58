//! Table and column descriptions that statements are composed from.

use std::fmt;
use std::sync::Arc;

use super::types::Expression;
use crate::error::CompileError;
use crate::types::{SqlType, Value};

/// Where the value of a column default (or on-update value) comes from.
#[derive(Clone)]
pub enum ValueProducer {
    /// A fixed value.
    Constant(Value),
    /// A value computed on the client each time it is needed.
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
    /// Left to the database (`DEFAULT`, sequences, triggers).
    Server,
}

impl ValueProducer {
    pub fn constant(value: impl Into<Value>) -> Self {
        ValueProducer::Constant(value.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        ValueProducer::Computed(Arc::new(f))
    }

    pub fn is_client_side(&self) -> bool {
        !matches!(self, ValueProducer::Server)
    }

    /// The client-side value, if any. Server producers yield nothing.
    pub fn produce(&self) -> Option<Value> {
        match self {
            ValueProducer::Constant(value) => Some(value.clone()),
            ValueProducer::Computed(f) => Some(f()),
            ValueProducer::Server => None,
        }
    }
}

impl fmt::Debug for ValueProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueProducer::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            ValueProducer::Computed(_) => write!(f, "Computed(..)"),
            ValueProducer::Server => write!(f, "Server"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Name used for bind parameters and listing keys. Defaults to `name`.
    pub key: String,
    /// Name of the owning table, used to qualify references.
    pub table: Option<String>,
    pub sql_type: Option<SqlType>,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<ValueProducer>,
    pub onupdate: Option<ValueProducer>,
    pub label: Option<String>,
    /// Target of a foreign key, as `table.column`.
    pub foreign_key: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            table: None,
            sql_type: Some(sql_type),
            nullable: true,
            primary_key: false,
            default: None,
            onupdate: None,
            label: None,
            foreign_key: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, producer: ValueProducer) -> Self {
        self.default = Some(producer);
        self
    }

    pub fn onupdate(mut self, producer: ValueProducer) -> Self {
        self.onupdate = Some(producer);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.foreign_key = Some(target.into());
        self
    }

    /// Whether `name` refers to this column, by key or by SQL name.
    pub fn matches(&self, name: &str) -> bool {
        self.key == name || self.name == name
    }

    pub(crate) fn has_client_default(&self) -> bool {
        self.default.as_ref().is_some_and(ValueProducer::is_client_side)
    }

    pub(crate) fn has_server_default(&self) -> bool {
        matches!(self.default, Some(ValueProducer::Server))
    }

    pub(crate) fn has_client_onupdate(&self) -> bool {
        self.onupdate.as_ref().is_some_and(ValueProducer::is_client_side)
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.name == other.name
    }
}

#[derive(Debug, PartialEq)]
pub struct Table {
    pub schema: Option<String>,
    pub name: String,
    columns: Vec<Arc<Column>>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    /// Look a column up by key, then by SQL name.
    pub fn c(&self, key: &str) -> Result<&Arc<Column>, CompileError> {
        self.columns
            .iter()
            .find(|c| c.key == key)
            .or_else(|| self.columns.iter().find(|c| c.name == key))
            .ok_or_else(|| CompileError::UnknownColumn(format!("{}.{}", self.name, key)))
    }

    /// A reference to the column, ready to be used in expressions.
    pub fn col(&self, key: &str) -> Result<Expression, CompileError> {
        self.c(key).map(|c| Expression::Column(c.clone()))
    }

    pub fn primary_key(&self) -> Vec<&Arc<Column>> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }
}

pub struct TableBuilder {
    schema: Option<String>,
    name: String,
    columns: Vec<Column>,
}

impl TableBuilder {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn column(mut self, mut column: Column) -> Self {
        column.table = Some(self.name.clone());
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Arc<Table> {
        Arc::new(Table {
            schema: self.schema,
            name: self.name,
            columns: self.columns.into_iter().map(Arc::new).collect(),
        })
    }
}
