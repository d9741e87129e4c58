use serde::Serialize;
use std::sync::Arc;

use crate::ast::{Column, Expression, SelectItem, SelectQuery, TableRef};

/// A result column of a listing query.
#[derive(Debug, Clone)]
pub(crate) struct Projected {
    /// Application facing name, used for filters, sorting and map keys.
    pub key: String,
    /// Name of the column in the result rows.
    pub name: String,
    pub expr: Expression,
    pub column: Option<Arc<Column>>,
}

/// The result columns of `query`, with wildcards expanded from the tables
/// it reads.
pub(crate) fn projected(query: &SelectQuery) -> Vec<Projected> {
    let mut out = Vec::new();
    for item in &query.projections {
        match item {
            SelectItem::Expression { expr, alias } => match (expr, alias) {
                (Expression::Column(column), None) => out.push(from_column(column)),
                (Expression::Column(column), Some(alias)) => out.push(Projected {
                    key: alias.clone(),
                    name: alias.clone(),
                    expr: expr.clone(),
                    column: Some(column.clone()),
                }),
                (_, Some(alias)) => out.push(Projected {
                    key: alias.clone(),
                    name: alias.clone(),
                    expr: expr.clone(),
                    column: None,
                }),
                (_, None) => {}
            },
            SelectItem::Wildcard => {
                for table in tables(query) {
                    out.extend(table.iter().map(from_column));
                }
            }
            SelectItem::QualifiedWildcard(name) => {
                for table in tables(query) {
                    if table.first().and_then(|c| c.table.as_deref()) == Some(name.as_str()) {
                        out.extend(table.iter().map(from_column));
                    }
                }
            }
        }
    }
    out
}

fn from_column(column: &Arc<Column>) -> Projected {
    Projected {
        key: column.key.clone(),
        name: column.name.clone(),
        expr: Expression::Column(column.clone()),
        column: Some(column.clone()),
    }
}

fn tables(query: &SelectQuery) -> Vec<&[Arc<Column>]> {
    query
        .from
        .iter()
        .chain(query.joins.iter().map(|join| &join.table))
        .filter_map(|table| match table {
            TableRef::Table(table) => Some(table.columns()),
            TableRef::Subquery { .. } => None,
        })
        .collect()
}

/// Find the result column an attribute names, by key first and then by
/// column name.
pub(crate) fn resolve<'a>(columns: &'a [Projected], attribute: &str) -> Option<&'a Projected> {
    columns
        .iter()
        .find(|p| p.key == attribute)
        .or_else(|| columns.iter().find(|p| p.name == attribute))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<String>,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<String>,
}

/// Shape of a listing result, independent of its rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    pub fields: Vec<FieldInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_slot: Option<String>,
}

impl Metadata {
    pub(crate) fn describe(query: &SelectQuery) -> Self {
        let columns = projected(query);
        let mut keys: Vec<String> = columns
            .iter()
            .filter(|p| p.column.as_ref().is_some_and(|c| c.primary_key))
            .map(|p| p.key.clone())
            .collect();
        let primary_key = match keys.len() {
            0 => None,
            1 => keys.pop().map(PrimaryKey::Single),
            _ => Some(PrimaryKey::Composite(keys)),
        };
        let fields = columns.iter().map(field_info).collect();
        Metadata {
            primary_key,
            fields,
            root_slot: None,
            total_slot: None,
            success_slot: None,
        }
    }
}

fn field_info(projected: &Projected) -> FieldInfo {
    let column = projected.column.as_deref();
    FieldInfo {
        name: projected.key.clone(),
        label: column
            .and_then(|c| c.label.clone())
            .unwrap_or_else(|| default_label(&projected.key)),
        sql_type: column.and_then(|c| c.sql_type.as_ref()).map(|t| t.to_string()),
        nullable: column.map_or(true, |c| c.nullable),
        foreign_keys: column.and_then(|c| c.foreign_key.clone()).into_iter().collect(),
    }
}

/// `first_name` becomes `First name`.
fn default_label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
