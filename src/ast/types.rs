//! Statement tree for composing PostgreSQL statements.
//!
//! Trees are plain values: builders consume and return them, so a base
//! query can be cloned and refined (extra filters, ordering, paging)
//! without affecting the original.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::table::{Column, Table};
use crate::types::{Interval, SqlType, Value};

/// Anything the engine can run.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SQL text already using `$N` placeholders, run with positional args.
    Raw(String),
    /// A composed statement, compiled before running.
    Query(Query),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Box<SelectQuery>),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    /// Free text with `:name` bind markers.
    Text(String),
}

/// A SELECT query with the standard clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub projections: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A single item in the SELECT projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `table.*`
    QualifiedWildcard(String),
    /// An expression, optionally aliased: `expr AS alias`.
    Expression {
        expr: Expression,
        alias: Option<String>,
    },
}

/// Table reference in FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table(Arc<Table>),
    /// `(SELECT ...) AS alias`
    Subquery { query: Box<SelectQuery>, alias: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// A bind parameter, resolved to a `$N` placeholder at compile time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindParam {
    /// Explicit name; anonymous binds get one generated from `hint`.
    pub key: Option<String>,
    pub value: Option<Value>,
    pub sql_type: Option<SqlType>,
    pub hint: Option<String>,
}

impl BindParam {
    /// A named bind whose value comes from the named arguments.
    pub fn named(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    /// An anonymous bind carrying its own value.
    pub fn anonymous(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn typed(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Value used when the named arguments do not provide one.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Take type and naming hint from the column the bind is compared to.
    pub(crate) fn adopt(&mut self, column: &Column) {
        if self.sql_type.is_none() {
            self.sql_type = column.sql_type.clone();
        }
        self.adopt_hint(column);
    }

    pub(crate) fn adopt_hint(&mut self, column: &Column) {
        if self.key.is_none() && self.hint.is_none() {
            self.hint = Some(column.key.clone());
        }
    }
}

/// Core expression type. Recursive to support arbitrary nesting.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(Arc<Column>),
    Bind(BindParam),
    /// Literal rendered inline, never as a parameter.
    Literal(Literal),
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    Function {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    Case {
        operand: Option<Box<Expression>>,
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },
    Subquery(Box<SelectQuery>),
    Exists(Box<SelectQuery>),
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    /// `CAST(expr AS type)`
    Cast {
        expr: Box<Expression>,
        data_type: SqlType,
    },
    /// Wildcard `*` (used in COUNT(*)).
    Wildcard,
    /// SQL fragment with `:name` bind markers.
    Text(String),
    Nested(Box<Expression>),
}

/// Literal values in SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Like,
    ILike,
    NotLike,
    NotILike,
    Concat,
    // Range and array containment
    Contains,
    ContainedBy,
    Overlaps,
}

impl BinaryOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::ILike => "ILIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::NotILike => "NOT ILIKE",
            BinaryOperator::Concat => "||",
            BinaryOperator::Contains => "@>",
            BinaryOperator::ContainedBy => "<@",
            BinaryOperator::Overlaps => "&&",
        }
    }

    /// Operators whose right operand has the same type as the left one.
    fn same_typed_operands(self) -> bool {
        !matches!(
            self,
            BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::Contains
                | BinaryOperator::ContainedBy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub asc: Option<bool>,
    pub nulls_first: Option<bool>,
}

impl OrderByExpr {
    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = Some(true);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_first = Some(false);
        self
    }
}

/// INSERT statement. Without explicit values every column supplied by the
/// named arguments is inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: Arc<Table>,
    pub values: Vec<(String, Expression)>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: Arc<Table>,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Expression>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Column key or name.
    pub column: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: Arc<Table>,
    pub filter: Option<Expression>,
    pub returning: Vec<SelectItem>,
}

/// `SELECT <every column> FROM table`.
pub fn select(table: &Arc<Table>) -> SelectQuery {
    SelectQuery::new(
        table
            .columns()
            .iter()
            .map(|c| SelectItem::from(Expression::Column(c.clone())))
            .collect(),
    )
    .from(table)
}

pub fn insert(table: &Arc<Table>) -> InsertQuery {
    InsertQuery {
        table: table.clone(),
        values: Vec::new(),
        returning: Vec::new(),
    }
}

pub fn update(table: &Arc<Table>) -> UpdateQuery {
    UpdateQuery {
        table: table.clone(),
        assignments: Vec::new(),
        filter: None,
        returning: Vec::new(),
    }
}

pub fn delete(table: &Arc<Table>) -> DeleteQuery {
    DeleteQuery {
        table: table.clone(),
        filter: None,
        returning: Vec::new(),
    }
}

/// A named bind parameter.
pub fn bind(key: impl Into<String>) -> Expression {
    Expression::Bind(BindParam::named(key))
}

/// A SQL fragment, with `:name` markers turned into bind parameters.
pub fn text(sql: impl Into<String>) -> Expression {
    Expression::Text(sql.into())
}

pub fn func(name: impl Into<String>, args: Vec<Expression>) -> Expression {
    Expression::Function {
        name: name.into(),
        args,
        distinct: false,
    }
}

/// `count(*)`
pub fn count_star() -> Expression {
    func("count", vec![Expression::Wildcard])
}

pub fn literal(literal: Literal) -> Expression {
    Expression::Literal(literal)
}

fn and_filter(existing: Option<Expression>, condition: Expression) -> Option<Expression> {
    Some(match existing {
        Some(existing) => existing.and(condition),
        None => condition,
    })
}

impl SelectQuery {
    pub fn new(projections: Vec<SelectItem>) -> Self {
        Self {
            projections,
            ..Default::default()
        }
    }

    pub fn from(mut self, table: &Arc<Table>) -> Self {
        self.from.push(TableRef::Table(table.clone()));
        self
    }

    pub fn from_subquery(mut self, query: SelectQuery, alias: impl Into<String>) -> Self {
        self.from.push(TableRef::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add a WHERE condition, ANDed with any existing one.
    pub fn filter(mut self, condition: Expression) -> Self {
        self.filter = and_filter(self.filter.take(), condition);
        self
    }

    pub fn join(self, table: &Arc<Table>, on: Expression) -> Self {
        self.join_with(JoinType::Inner, table, Some(on))
    }

    pub fn left_join(self, table: &Arc<Table>, on: Expression) -> Self {
        self.join_with(JoinType::Left, table, Some(on))
    }

    pub fn join_with(mut self, join_type: JoinType, table: &Arc<Table>, on: Option<Expression>) -> Self {
        self.joins.push(Join {
            join_type,
            table: TableRef::Table(table.clone()),
            on,
        });
        self
    }

    pub fn group_by(mut self, expr: Expression) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, condition: Expression) -> Self {
        self.having = and_filter(self.having.take(), condition);
        self
    }

    pub fn order_by(mut self, order: OrderByExpr) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Same query with a different projection list.
    pub fn with_only_columns(mut self, projections: Vec<SelectItem>) -> Self {
        self.projections = projections;
        self
    }

    /// Expressions of the projection list, skipping wildcards.
    pub fn inner_columns(&self) -> impl Iterator<Item = &Expression> {
        self.projections.iter().filter_map(|item| match item {
            SelectItem::Expression { expr, .. } => Some(expr),
            _ => None,
        })
    }
}

impl InsertQuery {
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn returning(mut self, items: Vec<SelectItem>) -> Self {
        self.returning = items;
        self
    }
}

impl UpdateQuery {
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.assignments.push(Assignment {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn filter(mut self, condition: Expression) -> Self {
        self.filter = and_filter(self.filter.take(), condition);
        self
    }

    pub fn returning(mut self, items: Vec<SelectItem>) -> Self {
        self.returning = items;
        self
    }
}

impl DeleteQuery {
    pub fn filter(mut self, condition: Expression) -> Self {
        self.filter = and_filter(self.filter.take(), condition);
        self
    }

    pub fn returning(mut self, items: Vec<SelectItem>) -> Self {
        self.returning = items;
        self
    }
}

impl Expression {
    fn binary(self, op: BinaryOperator, right: Expression) -> Expression {
        let mut right = right;
        if let (Expression::Column(column), Expression::Bind(bind)) = (&self, &mut right) {
            if op.same_typed_operands() {
                bind.adopt(column);
            } else {
                bind.adopt_hint(column);
            }
        }
        Expression::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// Typed the same way as `self` would type a comparison operand.
    fn operand(&self, value: impl Into<Expression>) -> Expression {
        let mut value = value.into();
        if let (Expression::Column(column), Expression::Bind(bind)) = (self, &mut value) {
            bind.adopt(column);
        }
        value
    }

    pub fn eq(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Eq, other.into())
    }

    pub fn ne(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::NotEq, other.into())
    }

    pub fn lt(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Lt, other.into())
    }

    pub fn le(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::LtEq, other.into())
    }

    pub fn gt(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Gt, other.into())
    }

    pub fn ge(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::GtEq, other.into())
    }

    pub fn like(self, pattern: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Like, pattern.into())
    }

    pub fn ilike(self, pattern: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::ILike, pattern.into())
    }

    pub fn not_like(self, pattern: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::NotLike, pattern.into())
    }

    /// `self @> other`
    pub fn contains(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Contains, other.into())
    }

    /// `self <@ other`
    pub fn contained_by(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::ContainedBy, other.into())
    }

    pub fn overlaps(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Overlaps, other.into())
    }

    pub fn concat(self, other: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Concat, other.into())
    }

    pub fn and(self, other: Expression) -> Expression {
        self.binary(BinaryOperator::And, other)
    }

    pub fn or(self, other: Expression) -> Expression {
        self.binary(BinaryOperator::Or, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expression {
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self),
        }
    }

    pub fn in_list<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Expression>,
    {
        let list = values.into_iter().map(|v| self.operand(v)).collect();
        Expression::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn not_in<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Expression>,
    {
        match self.in_list(values) {
            Expression::InList { expr, list, .. } => Expression::InList {
                expr,
                list,
                negated: true,
            },
            other => other,
        }
    }

    pub fn between(self, low: impl Into<Expression>, high: impl Into<Expression>) -> Expression {
        let low = self.operand(low);
        let high = self.operand(high);
        Expression::Between {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        }
    }

    pub fn is_null(self) -> Expression {
        Expression::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expression {
        Expression::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn cast(self, data_type: SqlType) -> Expression {
        Expression::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    pub fn nested(self) -> Expression {
        Expression::Nested(Box::new(self))
    }

    pub fn asc(self) -> OrderByExpr {
        OrderByExpr {
            expr: self,
            asc: Some(true),
            nulls_first: None,
        }
    }

    pub fn desc(self) -> OrderByExpr {
        OrderByExpr {
            expr: self,
            asc: Some(false),
            nulls_first: None,
        }
    }

    pub fn label(self, alias: impl Into<String>) -> SelectItem {
        SelectItem::Expression {
            expr: self,
            alias: Some(alias.into()),
        }
    }
}

impl From<Expression> for SelectItem {
    fn from(expr: Expression) -> Self {
        SelectItem::Expression { expr, alias: None }
    }
}

impl From<BindParam> for Expression {
    fn from(bind: BindParam) -> Self {
        Expression::Bind(bind)
    }
}

impl From<Literal> for Expression {
    fn from(literal: Literal) -> Self {
        Expression::Literal(literal)
    }
}

impl From<SelectQuery> for Expression {
    fn from(query: SelectQuery) -> Self {
        Expression::Subquery(Box::new(query))
    }
}

macro_rules! impl_expression_from_value {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for Expression {
                fn from(v: $source) -> Self {
                    Expression::Bind(BindParam::anonymous(v))
                }
            }
        )*
    };
}

impl_expression_from_value!(
    Value,
    bool,
    i16,
    i32,
    i64,
    f32,
    f64,
    Decimal,
    String,
    &str,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    DateTime<Utc>,
    Uuid,
    Interval,
    serde_json::Value,
);

impl From<Query> for Statement {
    fn from(query: Query) -> Self {
        Statement::Query(query)
    }
}

impl From<SelectQuery> for Statement {
    fn from(query: SelectQuery) -> Self {
        Statement::Query(Query::Select(Box::new(query)))
    }
}

impl From<InsertQuery> for Statement {
    fn from(query: InsertQuery) -> Self {
        Statement::Query(Query::Insert(query))
    }
}

impl From<UpdateQuery> for Statement {
    fn from(query: UpdateQuery) -> Self {
        Statement::Query(Query::Update(query))
    }
}

impl From<DeleteQuery> for Statement {
    fn from(query: DeleteQuery) -> Self {
        Statement::Query(Query::Delete(query))
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::Raw(sql.to_string())
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::Raw(sql)
    }
}

impl Statement {
    /// Free text with `:name` bind markers, resolved from named arguments.
    pub fn text(sql: impl Into<String>) -> Self {
        Statement::Query(Query::Text(sql.into()))
    }
}
