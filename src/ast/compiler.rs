/// Statement tree → positional PostgreSQL SQL compiler.
///
/// Every bind parameter becomes a `$N` placeholder, numbered in textual
/// order and annotated with `::TYPE` when its type is known. The values are
/// collected into an argument list matching that numbering, with named
/// arguments taking precedence over the values carried by the tree and
/// client-side column defaults filling whatever is still missing.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::defaults::{inject_defaults, DefaultRule};
use super::formatter::{quote_ident, SqlLayout};
use super::table::{Column, Table};
use super::types::*;
use crate::error::CompileError;
use crate::types::{NamedArgs, SqlType, Value};

/// Final SQL text and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Compile a statement and collect its arguments.
///
/// Raw statements are returned as they are, with `positional` as their
/// arguments. Composed statements ignore `positional` and take their values
/// from the tree and from `named`.
pub fn compile(
    statement: &Statement,
    positional: &[Value],
    named: Option<&NamedArgs>,
) -> Result<Compiled, CompileError> {
    match statement {
        Statement::Raw(sql) => Ok(Compiled {
            sql: sql.clone(),
            args: positional.to_vec(),
        }),
        Statement::Query(query) => {
            let rendered = Renderer::new(SqlLayout::Compact, named).render(query)?;
            let mut params = rendered.construct_params(named)?;
            inject_defaults(&mut params, &rendered.insert_prefetch, DefaultRule::Insert);
            inject_defaults(&mut params, &rendered.update_prefetch, DefaultRule::Update);
            let args = rendered
                .positions
                .iter()
                .map(|name| params.get(name).cloned().unwrap_or(Value::Null))
                .collect();
            Ok(Compiled {
                sql: rendered.sql,
                args,
            })
        }
    }
}

/// SQL text of a statement in the given layout, without resolving values.
///
/// `named` only matters for INSERTs without explicit values, whose column
/// list follows the supplied argument names.
pub fn render_sql(
    statement: &Statement,
    layout: SqlLayout,
    named: Option<&NamedArgs>,
) -> Result<String, CompileError> {
    match statement {
        Statement::Raw(sql) => Ok(sql.clone()),
        Statement::Query(query) => Ok(Renderer::new(layout, named).render(query)?.sql),
    }
}

#[derive(Debug)]
struct BindSlot {
    value: Option<Value>,
    required: bool,
}

struct Rendered {
    sql: String,
    positions: Vec<String>,
    binds: HashMap<String, BindSlot>,
    insert_prefetch: Vec<Arc<Column>>,
    update_prefetch: Vec<Arc<Column>>,
}

impl Rendered {
    fn construct_params(&self, named: Option<&NamedArgs>) -> Result<HashMap<String, Value>, CompileError> {
        let mut params = HashMap::with_capacity(self.binds.len());
        for name in &self.positions {
            if params.contains_key(name) {
                continue;
            }
            let Some(slot) = self.binds.get(name) else {
                continue;
            };
            match named.and_then(|args| args.get(name)).or(slot.value.as_ref()) {
                Some(value) => {
                    params.insert(name.clone(), value.clone());
                }
                None if slot.required => return Err(CompileError::MissingBind(name.clone())),
                None => {}
            }
        }
        Ok(params)
    }
}

struct Renderer<'a> {
    layout: SqlLayout,
    column_keys: Option<&'a NamedArgs>,
    positions: Vec<String>,
    binds: HashMap<String, BindSlot>,
    anonymous: HashMap<String, usize>,
    /// Names taken by SET/VALUES binds of columns.
    reserved: HashSet<String>,
    insert_prefetch: Vec<Arc<Column>>,
    update_prefetch: Vec<Arc<Column>>,
}

impl<'a> Renderer<'a> {
    fn new(layout: SqlLayout, column_keys: Option<&'a NamedArgs>) -> Self {
        Self {
            layout,
            column_keys,
            positions: Vec::new(),
            binds: HashMap::new(),
            anonymous: HashMap::new(),
            reserved: HashSet::new(),
            insert_prefetch: Vec::new(),
            update_prefetch: Vec::new(),
        }
    }

    fn render(mut self, query: &Query) -> Result<Rendered, CompileError> {
        let sql = self.query(query, 0)?;
        Ok(Rendered {
            sql,
            positions: self.positions,
            binds: self.binds,
            insert_prefetch: self.insert_prefetch,
            update_prefetch: self.update_prefetch,
        })
    }

    fn query(&mut self, query: &Query, depth: usize) -> Result<String, CompileError> {
        match query {
            Query::Select(s) => self.select(s, depth),
            Query::Insert(i) => self.insert(i, depth),
            Query::Update(u) => self.update(u, depth),
            Query::Delete(d) => self.delete(d, depth),
            Query::Text(sql) => Ok(self.text(sql)),
        }
    }

    fn select(&mut self, select: &SelectQuery, depth: usize) -> Result<String, CompileError> {
        let mut parts = Vec::new();

        let keyword = if select.distinct {
            "SELECT DISTINCT"
        } else {
            "SELECT"
        };
        let items = if select.projections.is_empty() {
            vec!["*".to_string()]
        } else {
            select
                .projections
                .iter()
                .map(|item| self.select_item(item, depth))
                .collect::<Result<Vec<_>, _>>()?
        };
        parts.push(format!("{}{}", keyword, self.layout.list(items, depth)));

        if !select.from.is_empty() {
            let tables = select
                .from
                .iter()
                .map(|table| self.table_ref(table, depth))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("FROM{}", self.layout.list(tables, depth)));
        }

        for join in &select.joins {
            parts.push(self.join(join, depth)?);
        }

        if let Some(filter) = &select.filter {
            parts.push(format!("WHERE {}", self.expr(filter, depth)?));
        }

        if !select.group_by.is_empty() {
            let groups = select
                .group_by
                .iter()
                .map(|expr| self.expr(expr, depth))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("GROUP BY {}", groups.join(", ")));
        }

        if let Some(having) = &select.having {
            parts.push(format!("HAVING {}", self.expr(having, depth)?));
        }

        if !select.order_by.is_empty() {
            let orders = select
                .order_by
                .iter()
                .map(|order| self.order_by(order, depth))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = select.limit {
            parts.push(format!("LIMIT {}", self.bind(&paging_bind(limit))));
        }

        if let Some(offset) = select.offset {
            parts.push(format!("OFFSET {}", self.bind(&paging_bind(offset))));
        }

        Ok(self.layout.clauses(parts, depth))
    }

    fn insert(&mut self, insert: &InsertQuery, depth: usize) -> Result<String, CompileError> {
        let table = &insert.table;
        let explicit = insert
            .values
            .iter()
            .map(|(key, expr)| Ok((table.c(key)?, expr)))
            .collect::<Result<Vec<_>, CompileError>>()?;

        let mut columns = Vec::new();
        let mut values = Vec::new();
        for column in table.columns() {
            if let Some((_, expr)) = explicit.iter().find(|(c, _)| Arc::ptr_eq(c, column)) {
                columns.push(quote_ident(&column.name).into_owned());
                values.push(self.crud_value(column, expr, depth)?);
            } else if column.has_client_default() {
                self.insert_prefetch.push(column.clone());
                columns.push(quote_ident(&column.name).into_owned());
                values.push(self.prefetch_bind(column));
            } else if explicit.is_empty() && self.supplies(column) {
                columns.push(quote_ident(&column.name).into_owned());
                values.push(self.prefetch_bind(column));
            }
        }

        let mut parts = Vec::new();
        if columns.is_empty() {
            parts.push(format!("INSERT INTO {} DEFAULT VALUES", table_name(table)));
        } else {
            parts.push(format!(
                "INSERT INTO {} ({})",
                table_name(table),
                columns.join(", ")
            ));
            parts.push(format!("VALUES ({})", values.join(", ")));
        }
        self.returning(&insert.returning, &mut parts, depth)?;
        Ok(self.layout.clauses(parts, depth))
    }

    fn update(&mut self, update: &UpdateQuery, depth: usize) -> Result<String, CompileError> {
        let table = &update.table;
        let explicit = update
            .assignments
            .iter()
            .map(|assignment| Ok((table.c(&assignment.column)?, &assignment.value)))
            .collect::<Result<Vec<_>, CompileError>>()?;

        let mut sets = Vec::new();
        for column in table.columns() {
            let name = quote_ident(&column.name).into_owned();
            if let Some((_, expr)) = explicit.iter().find(|(c, _)| Arc::ptr_eq(c, column)) {
                sets.push(format!("{} = {}", name, self.crud_value(column, expr, depth)?));
            } else if column.has_client_onupdate() {
                self.update_prefetch.push(column.clone());
                sets.push(format!("{} = {}", name, self.prefetch_bind(column)));
            }
        }
        if sets.is_empty() {
            return Err(CompileError::InvalidStatement(format!(
                "UPDATE of {} does not set any column",
                table.name
            )));
        }

        let mut parts = vec![
            format!("UPDATE {}", table_name(table)),
            format!("SET{}", self.layout.list(sets, depth)),
        ];
        if let Some(filter) = &update.filter {
            parts.push(format!("WHERE {}", self.expr(filter, depth)?));
        }
        self.returning(&update.returning, &mut parts, depth)?;
        Ok(self.layout.clauses(parts, depth))
    }

    fn delete(&mut self, delete: &DeleteQuery, depth: usize) -> Result<String, CompileError> {
        let mut parts = vec![format!("DELETE FROM {}", table_name(&delete.table))];
        if let Some(filter) = &delete.filter {
            parts.push(format!("WHERE {}", self.expr(filter, depth)?));
        }
        self.returning(&delete.returning, &mut parts, depth)?;
        Ok(self.layout.clauses(parts, depth))
    }

    fn returning(
        &mut self,
        items: &[SelectItem],
        parts: &mut Vec<String>,
        depth: usize,
    ) -> Result<(), CompileError> {
        if !items.is_empty() {
            let items = items
                .iter()
                .map(|item| self.select_item(item, depth))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("RETURNING{}", self.layout.list(items, depth)));
        }
        Ok(())
    }

    /// Column names an INSERT without explicit values takes from the arguments.
    fn supplies(&self, column: &Column) -> bool {
        match self.column_keys {
            Some(keys) => keys.contains_key(&column.key),
            None => !column.has_server_default(),
        }
    }

    fn crud_value(&mut self, column: &Column, expr: &Expression, depth: usize) -> Result<String, CompileError> {
        match expr {
            Expression::Bind(bind) => {
                let mut bind = bind.clone();
                bind.adopt(column);
                if bind.key.is_none() {
                    let name = if self.binds.contains_key(&column.key) {
                        self.anonymous_name(&column.key)
                    } else {
                        column.key.clone()
                    };
                    self.reserved.insert(name.clone());
                    bind.key = Some(name);
                }
                Ok(self.bind(&bind))
            }
            other => self.expr(other, depth),
        }
    }

    /// Bind keyed by the column key, filled from arguments or defaults.
    fn prefetch_bind(&mut self, column: &Column) -> String {
        self.reserved.insert(column.key.clone());
        self.register(&column.key, None, false);
        self.placeholder(column.key.clone(), column.sql_type.as_ref())
    }

    fn select_item(&mut self, item: &SelectItem, depth: usize) -> Result<String, CompileError> {
        Ok(match item {
            SelectItem::Wildcard => "*".to_string(),
            SelectItem::QualifiedWildcard(table) => format!("{}.*", quote_ident(table)),
            SelectItem::Expression { expr, alias } => {
                let expr = self.expr(expr, depth)?;
                match alias {
                    Some(alias) => format!("{} AS {}", expr, quote_ident(alias)),
                    None => expr,
                }
            }
        })
    }

    fn table_ref(&mut self, table: &TableRef, depth: usize) -> Result<String, CompileError> {
        match table {
            TableRef::Table(table) => Ok(table_name(table)),
            TableRef::Subquery { query, alias } => {
                let inner = self.select(query, depth + 1)?;
                Ok(format!(
                    "{} AS {}",
                    self.layout.subquery(inner, depth),
                    quote_ident(alias)
                ))
            }
        }
    }

    fn join(&mut self, join: &Join, depth: usize) -> Result<String, CompileError> {
        let keyword = match join.join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT OUTER JOIN",
            JoinType::Right => "RIGHT OUTER JOIN",
            JoinType::Full => "FULL OUTER JOIN",
            JoinType::Cross => "CROSS JOIN",
        };
        let table = self.table_ref(&join.table, depth)?;
        match &join.on {
            Some(on) => Ok(format!("{} {} ON {}", keyword, table, self.expr(on, depth)?)),
            None => Ok(format!("{} {}", keyword, table)),
        }
    }

    fn order_by(&mut self, order: &OrderByExpr, depth: usize) -> Result<String, CompileError> {
        let mut s = self.expr(&order.expr, depth)?;
        match order.asc {
            Some(true) => s.push_str(" ASC"),
            Some(false) => s.push_str(" DESC"),
            None => {}
        }
        match order.nulls_first {
            Some(true) => s.push_str(" NULLS FIRST"),
            Some(false) => s.push_str(" NULLS LAST"),
            None => {}
        }
        Ok(s)
    }

    fn expr(&mut self, expr: &Expression, depth: usize) -> Result<String, CompileError> {
        Ok(match expr {
            Expression::Column(column) => column_ref(column),
            Expression::Bind(bind) => {
                if let Some(key) = bind.key.as_ref().filter(|key| self.reserved.contains(*key)) {
                    return Err(CompileError::InvalidStatement(format!(
                        "bind name {:?} is reserved for the value of column {:?}, use another name",
                        key, key
                    )));
                }
                self.bind(bind)
            }
            Expression::Literal(lit) => render_literal(lit),
            Expression::BinaryOp { left, op, right } => {
                let l = self.operand(left, *op, false, depth)?;
                let r = self.operand(right, *op, true, depth)?;
                match op {
                    BinaryOperator::And | BinaryOperator::Or => format!(
                        "{}{}{} {}",
                        l,
                        self.layout.logical_break(depth),
                        op.as_sql(),
                        r
                    ),
                    _ => format!("{} {} {}", l, op.as_sql(), r),
                }
            }
            Expression::UnaryOp { op, expr } => {
                let inner = self.expr(expr, depth)?;
                let inner = if matches!(**expr, Expression::BinaryOp { .. }) {
                    format!("({})", inner)
                } else {
                    inner
                };
                match op {
                    UnaryOperator::Not => format!("NOT {}", inner),
                    UnaryOperator::Minus => format!("-{}", inner),
                    UnaryOperator::Plus => format!("+{}", inner),
                }
            }
            Expression::Function {
                name,
                args,
                distinct,
            } => {
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                let distinct = if *distinct { "DISTINCT " } else { "" };
                format!("{}({}{})", name, distinct, args.join(", "))
            }
            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut s = String::from("CASE");
                if let Some(operand) = operand {
                    s.push(' ');
                    s.push_str(&self.expr(operand, depth)?);
                }
                for (when, then) in when_clauses {
                    let when = self.expr(when, depth)?;
                    let then = self.expr(then, depth)?;
                    s.push_str(&format!(" WHEN {} THEN {}", when, then));
                }
                if let Some(else_clause) = else_clause {
                    s.push_str(&format!(" ELSE {}", self.expr(else_clause, depth)?));
                }
                s.push_str(" END");
                s
            }
            Expression::Subquery(query) => {
                let inner = self.select(query, depth + 1)?;
                self.layout.subquery(inner, depth)
            }
            Expression::Exists(query) => {
                let inner = self.select(query, depth + 1)?;
                format!("EXISTS {}", self.layout.subquery(inner, depth))
            }
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    return Ok(if *negated { "1 = 1" } else { "1 != 1" }.to_string());
                }
                let e = self.expr(expr, depth)?;
                let items = list
                    .iter()
                    .map(|item| self.expr(item, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                let not = if *negated { "NOT " } else { "" };
                format!("{} {}IN ({})", e, not, items.join(", "))
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let e = self.expr(expr, depth)?;
                let low = self.expr(low, depth)?;
                let high = self.expr(high, depth)?;
                let not = if *negated { "NOT " } else { "" };
                format!("{} {}BETWEEN {} AND {}", e, not, low, high)
            }
            Expression::IsNull { expr, negated } => {
                let e = self.expr(expr, depth)?;
                if *negated {
                    format!("{} IS NOT NULL", e)
                } else {
                    format!("{} IS NULL", e)
                }
            }
            Expression::Cast { expr, data_type } => {
                format!("CAST({} AS {})", self.expr(expr, depth)?, data_type)
            }
            Expression::Wildcard => "*".to_string(),
            Expression::Text(sql) => self.text(sql),
            Expression::Nested(inner) => format!("({})", self.expr(inner, depth)?),
        })
    }

    /// Render one side of a binary operation, parenthesized when the tree
    /// shape would otherwise be lost.
    fn operand(
        &mut self,
        expr: &Expression,
        parent: BinaryOperator,
        right_side: bool,
        depth: usize,
    ) -> Result<String, CompileError> {
        let rendered = self.expr(expr, depth)?;
        if let Expression::BinaryOp { op, .. } = expr {
            let (child, outer) = (precedence(*op), precedence(parent));
            if child < outer || (right_side && child == outer && !is_associative(parent)) {
                return Ok(format!("({})", rendered));
            }
        }
        Ok(rendered)
    }

    fn bind(&mut self, bind: &BindParam) -> String {
        let name = match &bind.key {
            Some(key) => key.clone(),
            None => self.anonymous_name(bind.hint.as_deref().unwrap_or("param")),
        };
        let sql_type = bind
            .sql_type
            .clone()
            .or_else(|| bind.value.as_ref().and_then(Value::sql_type));
        let required = bind.key.is_some() && bind.value.is_none();
        self.register(&name, bind.value.clone(), required);
        self.placeholder(name, sql_type.as_ref())
    }

    /// Replace `:name` markers with placeholders. `::` casts and `\:` are
    /// left as literal colons, as is any colon following a word character.
    fn text(&mut self, sql: &str) -> String {
        let chars: Vec<char> = sql.chars().collect();
        let mut out = String::with_capacity(sql.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && chars.get(i + 1) == Some(&':') {
                out.push(':');
                i += 2;
                continue;
            }
            if c == ':' {
                if chars.get(i + 1) == Some(&':') {
                    out.push_str("::");
                    i += 2;
                    continue;
                }
                let after_word = i > 0 && is_word(chars[i - 1]);
                let starts_name = chars
                    .get(i + 1)
                    .is_some_and(|c| c.is_alphabetic() || *c == '_');
                if !after_word && starts_name {
                    let mut end = i + 1;
                    while end < chars.len() && is_word(chars[end]) {
                        end += 1;
                    }
                    let name: String = chars[i + 1..end].iter().collect();
                    self.register(&name, None, true);
                    out.push_str(&self.placeholder(name, None));
                    i = end;
                    continue;
                }
            }
            out.push(c);
            i += 1;
        }
        out
    }

    fn anonymous_name(&mut self, hint: &str) -> String {
        loop {
            let counter = self.anonymous.entry(hint.to_string()).or_insert(0);
            *counter += 1;
            let name = format!("{}_{}", hint, counter);
            if !self.binds.contains_key(&name) {
                return name;
            }
        }
    }

    fn register(&mut self, name: &str, value: Option<Value>, required: bool) {
        self.binds
            .entry(name.to_string())
            .or_insert(BindSlot { value, required });
    }

    fn placeholder(&mut self, name: String, sql_type: Option<&SqlType>) -> String {
        self.positions.push(name);
        let n = self.positions.len();
        match sql_type {
            Some(sql_type) => format!("${}::{}", n, sql_type),
            None => format!("${}", n),
        }
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn paging_bind(n: u64) -> BindParam {
    BindParam {
        key: None,
        value: Some(Value::Int64(i64::try_from(n).unwrap_or(i64::MAX))),
        sql_type: Some(SqlType::Integer),
        hint: Some("param".to_string()),
    }
}

fn precedence(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::Or => 1,
        BinaryOperator::And => 2,
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq
        | BinaryOperator::Like
        | BinaryOperator::ILike
        | BinaryOperator::NotLike
        | BinaryOperator::NotILike
        | BinaryOperator::Contains
        | BinaryOperator::ContainedBy
        | BinaryOperator::Overlaps => 3,
        BinaryOperator::Concat => 4,
        BinaryOperator::Plus | BinaryOperator::Minus => 5,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
    }
}

fn is_associative(op: BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Plus
            | BinaryOperator::Multiply
            | BinaryOperator::Concat
    )
}

fn table_name(table: &Table) -> String {
    match &table.schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&table.name)),
        None => quote_ident(&table.name).into_owned(),
    }
}

fn column_ref(column: &Column) -> String {
    match &column.table {
        Some(table) => format!("{}.{}", quote_ident(table), quote_ident(&column.name)),
        None => quote_ident(&column.name).into_owned(),
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Integer(n) => n.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::table::ValueProducer;
    use chrono::NaiveDate;

    fn users() -> Arc<Table> {
        Table::new("users")
            .column(
                Column::new("id", SqlType::Integer)
                    .primary_key()
                    .default(ValueProducer::Server),
            )
            .column(Column::new("name", SqlType::Varchar(None)).not_null())
            .column(Column::new("email", SqlType::Varchar(None)))
            .column(
                Column::new("status", SqlType::Varchar(Some(10)))
                    .default(ValueProducer::constant("new")),
            )
            .column(Column::new("changed", SqlType::Integer).onupdate(ValueProducer::constant(1)))
            .build()
    }

    fn ids_and_names(users: &Arc<Table>) -> SelectQuery {
        SelectQuery::new(vec![
            users.col("id").unwrap().into(),
            users.col("name").unwrap().into(),
        ])
        .from(users)
    }

    fn named(pairs: &[(&str, Value)]) -> NamedArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn placeholders(sql: &str) -> Vec<String> {
        sql.split('$')
            .skip(1)
            .map(|rest| rest.chars().take_while(|c| c.is_ascii_digit()).collect())
            .collect()
    }

    #[test]
    fn test_raw_statement_passes_through() {
        let stmt = Statement::from("SELECT $1, $2");
        let compiled = compile(&stmt, &[Value::from(1), Value::from("x")], None).unwrap();
        assert_eq!(compiled.sql, "SELECT $1, $2");
        assert_eq!(compiled.args, vec![Value::from(1), Value::from("x")]);
    }

    #[test]
    fn test_select_all_columns() {
        let users = users();
        let compiled = compile(&select(&users).into(), &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT users.id, users.name, users.email, users.status, users.changed FROM users"
        );
        assert!(compiled.args.is_empty());
    }

    #[test]
    fn test_typed_anonymous_bind() {
        let users = users();
        let stmt = ids_and_names(&users).filter(users.col("id").unwrap().eq(1));
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT users.id, users.name FROM users WHERE users.id = $1::INTEGER"
        );
        assert_eq!(compiled.args, vec![Value::Int32(1)]);
    }

    #[test]
    fn test_named_bind_from_arguments() {
        let users = users();
        let stmt = ids_and_names(&users).filter(users.col("name").unwrap().ne(bind("some_name")));
        let args = named(&[("some_name", Value::from("secretary"))]);
        let compiled = compile(&stmt.into(), &[], Some(&args)).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT users.id, users.name FROM users WHERE users.name != $1::VARCHAR"
        );
        assert_eq!(compiled.args, vec![Value::from("secretary")]);
    }

    #[test]
    fn test_missing_named_bind_is_an_error() {
        let users = users();
        let stmt = ids_and_names(&users).filter(users.col("name").unwrap().ne(bind("some_name")));
        let err = compile(&stmt.into(), &[], None).unwrap_err();
        assert_eq!(err, CompileError::MissingBind("some_name".into()));
    }

    #[test]
    fn test_bind_default_value_is_used_when_not_supplied() {
        let users = users();
        let stmt = ids_and_names(&users)
            .filter(users.col("name").unwrap().eq(BindParam::named("who").value("admin")));
        let compiled = compile(&stmt.clone().into(), &[], None).unwrap();
        assert_eq!(compiled.args, vec![Value::from("admin")]);

        let args = named(&[("who", Value::from("guest"))]);
        let compiled = compile(&stmt.into(), &[], Some(&args)).unwrap();
        assert_eq!(compiled.args, vec![Value::from("guest")]);
    }

    #[test]
    fn test_repeated_named_bind_gets_one_placeholder_per_occurrence() {
        let users = users();
        let stmt = ids_and_names(&users).filter(
            users
                .col("name")
                .unwrap()
                .eq(bind("who"))
                .or(users.col("email").unwrap().eq(bind("who"))),
        );
        let args = named(&[("who", Value::from("lele"))]);
        let compiled = compile(&stmt.into(), &[], Some(&args)).unwrap();
        assert!(compiled
            .sql
            .ends_with("WHERE users.name = $1::VARCHAR OR users.email = $2::VARCHAR"));
        assert_eq!(compiled.args, vec![Value::from("lele"), Value::from("lele")]);
    }

    #[test]
    fn test_anonymous_names_are_unique_and_overridable() {
        let users = users();
        let stmt = ids_and_names(&users)
            .filter(users.col("id").unwrap().gt(1))
            .filter(users.col("id").unwrap().lt(10));
        let compiled = compile(&stmt.clone().into(), &[], None).unwrap();
        assert!(compiled
            .sql
            .ends_with("WHERE users.id > $1::INTEGER AND users.id < $2::INTEGER"));
        assert_eq!(compiled.args, vec![Value::Int32(1), Value::Int32(10)]);

        let args = named(&[("id_2", Value::Int32(5))]);
        let compiled = compile(&stmt.into(), &[], Some(&args)).unwrap();
        assert_eq!(compiled.args, vec![Value::Int32(1), Value::Int32(5)]);
    }

    #[test]
    fn test_untyped_bind_takes_type_from_value() {
        let periods = Table::new("periods")
            .column(Column::new("validity", SqlType::DateRange))
            .build();
        let day = NaiveDate::from_ymd_opt(2017, 2, 1).unwrap();
        let stmt = SelectQuery::new(vec![periods.col("validity").unwrap().into()])
            .from(&periods)
            .filter(periods.col("validity").unwrap().contains(day));
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT periods.validity FROM periods WHERE periods.validity @> $1::DATE"
        );
        assert_eq!(compiled.args, vec![Value::Date(day)]);
    }

    #[test]
    fn test_insert_with_values_and_client_default() {
        let users = users();
        let stmt = insert(&users).value("name", "lele");
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO users (name, status) VALUES ($1::VARCHAR, $2::VARCHAR(10))"
        );
        assert_eq!(compiled.args, vec![Value::from("lele"), Value::from("new")]);
    }

    #[test]
    fn test_insert_columns_follow_named_arguments() {
        let users = users();
        let args = named(&[
            ("name", Value::from("x")),
            ("email", Value::from("x@example.com")),
            ("status", Value::from("old")),
        ]);
        let compiled = compile(&insert(&users).into(), &[], Some(&args)).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO users (name, email, status) VALUES ($1::VARCHAR, $2::VARCHAR, $3::VARCHAR(10))"
        );
        assert_eq!(
            compiled.args,
            vec![
                Value::from("x"),
                Value::from("x@example.com"),
                Value::from("old")
            ]
        );
    }

    #[test]
    fn test_insert_null_argument_gets_default() {
        let users = users();
        let args = named(&[("name", Value::from("x")), ("status", Value::Null)]);
        let compiled = compile(&insert(&users).into(), &[], Some(&args)).unwrap();
        assert_eq!(compiled.args, vec![Value::from("x"), Value::from("new")]);
    }

    #[test]
    fn test_insert_unknown_column() {
        let users = users();
        let err = compile(&insert(&users).value("nope", 1).into(), &[], None).unwrap_err();
        assert_eq!(err, CompileError::UnknownColumn("users.nope".into()));
    }

    #[test]
    fn test_insert_default_values() {
        let t = Table::new("events")
            .column(Column::new("id", SqlType::BigInt).default(ValueProducer::Server))
            .build();
        let compiled = compile(&insert(&t).into(), &[], None).unwrap();
        assert_eq!(compiled.sql, "INSERT INTO events DEFAULT VALUES");
    }

    #[test]
    fn test_insert_returning() {
        let users = users();
        let stmt = insert(&users)
            .value("name", "lele")
            .returning(vec![users.col("id").unwrap().into()]);
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert!(compiled.sql.ends_with(" RETURNING users.id"));
    }

    #[test]
    fn test_update_adds_onupdate_columns() {
        let users = users();
        let stmt = update(&users)
            .set("name", "x")
            .filter(users.col("id").unwrap().eq(1));
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE users SET name = $1::VARCHAR, changed = $2::INTEGER WHERE users.id = $3::INTEGER"
        );
        assert_eq!(
            compiled.args,
            vec![Value::from("x"), Value::Int32(1), Value::Int32(1)]
        );
    }

    #[test]
    fn test_named_bind_cannot_reuse_a_set_column_key() {
        let users = users();
        let stmt = update(&users)
            .set("name", "x")
            .filter(users.col("name").unwrap().eq(bind("name")));
        let err = compile(&stmt.into(), &[], Some(&named(&[("name", Value::from("y"))]))).unwrap_err();
        assert!(matches!(err, CompileError::InvalidStatement(ref msg) if msg.contains("\"name\"")));

        let stmt = update(&users)
            .set("name", "x")
            .filter(users.col("id").unwrap().eq(bind("changed")));
        let err = compile(&stmt.into(), &[], Some(&named(&[("changed", Value::from(2))]))).unwrap_err();
        assert!(matches!(err, CompileError::InvalidStatement(_)));

        let stmt = update(&users)
            .set("name", bind("name"))
            .filter(users.col("id").unwrap().eq(bind("id")));
        let args = named(&[("name", Value::from("x")), ("id", Value::from(3))]);
        let compiled = compile(&stmt.into(), &[], Some(&args)).unwrap();
        assert_eq!(
            compiled.args,
            vec![Value::from("x"), Value::Int32(1), Value::from(3)]
        );
    }

    #[test]
    fn test_compilation_is_repeatable() {
        let users = users();
        let query: Statement = ids_and_names(&users)
            .filter(
                users
                    .col("id")
                    .unwrap()
                    .gt(10)
                    .and(users.col("name").unwrap().eq(bind("name")))
                    .and(users.col("status").unwrap().in_list(["new", "old"])),
            )
            .into();
        let args = named(&[("name", Value::from("lele"))]);
        let first = compile(&query, &[], Some(&args)).unwrap();
        let second = compile(&query, &[], Some(&args)).unwrap();
        assert_eq!(first, second);
        assert_eq!(placeholders(&first.sql), vec!["1", "2", "3", "4"]);

        let insert: Statement = insert(&users).value("name", "lele").into();
        let first = compile(&insert, &[], None).unwrap();
        let second = compile(&insert, &[], None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.args, vec![Value::from("lele"), Value::from("new")]);
    }

    #[test]
    fn test_update_without_assignments() {
        let t = Table::new("t")
            .column(Column::new("a", SqlType::Integer))
            .build();
        let err = compile(&update(&t).into(), &[], None).unwrap_err();
        assert!(matches!(err, CompileError::InvalidStatement(_)));
    }

    #[test]
    fn test_delete() {
        let users = users();
        let stmt = delete(&users)
            .filter(users.col("id").unwrap().eq(3))
            .returning(vec![users.col("id").unwrap().into()]);
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "DELETE FROM users WHERE users.id = $1::INTEGER RETURNING users.id"
        );
        assert_eq!(compiled.args, vec![Value::Int32(3)]);
    }

    #[test]
    fn test_text_binds() {
        let stmt = Statement::text("SELECT :a, :b::int, '10:30', x:y, \\:literal");
        let args = named(&[("a", Value::from(1)), ("b", Value::from(2))]);
        let compiled = compile(&stmt, &[], Some(&args)).unwrap();
        assert_eq!(compiled.sql, "SELECT $1, $2::int, '10:30', x:y, :literal");
        assert_eq!(compiled.args, vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn test_text_bind_must_be_supplied() {
        let err = compile(&Statement::text("SELECT :a"), &[], None).unwrap_err();
        assert_eq!(err, CompileError::MissingBind("a".into()));
    }

    #[test]
    fn test_limit_and_offset_are_binds() {
        let users = users();
        let stmt = ids_and_names(&users).limit(10).offset(20);
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert!(compiled
            .sql
            .ends_with("FROM users LIMIT $1::INTEGER OFFSET $2::INTEGER"));
        assert_eq!(compiled.args, vec![Value::Int64(10), Value::Int64(20)]);
    }

    #[test]
    fn test_precedence_is_preserved() {
        let users = users();
        let id = || users.col("id").unwrap();
        let stmt = ids_and_names(&users).filter(
            id().eq(1)
                .or(id().eq(2))
                .and(users.col("name").unwrap().eq("x")),
        );
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert!(compiled.sql.ends_with(
            "WHERE (users.id = $1::INTEGER OR users.id = $2::INTEGER) AND users.name = $3::VARCHAR"
        ));
    }

    #[test]
    fn test_in_list() {
        let users = users();
        let stmt = ids_and_names(&users).filter(users.col("id").unwrap().in_list([1, 2]));
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert!(compiled
            .sql
            .ends_with("WHERE users.id IN ($1::INTEGER, $2::INTEGER)"));

        let empty: Vec<i32> = Vec::new();
        let stmt = ids_and_names(&users).filter(users.col("id").unwrap().in_list(empty));
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert!(compiled.sql.ends_with("WHERE 1 != 1"));
    }

    #[test]
    fn test_count_over_subquery() {
        let users = users();
        let inner = SelectQuery::new(vec![users.col("id").unwrap().into()])
            .from(&users)
            .filter(users.col("id").unwrap().gt(1));
        let stmt = SelectQuery::new(vec![count_star().label("count_1")]).from_subquery(inner, "cnt");
        let statement: Statement = stmt.into();
        let compiled = compile(&statement, &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT count(*) AS count_1 FROM (SELECT users.id FROM users WHERE users.id > $1::INTEGER) AS cnt"
        );

        let pretty = render_sql(&statement, SqlLayout::Pretty, None).unwrap();
        assert_eq!(
            pretty,
            "SELECT count(*) AS count_1\nFROM (\n    SELECT users.id\n    FROM users\n    WHERE users.id > $1::INTEGER\n) AS cnt"
        );
    }

    #[test]
    fn test_pretty_layout_keeps_numbering() {
        let users = users();
        let stmt: Statement = ids_and_names(&users)
            .filter(users.col("id").unwrap().eq(1))
            .filter(users.col("name").unwrap().eq("x"))
            .order_by(users.col("name").unwrap().desc())
            .into();
        let compact = render_sql(&stmt, SqlLayout::Compact, None).unwrap();
        let pretty = render_sql(&stmt, SqlLayout::Pretty, None).unwrap();
        assert_eq!(
            pretty,
            "SELECT\n    users.id,\n    users.name\nFROM users\nWHERE users.id = $1::INTEGER\n    AND users.name = $2::VARCHAR\nORDER BY users.name DESC"
        );
        assert_eq!(placeholders(&compact), placeholders(&pretty));
        assert_eq!(compact, compile(&stmt, &[], None).unwrap().sql);
    }

    #[test]
    fn test_render_bare_insert_without_arguments() {
        let users = users();
        let sql = render_sql(&insert(&users).into(), SqlLayout::Compact, None).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO users (name, email, status, changed) VALUES ($1::VARCHAR, $2::VARCHAR, $3::VARCHAR(10), $4::INTEGER)"
        );
    }

    #[test]
    fn test_identifiers_are_quoted_when_needed() {
        let t = Table::new("user")
            .schema("auth")
            .column(Column::new("Name", SqlType::Text))
            .build();
        let compiled = compile(&select(&t).into(), &[], None).unwrap();
        assert_eq!(compiled.sql, "SELECT \"user\".\"Name\" FROM auth.\"user\"");
    }

    #[test]
    fn test_join() {
        let users = users();
        let roles = Table::new("roles")
            .column(Column::new("user_id", SqlType::Integer).references("users.id"))
            .column(Column::new("role", SqlType::Text))
            .build();
        let stmt = SelectQuery::new(vec![
            users.col("name").unwrap().into(),
            roles.col("role").unwrap().into(),
        ])
        .from(&users)
        .left_join(&roles, roles.col("user_id").unwrap().eq(users.col("id").unwrap()));
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT users.name, roles.role FROM users LEFT OUTER JOIN roles ON roles.user_id = users.id"
        );
    }

    #[test]
    fn test_literals_are_inlined() {
        let users = users();
        let stmt = ids_and_names(&users).filter(
            users
                .col("name")
                .unwrap()
                .eq(literal(Literal::String("it's".into()))),
        );
        let compiled = compile(&stmt.into(), &[], None).unwrap();
        assert!(compiled.sql.ends_with("WHERE users.name = 'it''s'"));
        assert!(compiled.args.is_empty());
    }
}
