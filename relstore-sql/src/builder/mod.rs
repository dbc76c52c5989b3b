//! SQL rendering.
//!
//! A [`BuildContext`] renders exactly one statement: it owns the SQL buffer,
//! the positional parameter list and the table abbreviations (`T1`, `T2`, ...
//! in the order record types were collected). Everything that differs
//! between databases goes through the [`Dialect`] trait, whose default
//! methods are the base rendering.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgreSqlDialect;
pub use sqlite::SqliteDialect;

use crate::clause::{
    CreateIndexClause, DeleteClause, DropIndexClause, InsertClause, SelectClause, UpdateClause,
};
use crate::error::{SqlError, SqlResult};
use crate::expression::{ColumnExp, Expression, Order};
use crate::functions::{DatePart, FullText, FullTextKind, Func, IntervalUnit};
use crate::record::{FieldDef, RecordRef, RecordType, RecordTypeSet};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Rendered SQL plus its bound values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Text identifying this exact statement, parameters included.
    pub fn cache_text(&self) -> String {
        format!("{} {:?}", self.sql, self.params)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// Database-specific rendering hooks.
pub trait Dialect: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Placeholder for the `index`-th (1-based) bound parameter.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn render_function(&self, ctx: &mut BuildContext<'_>, func: Func, args: &[Expression]) -> SqlResult<()> {
        render_function_call(ctx, func.canonical_name(), func, args)
    }

    fn render_date_part(&self, ctx: &mut BuildContext<'_>, part: DatePart, arg: &Expression) -> SqlResult<()> {
        ctx.push("extract(");
        ctx.push(date_field_name(part));
        ctx.push(" from ");
        ctx.render_expression(arg)?;
        ctx.push(")");
        Ok(())
    }

    fn render_date_truncate(&self, ctx: &mut BuildContext<'_>, arg: &Expression) -> SqlResult<()> {
        ctx.push("date_trunc('day', ");
        ctx.render_expression(arg)?;
        ctx.push(")");
        Ok(())
    }

    fn render_interval(&self, ctx: &mut BuildContext<'_>, amount: i64, unit: IntervalUnit) -> SqlResult<()> {
        ctx.push(&format!("interval '{} {}'", amount, unit.as_str()));
        Ok(())
    }

    fn render_full_text(&self, ctx: &mut BuildContext<'_>, _kind: FullTextKind, _search: &FullText) -> SqlResult<()> {
        Err(ctx.unsupported("full-text search"))
    }

    /// Joins normalized full-text terms into a boolean OR.
    fn full_text_separator(&self) -> &'static str {
        "|"
    }

    /// Whether DELETE may alias its target table.
    fn delete_uses_alias(&self) -> bool {
        true
    }

    fn render_for_update(&self, ctx: &mut BuildContext<'_>) {
        ctx.push(" for update");
    }

    /// Tail of an INSERT that writes no explicit columns.
    fn empty_insert(&self) -> &'static str {
        " default values"
    }

    fn render_create_index(&self, ctx: &mut BuildContext<'_>, clause: &CreateIndexClause) -> SqlResult<()> {
        render_create_index(ctx, clause)
    }

    fn render_drop_index(&self, ctx: &mut BuildContext<'_>, clause: &DropIndexClause) -> SqlResult<()> {
        ctx.push("drop index ");
        ctx.push_identifier(&clause.name);
        Ok(())
    }

    /// Native column type for DDL.
    fn column_type(&self, field: &FieldDef) -> SqlResult<String>;
}

/// Which built-in dialect to use, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    PostgreSql,
    MySql,
    Sqlite,
}

impl DialectKind {
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        match self {
            DialectKind::PostgreSql => Arc::new(PostgreSqlDialect),
            DialectKind::MySql => Arc::new(MySqlDialect),
            DialectKind::Sqlite => Arc::new(SqliteDialect),
        }
    }
}

/// Field name used by `extract`/`date_part`.
pub fn date_field_name(part: DatePart) -> &'static str {
    match part {
        DatePart::DayOfMonth => "day",
        DatePart::DayOfWeek => "dow",
        DatePart::DayOfYear => "doy",
        DatePart::Hour => "hour",
        DatePart::Minute => "minute",
        DatePart::Month => "month",
        DatePart::Second => "second",
        DatePart::Week => "week",
        DatePart::Year => "year",
        DatePart::Epoch => "epoch",
    }
}

/// Default `name(args)` rendering, with the SQL-standard forms of
/// `position` and `substring`.
pub fn render_function_call(ctx: &mut BuildContext<'_>, name: &str, func: Func, args: &[Expression]) -> SqlResult<()> {
    match (func, args) {
        (Func::Position, [needle, haystack]) => {
            ctx.push("position(");
            ctx.render_expression(needle)?;
            ctx.push(" in ");
            ctx.render_expression(haystack)?;
            ctx.push(")");
        }
        (Func::Substring, [string, from, rest @ ..]) => {
            ctx.push("substring(");
            ctx.render_expression(string)?;
            ctx.push(" from ");
            ctx.render_expression(from)?;
            if let Some(count) = rest.first() {
                ctx.push(" for ");
                ctx.render_expression(count)?;
            }
            ctx.push(")");
        }
        _ => {
            ctx.push(name);
            ctx.push("(");
            ctx.render_list(args, ", ")?;
            ctx.push(")");
        }
    }
    Ok(())
}

/// Default CREATE INDEX rendering. Non-column components are parenthesized.
pub fn render_create_index(ctx: &mut BuildContext<'_>, clause: &CreateIndexClause) -> SqlResult<()> {
    let previous = ctx.set_abbreviate(false);
    ctx.push(if clause.unique { "create unique index " } else { "create index " });
    ctx.push_identifier(&clause.name);
    ctx.push(" on ");
    ctx.push_table(&clause.record);
    ctx.push(" (");
    for (i, (component, order)) in clause.components.iter().enumerate() {
        if i > 0 {
            ctx.push(", ");
        }
        match component {
            Expression::Column(col) => ctx.push_column(col)?,
            other => {
                ctx.push("(");
                ctx.render_expression(other)?;
                ctx.push(")");
            }
        }
        if *order == Order::Desc {
            ctx.push(" desc");
        }
    }
    ctx.push(")");
    ctx.set_abbreviate(previous);
    Ok(())
}

pub struct BuildContext<'a> {
    dialect: &'a dyn Dialect,
    sql: String,
    params: Vec<Value>,
    aliases: Vec<(RecordRef, String)>,
    abbreviate: bool,
}

impl<'a> BuildContext<'a> {
    pub fn new(dialect: &'a dyn Dialect, types: &RecordTypeSet) -> Self {
        let aliases = types
            .iter()
            .enumerate()
            .map(|(i, record)| (Arc::clone(record), format!("T{}", i + 1)))
            .collect();
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            aliases,
            abbreviate: true,
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Appends a placeholder and records `value` at the matching position.
    pub fn bind(&mut self, value: Value) {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    pub fn push_identifier(&mut self, ident: &str) {
        let quoted = self.dialect.quote_identifier(ident);
        self.sql.push_str(&quoted);
    }

    pub fn push_table(&mut self, record: &RecordType) {
        self.push_identifier(record.table());
    }

    pub fn push_table_alias(&mut self, record: &RecordType) -> SqlResult<()> {
        let alias = self.alias(record)?;
        self.push_table(record);
        self.push(" as ");
        self.push(&alias);
        Ok(())
    }

    pub fn alias(&self, record: &RecordType) -> SqlResult<String> {
        self.aliases
            .iter()
            .find(|(r, _)| r.same_type(record))
            .map(|(_, alias)| alias.clone())
            .ok_or_else(|| {
                SqlError::InvalidArgument(format!("{} is not part of this statement", record.name()))
            })
    }

    /// Qualified with the table abbreviation unless abbreviations are off.
    pub fn push_column(&mut self, col: &ColumnExp) -> SqlResult<()> {
        let column = col.record().column_name(col.field())?;
        if self.abbreviate {
            let alias = self.alias(col.record())?;
            self.push(&alias);
            self.push(".");
        }
        self.push_identifier(column);
        Ok(())
    }

    /// Turns table abbreviations on or off, returning the previous setting.
    pub fn set_abbreviate(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.abbreviate, on)
    }

    pub fn unsupported(&self, what: &str) -> SqlError {
        SqlError::Unsupported {
            dialect: self.dialect.name(),
            what: what.to_string(),
        }
    }

    pub fn render_list(&mut self, exps: &[Expression], separator: &str) -> SqlResult<()> {
        for (i, exp) in exps.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.render_expression(exp)?;
        }
        Ok(())
    }

    fn render_logic(&mut self, conditions: &[Expression], separator: &str, empty: &str) -> SqlResult<()> {
        match conditions {
            [] => self.push(empty),
            [single] => self.render_expression(single)?,
            many => {
                self.push("(");
                self.render_list(many, separator)?;
                self.push(")");
            }
        }
        Ok(())
    }

    pub fn render_expression(&mut self, exp: &Expression) -> SqlResult<()> {
        let dialect = self.dialect;
        match exp {
            Expression::Column(col) => self.push_column(col)?,
            Expression::Value(v) => self.bind(v.clone()),
            Expression::Literal(sql) => self.push(sql),
            Expression::Compare { op, left, right } => {
                self.push("(");
                self.render_expression(left)?;
                self.push(" ");
                self.push(op.token());
                self.push(" ");
                self.render_expression(right)?;
                self.push(")");
            }
            Expression::Arithmetic { op, operands } => {
                self.push("(");
                self.render_list(operands, &format!(" {} ", op.token()))?;
                self.push(")");
            }
            Expression::In { target, values } => {
                if values.is_empty() {
                    self.push("(1 = 0)");
                } else {
                    self.render_expression(target)?;
                    self.push(" in (");
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.bind(v.clone());
                    }
                    self.push(")");
                }
            }
            Expression::IsNull(e) => {
                self.push("(");
                self.render_expression(e)?;
                self.push(" is null)");
            }
            Expression::And(conditions) => self.render_logic(conditions, " and ", "(1 = 1)")?,
            Expression::Or(conditions) => self.render_logic(conditions, " or ", "(1 = 0)")?,
            Expression::Not(e) => {
                self.push("not ");
                self.render_expression(e)?;
            }
            Expression::Case { whens, otherwise } => {
                self.push("case");
                for (when, then) in whens {
                    self.push(" when ");
                    self.render_expression(when)?;
                    self.push(" then ");
                    self.render_expression(then)?;
                }
                if let Some(e) = otherwise {
                    self.push(" else ");
                    self.render_expression(e)?;
                }
                self.push(" end");
            }
            Expression::Exists(select) => {
                self.push("exists (");
                self.render_select(select)?;
                self.push(")");
            }
            Expression::Function { func, args } => dialect.render_function(self, *func, args)?,
            Expression::Aggregate { kind, distinct, arg } => {
                self.push(kind.sql_name());
                self.push("(");
                if *distinct {
                    self.push("distinct ");
                }
                self.render_expression(arg)?;
                self.push(")");
            }
            Expression::DatePart { part, arg } => dialect.render_date_part(self, *part, arg)?,
            Expression::DateTruncate(arg) => dialect.render_date_truncate(self, arg)?,
            Expression::Interval { amount, unit } => dialect.render_interval(self, *amount, *unit)?,
            Expression::FullText { kind, search } => dialect.render_full_text(self, *kind, search)?,
        }
        Ok(())
    }

    pub fn render_select(&mut self, select: &SelectClause) -> SqlResult<()> {
        self.push("select ");
        for (i, field) in select.fields().iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match select.field_override(field) {
                Some(exp) => {
                    self.render_expression(exp)?;
                    self.push(" as ");
                    self.push_identifier(select.record().column_name(field)?);
                }
                None => self.push_column(&ColumnExp::new(select.record(), field))?,
            }
        }

        self.push(" from ");
        match select.from_override() {
            Some(from) => {
                for (i, record) in from.records.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push_table_alias(record)?;
                }
            }
            None => self.push_table_alias(select.record())?,
        }

        for join in select.joins() {
            self.push(" ");
            self.push(join.kind.keyword());
            self.push(" ");
            self.push_table_alias(&join.record)?;
            self.push(" on ");
            self.render_expression(&join.condition)?;
        }

        if let Some(where_clause) = select.where_clause() {
            self.push(" where ");
            self.render_expression(&where_clause.condition())?;
        }

        if let Some(group) = select.group_by() {
            self.push(" group by ");
            self.render_list(&group.expressions, ", ")?;
        }

        if let Some(order) = select.order_by() {
            self.push(" order by ");
            for (i, (exp, direction)) in order.terms.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.render_expression(exp)?;
                self.push(match direction {
                    Order::Asc => " asc",
                    Order::Desc => " desc",
                });
            }
        }

        if let Some(limit) = select.limit() {
            self.push(" limit ");
            self.bind(Value::Int(limit.count as i64));
            self.push(" offset ");
            self.bind(Value::Int(limit.offset as i64));
        }

        if select.is_for_update() {
            let dialect = self.dialect;
            dialect.render_for_update(self);
        }
        Ok(())
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

pub fn build_select(dialect: &dyn Dialect, select: &SelectClause) -> SqlResult<Statement> {
    let mut types = RecordTypeSet::new();
    select.collect_record_types(&mut types);
    let mut ctx = BuildContext::new(dialect, &types);
    ctx.render_select(select)?;
    Ok(ctx.finish())
}

pub fn build_insert(dialect: &dyn Dialect, insert: &InsertClause) -> SqlResult<Statement> {
    let mut types = RecordTypeSet::new();
    types.insert(&insert.record);
    let mut ctx = BuildContext::new(dialect, &types);
    ctx.set_abbreviate(false);

    ctx.push("insert into ");
    ctx.push_table(&insert.record);
    let written: Vec<&(String, Value)> = insert.written_values().collect();
    if written.is_empty() {
        ctx.push(dialect.empty_insert());
        return Ok(ctx.finish());
    }
    ctx.push(" (");
    for (i, (field, _)) in written.iter().enumerate() {
        if i > 0 {
            ctx.push(", ");
        }
        ctx.push_identifier(insert.record.column_name(field)?);
    }
    ctx.push(") values (");
    for (i, (_, value)) in written.iter().enumerate() {
        if i > 0 {
            ctx.push(", ");
        }
        ctx.bind(value.clone());
    }
    ctx.push(")");
    Ok(ctx.finish())
}

/// UPDATE renders unqualified columns; not every database accepts an alias
/// on the updated table.
pub fn build_update(dialect: &dyn Dialect, update: &UpdateClause) -> SqlResult<Statement> {
    let mut types = RecordTypeSet::new();
    update.collect_record_types(&mut types);
    let mut ctx = BuildContext::new(dialect, &types);
    ctx.set_abbreviate(false);

    ctx.push("update ");
    ctx.push_table(&update.record);
    ctx.push(" set ");
    for (i, (field, value)) in update.fields.iter().zip(&update.values).enumerate() {
        if i > 0 {
            ctx.push(", ");
        }
        ctx.push_identifier(update.record.column_name(field)?);
        ctx.push(" = ");
        ctx.render_expression(value)?;
    }
    ctx.push(" where ");
    ctx.render_expression(&update.where_clause.condition())?;
    Ok(ctx.finish())
}

pub fn build_delete(dialect: &dyn Dialect, delete: &DeleteClause) -> SqlResult<Statement> {
    let mut types = RecordTypeSet::new();
    delete.collect_record_types(&mut types);
    let mut ctx = BuildContext::new(dialect, &types);

    ctx.push("delete from ");
    if dialect.delete_uses_alias() {
        ctx.push_table_alias(&delete.record)?;
    } else {
        ctx.set_abbreviate(false);
        ctx.push_table(&delete.record);
    }
    ctx.push(" where ");
    ctx.render_expression(&delete.where_clause.condition())?;
    Ok(ctx.finish())
}

pub fn build_create_index(dialect: &dyn Dialect, clause: &CreateIndexClause) -> SqlResult<Statement> {
    let mut types = RecordTypeSet::new();
    clause.collect_record_types(&mut types);
    let mut ctx = BuildContext::new(dialect, &types);
    dialect.render_create_index(&mut ctx, clause)?;
    Ok(ctx.finish())
}

pub fn build_drop_index(dialect: &dyn Dialect, clause: &DropIndexClause) -> SqlResult<Statement> {
    let mut types = RecordTypeSet::new();
    types.insert(&clause.record);
    let mut ctx = BuildContext::new(dialect, &types);
    dialect.render_drop_index(&mut ctx, clause)?;
    Ok(ctx.finish())
}
