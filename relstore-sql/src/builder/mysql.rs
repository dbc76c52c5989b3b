use super::{render_create_index, render_function_call, BuildContext, Dialect};
use crate::clause::{CreateIndexClause, DropIndexClause};
use crate::error::{SqlError, SqlResult};
use crate::expression::{ColumnExp, Expression};
use crate::fulltext::normalize_query;
use crate::functions::{DatePart, FullText, FullTextKind, Func, IntervalUnit};
use crate::record::{ColumnType, FieldDef};
use crate::value::Value;

/// MySQL: bare identifiers, `?` placeholders, boolean-mode full-text search.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        ident.to_string()
    }

    fn render_function(&self, ctx: &mut BuildContext<'_>, func: Func, args: &[Expression]) -> SqlResult<()> {
        match (func, args) {
            (Func::Random, _) => {
                ctx.push("rand()");
                Ok(())
            }
            (Func::Trunc, [arg]) => {
                ctx.push("truncate(");
                ctx.render_expression(arg)?;
                ctx.push(", 0)");
                Ok(())
            }
            (Func::Length, _) => render_function_call(ctx, "char_length", func, args),
            _ => render_function_call(ctx, func.canonical_name(), func, args),
        }
    }

    fn render_date_part(&self, ctx: &mut BuildContext<'_>, part: DatePart, arg: &Expression) -> SqlResult<()> {
        let function = match part {
            DatePart::DayOfMonth => "dayofmonth",
            DatePart::DayOfWeek => "dayofweek",
            DatePart::DayOfYear => "dayofyear",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Month => "month",
            DatePart::Second => "second",
            DatePart::Week => "week",
            DatePart::Year => "year",
            DatePart::Epoch => "unix_timestamp",
        };
        ctx.push(function);
        ctx.push("(");
        ctx.render_expression(arg)?;
        ctx.push(")");
        Ok(())
    }

    fn render_date_truncate(&self, ctx: &mut BuildContext<'_>, arg: &Expression) -> SqlResult<()> {
        ctx.push("cast(date(");
        ctx.render_expression(arg)?;
        ctx.push(") as datetime)");
        Ok(())
    }

    fn render_interval(&self, ctx: &mut BuildContext<'_>, amount: i64, unit: IntervalUnit) -> SqlResult<()> {
        ctx.push(&format!("interval {} {}", amount, unit.as_str()));
        Ok(())
    }

    /// Match and rank share one syntax; in boolean mode `match` yields the
    /// relevance score.
    fn render_full_text(&self, ctx: &mut BuildContext<'_>, _kind: FullTextKind, search: &FullText) -> SqlResult<()> {
        let index = search.record.full_text_index(&search.index).ok_or_else(|| {
            SqlError::InvalidArgument(format!(
                "{} has no full-text index named '{}'",
                search.record.name(),
                search.index
            ))
        })?;
        ctx.push("match(");
        for (i, field) in index.fields.iter().enumerate() {
            if i > 0 {
                ctx.push(", ");
            }
            ctx.push_column(&ColumnExp::new(&search.record, field))?;
        }
        ctx.push(") against (");
        ctx.bind(Value::Text(normalize_query(&search.query, self.full_text_separator())));
        ctx.push(" in boolean mode)");
        Ok(())
    }

    fn full_text_separator(&self) -> &'static str {
        " "
    }

    fn delete_uses_alias(&self) -> bool {
        false
    }

    fn empty_insert(&self) -> &'static str {
        " () values ()"
    }

    fn render_create_index(&self, ctx: &mut BuildContext<'_>, clause: &CreateIndexClause) -> SqlResult<()> {
        if let Some((component, _)) = clause
            .components
            .iter()
            .find(|(c, _)| !matches!(c, Expression::Column(_)))
        {
            tracing::warn!(
                "MySQL index '{}' can only use plain columns, got {}",
                clause.name,
                component
            );
            return Err(SqlError::InvalidArgument(format!(
                "index '{}' component {} is not a column",
                clause.name, component
            )));
        }
        render_create_index(ctx, clause)
    }

    fn render_drop_index(&self, ctx: &mut BuildContext<'_>, clause: &DropIndexClause) -> SqlResult<()> {
        ctx.push("drop index ");
        ctx.push_identifier(&clause.name);
        ctx.push(" on ");
        ctx.push_table(&clause.record);
        Ok(())
    }

    fn column_type(&self, field: &FieldDef) -> SqlResult<String> {
        let ty = match field.column_type {
            ColumnType::Boolean | ColumnType::Byte => "TINYINT".to_string(),
            ColumnType::Short => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Long => "BIGINT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::String => match field.length.unwrap_or(255) {
                len if len >= 32768 => "TEXT".to_string(),
                len => format!("VARCHAR({})", len),
            },
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Timestamp => "DATETIME".to_string(),
            ColumnType::Blob => match field.length.unwrap_or(255) {
                len if len < 32768 => format!("VARBINARY({})", len),
                len if len < 65536 => "BLOB".to_string(),
                len if len < (1 << 24) => "MEDIUMBLOB".to_string(),
                _ => "LONGBLOB".to_string(),
            },
        };
        Ok(ty)
    }
}
