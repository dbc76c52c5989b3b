use super::{render_function_call, BuildContext, Dialect};
use crate::error::SqlResult;
use crate::expression::Expression;
use crate::functions::{DatePart, Func, IntervalUnit};
use crate::record::{ColumnType, FieldDef};

/// SQLite, with timestamps stored as `YYYY-MM-DD HH:MM:SS` text.
///
/// There is no row locking, so `for update` is dropped, and no interval
/// type, so interval arithmetic is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

fn strftime_format(part: DatePart) -> &'static str {
    match part {
        DatePart::DayOfMonth => "%d",
        DatePart::DayOfWeek => "%w",
        DatePart::DayOfYear => "%j",
        DatePart::Hour => "%H",
        DatePart::Minute => "%M",
        DatePart::Month => "%m",
        DatePart::Second => "%S",
        DatePart::Week => "%W",
        DatePart::Year => "%Y",
        DatePart::Epoch => "%s",
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn render_function(&self, ctx: &mut BuildContext<'_>, func: Func, args: &[Expression]) -> SqlResult<()> {
        match (func, args) {
            (Func::Now, _) => ctx.push("current_timestamp"),
            (Func::Trunc, [arg]) => {
                ctx.push("cast(");
                ctx.render_expression(arg)?;
                ctx.push(" as integer)");
            }
            (Func::Position, [needle, haystack]) => {
                ctx.push("instr(");
                ctx.render_expression(haystack)?;
                ctx.push(", ");
                ctx.render_expression(needle)?;
                ctx.push(")");
            }
            (Func::Substring, _) => {
                ctx.push("substr(");
                ctx.render_list(args, ", ")?;
                ctx.push(")");
            }
            (Func::Greatest, _) => return render_function_call(ctx, "max", func, args),
            (Func::Least, _) => return render_function_call(ctx, "min", func, args),
            _ => return render_function_call(ctx, func.canonical_name(), func, args),
        }
        Ok(())
    }

    fn render_date_part(&self, ctx: &mut BuildContext<'_>, part: DatePart, arg: &Expression) -> SqlResult<()> {
        ctx.push(&format!("cast(strftime('{}', ", strftime_format(part)));
        ctx.render_expression(arg)?;
        ctx.push(") as integer)");
        Ok(())
    }

    fn render_date_truncate(&self, ctx: &mut BuildContext<'_>, arg: &Expression) -> SqlResult<()> {
        ctx.push("datetime(");
        ctx.render_expression(arg)?;
        ctx.push(", 'start of day')");
        Ok(())
    }

    fn render_interval(&self, ctx: &mut BuildContext<'_>, _amount: i64, _unit: IntervalUnit) -> SqlResult<()> {
        Err(ctx.unsupported("interval arithmetic"))
    }

    fn delete_uses_alias(&self) -> bool {
        false
    }

    fn render_for_update(&self, _ctx: &mut BuildContext<'_>) {
        tracing::debug!("sqlite has no row locks, dropping 'for update'");
    }

    fn column_type(&self, field: &FieldDef) -> SqlResult<String> {
        let ty = match field.column_type {
            ColumnType::Boolean
            | ColumnType::Byte
            | ColumnType::Short
            | ColumnType::Integer
            | ColumnType::Long => "INTEGER",
            ColumnType::Float | ColumnType::Double => "REAL",
            ColumnType::String | ColumnType::Date | ColumnType::Time | ColumnType::Timestamp => "TEXT",
            ColumnType::Blob => "BLOB",
        };
        Ok(ty.to_string())
    }
}
