use super::{date_field_name, BuildContext, Dialect};
use crate::error::{SqlError, SqlResult};
use crate::expression::Expression;
use crate::fulltext::normalize_query;
use crate::functions::{DatePart, FullText, FullTextKind};
use crate::record::{ColumnType, FieldDef, FullTextConfig};
use crate::value::Value;

/// PostgreSQL: double-quoted identifiers and `$n` placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgreSqlDialect;

impl Dialect for PostgreSqlDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn render_date_part(&self, ctx: &mut BuildContext<'_>, part: DatePart, arg: &Expression) -> SqlResult<()> {
        ctx.push("date_part(");
        ctx.bind(Value::Text(date_field_name(part).to_string()));
        ctx.push(", ");
        ctx.render_expression(arg)?;
        ctx.push(")");
        Ok(())
    }

    fn render_full_text(&self, ctx: &mut BuildContext<'_>, kind: FullTextKind, search: &FullText) -> SqlResult<()> {
        let index = search.record.full_text_index(&search.index).ok_or_else(|| {
            SqlError::InvalidArgument(format!(
                "{} has no full-text index named '{}'",
                search.record.name(),
                search.index
            ))
        })?;
        let config = match index.config {
            FullTextConfig::Simple => "pg_catalog.simple",
            FullTextConfig::English => "pg_catalog.english",
        };
        let column = format!("ftsCol_{}", search.index);
        let query = normalize_query(&search.query, self.full_text_separator());

        match kind {
            FullTextKind::Match => {
                ctx.push_identifier(&column);
                ctx.push(&format!(" @@ to_tsquery('{}', ", config));
                ctx.bind(Value::Text(query));
                ctx.push(")");
            }
            FullTextKind::Rank => {
                ctx.push("ts_rank(");
                ctx.push_identifier(&column);
                ctx.push(&format!(", to_tsquery('{}', ", config));
                ctx.bind(Value::Text(query));
                ctx.push("), 1)");
            }
        }
        Ok(())
    }

    fn column_type(&self, field: &FieldDef) -> SqlResult<String> {
        let ty = match field.column_type {
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Byte | ColumnType::Short => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Long => "BIGINT".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::String => match field.length.unwrap_or(255) {
                len if len >= 32768 => "TEXT".to_string(),
                len => format!("VARCHAR({})", len),
            },
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Blob => "BYTEA".to_string(),
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::fixtures::{person, pet};
    use crate::builder::{build_create_index, build_delete, build_drop_index, build_insert, build_select, build_update};
    use crate::clause::{
        CreateIndexClause, DeleteClause, DropIndexClause, FieldOverride, FromOverride, InsertClause, Join, Limit,
        OrderBy, QueryClause, SelectClause, UpdateClause, WhereClause,
    };
    use crate::expression::{ColumnExp, Order};
    use crate::functions::{AggregateKind, Func, IntervalUnit};
    use crate::key::{Key, KeySet};
    use std::collections::HashSet;

    #[test]
    fn test_select_with_where_order_limit() {
        let p = person();
        let clauses = vec![
            QueryClause::from(Expression::column(&p, "age").greater_than(21)),
            OrderBy::descending(Expression::column(&p, "name")).into(),
            Limit::new(10, 5).into(),
        ];
        let select = SelectClause::new(&p, vec!["id".into(), "name".into()], clauses).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert_eq!(
            stmt.sql,
            "select T1.\"id\", T1.\"name\" from \"person\" as T1 where (T1.\"age\" > $1) \
             order by T1.\"name\" desc limit $2 offset $3"
        );
        assert_eq!(stmt.params, vec![Value::Int(21), Value::Int(5), Value::Int(10)]);
    }

    #[test]
    fn test_select_for_update_with_key() {
        let p = person();
        let key = Key::from_values(&p, vec![Value::Int(9)]).unwrap();
        let select = SelectClause::new(&p, vec!["name".into()], vec![key.into(), QueryClause::ForUpdate]).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert_eq!(
            stmt.sql,
            "select T1.\"name\" from \"person\" as T1 where (T1.\"id\" = $1) for update"
        );
    }

    #[test]
    fn test_join_and_key_set() {
        let p = person();
        let pets = pet();
        let keys = (1..=3)
            .map(|i| Key::from_values(&p, vec![Value::Int(i)]).unwrap())
            .collect();
        let clauses = vec![
            QueryClause::from(Join::on(&ColumnExp::new(&p, "id"), &ColumnExp::new(&pets, "owner_id"))),
            KeySet::explicit(&p, keys).unwrap().into(),
        ];
        let select = SelectClause::new(&p, vec!["id".into()], clauses).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert_eq!(
            stmt.sql,
            "select T1.\"id\" from \"person\" as T1 inner join \"pet\" as T2 on (T1.\"id\" = T2.\"owner_id\") \
             where T1.\"id\" in ($1, $2, $3)"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_count_projection_with_from_override() {
        let p = person();
        let pets = pet();
        let clauses = vec![
            QueryClause::from(FromOverride::new(&[&pets])),
            FieldOverride::new("age", Expression::aggregate(AggregateKind::Count, Expression::column(&pets, "species"), true)).into(),
        ];
        let select = SelectClause::new(&p, vec!["age".into()], clauses).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert_eq!(stmt.sql, "select count(distinct T2.\"species\") as \"age\" from \"pet\" as T2");
    }

    #[test]
    fn test_date_functions_and_interval() {
        let p = person();
        let born = Expression::column(&p, "born");
        let condition = Expression::and(vec![
            Expression::date_part(DatePart::Year, born.clone()).equals(1990),
            Expression::date_truncate(born.clone()).less_than(
                Expression::function(Func::Now, vec![]).unwrap().minus(Expression::interval(3, IntervalUnit::Day)),
            ),
        ]);
        let select = SelectClause::new(&p, vec!["id".into()], vec![QueryClause::from(condition)]).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert_eq!(
            stmt.sql,
            "select T1.\"id\" from \"person\" as T1 where ((date_part($1, T1.\"born\") = $2) and \
             (date_trunc('day', T1.\"born\") < (now() - interval '3 day')))"
        );
        assert_eq!(stmt.params, vec![Value::Text("year".into()), Value::Int(1990)]);
    }

    #[test]
    fn test_full_text_match_and_rank() {
        let p = person();
        let matches = Expression::full_text(FullTextKind::Match, &p, "bio", "Hello, World!").unwrap();
        let rank = Expression::full_text(FullTextKind::Rank, &p, "bio", "Hello, World!").unwrap();
        let clauses = vec![QueryClause::from(matches), OrderBy::descending(rank).into()];
        let select = SelectClause::new(&p, vec!["id".into()], clauses).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert_eq!(
            stmt.sql,
            "select T1.\"id\" from \"person\" as T1 where \"ftsCol_bio\" @@ to_tsquery('pg_catalog.english', $1) \
             order by ts_rank(\"ftsCol_bio\", to_tsquery('pg_catalog.english', $2), 1) desc"
        );
        assert_eq!(stmt.params[0], Value::Text("hello|world".into()));
    }

    #[test]
    fn test_functions_case_exists() {
        let p = person();
        let pets = pet();
        let sub = SelectClause::new(
            &pets,
            vec!["id".into()],
            vec![QueryClause::from(Expression::column(&pets, "owner_id").equals(Expression::column(&p, "id")))],
        )
        .unwrap();
        let label = Expression::case(
            vec![(Expression::column(&p, "age").less_than(18), Expression::value("minor"))],
            Some(Expression::value("adult")),
        )
        .unwrap();
        let clauses = vec![
            QueryClause::from(Expression::exists(sub)),
            FieldOverride::new("name", label).into(),
        ];
        let select = SelectClause::new(&p, vec!["name".into()], clauses).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert_eq!(
            stmt.sql,
            "select case when (T1.\"age\" < $1) then $2 else $3 end as \"name\" from \"person\" as T1 \
             where exists (select T2.\"id\" from \"pet\" as T2 where (T2.\"owner_id\" = T1.\"id\"))"
        );

        let lower = Expression::function(Func::Substring, vec![Expression::column(&p, "name"), 1.into(), 3.into()]).unwrap();
        let select = SelectClause::new(&p, vec!["id".into()], vec![QueryClause::from(lower.equals("bob"))]).unwrap();
        let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
        assert!(stmt.sql.ends_with("where (substring(T1.\"name\" from $1 for $2) = $3)"));
    }

    #[test]
    fn test_insert_update_delete() {
        let p = person();
        let identity: HashSet<String> = ["id".to_string()].into_iter().collect();
        let insert = InsertClause::new(
            &p,
            vec![
                ("id".to_string(), Value::Null),
                ("name".to_string(), "Bob".into()),
                ("age".to_string(), 25.into()),
            ],
            identity,
        )
        .unwrap();
        let stmt = build_insert(&PostgreSqlDialect, &insert).unwrap();
        assert_eq!(stmt.sql, "insert into \"person\" (\"name\", \"age\") values ($1, $2)");

        let key = Key::from_values(&p, vec![Value::Int(4)]).unwrap();
        let update = UpdateClause::new(
            &p,
            WhereClause::Key(key.clone()),
            vec!["age".into()],
            vec![Expression::column(&p, "age").plus(1)],
        )
        .unwrap();
        let stmt = build_update(&PostgreSqlDialect, &update).unwrap();
        assert_eq!(stmt.sql, "update \"person\" set \"age\" = (\"age\" + $1) where (\"id\" = $2)");
        assert_eq!(stmt.params, vec![Value::Int(1), Value::Int(4)]);

        let delete = DeleteClause::new(&p, WhereClause::Key(key));
        let stmt = build_delete(&PostgreSqlDialect, &delete).unwrap();
        assert_eq!(stmt.sql, "delete from \"person\" as T1 where (T1.\"id\" = $1)");
    }

    #[test]
    fn test_index_statements() {
        let p = person();
        let create = CreateIndexClause::new(
            &p,
            "person_name_lower",
            true,
            vec![
                (Expression::function(Func::Lower, vec![Expression::column(&p, "name")]).unwrap(), Order::Asc),
                (Expression::column(&p, "age"), Order::Desc),
            ],
        )
        .unwrap();
        let stmt = build_create_index(&PostgreSqlDialect, &create).unwrap();
        assert_eq!(
            stmt.sql,
            "create unique index \"person_name_lower\" on \"person\" ((lower(\"name\")), \"age\" desc)"
        );

        let drop = DropIndexClause::new(&p, "person_name_lower");
        let stmt = build_drop_index(&PostgreSqlDialect, &drop).unwrap();
        assert_eq!(stmt.sql, "drop index \"person_name_lower\"");
    }

    #[test]
    fn test_column_types() {
        let p = person();
        let types: Vec<String> = p
            .fields()
            .iter()
            .map(|f| PostgreSqlDialect.column_type(f).unwrap())
            .collect();
        assert_eq!(types, vec!["INTEGER", "VARCHAR(64)", "INTEGER", "TIMESTAMP", "TEXT"]);
    }
}
