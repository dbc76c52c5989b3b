//! In-memory evaluation of expressions against already loaded values.
//!
//! Evaluation never fails: operands that cannot be compared or computed
//! produce [`Evaluation::NotApplicable`], which a boolean context treats as
//! false.

use crate::expression::{ArithOp, ColumnExp, CompareOp, Expression};
use crate::functions::{DatePart, Func};
use crate::value::Value;
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::cmp::Ordering;

/// Supplies column values to the evaluator.
pub trait FieldSource {
    fn field_value(&self, column: &ColumnExp) -> Option<Value>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Value(Value),
    NotApplicable(String),
}

impl Evaluation {
    fn na(reason: impl Into<String>) -> Self {
        Evaluation::NotApplicable(reason.into())
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Evaluation::Value(Value::Bool(true)))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Evaluation::Value(v) => Some(v),
            Evaluation::NotApplicable(_) => None,
        }
    }
}

impl Expression {
    pub fn evaluate(&self, source: &dyn FieldSource) -> Evaluation {
        match self {
            Expression::Column(col) => match source.field_value(col) {
                Some(v) => Evaluation::Value(v),
                None => Evaluation::na(format!("no value for {}", col.field())),
            },
            Expression::Value(v) => Evaluation::Value(v.clone()),
            Expression::Literal(_) => Evaluation::na("literal SQL"),
            Expression::Compare { op, left, right } => {
                let (l, r) = match (left.evaluate(source), right.evaluate(source)) {
                    (Evaluation::Value(l), Evaluation::Value(r)) => (l, r),
                    (na @ Evaluation::NotApplicable(_), _) | (_, na @ Evaluation::NotApplicable(_)) => {
                        return na
                    }
                };
                compare(*op, &l, &r)
            }
            Expression::Arithmetic { op, operands } => {
                let mut values = Vec::with_capacity(operands.len());
                for operand in operands {
                    match operand.evaluate(source) {
                        Evaluation::Value(v) => values.push(v),
                        na => return na,
                    }
                }
                arithmetic(*op, &values)
            }
            Expression::In { target, values } => match target.evaluate(source) {
                Evaluation::Value(Value::Null) => Evaluation::na("null operand to in"),
                Evaluation::Value(v) => Evaluation::Value(Value::Bool(
                    values.iter().any(|c| v.compare(c) == Some(Ordering::Equal)),
                )),
                na => na,
            },
            Expression::IsNull(e) => match e.evaluate(source) {
                Evaluation::Value(v) => Evaluation::Value(Value::Bool(v.is_null())),
                na => na,
            },
            Expression::And(conditions) => logical(conditions, source, false),
            Expression::Or(conditions) => logical(conditions, source, true),
            Expression::Not(e) => match e.evaluate(source) {
                Evaluation::Value(Value::Bool(b)) => Evaluation::Value(Value::Bool(!b)),
                Evaluation::Value(v) => Evaluation::na(format!("not on {}", v.type_name())),
                na => na,
            },
            Expression::Case { whens, otherwise } => {
                for (when, then) in whens {
                    if when.evaluate(source).is_true() {
                        return then.evaluate(source);
                    }
                }
                match otherwise {
                    Some(e) => e.evaluate(source),
                    None => Evaluation::Value(Value::Null),
                }
            }
            Expression::Exists(_) => Evaluation::na("sub-select"),
            Expression::Function { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match arg.evaluate(source) {
                        Evaluation::Value(v) => values.push(v),
                        na => return na,
                    }
                }
                function(*func, &values)
            }
            Expression::Aggregate { .. } => Evaluation::na("aggregate"),
            Expression::DatePart { part, arg } => match arg.evaluate(source) {
                Evaluation::Value(v) => date_part(*part, &v),
                na => na,
            },
            Expression::DateTruncate(arg) => match arg.evaluate(source) {
                Evaluation::Value(Value::Timestamp(ts)) => match ts.date().and_hms_opt(0, 0, 0) {
                    Some(day) => Evaluation::Value(Value::Timestamp(day)),
                    None => Evaluation::na("date truncation"),
                },
                Evaluation::Value(Value::Date(d)) => Evaluation::Value(Value::Date(d)),
                Evaluation::Value(v) => Evaluation::na(format!("date truncation of {}", v.type_name())),
                na => na,
            },
            Expression::Interval { .. } => Evaluation::na("interval"),
            Expression::FullText { .. } => Evaluation::na("full-text search"),
        }
    }
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> Evaluation {
    if op == CompareOp::Like {
        return Evaluation::na("like is not evaluated in memory");
    }
    let Some(ordering) = l.compare(r) else {
        return Evaluation::na(format!("can't compare {} with {}", l.type_name(), r.type_name()));
    };
    let result = match op {
        CompareOp::Equals => ordering == Ordering::Equal,
        CompareOp::NotEquals => ordering != Ordering::Equal,
        CompareOp::LessThan => ordering == Ordering::Less,
        CompareOp::LessThanEquals => ordering != Ordering::Greater,
        CompareOp::GreaterThan => ordering == Ordering::Greater,
        CompareOp::GreaterThanEquals => ordering != Ordering::Less,
        CompareOp::Like => unreachable!(),
    };
    Evaluation::Value(Value::Bool(result))
}

fn logical(conditions: &[Expression], source: &dyn FieldSource, is_or: bool) -> Evaluation {
    let mut undecided = None;
    for condition in conditions {
        match condition.evaluate(source) {
            Evaluation::Value(Value::Bool(b)) if b == is_or => return Evaluation::Value(Value::Bool(b)),
            Evaluation::Value(Value::Bool(_)) => {}
            Evaluation::Value(v) => {
                undecided.get_or_insert_with(|| format!("{} in boolean context", v.type_name()));
            }
            Evaluation::NotApplicable(reason) => {
                undecided.get_or_insert(reason);
            }
        }
    }
    match undecided {
        Some(reason) => Evaluation::NotApplicable(reason),
        None => Evaluation::Value(Value::Bool(!is_or)),
    }
}

fn arithmetic(op: ArithOp, values: &[Value]) -> Evaluation {
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let ints: Vec<i64> = values.iter().filter_map(Value::as_i64).collect();
        let mut iter = ints.into_iter();
        let Some(mut acc) = iter.next() else {
            return Evaluation::na("no operands");
        };
        for v in iter {
            let next = match op {
                ArithOp::Add => acc.checked_add(v),
                ArithOp::Sub => acc.checked_sub(v),
                ArithOp::Mul => acc.checked_mul(v),
                ArithOp::Div => acc.checked_div(v),
                ArithOp::BitAnd => Some(acc & v),
                ArithOp::BitOr => Some(acc | v),
            };
            match next {
                Some(n) => acc = n,
                None => return Evaluation::na("integer overflow or division by zero"),
            }
        }
        return Evaluation::Value(Value::Int(acc));
    }

    if matches!(op, ArithOp::BitAnd | ArithOp::BitOr) {
        return Evaluation::na("bitwise operation on non-integers");
    }
    let mut floats = Vec::with_capacity(values.len());
    for v in values {
        match v.as_f64() {
            Some(f) => floats.push(f),
            None => return Evaluation::na(format!("arithmetic on {}", v.type_name())),
        }
    }
    let mut iter = floats.into_iter();
    let Some(mut acc) = iter.next() else {
        return Evaluation::na("no operands");
    };
    for v in iter {
        acc = match op {
            ArithOp::Add => acc + v,
            ArithOp::Sub => acc - v,
            ArithOp::Mul => acc * v,
            _ => acc / v,
        };
    }
    Evaluation::Value(Value::Float(acc))
}

fn numeric(values: &[Value], f: impl Fn(f64) -> f64) -> Evaluation {
    match values.first().and_then(Value::as_f64) {
        Some(x) => Evaluation::Value(Value::Float(f(x))),
        None => Evaluation::na("numeric function on non-number"),
    }
}

fn text(values: &[Value], f: impl Fn(&str) -> Value) -> Evaluation {
    match values.first() {
        Some(Value::Text(s)) => Evaluation::Value(f(s)),
        _ => Evaluation::na("string function on non-text"),
    }
}

fn extreme(values: &[Value], wanted: Ordering) -> Evaluation {
    let mut best: Option<&Value> = None;
    for v in values {
        best = match best {
            None => Some(v),
            Some(b) => match v.compare(b) {
                Some(o) if o == wanted => Some(v),
                Some(_) => Some(b),
                None => return Evaluation::na("incomparable operands"),
            },
        };
    }
    best.map_or_else(|| Evaluation::na("no operands"), |v| Evaluation::Value(v.clone()))
}

fn function(func: Func, values: &[Value]) -> Evaluation {
    if func != Func::Coalesce && values.iter().any(Value::is_null) {
        return Evaluation::Value(Value::Null);
    }
    match func {
        Func::Abs => match values.first() {
            Some(Value::Int(i)) => Evaluation::Value(Value::Int(i.abs())),
            _ => numeric(values, f64::abs),
        },
        Func::Ceil => numeric(values, f64::ceil),
        Func::Exp => numeric(values, f64::exp),
        Func::Floor => numeric(values, f64::floor),
        Func::Ln => numeric(values, f64::ln),
        Func::Log10 => numeric(values, f64::log10),
        Func::Pi => Evaluation::Value(Value::Float(std::f64::consts::PI)),
        Func::Power => match (values.first().and_then(Value::as_f64), values.get(1).and_then(Value::as_f64)) {
            (Some(b), Some(e)) => Evaluation::Value(Value::Float(b.powf(e))),
            _ => Evaluation::na("power on non-numbers"),
        },
        Func::Round => numeric(values, f64::round),
        Func::Sign => numeric(values, |x| if x == 0.0 { 0.0 } else { x.signum() }),
        Func::Sqrt => numeric(values, f64::sqrt),
        Func::Trunc => numeric(values, f64::trunc),
        Func::Length => text(values, |s| Value::Int(s.chars().count() as i64)),
        Func::Lower => text(values, |s| Value::Text(s.to_lowercase())),
        Func::Upper => text(values, |s| Value::Text(s.to_uppercase())),
        Func::Trim => text(values, |s| Value::Text(s.trim().to_string())),
        Func::Position => match (values.first(), values.get(1)) {
            (Some(Value::Text(needle)), Some(Value::Text(haystack))) => {
                let pos = haystack
                    .find(needle.as_str())
                    .map_or(0, |byte| haystack[..byte].chars().count() as i64 + 1);
                Evaluation::Value(Value::Int(pos))
            }
            _ => Evaluation::na("position on non-text"),
        },
        Func::Coalesce => Evaluation::Value(
            values.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null),
        ),
        Func::Greatest => extreme(values, Ordering::Greater),
        Func::Least => extreme(values, Ordering::Less),
        Func::Random | Func::Now | Func::Substring => {
            Evaluation::na(format!("{}() is only evaluated by the database", func.canonical_name()))
        }
    }
}

fn date_part(part: DatePart, value: &Value) -> Evaluation {
    let ts: NaiveDateTime = match value {
        Value::Timestamp(ts) => *ts,
        Value::Date(d) => match d.and_hms_opt(0, 0, 0) {
            Some(ts) => ts,
            None => return Evaluation::na("date part"),
        },
        Value::Null => return Evaluation::Value(Value::Null),
        other => return Evaluation::na(format!("date part of {}", other.type_name())),
    };
    let n = match part {
        DatePart::DayOfMonth => i64::from(ts.day()),
        DatePart::DayOfWeek => i64::from(ts.weekday().num_days_from_sunday()),
        DatePart::DayOfYear => i64::from(ts.ordinal()),
        DatePart::Hour => i64::from(ts.hour()),
        DatePart::Minute => i64::from(ts.minute()),
        DatePart::Month => i64::from(ts.month()),
        DatePart::Second => i64::from(ts.second()),
        DatePart::Week => i64::from(ts.iso_week().week()),
        DatePart::Year => i64::from(ts.year()),
        DatePart::Epoch => ts.and_utc().timestamp(),
    };
    Evaluation::Value(Value::Int(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ColumnType, FieldDef, RecordRef, RecordType};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Row(HashMap<String, Value>);

    impl FieldSource for Row {
        fn field_value(&self, column: &ColumnExp) -> Option<Value> {
            self.0.get(column.field()).cloned()
        }
    }

    fn person() -> RecordRef {
        Arc::new(
            RecordType::builder("Person", "person")
                .field(FieldDef::new("id", ColumnType::Integer))
                .field(FieldDef::new("name", ColumnType::String).nullable())
                .field(FieldDef::new("age", ColumnType::Integer))
                .field(FieldDef::new("born", ColumnType::Timestamp))
                .primary_key(["id"])
                .build()
                .unwrap(),
        )
    }

    fn row() -> Row {
        let born = NaiveDate::from_ymd_opt(1990, 3, 14).unwrap().and_hms_opt(15, 9, 26).unwrap();
        Row(HashMap::from([
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::Null),
            ("age".to_string(), Value::Int(34)),
            ("born".to_string(), Value::Timestamp(born)),
        ]))
    }

    #[test]
    fn test_comparisons() {
        let p = person();
        let age = Expression::column(&p, "age");
        assert!(age.clone().greater_than(30).evaluate(&row()).is_true());
        assert!(!age.clone().less_than(30).evaluate(&row()).is_true());
        assert!(age.equals(34.0).evaluate(&row()).is_true());
    }

    #[test]
    fn test_null_operand_is_not_applicable() {
        let p = person();
        let exp = Expression::column(&p, "name").less_than("Bob");
        let result = exp.evaluate(&row());
        assert!(matches!(result, Evaluation::NotApplicable(_)));
        assert!(!result.is_true());
    }

    #[test]
    fn test_incomparable_types_not_applicable() {
        let p = person();
        let exp = Expression::column(&p, "age").equals("thirty");
        assert!(matches!(exp.evaluate(&row()), Evaluation::NotApplicable(_)));
    }

    #[test]
    fn test_logic_short_circuits_past_not_applicable() {
        let p = person();
        let unknown = Expression::column(&p, "name").greater_than("A");
        let falsy = Expression::column(&p, "age").less_than(0);
        let and = Expression::and(vec![unknown.clone(), falsy]);
        assert_eq!(and.evaluate(&row()), Evaluation::Value(Value::Bool(false)));

        let truthy = Expression::column(&p, "age").greater_than(0);
        let or = Expression::or(vec![unknown.clone(), truthy]);
        assert!(or.evaluate(&row()).is_true());

        let undecided = Expression::and(vec![unknown, Expression::value(true)]);
        assert!(matches!(undecided.evaluate(&row()), Evaluation::NotApplicable(_)));
    }

    #[test]
    fn test_arithmetic() {
        let p = person();
        let exp = Expression::column(&p, "age").plus(6).times(2);
        assert_eq!(exp.evaluate(&row()), Evaluation::Value(Value::Int(80)));

        let div = Expression::column(&p, "age").divided_by(0);
        assert!(matches!(div.evaluate(&row()), Evaluation::NotApplicable(_)));

        let mixed = Expression::column(&p, "age").plus(0.5);
        assert_eq!(mixed.evaluate(&row()), Evaluation::Value(Value::Float(34.5)));
    }

    #[test]
    fn test_in_and_is_null() {
        let p = person();
        let exp = Expression::column(&p, "age").in_values(vec![33, 34]).unwrap();
        assert!(exp.evaluate(&row()).is_true());
        assert!(Expression::column(&p, "name").is_null().evaluate(&row()).is_true());
    }

    #[test]
    fn test_case() {
        let p = person();
        let exp = Expression::case(
            vec![(Expression::column(&p, "age").less_than(18), Expression::value("minor"))],
            Some(Expression::value("adult")),
        )
        .unwrap();
        assert_eq!(exp.evaluate(&row()), Evaluation::Value(Value::Text("adult".into())));
    }

    #[test]
    fn test_date_parts() {
        let p = person();
        let born = Expression::column(&p, "born");
        let year = Expression::date_part(DatePart::Year, born.clone());
        assert_eq!(year.evaluate(&row()), Evaluation::Value(Value::Int(1990)));
        let dow = Expression::date_part(DatePart::DayOfWeek, born.clone());
        assert_eq!(dow.evaluate(&row()), Evaluation::Value(Value::Int(3)));
        let minute = Expression::date_part(DatePart::Minute, born);
        assert_eq!(minute.evaluate(&row()), Evaluation::Value(Value::Int(9)));
    }

    #[test]
    fn test_functions() {
        let lower = Expression::function(Func::Lower, vec![Expression::value("MiXeD")]).unwrap();
        assert_eq!(lower.evaluate(&row()), Evaluation::Value(Value::Text("mixed".into())));

        let greatest = Expression::function(Func::Greatest, vec![1.into(), 7.into(), 3.into()]).unwrap();
        assert_eq!(greatest.evaluate(&row()), Evaluation::Value(Value::Int(7)));

        let pos = Expression::function(Func::Position, vec!["lo".into(), "hello".into()]).unwrap();
        assert_eq!(pos.evaluate(&row()), Evaluation::Value(Value::Int(4)));

        let like = Expression::value("abc").like("a%");
        assert!(matches!(like.evaluate(&row()), Evaluation::NotApplicable(_)));
    }
}
