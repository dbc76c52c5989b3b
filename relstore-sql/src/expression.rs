//! Expression tree.
//!
//! Expressions are plain values: every consumer (renderer, evaluator, type
//! collector) matches exhaustively over [`Expression`], so adding a node kind
//! is a compile error everywhere it is not yet handled.

use crate::clause::SelectClause;
use crate::error::{SqlError, SqlResult};
use crate::functions::{AggregateKind, DatePart, FullText, FullTextKind, Func, IntervalUnit};
use crate::record::{RecordRef, RecordTypeSet};
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Largest number of values an `In` expression may carry (signed 16-bit max).
pub const MAX_KEYS: usize = 32767;

/// A (record type, field) pair. Two columns are equal when they name the
/// same field of the same record type.
#[derive(Debug, Clone)]
pub struct ColumnExp {
    record: RecordRef,
    field: String,
}

impl ColumnExp {
    pub fn new(record: &RecordRef, field: &str) -> Self {
        Self {
            record: Arc::clone(record),
            field: field.to_string(),
        }
    }

    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn exp(&self) -> Expression {
        Expression::Column(self.clone())
    }
}

impl PartialEq for ColumnExp {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.record.same_type(&other.record)
    }
}

impl Eq for ColumnExp {}

impl Hash for ColumnExp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.record.name().hash(state);
        self.record.table().hash(state);
        self.field.hash(state);
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
    Like,
}

impl CompareOp {
    pub fn token(&self) -> &'static str {
        match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "!=",
            CompareOp::LessThan => "<",
            CompareOp::LessThanEquals => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanEquals => ">=",
            CompareOp::Like => "like",
        }
    }
}

/// N-ary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    BitAnd,
    BitOr,
}

impl ArithOp {
    pub fn token(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::BitAnd => "&",
            ArithOp::BitOr => "|",
        }
    }
}

/// Sort direction for ORDER BY and index components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Column(ColumnExp),
    /// Bound through the parameter list.
    Value(Value),
    /// Verbatim SQL, the caller's responsibility to sanitize.
    Literal(String),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Arithmetic {
        op: ArithOp,
        operands: Vec<Expression>,
    },
    In {
        target: Box<Expression>,
        values: Vec<Value>,
    },
    IsNull(Box<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Case {
        whens: Vec<(Expression, Expression)>,
        otherwise: Option<Box<Expression>>,
    },
    Exists(Box<SelectClause>),
    Function {
        func: Func,
        args: Vec<Expression>,
    },
    Aggregate {
        kind: AggregateKind,
        distinct: bool,
        arg: Box<Expression>,
    },
    DatePart {
        part: DatePart,
        arg: Box<Expression>,
    },
    /// Truncates a timestamp to the start of its day.
    DateTruncate(Box<Expression>),
    Interval {
        amount: i64,
        unit: IntervalUnit,
    },
    FullText {
        kind: FullTextKind,
        search: FullText,
    },
}

impl Expression {
    pub fn column(record: &RecordRef, field: &str) -> Self {
        Expression::Column(ColumnExp::new(record, field))
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Expression::Value(value.into())
    }

    pub fn literal(sql: &str) -> Self {
        Expression::Literal(sql.to_string())
    }

    fn compare(self, op: CompareOp, other: impl Into<Expression>) -> Self {
        Expression::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn equals(self, other: impl Into<Expression>) -> Self {
        self.compare(CompareOp::Equals, other)
    }

    pub fn not_equals(self, other: impl Into<Expression>) -> Self {
        self.compare(CompareOp::NotEquals, other)
    }

    pub fn less_than(self, other: impl Into<Expression>) -> Self {
        self.compare(CompareOp::LessThan, other)
    }

    pub fn less_equal(self, other: impl Into<Expression>) -> Self {
        self.compare(CompareOp::LessThanEquals, other)
    }

    pub fn greater_than(self, other: impl Into<Expression>) -> Self {
        self.compare(CompareOp::GreaterThan, other)
    }

    pub fn greater_equal(self, other: impl Into<Expression>) -> Self {
        self.compare(CompareOp::GreaterThanEquals, other)
    }

    pub fn like(self, pattern: impl Into<Expression>) -> Self {
        self.compare(CompareOp::Like, pattern)
    }

    pub fn is_null(self) -> Self {
        Expression::IsNull(Box::new(self))
    }

    pub fn not(self) -> Self {
        Expression::Not(Box::new(self))
    }

    /// Membership test. At most [`MAX_KEYS`] values; an empty list is allowed
    /// and matches nothing.
    pub fn in_values<I, V>(self, values: I) -> SqlResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.len() > MAX_KEYS {
            return Err(SqlError::InvalidArgument(format!(
                "In() supports at most {} values, got {}; split the query",
                MAX_KEYS,
                values.len()
            )));
        }
        if values.is_empty() {
            tracing::warn!("Grouchily allowing empty In()");
        }
        Ok(Expression::In {
            target: Box::new(self),
            values,
        })
    }

    pub fn and(conditions: Vec<Expression>) -> Self {
        Expression::And(conditions)
    }

    pub fn or(conditions: Vec<Expression>) -> Self {
        Expression::Or(conditions)
    }

    fn arithmetic(self, op: ArithOp, other: impl Into<Expression>) -> Self {
        match self {
            Expression::Arithmetic { op: own, mut operands } if own == op => {
                operands.push(other.into());
                Expression::Arithmetic { op, operands }
            }
            lhs => Expression::Arithmetic {
                op,
                operands: vec![lhs, other.into()],
            },
        }
    }

    pub fn plus(self, other: impl Into<Expression>) -> Self {
        self.arithmetic(ArithOp::Add, other)
    }

    pub fn minus(self, other: impl Into<Expression>) -> Self {
        self.arithmetic(ArithOp::Sub, other)
    }

    pub fn times(self, other: impl Into<Expression>) -> Self {
        self.arithmetic(ArithOp::Mul, other)
    }

    pub fn divided_by(self, other: impl Into<Expression>) -> Self {
        self.arithmetic(ArithOp::Div, other)
    }

    pub fn bit_and(self, other: impl Into<Expression>) -> Self {
        self.arithmetic(ArithOp::BitAnd, other)
    }

    pub fn bit_or(self, other: impl Into<Expression>) -> Self {
        self.arithmetic(ArithOp::BitOr, other)
    }

    pub fn case(whens: Vec<(Expression, Expression)>, otherwise: Option<Expression>) -> SqlResult<Self> {
        if whens.is_empty() {
            return Err(SqlError::InvalidArgument(
                "Case needs at least one when/then pair".to_string(),
            ));
        }
        Ok(Expression::Case {
            whens,
            otherwise: otherwise.map(Box::new),
        })
    }

    pub fn exists(select: SelectClause) -> Self {
        Expression::Exists(Box::new(select))
    }

    pub fn function(func: Func, args: Vec<Expression>) -> SqlResult<Self> {
        func.check_arity(args.len())?;
        Ok(Expression::Function { func, args })
    }

    pub fn aggregate(kind: AggregateKind, arg: impl Into<Expression>, distinct: bool) -> Self {
        Expression::Aggregate {
            kind,
            distinct,
            arg: Box::new(arg.into()),
        }
    }

    /// `count(*)`
    pub fn count_all() -> Self {
        Expression::aggregate(AggregateKind::Count, Expression::literal("*"), false)
    }

    pub fn date_part(part: DatePart, arg: impl Into<Expression>) -> Self {
        Expression::DatePart {
            part,
            arg: Box::new(arg.into()),
        }
    }

    pub fn date_truncate(arg: impl Into<Expression>) -> Self {
        Expression::DateTruncate(Box::new(arg.into()))
    }

    pub fn interval(amount: i64, unit: IntervalUnit) -> Self {
        Expression::Interval { amount, unit }
    }

    /// Full-text search against a named index of `record`.
    pub fn full_text(kind: FullTextKind, record: &RecordRef, index: &str, query: &str) -> SqlResult<Self> {
        if record.full_text_index(index).is_none() {
            return Err(SqlError::InvalidArgument(format!(
                "{} has no full-text index named '{}'",
                record.name(),
                index
            )));
        }
        Ok(Expression::FullText {
            kind,
            search: FullText {
                record: Arc::clone(record),
                index: index.to_string(),
                query: query.to_string(),
            },
        })
    }

    /// Adds every record type this expression touches to `set`.
    pub fn collect_record_types(&self, set: &mut RecordTypeSet) {
        match self {
            Expression::Column(col) => set.insert(col.record()),
            Expression::Value(_) | Expression::Literal(_) | Expression::Interval { .. } => {}
            Expression::Compare { left, right, .. } => {
                left.collect_record_types(set);
                right.collect_record_types(set);
            }
            Expression::Arithmetic { operands, .. } => {
                operands.iter().for_each(|e| e.collect_record_types(set))
            }
            Expression::In { target, .. } => target.collect_record_types(set),
            Expression::IsNull(e) | Expression::Not(e) | Expression::DateTruncate(e) => {
                e.collect_record_types(set)
            }
            Expression::And(conditions) | Expression::Or(conditions) => {
                conditions.iter().for_each(|e| e.collect_record_types(set))
            }
            Expression::Case { whens, otherwise } => {
                for (when, then) in whens {
                    when.collect_record_types(set);
                    then.collect_record_types(set);
                }
                if let Some(e) = otherwise {
                    e.collect_record_types(set);
                }
            }
            Expression::Exists(select) => select.collect_record_types(set),
            Expression::Function { args, .. } => args.iter().for_each(|e| e.collect_record_types(set)),
            Expression::Aggregate { arg, .. } | Expression::DatePart { arg, .. } => {
                arg.collect_record_types(set)
            }
            Expression::FullText { search, .. } => set.insert(&search.record),
        }
    }
}

impl From<ColumnExp> for Expression {
    fn from(col: ColumnExp) -> Self {
        Expression::Column(col)
    }
}

impl From<&ColumnExp> for Expression {
    fn from(col: &ColumnExp) -> Self {
        Expression::Column(col.clone())
    }
}

impl From<Value> for Expression {
    fn from(v: Value) -> Self {
        Expression::Value(v)
    }
}

impl From<i64> for Expression {
    fn from(v: i64) -> Self {
        Expression::Value(Value::Int(v))
    }
}

impl From<i32> for Expression {
    fn from(v: i32) -> Self {
        Expression::Value(Value::from(v))
    }
}

impl From<f64> for Expression {
    fn from(v: f64) -> Self {
        Expression::Value(Value::Float(v))
    }
}

impl From<bool> for Expression {
    fn from(v: bool) -> Self {
        Expression::Value(Value::Bool(v))
    }
}

impl From<&str> for Expression {
    fn from(v: &str) -> Self {
        Expression::Value(Value::from(v))
    }
}

impl From<String> for Expression {
    fn from(v: String) -> Self {
        Expression::Value(Value::Text(v))
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expression], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(col) => write!(f, "{}.{}", col.record().name(), col.field()),
            Expression::Value(v) => write!(f, "{:?}", v),
            Expression::Literal(sql) => write!(f, "{}", sql),
            Expression::Compare { op, left, right } => {
                write!(f, "({} {} {})", left, op.token(), right)
            }
            Expression::Arithmetic { op, operands } => {
                write!(f, "(")?;
                write_joined(f, operands, &format!(" {} ", op.token()))?;
                write!(f, ")")
            }
            Expression::In { target, values } => {
                write!(f, "{} in (", target)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", v)?;
                }
                write!(f, ")")
            }
            Expression::IsNull(e) => write!(f, "({} is null)", e),
            Expression::And(c) => {
                write!(f, "(")?;
                write_joined(f, c, " and ")?;
                write!(f, ")")
            }
            Expression::Or(c) => {
                write!(f, "(")?;
                write_joined(f, c, " or ")?;
                write!(f, ")")
            }
            Expression::Not(e) => write!(f, "not {}", e),
            Expression::Case { whens, otherwise } => {
                write!(f, "case")?;
                for (when, then) in whens {
                    write!(f, " when {} then {}", when, then)?;
                }
                if let Some(e) = otherwise {
                    write!(f, " else {}", e)?;
                }
                write!(f, " end")
            }
            Expression::Exists(select) => write!(f, "exists {}", select),
            Expression::Function { func, args } => {
                write!(f, "{}(", func.canonical_name())?;
                write_joined(f, args, ", ")?;
                write!(f, ")")
            }
            Expression::Aggregate { kind, distinct, arg } => {
                let distinct = if *distinct { "distinct " } else { "" };
                write!(f, "{}({}{})", kind.canonical_name(), distinct, arg)
            }
            Expression::DatePart { part, arg } => write!(f, "{}({})", part.canonical_name(), arg),
            Expression::DateTruncate(arg) => write!(f, "date({})", arg),
            Expression::Interval { amount, unit } => write!(f, "interval {} {}", amount, unit.as_str()),
            Expression::FullText { kind, search } => {
                let name = match kind {
                    FullTextKind::Match => "match",
                    FullTextKind::Rank => "rank",
                };
                write!(f, "{}({}, {:?})", name, search.index, search.query)
            }
        }
    }
}
