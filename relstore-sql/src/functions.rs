//! Function, aggregate, date-part and full-text node metadata.

use crate::error::{SqlError, SqlResult};
use crate::record::RecordRef;

/// Scalar SQL functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Abs,
    Ceil,
    Exp,
    Floor,
    Ln,
    Log10,
    Pi,
    Power,
    Random,
    Round,
    Sign,
    Sqrt,
    Trunc,
    Length,
    Lower,
    Position,
    Substring,
    Trim,
    Upper,
    Coalesce,
    Greatest,
    Least,
    Now,
}

impl Func {
    /// Name used by the default renderer.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Ceil => "ceil",
            Func::Exp => "exp",
            Func::Floor => "floor",
            Func::Ln => "ln",
            Func::Log10 => "log10",
            Func::Pi => "pi",
            Func::Power => "power",
            Func::Random => "random",
            Func::Round => "round",
            Func::Sign => "sign",
            Func::Sqrt => "sqrt",
            Func::Trunc => "trunc",
            Func::Length => "length",
            Func::Lower => "lower",
            Func::Position => "position",
            Func::Substring => "substring",
            Func::Trim => "trim",
            Func::Upper => "upper",
            Func::Coalesce => "coalesce",
            Func::Greatest => "greatest",
            Func::Least => "least",
            Func::Now => "now",
        }
    }

    /// Checks the argument count, returning an invalid-argument error on misuse.
    pub fn check_arity(&self, count: usize) -> SqlResult<()> {
        let ok = match self {
            Func::Pi | Func::Random | Func::Now => count == 0,
            Func::Power | Func::Position => count == 2,
            Func::Substring => count == 2 || count == 3,
            Func::Coalesce | Func::Greatest | Func::Least => count >= 1,
            _ => count == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(SqlError::InvalidArgument(format!(
                "{}() does not take {} argument(s)",
                self.canonical_name(),
                count
            )))
        }
    }
}

/// Aggregate functions. Each wraps one argument and a distinct flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Average,
    Count,
    Every,
    Max,
    Min,
    Sum,
}

impl AggregateKind {
    pub fn canonical_name(&self) -> &'static str {
        match self {
            AggregateKind::Average => "average",
            AggregateKind::Count => "count",
            AggregateKind::Every => "every",
            AggregateKind::Max => "max",
            AggregateKind::Min => "min",
            AggregateKind::Sum => "sum",
        }
    }

    /// Standard SQL spelling.
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateKind::Average => "avg",
            other => other.canonical_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    DayOfMonth,
    DayOfWeek,
    DayOfYear,
    Hour,
    Minute,
    Month,
    Second,
    Week,
    Year,
    Epoch,
}

impl DatePart {
    pub fn canonical_name(&self) -> &'static str {
        match self {
            DatePart::DayOfMonth => "day_of_month",
            DatePart::DayOfWeek => "day_of_week",
            DatePart::DayOfYear => "day_of_year",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Month => "month",
            DatePart::Second => "second",
            DatePart::Week => "week",
            DatePart::Year => "year",
            DatePart::Epoch => "epoch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Second => "second",
            IntervalUnit::Minute => "minute",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullTextKind {
    /// Boolean filter: does the row match the query.
    Match,
    /// Numeric relevance of the row for the query.
    Rank,
}

/// A search against one named full-text index of a record type.
#[derive(Debug, Clone)]
pub struct FullText {
    pub record: RecordRef,
    pub index: String,
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert!(Func::Abs.check_arity(1).is_ok());
        assert!(Func::Abs.check_arity(2).is_err());
        assert!(Func::Now.check_arity(0).is_ok());
        assert!(Func::Substring.check_arity(3).is_ok());
        assert!(Func::Coalesce.check_arity(0).is_err());
    }

    #[test]
    fn test_aggregate_names() {
        assert_eq!(AggregateKind::Average.canonical_name(), "average");
        assert_eq!(AggregateKind::Average.sql_name(), "avg");
        assert_eq!(AggregateKind::Count.sql_name(), "count");
    }
}
