//! Statement fragments and the statement shapes built from them.

use crate::error::{SqlError, SqlResult};
use crate::expression::{ColumnExp, Expression, Order};
use crate::functions::Func;
use crate::key::{Key, KeySet};
use crate::record::{RecordRef, RecordTypeSet};
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The WHERE of a statement. Key and key-set conditions keep their identity
/// so the write path can turn them into precise cache invalidations.
#[derive(Debug, Clone)]
pub enum WhereClause {
    Condition(Expression),
    Key(Key),
    KeySet(KeySet),
}

impl WhereClause {
    /// AND of equality tests, using `is null` for null values.
    pub fn from_pairs<I, S>(record: &RecordRef, pairs: I) -> SqlResult<WhereClause>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut tests = Vec::new();
        for (field, value) in pairs {
            let field = field.as_ref();
            record.column_name(field)?;
            let col = ColumnExp::new(record, field).exp();
            tests.push(if value.is_null() {
                col.is_null()
            } else {
                col.equals(Expression::Value(value))
            });
        }
        if tests.is_empty() {
            return Err(SqlError::InvalidArgument(
                "Where needs at least one column".to_string(),
            ));
        }
        Ok(WhereClause::Condition(if tests.len() == 1 {
            tests.remove(0)
        } else {
            Expression::And(tests)
        }))
    }

    pub fn condition(&self) -> Expression {
        match self {
            WhereClause::Condition(exp) => exp.clone(),
            WhereClause::Key(key) => key.condition(),
            WhereClause::KeySet(set) => set.condition(),
        }
    }

    pub fn collect_record_types(&self, set: &mut RecordTypeSet) {
        match self {
            WhereClause::Condition(exp) => exp.collect_record_types(set),
            WhereClause::Key(key) => set.insert(key.record_type()),
            WhereClause::KeySet(keys) => set.insert(keys.record_type()),
        }
    }
}

impl From<Expression> for WhereClause {
    fn from(exp: Expression) -> Self {
        WhereClause::Condition(exp)
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereClause::Condition(exp) => write!(f, "{}", exp),
            WhereClause::Key(key) => write!(f, "{}", key),
            WhereClause::KeySet(set) => write!(f, "{}", set),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner join",
            JoinKind::LeftOuter => "left outer join",
            JoinKind::RightOuter => "right outer join",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub record: RecordRef,
    pub condition: Expression,
    pub kind: JoinKind,
}

impl Join {
    pub fn inner(record: &RecordRef, condition: Expression) -> Self {
        Self::with_kind(record, condition, JoinKind::Inner)
    }

    pub fn left_outer(record: &RecordRef, condition: Expression) -> Self {
        Self::with_kind(record, condition, JoinKind::LeftOuter)
    }

    pub fn with_kind(record: &RecordRef, condition: Expression, kind: JoinKind) -> Self {
        Self {
            record: Arc::clone(record),
            condition,
            kind,
        }
    }

    /// Joins on equality of two columns.
    pub fn on(left: &ColumnExp, right: &ColumnExp) -> Self {
        Self::inner(right.record(), left.exp().equals(right.exp()))
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub terms: Vec<(Expression, Order)>,
}

impl OrderBy {
    pub fn ascending(exp: impl Into<Expression>) -> Self {
        Self {
            terms: vec![(exp.into(), Order::Asc)],
        }
    }

    pub fn descending(exp: impl Into<Expression>) -> Self {
        Self {
            terms: vec![(exp.into(), Order::Desc)],
        }
    }

    /// Random row order.
    pub fn random() -> Self {
        Self::ascending(Expression::Function {
            func: Func::Random,
            args: Vec::new(),
        })
    }

    pub fn then(mut self, exp: impl Into<Expression>, order: Order) -> Self {
        self.terms.push((exp.into(), order));
        self
    }
}

#[derive(Debug, Clone)]
pub struct GroupBy {
    pub expressions: Vec<Expression>,
}

impl GroupBy {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Self { expressions }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

impl Limit {
    pub fn new(offset: u64, count: u64) -> Self {
        Self { offset, count }
    }
}

/// Supplies the value of one selected field from an arbitrary expression.
#[derive(Debug, Clone)]
pub struct FieldOverride {
    pub field: String,
    pub expression: Expression,
}

impl FieldOverride {
    pub fn new(field: &str, expression: impl Into<Expression>) -> Self {
        Self {
            field: field.to_string(),
            expression: expression.into(),
        }
    }
}

/// Replaces the FROM list, typically for projections over other tables.
#[derive(Debug, Clone)]
pub struct FromOverride {
    pub records: Vec<RecordRef>,
}

impl FromOverride {
    pub fn new(records: &[&RecordRef]) -> Self {
        Self {
            records: records.iter().map(|r| Arc::clone(r)).collect(),
        }
    }
}

/// One fragment of a select.
#[derive(Debug, Clone)]
pub enum QueryClause {
    Where(WhereClause),
    Join(Join),
    OrderBy(OrderBy),
    GroupBy(GroupBy),
    Limit(Limit),
    ForUpdate,
    FieldOverride(FieldOverride),
    FromOverride(FromOverride),
}

impl QueryClause {
    pub fn kind_name(&self) -> &'static str {
        match self {
            QueryClause::Where(_) => "Where",
            QueryClause::Join(_) => "Join",
            QueryClause::OrderBy(_) => "OrderBy",
            QueryClause::GroupBy(_) => "GroupBy",
            QueryClause::Limit(_) => "Limit",
            QueryClause::ForUpdate => "ForUpdate",
            QueryClause::FieldOverride(_) => "FieldOverride",
            QueryClause::FromOverride(_) => "FromOverride",
        }
    }
}

impl From<WhereClause> for QueryClause {
    fn from(c: WhereClause) -> Self {
        QueryClause::Where(c)
    }
}

impl From<Expression> for QueryClause {
    fn from(c: Expression) -> Self {
        QueryClause::Where(WhereClause::Condition(c))
    }
}

impl From<Key> for QueryClause {
    fn from(key: Key) -> Self {
        QueryClause::Where(WhereClause::Key(key))
    }
}

impl From<KeySet> for QueryClause {
    fn from(keys: KeySet) -> Self {
        QueryClause::Where(WhereClause::KeySet(keys))
    }
}

impl From<Join> for QueryClause {
    fn from(c: Join) -> Self {
        QueryClause::Join(c)
    }
}

impl From<OrderBy> for QueryClause {
    fn from(c: OrderBy) -> Self {
        QueryClause::OrderBy(c)
    }
}

impl From<GroupBy> for QueryClause {
    fn from(c: GroupBy) -> Self {
        QueryClause::GroupBy(c)
    }
}

impl From<Limit> for QueryClause {
    fn from(c: Limit) -> Self {
        QueryClause::Limit(c)
    }
}

impl From<FieldOverride> for QueryClause {
    fn from(c: FieldOverride) -> Self {
        QueryClause::FieldOverride(c)
    }
}

impl From<FromOverride> for QueryClause {
    fn from(c: FromOverride) -> Self {
        QueryClause::FromOverride(c)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, kind: &'static str) -> SqlResult<()> {
    if slot.is_some() {
        return Err(SqlError::DuplicateClause(kind));
    }
    *slot = Some(value);
    Ok(())
}

/// A validated select: at most one of each singleton clause, joins in caller
/// order, field overrides keyed by field name (last one wins).
#[derive(Debug, Clone)]
pub struct SelectClause {
    record: RecordRef,
    fields: Vec<String>,
    where_clause: Option<WhereClause>,
    from_override: Option<FromOverride>,
    joins: Vec<Join>,
    order_by: Option<OrderBy>,
    group_by: Option<GroupBy>,
    limit: Option<Limit>,
    for_update: bool,
    overrides: Vec<FieldOverride>,
}

impl SelectClause {
    pub fn new<I>(record: &RecordRef, fields: Vec<String>, clauses: I) -> SqlResult<SelectClause>
    where
        I: IntoIterator<Item = QueryClause>,
    {
        for field in &fields {
            if record.field(field).is_none() {
                return Err(record.unknown_field(field));
            }
        }

        let mut select = SelectClause {
            record: Arc::clone(record),
            fields,
            where_clause: None,
            from_override: None,
            joins: Vec::new(),
            order_by: None,
            group_by: None,
            limit: None,
            for_update: false,
            overrides: Vec::new(),
        };
        let mut for_update = None;

        for clause in clauses {
            match clause {
                QueryClause::Where(w) => set_once(&mut select.where_clause, w, "Where")?,
                QueryClause::FromOverride(f) => set_once(&mut select.from_override, f, "FromOverride")?,
                QueryClause::OrderBy(o) => set_once(&mut select.order_by, o, "OrderBy")?,
                QueryClause::GroupBy(g) => set_once(&mut select.group_by, g, "GroupBy")?,
                QueryClause::Limit(l) => set_once(&mut select.limit, l, "Limit")?,
                QueryClause::ForUpdate => set_once(&mut for_update, (), "ForUpdate")?,
                QueryClause::Join(j) => select.joins.push(j),
                QueryClause::FieldOverride(o) => {
                    if record.field(&o.field).is_none() {
                        return Err(record.unknown_field(&o.field));
                    }
                    select.overrides.retain(|existing| existing.field != o.field);
                    select.overrides.push(o);
                }
            }
        }
        select.for_update = for_update.is_some();
        Ok(select)
    }

    /// Selects every field of the record type.
    pub fn all_fields<I>(record: &RecordRef, clauses: I) -> SqlResult<SelectClause>
    where
        I: IntoIterator<Item = QueryClause>,
    {
        SelectClause::new(record, record.field_names(), clauses)
    }

    /// Selects only the primary-key fields.
    pub fn for_keys<I>(record: &RecordRef, clauses: I) -> SqlResult<SelectClause>
    where
        I: IntoIterator<Item = QueryClause>,
    {
        SelectClause::new(record, record.primary_key_fields().to_vec(), clauses)
    }

    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn where_clause(&self) -> Option<&WhereClause> {
        self.where_clause.as_ref()
    }

    pub fn from_override(&self) -> Option<&FromOverride> {
        self.from_override.as_ref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn group_by(&self) -> Option<&GroupBy> {
        self.group_by.as_ref()
    }

    pub fn limit(&self) -> Option<&Limit> {
        self.limit.as_ref()
    }

    pub fn is_for_update(&self) -> bool {
        self.for_update
    }

    pub fn field_override(&self, field: &str) -> Option<&Expression> {
        self.overrides
            .iter()
            .find(|o| o.field == field)
            .map(|o| &o.expression)
    }

    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Caps the result at `count` rows unless a limit is already present.
    pub fn limited_to(mut self, count: u64) -> SelectClause {
        if self.limit.is_none() {
            self.limit = Some(Limit::new(0, count));
        }
        self
    }

    /// The only fragment is a WHERE on a primary key.
    pub fn key_only(&self) -> Option<&Key> {
        let plain = self.from_override.is_none()
            && self.joins.is_empty()
            && self.order_by.is_none()
            && self.group_by.is_none()
            && self.limit.is_none()
            && !self.for_update
            && self.overrides.is_empty();
        match (&self.where_clause, plain) {
            (Some(WhereClause::Key(key)), true) => Some(key),
            _ => None,
        }
    }

    pub fn collect_record_types(&self, set: &mut RecordTypeSet) {
        set.insert(&self.record);
        if let Some(from) = &self.from_override {
            from.records.iter().for_each(|r| set.insert(r));
        }
        for join in &self.joins {
            set.insert(&join.record);
            join.condition.collect_record_types(set);
        }
        for o in &self.overrides {
            o.expression.collect_record_types(set);
        }
        if let Some(w) = &self.where_clause {
            w.collect_record_types(set);
        }
        if let Some(order) = &self.order_by {
            order.terms.iter().for_each(|(e, _)| e.collect_record_types(set));
        }
        if let Some(group) = &self.group_by {
            group.expressions.iter().for_each(|e| e.collect_record_types(set));
        }
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let none = || "null".to_string();
        let from = self.from_override.as_ref().map_or_else(none, |o| {
            o.records.iter().map(|r| r.name().to_string()).collect::<Vec<_>>().join(", ")
        });
        let joins = self
            .joins
            .iter()
            .map(|j| format!("{} {} on {}", j.kind.keyword(), j.record.name(), j.condition))
            .collect::<Vec<_>>()
            .join(", ");
        let order = self.order_by.as_ref().map_or_else(none, |o| {
            o.terms
                .iter()
                .map(|(e, dir)| format!("{} {}", e, if *dir == Order::Asc { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(", ")
        });
        let group = self.group_by.as_ref().map_or_else(none, |g| {
            g.expressions.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        });
        let limit = self
            .limit
            .map_or_else(none, |l| format!("{}+{}", l.offset, l.count));
        write!(
            f,
            "(where={}, from={}, join=[{}], orderBy={}, groupBy={}, limit={}, forUpdate={})",
            self.where_clause.as_ref().map_or_else(none, ToString::to_string),
            from,
            joins,
            order,
            group,
            limit,
            self.for_update
        )
    }
}

/// Proof that a clause list can be answered by selecting primary-key columns
/// alone, which is what the two-phase loader needs.
#[derive(Debug, Clone)]
pub struct KeyProjection {
    record: RecordRef,
    clauses: Vec<QueryClause>,
}

impl KeyProjection {
    /// Why the clauses are not key-projectable, if they are not.
    pub fn obstacle(record: &RecordRef, clauses: &[QueryClause]) -> Option<String> {
        if !record.has_primary_key() {
            return Some(format!("{} has no primary key", record.name()));
        }
        if record.has_computed_fields() {
            return Some(format!("{} has computed fields", record.name()));
        }
        clauses.iter().find_map(|c| match c {
            QueryClause::FieldOverride(o) => Some(format!("field override on '{}'", o.field)),
            QueryClause::Join(_) => Some("join".to_string()),
            QueryClause::FromOverride(_) => Some("from override".to_string()),
            _ => None,
        })
    }

    pub fn new(record: &RecordRef, clauses: Vec<QueryClause>) -> SqlResult<KeyProjection> {
        if let Some(reason) = KeyProjection::obstacle(record, &clauses) {
            return Err(SqlError::InvalidArgument(format!(
                "{} can't be loaded in two phases: {}",
                record.name(),
                reason
            )));
        }
        SelectClause::for_keys(record, clauses.iter().cloned())?;
        Ok(KeyProjection {
            record: Arc::clone(record),
            clauses,
        })
    }

    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    pub fn clauses(&self) -> &[QueryClause] {
        &self.clauses
    }

    /// Select of the primary-key columns only.
    pub fn key_select(&self) -> SqlResult<SelectClause> {
        SelectClause::for_keys(&self.record, self.clauses.iter().cloned())
    }
}

/// Insert of one record's values. Identity fields without a value (null or
/// zero) are left for the database to assign.
#[derive(Debug, Clone)]
pub struct InsertClause {
    pub record: RecordRef,
    pub values: Vec<(String, Value)>,
    pub identity_fields: HashSet<String>,
}

impl InsertClause {
    pub fn new(record: &RecordRef, values: Vec<(String, Value)>, identity_fields: HashSet<String>) -> SqlResult<Self> {
        for (field, _) in &values {
            record.column_name(field)?;
        }
        Ok(Self {
            record: Arc::clone(record),
            values,
            identity_fields,
        })
    }

    /// The (field, value) pairs that are actually written.
    pub fn written_values(&self) -> impl Iterator<Item = &(String, Value)> {
        self.values.iter().filter(move |(field, value)| {
            !(self.identity_fields.contains(field) && (value.is_null() || value.is_zero()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct UpdateClause {
    pub record: RecordRef,
    pub where_clause: WhereClause,
    pub fields: Vec<String>,
    pub values: Vec<Expression>,
}

impl UpdateClause {
    pub fn new(
        record: &RecordRef,
        where_clause: WhereClause,
        fields: Vec<String>,
        values: Vec<Expression>,
    ) -> SqlResult<Self> {
        if fields.is_empty() {
            return Err(SqlError::InvalidArgument("Update needs at least one field".to_string()));
        }
        if fields.len() != values.len() {
            return Err(SqlError::InvalidArgument(format!(
                "Update given {} fields but {} values",
                fields.len(),
                values.len()
            )));
        }
        for field in &fields {
            record.column_name(field)?;
        }
        Ok(Self {
            record: Arc::clone(record),
            where_clause,
            fields,
            values,
        })
    }

    pub fn collect_record_types(&self, set: &mut RecordTypeSet) {
        set.insert(&self.record);
        self.where_clause.collect_record_types(set);
        self.values.iter().for_each(|v| v.collect_record_types(set));
    }
}

#[derive(Debug, Clone)]
pub struct DeleteClause {
    pub record: RecordRef,
    pub where_clause: WhereClause,
}

impl DeleteClause {
    pub fn new(record: &RecordRef, where_clause: WhereClause) -> Self {
        Self {
            record: Arc::clone(record),
            where_clause,
        }
    }

    pub fn collect_record_types(&self, set: &mut RecordTypeSet) {
        set.insert(&self.record);
        self.where_clause.collect_record_types(set);
    }
}

#[derive(Debug, Clone)]
pub struct CreateIndexClause {
    pub record: RecordRef,
    pub name: String,
    pub unique: bool,
    pub components: Vec<(Expression, Order)>,
}

impl CreateIndexClause {
    pub fn new(record: &RecordRef, name: &str, unique: bool, components: Vec<(Expression, Order)>) -> SqlResult<Self> {
        if components.is_empty() {
            return Err(SqlError::InvalidArgument(format!("Index '{}' has no components", name)));
        }
        Ok(Self {
            record: Arc::clone(record),
            name: name.to_string(),
            unique,
            components,
        })
    }

    pub fn collect_record_types(&self, set: &mut RecordTypeSet) {
        set.insert(&self.record);
        self.components.iter().for_each(|(e, _)| e.collect_record_types(set));
    }
}

#[derive(Debug, Clone)]
pub struct DropIndexClause {
    pub record: RecordRef,
    pub name: String,
}

impl DropIndexClause {
    pub fn new(record: &RecordRef, name: &str) -> Self {
        Self {
            record: Arc::clone(record),
            name: name.to_string(),
        }
    }
}
