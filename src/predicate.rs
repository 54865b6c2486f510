//! Backing-store predicates and their rendering into SQL using sea-query.
//!
//! Values are always carried as bound parameters: [`CompiledQuery::build`]
//! returns the SQL text with placeholders and the parameter list separately.

use crate::ast::Direction;
use crate::resolver::Value;
use sea_query::{
    Asterisk, Cond, Condition, Expr, Iden, LikeExpr, Order, QueryBuilder, QueryStatementWriter,
    SelectStatement, SimpleExpr, Values,
};
use serde::{Deserialize, Serialize};

/// Represents a table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Scalar comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// Which records match, expressed over storage columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every record (an empty query)
    Always,
    Compare {
        column: String,
        op: Comparison,
        value: Value,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    InList {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// Substring match
    Contains {
        column: String,
        needle: String,
        negated: bool,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    /// A parenthesized sub-predicate
    Group(Box<Predicate>),
    /// One leaf per column of a multi-column field
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

/// A sort directive over a storage column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    pub direction: Direction,
}

/// Output of the executor: what the backing store filters and sorts by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    pub order: Vec<SortKey>,
}

impl Predicate {
    /// Convert into a sea-query condition tree. Nested junctions are
    /// parenthesized by sea-query, which preserves left-to-right grouping.
    pub fn to_condition(&self) -> Condition {
        match self {
            Predicate::Always => Cond::all(),
            Predicate::Compare { column, op, value } => {
                let col = Expr::col(ColumnName(column.clone()));
                let val = to_sea_value(value);
                let expr = match op {
                    Comparison::Eq => col.eq(val),
                    Comparison::NotEq => col.ne(val),
                    Comparison::Gt => col.gt(val),
                    Comparison::Lt => col.lt(val),
                    Comparison::Gte => col.gte(val),
                    Comparison::Lte => col.lte(val),
                };
                leaf(expr)
            }
            Predicate::IsNull { column, negated } => {
                let col = Expr::col(ColumnName(column.clone()));
                leaf(if *negated { col.is_not_null() } else { col.is_null() })
            }
            Predicate::InList { column, values, negated } => {
                let col = Expr::col(ColumnName(column.clone()));
                let values = values.iter().map(to_sea_value);
                leaf(if *negated { col.is_not_in(values) } else { col.is_in(values) })
            }
            Predicate::Contains { column, needle, negated } => {
                let col = Expr::col(ColumnName(column.clone()));
                let pattern = LikeExpr::new(format!("%{}%", escape_like(needle))).escape('\\');
                leaf(if *negated { col.not_like(pattern) } else { col.like(pattern) })
            }
            Predicate::And(left, right) => Cond::all()
                .add(left.to_condition())
                .add(right.to_condition()),
            Predicate::Or(left, right) => Cond::any()
                .add(left.to_condition())
                .add(right.to_condition()),
            Predicate::Not(inner) => Cond::all().add(inner.to_condition()).not(),
            Predicate::Group(inner) => inner.to_condition(),
            Predicate::Any(items) => items
                .iter()
                .fold(Cond::any(), |cond, item| cond.add(item.to_condition())),
            Predicate::All(items) => items
                .iter()
                .fold(Cond::all(), |cond, item| cond.add(item.to_condition())),
        }
    }
}

fn leaf(expr: SimpleExpr) -> Condition {
    Cond::all().add(expr)
}

/// Escape LIKE wildcards so the needle matches literally
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Convert a resolved value to a sea-query Value
fn to_sea_value(value: &Value) -> sea_query::Value {
    match value {
        Value::Text(s) => sea_query::Value::String(Some(Box::new(s.clone()))),
        Value::Integer(n) => sea_query::Value::BigInt(Some(*n)),
        Value::Float(n) => sea_query::Value::Double(Some(*n)),
        Value::Timestamp(t) => (*t).into(),
        Value::Null => sea_query::Value::String(None),
        Value::Empty => sea_query::Value::String(Some(Box::new(String::new()))),
    }
}

impl CompiledQuery {
    /// Build `SELECT * FROM table WHERE ... ORDER BY ...`
    pub fn to_select(&self, table: &str) -> SelectStatement {
        let mut select = SelectStatement::new();
        select.column(Asterisk).from(TableName(table.to_string()));

        if self.predicate != Predicate::Always {
            select.cond_where(self.predicate.to_condition());
        }

        for key in &self.order {
            let order = match key.direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            select.order_by(ColumnName(key.column.clone()), order);
        }

        select
    }

    /// SQL with placeholders plus the bound parameters
    pub fn build<T: QueryBuilder>(&self, table: &str, builder: T) -> (String, Values) {
        self.to_select(table).build(builder)
    }
}
