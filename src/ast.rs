//! 查询语句的结构化表示
//!
//! 解析结果是不可变的值对象。函数引用（`currentUser()`、`-7d` 等）在这里只记录名字，
//! 执行时才会根据 `ExecutionContext` 求值，所以同一个解析结果可以跨请求复用。
//!
//! `Display` 实现把结构化查询重新序列化为查询文本。

use serde::{Deserialize, Serialize};
use std::fmt;

/// AST 的根节点, 代表一个完整的查询语句
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    /// 按出现顺序排列的条件或分组
    pub clauses: Vec<Clause>,
    /// 排序规则, 按声明顺序依次生效
    pub order_by: Vec<OrderSpec>,
}

/// 条件列表中的一项, 携带它与左侧条目的连接方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// 第一项的连接符没有意义, 执行时被忽略
    pub combinator: Combinator,
    /// 前缀 `NOT`
    pub negated: bool,
    pub term: Term,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Condition(Condition),
    /// 括号内的子查询
    Group(Vec<Clause>),
}

/// 单个字段条件, 例如：`priority IN ("High", "Highest")`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

/// 条件的取值, 形状由运算符决定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionValue {
    Single(Operand),
    /// `IN` / `NOT IN`
    List(Vec<Operand>),
    /// `CHANGED`
    None,
}

/// 未求值的操作数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(Literal),
    Function(FunctionRef),
}

/// 字面量值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Text(String),
    Integer(i64),
    Float(f64),
    Null,
    Empty,
}

/// 延迟求值的函数引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub function: Function,
    pub args: Vec<String>,
}

impl FunctionRef {
    pub fn new(function: Function) -> Self {
        Self { function, args: Vec::new() }
    }
}

/// 支持的函数, 封闭枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    CurrentUser,
    Now,
    StartOfDay,
    EndOfDay,
    StartOfWeek,
    EndOfWeek,
    StartOfMonth,
    EndOfMonth,
    /// 相对时间, 例如 `-7d`、`+2w`
    Offset(DateOffset),
}

impl Function {
    /// 按函数名查找 (不区分大小写), 不包含相对时间
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_lowercase().as_str() {
            "currentuser" => Function::CurrentUser,
            "now" => Function::Now,
            "startofday" => Function::StartOfDay,
            "endofday" => Function::EndOfDay,
            "startofweek" => Function::StartOfWeek,
            "endofweek" => Function::EndOfWeek,
            "startofmonth" => Function::StartOfMonth,
            "endofmonth" => Function::EndOfMonth,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::CurrentUser => "currentUser",
            Function::Now => "now",
            Function::StartOfDay => "startOfDay",
            Function::EndOfDay => "endOfDay",
            Function::StartOfWeek => "startOfWeek",
            Function::EndOfWeek => "endOfWeek",
            Function::StartOfMonth => "startOfMonth",
            Function::EndOfMonth => "endOfMonth",
            Function::Offset(_) => "offset",
        }
    }
}

/// `<带符号整数><单位>` 形式的相对时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOffset {
    pub amount: i64,
    pub unit: OffsetUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetUnit {
    Day,
    Week,
    Month,
    Year,
}

impl DateOffset {
    /// 解析 `-7d`、`+2w`、`3m`、`1y`; 不匹配时返回 `None`
    pub fn parse(s: &str) -> Option<Self> {
        let unit = match s.chars().last()? {
            'd' | 'D' => OffsetUnit::Day,
            'w' | 'W' => OffsetUnit::Week,
            'm' | 'M' => OffsetUnit::Month,
            'y' | 'Y' => OffsetUnit::Year,
            _ => return None,
        };
        let number = &s[..s.len() - 1];
        let digits = number.strip_prefix(&['+', '-'][..]).unwrap_or(number);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let amount = number.parse::<i64>().ok()?;
        Some(Self { amount, unit })
    }
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,       // =
    NotEq,    // !=
    Gt,       // >
    Lt,       // <
    Gte,      // >=
    Lte,      // <=
    In,       // IN
    NotIn,    // NOT IN
    Is,       // IS
    IsNot,    // IS NOT
    Like,     // ~
    NotLike,  // !~
    Was,      // WAS
    Changed,  // CHANGED
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Like => "~",
            Operator::NotLike => "!~",
            Operator::Was => "WAS",
            Operator::Changed => "CHANGED",
        }
    }

    /// `IN` / `NOT IN` 接受值列表
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// `CHANGED` 不接受值
    pub fn takes_value(&self) -> bool {
        !matches!(self, Operator::Changed)
    }

    /// 否定型运算符: 对多列字段要求所有列都满足
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Operator::NotEq | Operator::NotIn | Operator::IsNot | Operator::NotLike
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// 单个排序规则, 例如：`updated DESC`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for StructuredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_clauses(f, &self.clauses)?;
        if !self.order_by.is_empty() {
            if !self.clauses.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "ORDER BY ")?;
            for (i, spec) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{spec}")?;
            }
        }
        Ok(())
    }
}

fn write_clauses(f: &mut fmt::Formatter<'_>, clauses: &[Clause]) -> fmt::Result {
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", clause.combinator)?;
        }
        if clause.negated {
            write!(f, "NOT ")?;
        }
        match &clause.term {
            Term::Condition(condition) => write!(f, "{condition}")?,
            Term::Group(inner) => {
                write!(f, "(")?;
                write_clauses(f, inner)?;
                write!(f, ")")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.operator)?;
        match &self.value {
            ConditionValue::Single(operand) => write!(f, " {operand}"),
            ConditionValue::List(operands) => {
                write!(f, " (")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
            ConditionValue::None => Ok(()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(literal) => write!(f, "{literal}"),
            Operand::Function(function) => write!(f, "{function}"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "\"{s}\""),
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Float(n) => write!(f, "{n}"),
            Literal::Null => write!(f, "NULL"),
            Literal::Empty => write!(f, "EMPTY"),
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function {
            Function::Offset(offset) => write!(f, "{offset}"),
            function => write!(f, "{}({})", function.name(), self.args.join(", ")),
        }
    }
}

impl fmt::Display for DateOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            OffsetUnit::Day => 'd',
            OffsetUnit::Week => 'w',
            OffsetUnit::Month => 'm',
            OffsetUnit::Year => 'y',
        };
        write!(f, "{:+}{}", self.amount, unit)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => f.write_str("AND"),
            Combinator::Or => f.write_str("OR"),
        }
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        write!(f, "{} {}", self.field, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_offset_parse() {
        assert_eq!(
            DateOffset::parse("-7d"),
            Some(DateOffset { amount: -7, unit: OffsetUnit::Day })
        );
        assert_eq!(
            DateOffset::parse("+2w"),
            Some(DateOffset { amount: 2, unit: OffsetUnit::Week })
        );
        assert_eq!(
            DateOffset::parse("1y"),
            Some(DateOffset { amount: 1, unit: OffsetUnit::Year })
        );
        assert_eq!(DateOffset::parse("d"), None);
        assert_eq!(DateOffset::parse("-d"), None);
        assert_eq!(DateOffset::parse("7x"), None);
        assert_eq!(DateOffset::parse("Done"), None);
        assert_eq!(DateOffset::parse(""), None);
    }

    #[test]
    fn test_display_structured_query() {
        let query = StructuredQuery {
            clauses: vec![
                Clause {
                    combinator: Combinator::And,
                    negated: false,
                    term: Term::Group(vec![
                        Clause {
                            combinator: Combinator::And,
                            negated: false,
                            term: Term::Condition(Condition {
                                field: "status".to_string(),
                                operator: Operator::Eq,
                                value: ConditionValue::Single(Operand::Literal(Literal::Text(
                                    "Done".to_string(),
                                ))),
                            }),
                        },
                        Clause {
                            combinator: Combinator::Or,
                            negated: false,
                            term: Term::Condition(Condition {
                                field: "status".to_string(),
                                operator: Operator::Changed,
                                value: ConditionValue::None,
                            }),
                        },
                    ]),
                },
                Clause {
                    combinator: Combinator::And,
                    negated: true,
                    term: Term::Condition(Condition {
                        field: "created".to_string(),
                        operator: Operator::Gte,
                        value: ConditionValue::Single(Operand::Function(FunctionRef::new(
                            Function::Offset(DateOffset { amount: -7, unit: OffsetUnit::Day }),
                        ))),
                    }),
                },
            ],
            order_by: vec![OrderSpec { field: "updated".to_string(), direction: Direction::Desc }],
        };

        assert_eq!(
            query.to_string(),
            r#"(status = "Done" OR status CHANGED) AND NOT created >= -7d ORDER BY updated DESC"#
        );
    }

    #[test]
    fn test_display_function_with_args() {
        let function = FunctionRef {
            function: Function::StartOfDay,
            args: vec!["-1d".to_string()],
        };
        assert_eq!(function.to_string(), "startOfDay(-1d)");
        assert_eq!(FunctionRef::new(Function::CurrentUser).to_string(), "currentUser()");
    }
}
