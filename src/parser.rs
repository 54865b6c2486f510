//! 查询语句的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   ├─ "("        → collect_group()  收集到匹配的 ")"，递归解析为 Group
//!   ├─ AND / OR   → 更新当前连接符
//!   ├─ NOT        → 对下一个条件或分组取反
//!   ├─ ORDER BY   → parse_order_by()  读取 `字段 [ASC|DESC]`，逗号分隔，直到输入结束
//!   └─ 字段       → parse_condition()
//!                     ├─ 字段名
//!                     ├─ 运算符
//!                     └─ 值: IN / NOT IN → parse_value_list()
//!                            CHANGED     → 无值
//!                            其他        → parse_value()
//! ```
//!
//! ## 优先级
//!
//! 除括号外没有优先级：同一层级内的 AND / OR 严格从左到右结合。
//! `a OR b AND c` 等价于 `(a OR b) AND c`。
//!
//! ## 错误处理
//!
//! 语法分析永远不会失败。遇到无法理解的 token 时记录一条 [`ParseError`] 并跳过，
//! 返回尽可能完整的结构化查询，便于编辑器在用户输入过程中实时展示结果。
//! 面向用户的错误报告由校验器负责。

use crate::ast::{
    Clause, Combinator, Condition, ConditionValue, Direction, Operand, OrderSpec,
    StructuredQuery, Term,
};
use crate::token::{Keyword, Logical, Span, Token, TokenKind};
use crate::vocabulary;
use tracing::debug;

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    errors: Vec<ParseError>,
}

/// 解析过程中的可恢复问题
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

/// 解析 token 序列，丢弃诊断信息
pub fn parse(tokens: &[Token<'_>]) -> StructuredQuery {
    Parser::new(tokens).parse()
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            errors: Vec::new(),
        }
    }

    /// 解析过程中记录的诊断信息
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        let tokens = self.tokens;
        tokens.get(self.position)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.peek()?;
        self.position += 1;
        Some(token)
    }

    fn error(&mut self, message: String, span: Option<Span>) {
        debug!(%message, ?span, "recovering from malformed query");
        self.errors.push(ParseError { message, span });
    }

    pub fn parse(&mut self) -> StructuredQuery {
        let mut clauses = Vec::new();
        let mut order_by = Vec::new();
        let mut combinator = Combinator::And;
        let mut negated = false;
        // 最近一个还没有被条件消费的 AND / OR / NOT
        let mut dangling: Option<&Token<'_>> = None;

        while let Some(token) = self.peek() {
            let term = match token.kind {
                TokenKind::LParen => {
                    self.advance(); // 消费 (
                    let inner = self.collect_group(token.span);
                    let mut sub_parser = Parser::new(inner);
                    let group = sub_parser.parse();
                    self.errors.append(&mut sub_parser.errors);
                    if !group.order_by.is_empty() {
                        self.error(
                            "ORDER BY inside a group is ignored".to_string(),
                            Some(token.span),
                        );
                    }
                    Some(Term::Group(group.clauses))
                }
                TokenKind::Logical(logical) => {
                    self.advance();
                    match logical {
                        Logical::And => combinator = Combinator::And,
                        Logical::Or => combinator = Combinator::Or,
                        Logical::Not => negated = !negated,
                    }
                    dangling = Some(token);
                    continue;
                }
                TokenKind::Keyword(Keyword::OrderBy) => {
                    self.advance(); // 消费 ORDER BY
                    order_by = self.parse_order_by();
                    break;
                }
                TokenKind::Field | TokenKind::Literal { .. } | TokenKind::FunctionCall => {
                    self.parse_condition().map(Term::Condition)
                }
                _ => {
                    self.advance();
                    self.error(format!("Unexpected token '{}'", token.text), Some(token.span));
                    None
                }
            };

            if let Some(term) = term {
                clauses.push(Clause { combinator, negated, term });
                combinator = Combinator::And;
                negated = false;
                dangling = None;
            }
        }

        if let Some(token) = dangling {
            self.error(
                format!("'{}' is not followed by a condition", token.text),
                Some(token.span),
            );
        }

        StructuredQuery { clauses, order_by }
    }

    /// 收集到匹配的右括号为止的 token（不含括号本身），并越过右括号。
    /// 缺少右括号时收集到输入末尾
    fn collect_group(&mut self, open: Span) -> &'a [Token<'a>] {
        let tokens = self.tokens;
        let start = self.position;
        let mut depth = 1usize;

        while let Some(token) = self.advance() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return &tokens[start..self.position - 1];
                    }
                }
                _ => {}
            }
        }

        self.error("Unclosed '('".to_string(), Some(open));
        &tokens[start..]
    }

    /// 解析 `字段 运算符 值`，无法构成条件时返回 None
    fn parse_condition(&mut self) -> Option<Condition> {
        let field_token = self.advance()?;
        let field = canonical_field(field_token.text);

        let Some(op_token) = self.peek() else {
            self.error(format!("Missing operator after '{field}'"), Some(field_token.span));
            return None;
        };
        let TokenKind::Operator(operator) = op_token.kind else {
            // 不消费该 token，让主循环重新处理
            self.error(
                format!("Expected an operator after '{field}', found '{}'", op_token.text),
                Some(op_token.span),
            );
            return None;
        };
        self.advance(); // 消费运算符

        let value = if !operator.takes_value() {
            ConditionValue::None
        } else if operator.takes_list() {
            ConditionValue::List(self.parse_value_list(op_token.span)?)
        } else {
            ConditionValue::Single(self.parse_value(op_token.span)?)
        };

        Some(Condition { field, operator, value })
    }

    fn parse_value(&mut self, after: Span) -> Option<Operand> {
        match self.peek() {
            Some(token) if token.is_word() => {
                self.advance();
                Some(Operand::from_token(token))
            }
            Some(token) => {
                self.error(format!("Expected a value, found '{}'", token.text), Some(token.span));
                None
            }
            None => {
                self.error("Missing value".to_string(), Some(after));
                None
            }
        }
    }

    /// 解析 `(v1, v2, ...)`。单个不带括号的值视为只有一个元素的列表
    fn parse_value_list(&mut self, after: Span) -> Option<Vec<Operand>> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::LParen => {
                self.advance(); // 消费 (
            }
            Some(token) if token.is_word() => {
                self.advance();
                return Some(vec![Operand::from_token(token)]);
            }
            _ => return self.parse_value(after).map(|value| vec![value]),
        }

        let mut values = Vec::new();
        loop {
            let Some(token) = self.peek() else {
                self.error("Unclosed value list".to_string(), Some(after));
                break;
            };
            match token.kind {
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                TokenKind::Comma => {
                    self.advance();
                }
                _ if token.is_word() => {
                    self.advance();
                    values.push(Operand::from_token(token));
                }
                _ => {
                    self.error(
                        format!("Unexpected token '{}' in value list", token.text),
                        Some(token.span),
                    );
                    break;
                }
            }
        }
        Some(values)
    }

    /// 解析排序子句，消费剩余全部 token
    fn parse_order_by(&mut self) -> Vec<OrderSpec> {
        let mut specs: Vec<OrderSpec> = Vec::new();

        while let Some(token) = self.advance() {
            match token.kind {
                TokenKind::Field | TokenKind::Literal { .. } => specs.push(OrderSpec {
                    field: canonical_field(token.text),
                    direction: Direction::Asc,
                }),
                TokenKind::Keyword(keyword @ (Keyword::Asc | Keyword::Desc)) => {
                    let direction = if keyword == Keyword::Asc {
                        Direction::Asc
                    } else {
                        Direction::Desc
                    };
                    match specs.last_mut() {
                        Some(spec) => spec.direction = direction,
                        None => self.error(
                            format!("'{}' without a field", token.text),
                            Some(token.span),
                        ),
                    }
                }
                TokenKind::Comma => {}
                _ => self.error(
                    format!("Unexpected token '{}' in ORDER BY", token.text),
                    Some(token.span),
                ),
            }
        }

        specs
    }
}

fn canonical_field(text: &str) -> String {
    vocabulary::canonical_field(text)
        .map(str::to_string)
        .unwrap_or_else(|| text.to_string())
}
