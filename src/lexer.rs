//! 查询语句的词法分析器
//!
//! 词法分析永远不会失败：未闭合的字符串、不认识的符号都会作为裸词 (Literal) 输出，
//! 结构问题交给语法分析器和校验器处理。

use crate::ast::Operator;
use crate::token::{Keyword, Logical, Span, Token, TokenKind};
use crate::vocabulary;

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

/// 对整个输入进行分词
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

/// 裸词的结束字符
fn is_word_terminator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | ',' | '"' | '=' | '!' | '<' | '>' | '~')
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token<'a> {
        Token::new(kind, &self.input[start..self.position], Span::new(start, self.position))
    }

    /// 查看下一个裸词（跳过空白），不推进位置。返回该词和它的结束位置
    fn peek_word(&self) -> Option<(&'a str, usize)> {
        let rest = &self.input[self.position..];
        let trimmed = rest.trim_start();
        let start = self.position + (rest.len() - trimmed.len());
        let len = trimmed
            .find(is_word_terminator)
            .unwrap_or(trimmed.len());
        if len == 0 {
            return None;
        }
        Some((&self.input[start..start + len], start + len))
    }

    /// 如果下一个裸词等于 `expected`，消费它并返回 true
    fn eat_word(&mut self, expected: &str) -> bool {
        match self.peek_word() {
            Some((word, end)) if word.eq_ignore_ascii_case(expected) => {
                self.position = end;
                true
            }
            _ => false,
        }
    }

    /// 读取双引号包围的字符串字面量
    /// 注意：开始的引号已经被调用者消费
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            self.bump();
        }
        let content_end = self.position;

        if self.bump().is_none() {
            // 未闭合的字符串作为裸词原样输出
            return self.token(TokenKind::Literal { quoted: false }, start);
        }

        Token::new(
            TokenKind::Literal { quoted: true },
            &self.input[content_start..content_end],
            Span::new(start, self.position),
        )
    }

    /// 读取裸词：关键字、运算符单词、函数调用、字段名或未加引号的字面量
    fn read_word(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if is_word_terminator(c) {
                break;
            }
            self.bump();
        }
        let word = &self.input[start..self.position];

        if let Some(kind) = self.match_keyword(word) {
            return self.token(kind, start);
        }

        if self.peek() == Some('(') {
            return self.read_function_call(start);
        }

        let kind = if vocabulary::canonical_field(word).is_some() {
            TokenKind::Field
        } else {
            TokenKind::Literal { quoted: false }
        };
        self.token(kind, start)
    }

    /// 匹配关键字和单词形式的运算符，必要时向前多看一个词 (`NOT IN`, `IS NOT`, `ORDER BY`)
    fn match_keyword(&mut self, word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::Logical(Logical::And),
            "OR" => TokenKind::Logical(Logical::Or),
            "NOT" => {
                if self.eat_word("IN") {
                    TokenKind::Operator(Operator::NotIn)
                } else {
                    TokenKind::Logical(Logical::Not)
                }
            }
            "IS" => {
                if self.eat_word("NOT") {
                    TokenKind::Operator(Operator::IsNot)
                } else {
                    TokenKind::Operator(Operator::Is)
                }
            }
            "IN" => TokenKind::Operator(Operator::In),
            "WAS" => TokenKind::Operator(Operator::Was),
            "CHANGED" => TokenKind::Operator(Operator::Changed),
            "ORDER" => {
                if self.eat_word("BY") {
                    TokenKind::Keyword(Keyword::OrderBy)
                } else {
                    return None;
                }
            }
            "ASC" => TokenKind::Keyword(Keyword::Asc),
            "DESC" => TokenKind::Keyword(Keyword::Desc),
            _ => return None,
        };
        Some(kind)
    }

    /// 读取 `name(args)`，当前位置在 '(' 上。参数中的括号和字符串会被跳过
    fn read_function_call(&mut self, start: usize) -> Token<'a> {
        let mut depth = 0usize;
        let mut in_string = false;
        while let Some(c) = self.bump() {
            match c {
                '"' => in_string = !in_string,
                '(' if !in_string => depth += 1,
                ')' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        return self.token(TokenKind::FunctionCall, start);
                    }
                }
                _ => {}
            }
        }
        // 缺少右括号, 作为裸词输出
        self.token(TokenKind::Literal { quoted: false }, start)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let Some(c) = self.bump() else {
            return None; // 到达输入末尾
        };

        let token = match c {
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            ',' => self.token(TokenKind::Comma, start),
            '=' => self.token(TokenKind::Operator(Operator::Eq), start),
            '~' => self.token(TokenKind::Operator(Operator::Like), start),
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Operator(Operator::Lte), start)
                } else {
                    self.token(TokenKind::Operator(Operator::Lt), start)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Operator(Operator::Gte), start)
                } else {
                    self.token(TokenKind::Operator(Operator::Gt), start)
                }
            }
            '!' => match self.peek() {
                Some('=') => {
                    self.bump();
                    self.token(TokenKind::Operator(Operator::NotEq), start)
                }
                Some('~') => {
                    self.bump();
                    self.token(TokenKind::Operator(Operator::NotLike), start)
                }
                _ => self.token(TokenKind::Literal { quoted: false }, start),
            },
            '"' => self.read_string(start),
            _ => self.read_word(start),
        };
        Some(token)
    }
}
