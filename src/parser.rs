use std::borrow::Cow;

use crate::{
    ast::{CompareOp, Expr, Literal},
    error::{ParseError, ParseErrorKind},
};

type ParseResult<T> = Result<T, ParseError>;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    #[inline]
    fn make_error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            column: self.input.get(..self.pos).map_or(0, |s| s.chars().count()) + 1,
            kind,
        }
    }

    #[inline]
    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Consume `s` if the remaining input starts with it.
    fn consume(&mut self, s: &str) -> bool {
        if self.peek(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn consume_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Expect `s` to be the start of the remaining input, consume it or return Err.
    fn expect(&mut self, s: &str) -> ParseResult<()> {
        if self.consume(s) {
            return Ok(());
        }
        if self.eof() {
            return Err(self.make_error(ParseErrorKind::unexpected_eof(Some(s))));
        }
        Err(self.make_error(ParseErrorKind::UnexpectedToken {
            expected: format!("'{}'", s),
            found: format!("'{}'", self.rest().chars().take(10).collect::<String>()),
        }))
    }

    /// Consume while `pred` holds, returning the consumed slice.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.input.get(start..self.pos).unwrap_or_default()
    }

    // --- Condition Parsing (Recursive Descent) ---
    // Precedence: OR -> AND -> comparison -> NOT -> primary

    fn parse_expression(&mut self) -> ParseResult<Box<Expr<'a>>> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> ParseResult<Box<Expr<'a>>> {
        let mut left = self.parse_and_expression()?;
        loop {
            self.consume_whitespace();
            if self.consume("||") {
                let right = self.parse_and_expression()?;
                left = Box::new(Expr::Or { left, right });
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> ParseResult<Box<Expr<'a>>> {
        let mut left = self.parse_comparison()?;
        loop {
            self.consume_whitespace();
            if self.consume("&&") {
                let right = self.parse_comparison()?;
                left = Box::new(Expr::And { left, right });
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Box<Expr<'a>>> {
        let mut left = self.parse_not_expression()?;
        'operators: loop {
            self.consume_whitespace();
            for (token, op) in CompareOp::TOKENS {
                if self.consume(token) {
                    let right = self.parse_not_expression()?;
                    left = Box::new(Expr::Compare { op, left, right });
                    continue 'operators;
                }
            }
            break;
        }
        Ok(left)
    }

    fn parse_not_expression(&mut self) -> ParseResult<Box<Expr<'a>>> {
        self.consume_whitespace();
        // `!=` belongs to the comparison above us.
        if self.peek("!") && !self.peek("!=") {
            self.pos += 1;
            let operand = self.parse_not_expression()?;
            Ok(Box::new(Expr::Not { operand }))
        } else {
            self.parse_primary_expression()
        }
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Box<Expr<'a>>> {
        self.consume_whitespace();
        let Some(c) = self.peek_char() else {
            return Err(self.make_error(ParseErrorKind::unexpected_eof(Some("expression"))));
        };

        match c {
            '(' => {
                self.pos += 1;
                let inner = self.parse_expression()?;
                self.consume_whitespace();
                self.expect(")")?;
                Ok(inner)
            }
            '\'' | '"' => self.parse_string(c),
            '-' | '0'..='9' | '.' => self.parse_number(),
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
                let literal = match name {
                    "true" => Literal::Boolean(true),
                    "false" => Literal::Boolean(false),
                    "null" => Literal::Null,
                    "undefined" => Literal::Undefined,
                    _ => return Ok(Box::new(Expr::Identifier { name })),
                };
                Ok(Box::new(Expr::Literal(literal)))
            }
            other => Err(self.make_error(ParseErrorKind::UnexpectedToken {
                expected: "expression".to_string(),
                found: format!("'{}'", other),
            })),
        }
    }

    fn parse_number(&mut self) -> ParseResult<Box<Expr<'a>>> {
        let start = self.pos;
        self.consume("-");
        self.take_while(|c| c.is_ascii_digit() || c == '.');
        let literal = self.input.get(start..self.pos).unwrap_or_default();
        literal
            .parse::<f64>()
            .map(|n| Box::new(Expr::Literal(Literal::Number(n))))
            .map_err(|_| {
                self.make_error(ParseErrorKind::InvalidNumber {
                    literal: literal.to_string(),
                })
            })
    }

    fn parse_string(&mut self, quote: char) -> ParseResult<Box<Expr<'a>>> {
        let start_pos = self.pos;
        self.pos += quote.len_utf8();
        let body_start = self.pos;
        let mut owned: Option<String> = None;

        loop {
            let Some(c) = self.peek_char() else {
                self.pos = start_pos;
                return Err(self.make_error(ParseErrorKind::UnterminatedString));
            };
            self.pos += c.len_utf8();

            if c == quote {
                break;
            }
            if c == '\\' {
                // First escape: switch to an owned buffer holding what we saw so far.
                let buf = owned.get_or_insert_with(|| {
                    self.input
                        .get(body_start..self.pos - 1)
                        .unwrap_or_default()
                        .to_string()
                });
                let Some(escaped) = self.rest().chars().next() else {
                    self.pos = start_pos;
                    return Err(self.make_error(ParseErrorKind::UnterminatedString));
                };
                self.pos += escaped.len_utf8();
                buf.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            } else if let Some(buf) = owned.as_mut() {
                buf.push(c);
            }
        }

        let data = match owned {
            Some(buf) => Cow::Owned(buf),
            None => Cow::Borrowed(
                self.input
                    .get(body_start..self.pos - quote.len_utf8())
                    .unwrap_or_default(),
            ),
        };
        Ok(Box::new(Expr::Literal(Literal::String(data))))
    }
}

/// Parses a complete condition. Anything left over after the expression is
/// an error.
pub(crate) fn parse_condition(input: &str) -> ParseResult<Box<Expr<'_>>> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_expression()?;
    parser.consume_whitespace();
    if !parser.eof() {
        return Err(parser.make_error(ParseErrorKind::TrailingInput {
            remaining: parser.rest().to_string(),
        }));
    }
    Ok(expr)
}


#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! ident {
        ($name:expr) => {
            Box::new(Expr::Identifier { name: $name })
        };
    }
    macro_rules! num {
        ($n:expr) => {
            Box::new(Expr::Literal(Literal::Number($n)))
        };
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_single_identifier() {
        assert_eq!(parse_condition("isActive").unwrap(), ident!("isActive"));
        assert_eq!(parse_condition("  isActive  ").unwrap(), ident!("isActive"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_keywords_are_literals() {
        assert_eq!(
            parse_condition("true").unwrap(),
            Box::new(Expr::Literal(Literal::Boolean(true)))
        );
        assert_eq!(
            parse_condition("null").unwrap(),
            Box::new(Expr::Literal(Literal::Null))
        );
        assert_eq!(
            parse_condition("undefined").unwrap(),
            Box::new(Expr::Literal(Literal::Undefined))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_comparison() {
        assert_eq!(
            parse_condition("score > 90").unwrap(),
            Box::new(Expr::Compare {
                op: CompareOp::Gt,
                left: ident!("score"),
                right: num!(90.0),
            })
        );
        assert_eq!(
            parse_condition("a===-1.5").unwrap(),
            Box::new(Expr::Compare {
                op: CompareOp::StrictEq,
                left: ident!("a"),
                right: num!(-1.5),
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_not_versus_not_equal() {
        assert_eq!(
            parse_condition("!a != b").unwrap(),
            Box::new(Expr::Compare {
                op: CompareOp::LooseNe,
                left: Box::new(Expr::Not { operand: ident!("a") }),
                right: ident!("b"),
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_precedence_and_then_or() {
        // a && b || c  =>  (a && b) || c
        assert_eq!(
            parse_condition("a && b || c").unwrap(),
            Box::new(Expr::Or {
                left: Box::new(Expr::And {
                    left: ident!("a"),
                    right: ident!("b"),
                }),
                right: ident!("c"),
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_parentheses_override_precedence() {
        assert_eq!(
            parse_condition("a && (b || c)").unwrap(),
            Box::new(Expr::And {
                left: ident!("a"),
                right: Box::new(Expr::Or {
                    left: ident!("b"),
                    right: ident!("c"),
                }),
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_comparison_binds_tighter_than_and() {
        assert_eq!(
            parse_condition("x >= 1 && y < 2").unwrap(),
            Box::new(Expr::And {
                left: Box::new(Expr::Compare {
                    op: CompareOp::Ge,
                    left: ident!("x"),
                    right: num!(1.0),
                }),
                right: Box::new(Expr::Compare {
                    op: CompareOp::Lt,
                    left: ident!("y"),
                    right: num!(2.0),
                }),
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_string_literals() {
        assert_eq!(
            parse_condition("'it\\'s'").unwrap(),
            Box::new(Expr::Literal(Literal::String(Cow::Owned("it's".into()))))
        );
        assert_eq!(
            parse_condition("\"plain\"").unwrap(),
            Box::new(Expr::Literal(Literal::String(Cow::Borrowed("plain"))))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_empty_string() {
        let err = parse_condition("").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEOF { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_only_operator() {
        let err = parse_condition("&&").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedToken { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_unclosed_paren() {
        let err = parse_condition("(a || b").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEOF { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_unterminated_string() {
        let err = parse_condition("name == 'bob").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
        assert_eq!(err.column, 9);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_rejects_code() {
        // No calls, member access or assignment in the grammar.
        assert!(parse_condition("alert(1)").is_err());
        assert!(parse_condition("a.b").is_err());
        assert!(parse_condition("a = 1").is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_invalid_number() {
        let err = parse_condition("1.2.3").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::InvalidNumber {
                literal: "1.2.3".to_string()
            }
        );
    }
}
