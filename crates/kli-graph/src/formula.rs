//! Formula text → operator tree with leaves resolved to arena handles.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('**' | '^') unary)?
//! primary := number | ident | ident '(' expr ')' | '(' expr ')'
//! ```
//!
//! Power is right-associative and binds tighter than a leading minus on its
//! left operand, so `-x**2` is `-(x**2)`.

use kli_core::{ExprId, MathFn, ParamId, Real};

use crate::error::{GraphError, GraphResult};
use crate::space::Space;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Unresolved syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ast {
    Number(Real),
    Name(String),
    Neg(Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
    Call(String, Box<Ast>),
}

/// Compiled formula. Leaves point into the graph arena.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Number(Real),
    Param(ParamId),
    Expr(ExprId),
    Neg(Box<Formula>),
    Binary(BinOp, Box<Formula>, Box<Formula>),
    Call(MathFn, Box<Formula>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Real),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
}

fn malformed(formula: &str, what: impl Into<String>) -> GraphError {
    GraphError::Formula {
        formula: formula.to_string(),
        what: what.into(),
    }
}

fn tokenize(input: &str) -> GraphResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut end = start;
            let mut prev = c;
            while let Some(&(i, d)) = chars.peek() {
                let exponent_sign = (d == '+' || d == '-') && (prev == 'e' || prev == 'E');
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    end = i + d.len_utf8();
                    prev = d;
                    chars.next();
                } else {
                    break;
                }
            }
            let text = &input[start..end];
            let n = text
                .parse::<Real>()
                .map_err(|_| malformed(input, format!("bad number '{text}'")))?;
            tokens.push(Token::Number(n));
        } else if c.is_alphabetic() || c == '_' {
            let mut end = start;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(input[start..end].to_string()));
        } else {
            chars.next();
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => {
                    if matches!(chars.peek(), Some(&(_, '*'))) {
                        chars.next();
                        Token::Pow
                    } else {
                        Token::Star
                    }
                }
                '/' => Token::Slash,
                '^' => Token::Pow,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(malformed(input, format!("unexpected character '{other}'"))),
            };
            tokens.push(token);
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect_rparen(&mut self) -> GraphResult<()> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err(malformed(self.source, "expected ')'")),
        }
    }

    fn expr(&mut self) -> GraphResult<Ast> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> GraphResult<Ast> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> GraphResult<Ast> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Ast::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> GraphResult<Ast> {
        let base = self.primary()?;
        if let Some(Token::Pow) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Ast::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> GraphResult<Ast> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Ast::Number(n)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect_rparen()?;
                    Ok(Ast::Call(name, Box::new(arg)))
                } else {
                    Ok(Ast::Name(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(other) => Err(malformed(self.source, format!("unexpected token {other:?}"))),
            None => Err(malformed(self.source, "unexpected end of formula")),
        }
    }
}

/// Parse formula text into an unresolved tree.
pub(crate) fn parse(formula: &str) -> GraphResult<Ast> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(malformed(formula, "empty formula"));
    }
    let mut parser = Parser {
        source: formula,
        tokens,
        pos: 0,
    };
    let ast = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(malformed(formula, "trailing input"));
    }
    Ok(ast)
}

/// Resolve names against `space`: Expressions first, then Parameters, then
/// the constants `pi` and `e`.
pub(crate) fn compile(ast: &Ast, space: &Space, formula: &str) -> GraphResult<Formula> {
    let unresolved = |name: &str| GraphError::NameResolution {
        name: name.to_string(),
        formula: formula.to_string(),
    };
    Ok(match ast {
        Ast::Number(n) => Formula::Number(*n),
        Ast::Name(name) => {
            if let Some(id) = space.expr(name) {
                Formula::Expr(id)
            } else if let Some(id) = space.param(name) {
                Formula::Param(id)
            } else {
                match name.as_str() {
                    "pi" => Formula::Number(std::f64::consts::PI),
                    "e" => Formula::Number(std::f64::consts::E),
                    _ => return Err(unresolved(name)),
                }
            }
        }
        Ast::Neg(inner) => Formula::Neg(Box::new(compile(inner, space, formula)?)),
        Ast::Binary(op, l, r) => Formula::Binary(
            *op,
            Box::new(compile(l, space, formula)?),
            Box::new(compile(r, space, formula)?),
        ),
        Ast::Call(name, arg) => {
            let f = MathFn::from_name(name).ok_or_else(|| unresolved(name))?;
            Formula::Call(f, Box::new(compile(arg, space, formula)?))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Box<Ast> {
        Box::new(Ast::Number(n))
    }

    fn name(s: &str) -> Box<Ast> {
        Box::new(Ast::Name(s.into()))
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(
            parse("1 + 2*3").unwrap(),
            Ast::Binary(
                BinOp::Add,
                num(1.0),
                Box::new(Ast::Binary(BinOp::Mul, num(2.0), num(3.0)))
            )
        );
        assert_eq!(
            parse("a - b - c").unwrap(),
            Ast::Binary(
                BinOp::Sub,
                Box::new(Ast::Binary(BinOp::Sub, name("a"), name("b"))),
                name("c")
            )
        );
        assert_eq!(
            parse("2**3^2").unwrap(),
            Ast::Binary(
                BinOp::Pow,
                num(2.0),
                Box::new(Ast::Binary(BinOp::Pow, num(3.0), num(2.0)))
            )
        );
    }

    #[test]
    fn leading_minus_binds_looser_than_power() {
        assert_eq!(
            parse("-x**2").unwrap(),
            Ast::Neg(Box::new(Ast::Binary(BinOp::Pow, name("x"), num(2.0))))
        );
        assert_eq!(
            parse("x**-1").unwrap(),
            Ast::Binary(BinOp::Pow, name("x"), Box::new(Ast::Neg(num(1.0))))
        );
    }

    #[test]
    fn numbers_with_exponents() {
        assert_eq!(parse("1e-3").unwrap(), Ast::Number(1e-3));
        assert_eq!(parse("2.5E+2").unwrap(), Ast::Number(250.0));
        assert_eq!(
            parse("1e-3-x").unwrap(),
            Ast::Binary(BinOp::Sub, num(1e-3), name("x"))
        );
    }

    #[test]
    fn calls_and_parentheses() {
        assert_eq!(
            parse("ta1*exp(tk1*vr)").unwrap(),
            Ast::Binary(
                BinOp::Mul,
                name("ta1"),
                Box::new(Ast::Call(
                    "exp".into(),
                    Box::new(Ast::Binary(BinOp::Mul, name("tk1"), name("vr")))
                ))
            )
        );
        assert_eq!(parse("((x))").unwrap(), Ast::Name("x".into()));
    }

    #[test]
    fn malformed_formulas() {
        for bad in ["", "1 +", "(x", "x)", "x $ y", "2 3", "exp(", "1..2"] {
            assert!(
                matches!(parse(bad), Err(GraphError::Formula { .. })),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn compile_resolves_constants_and_rejects_unknowns() {
        let space = Space::empty();
        let f = compile(&parse("2*pi").unwrap(), &space, "2*pi").unwrap();
        assert_eq!(
            f,
            Formula::Binary(
                BinOp::Mul,
                Box::new(Formula::Number(2.0)),
                Box::new(Formula::Number(std::f64::consts::PI))
            )
        );
        let err = compile(&parse("erf(1)").unwrap(), &space, "erf(1)").unwrap_err();
        assert_eq!(
            err,
            GraphError::NameResolution {
                name: "erf".into(),
                formula: "erf(1)".into()
            }
        );
        assert!(matches!(
            compile(&parse("x+1").unwrap(), &space, "x+1"),
            Err(GraphError::NameResolution { .. })
        ));
    }
}
