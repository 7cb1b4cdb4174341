//! Sandboxed expression evaluation for the `eval` command.
//!
//! The evaluator is pure arithmetic: no variables, no assignment, no I/O.
//! Input length and nesting depth are bounded before parsing so hostile
//! input cannot exhaust the stack.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0, one_of},
    combinator::{all_consuming, map, opt},
    multi::{many0, separated_list0},
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated},
};
use thiserror::Error;

/// Default maximum expression length in bytes.
pub const MAX_EXPR_LEN: usize = 256;

/// Default maximum parenthesis nesting.
pub const MAX_DEPTH: usize = 32;

/// Evaluation failures, reported back to the invoker verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("empty expression")]
    Empty,
    #[error("expression too long ({0} bytes)")]
    TooLong(usize),
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("syntax error near {0:?}")]
    Syntax(String),
    #[error("unknown identifier {0:?}")]
    UnknownIdentifier(String),
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
}

/// Evaluates expressions on behalf of command handlers.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expr: &str) -> Result<String, EvalError>;
}

/// Floating point calculator: `+ - * / % ^`, unary sign, parentheses,
/// the constants `pi`, `e` and `tau`, and a fixed set of functions.
#[derive(Debug, Clone)]
pub struct ArithmeticEvaluator {
    max_len: usize,
    max_depth: usize,
}

impl Default for ArithmeticEvaluator {
    fn default() -> Self {
        Self {
            max_len: MAX_EXPR_LEN,
            max_depth: MAX_DEPTH,
        }
    }
}

impl ArithmeticEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_len: usize, max_depth: usize) -> Self {
        Self { max_len, max_depth }
    }

    fn check_depth(&self, expr: &str) -> Result<(), EvalError> {
        let mut depth = 0usize;
        for c in expr.chars() {
            match c {
                '(' => {
                    depth += 1;
                    if depth > self.max_depth {
                        return Err(EvalError::TooDeep);
                    }
                }
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Evaluator for ArithmeticEvaluator {
    fn evaluate(&self, expr: &str) -> Result<String, EvalError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(EvalError::Empty);
        }
        if expr.len() > self.max_len {
            return Err(EvalError::TooLong(expr.len()));
        }
        self.check_depth(expr)?;

        let ast = match all_consuming(delimited(multispace0, expression, multispace0))(expr) {
            Ok((_, ast)) => ast,
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                let near: String = e.input.chars().take(16).collect();
                return Err(EvalError::Syntax(near));
            }
            Err(nom::Err::Incomplete(_)) => return Err(EvalError::Syntax(String::new())),
        };

        let value = ast.eval()?;
        if !value.is_finite() {
            return Err(EvalError::NotFinite);
        }
        Ok(format_number(value))
    }
}

/// Integral values print without a fraction; everything else uses the
/// shortest round-trip representation.
fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Ident(String),
    Neg(Box<Expr>),
    Bin(Op, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl Op {
    fn from_char(c: char) -> Self {
        match c {
            '+' => Self::Add,
            '-' => Self::Sub,
            '*' => Self::Mul,
            '/' => Self::Div,
            '%' => Self::Rem,
            _ => Self::Pow,
        }
    }
}

impl Expr {
    fn eval(&self) -> Result<f64, EvalError> {
        match self {
            Self::Num(n) => Ok(*n),
            Self::Ident(name) => constant(name),
            Self::Neg(inner) => Ok(-inner.eval()?),
            Self::Bin(op, lhs, rhs) => {
                let (a, b) = (lhs.eval()?, rhs.eval()?);
                match op {
                    Op::Add => Ok(a + b),
                    Op::Sub => Ok(a - b),
                    Op::Mul => Ok(a * b),
                    Op::Div if b == 0.0 => Err(EvalError::DivisionByZero),
                    Op::Div => Ok(a / b),
                    Op::Rem if b == 0.0 => Err(EvalError::DivisionByZero),
                    Op::Rem => Ok(a % b),
                    Op::Pow => Ok(a.powf(b)),
                }
            }
            Self::Call(name, args) => {
                let values = args.iter().map(Expr::eval).collect::<Result<Vec<_>, _>>()?;
                call(name, &values)
            }
        }
    }
}

fn constant(name: &str) -> Result<f64, EvalError> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        "tau" => Ok(std::f64::consts::TAU),
        _ => Err(EvalError::UnknownIdentifier(name.to_string())),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let unary: Option<fn(f64) -> f64> = match name {
        "abs" => Some(f64::abs),
        "sqrt" => Some(f64::sqrt),
        "floor" => Some(f64::floor),
        "ceil" => Some(f64::ceil),
        "round" => Some(f64::round),
        "ln" => Some(f64::ln),
        "log10" => Some(f64::log10),
        "sin" => Some(f64::sin),
        "cos" => Some(f64::cos),
        "tan" => Some(f64::tan),
        _ => None,
    };
    if let Some(f) = unary {
        return match args {
            [x] => Ok(f(*x)),
            _ => Err(arity(name, 1, args.len())),
        };
    }
    match (name, args) {
        ("min", [a, b]) => Ok(a.min(*b)),
        ("max", [a, b]) => Ok(a.max(*b)),
        ("min" | "max", _) => Err(arity(name, 2, args.len())),
        _ => Err(EvalError::UnknownIdentifier(name.to_string())),
    }
}

fn arity(name: &str, expected: usize, got: usize) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        expected,
        got,
    }
}

// ============================================================================
// Grammar
//
//   expression := term (('+' | '-') term)*
//   term       := unary (('*' | '/' | '%') unary)*
//   unary      := ('-' | '+') unary | power
//   power      := atom ('^' unary)?
//   atom       := ident '(' args ')' | ident | number | '(' expression ')'
// ============================================================================

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn fold(first: Expr, rest: Vec<(char, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Bin(Op::from_char(op), Box::new(lhs), Box::new(rhs))
    })
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(one_of("+-")), term))(input)?;
    Ok((input, fold(first, rest)))
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(one_of("*/%")), unary))(input)?;
    Ok((input, fold(first, rest)))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        preceded(ws(char('+')), unary),
        power,
    ))(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(ws(char('^')), unary))(input)?;
    Ok(match exponent {
        Some(exp) => (input, Expr::Bin(Op::Pow, Box::new(base), Box::new(exp))),
        None => (input, base),
    })
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input).and_then(
        |(rest, ident)| {
            if ident.starts_with(|c: char| c.is_ascii_alphabetic()) {
                Ok((rest, ident))
            } else {
                Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Alpha,
                )))
            }
        },
    )
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(
            pair(
                identifier,
                opt(delimited(
                    ws(char('(')),
                    separated_list0(ws(char(',')), expression),
                    char(')'),
                )),
            ),
            |(name, args)| match args {
                Some(args) => Expr::Call(name.to_string(), args),
                None => Expr::Ident(name.to_string()),
            },
        ),
        // Identifiers go first: `double` would accept "inf" and "nan".
        map(double, Expr::Num),
        delimited(char('('), expression, terminated(char(')'), multispace0)),
    )))(input)
}
