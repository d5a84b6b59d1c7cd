//! Numeric expression language for `z = f(x, y, t)`.
//!
//! Expressions are parsed once with a pest grammar into a small AST and then
//! evaluated per sample. Evaluation is reached through the [`Evaluator`] trait
//! so the sampling pipeline never depends on this particular engine.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;
use std::sync::Arc;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "math/expr.pest"]
pub struct ExprParser;

#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("parse error: {0}")]
    Parse(#[from] Box<pest::error::Error<Rule>>),
    #[error("empty expression")]
    Empty,
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{name}` takes {expected} argument(s), got {found}")]
    Arity {
        name: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("result is not finite ({0})")]
    NonFinite(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bindings {
    pub x: f64,
    pub y: f64,
    pub t: f64,
}

impl Bindings {
    pub fn new(x: f64, y: f64, t: f64) -> Self {
        Self { x, y, t }
    }

    fn get(&self, variable: Variable) -> f64 {
        match variable {
            Variable::X => self.x,
            Variable::Y => self.y,
            Variable::T => self.t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    X,
    Y,
    T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Rem => floored_mod(lhs, rhs),
            BinaryOp::Pow => lhs.powf(rhs),
        }
    }
}

// Result takes the sign of the divisor; a zero divisor leaves the dividend.
fn floored_mod(lhs: f64, rhs: f64) -> f64 {
    if rhs == 0.0 {
        lhs
    } else {
        lhs - rhs * (lhs / rhs).floor()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Sqrt,
    Cbrt,
    Abs,
    Exp,
    Ln,
    Log,
    Log10,
    Log2,
    Floor,
    Ceil,
    Round,
    Sign,
    Min,
    Max,
    Pow,
    Hypot,
    Mod,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "asin" => Function::Asin,
            "acos" => Function::Acos,
            "atan" => Function::Atan,
            "atan2" => Function::Atan2,
            "sinh" => Function::Sinh,
            "cosh" => Function::Cosh,
            "tanh" => Function::Tanh,
            "sqrt" => Function::Sqrt,
            "cbrt" => Function::Cbrt,
            "abs" => Function::Abs,
            "exp" => Function::Exp,
            "ln" => Function::Ln,
            "log" => Function::Log,
            "log10" => Function::Log10,
            "log2" => Function::Log2,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "round" => Function::Round,
            "sign" => Function::Sign,
            "min" => Function::Min,
            "max" => Function::Max,
            "pow" => Function::Pow,
            "hypot" => Function::Hypot,
            "mod" => Function::Mod,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
            Function::Atan2 => "atan2",
            Function::Sinh => "sinh",
            Function::Cosh => "cosh",
            Function::Tanh => "tanh",
            Function::Sqrt => "sqrt",
            Function::Cbrt => "cbrt",
            Function::Abs => "abs",
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Log2 => "log2",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
            Function::Sign => "sign",
            Function::Min => "min",
            Function::Max => "max",
            Function::Pow => "pow",
            Function::Hypot => "hypot",
            Function::Mod => "mod",
        }
    }

    fn check_arity(self, found: usize) -> Result<(), EvalError> {
        let (ok, expected) = match self {
            Function::Atan2 | Function::Pow | Function::Hypot | Function::Mod => (found == 2, "2"),
            Function::Log => (found == 1 || found == 2, "1 or 2"),
            Function::Min | Function::Max => (found >= 1, "at least 1"),
            _ => (found == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(EvalError::Arity {
                name: self.name(),
                expected,
                found,
            })
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        let a = args[0];
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Asin => a.asin(),
            Function::Acos => a.acos(),
            Function::Atan => a.atan(),
            Function::Atan2 => a.atan2(args[1]),
            Function::Sinh => a.sinh(),
            Function::Cosh => a.cosh(),
            Function::Tanh => a.tanh(),
            Function::Sqrt => a.sqrt(),
            Function::Cbrt => a.cbrt(),
            Function::Abs => a.abs(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Log => match args.get(1) {
                Some(base) => a.ln() / base.ln(),
                None => a.ln(),
            },
            Function::Log10 => a.log10(),
            Function::Log2 => a.log2(),
            Function::Floor => a.floor(),
            Function::Ceil => a.ceil(),
            Function::Round => a.round(),
            Function::Sign => {
                if a > 0.0 {
                    1.0
                } else if a < 0.0 {
                    -1.0
                } else {
                    a
                }
            }
            Function::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Function::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Function::Pow => a.powf(args[1]),
            Function::Hypot => a.hypot(args[1]),
            Function::Mod => floored_mod(a, args[1]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(Variable),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Raw evaluation; the result may be NaN or infinite.
    pub fn eval(&self, bindings: &Bindings) -> f64 {
        match self {
            Expr::Number(value) => *value,
            Expr::Variable(variable) => bindings.get(*variable),
            Expr::Negate(inner) => -inner.eval(bindings),
            Expr::Binary(op, lhs, rhs) => op.apply(lhs.eval(bindings), rhs.eval(bindings)),
            Expr::Call(function, args) => match args.as_slice() {
                [a] => function.apply(&[a.eval(bindings)]),
                [a, b] => function.apply(&[a.eval(bindings), b.eval(bindings)]),
                _ => {
                    let values: Vec<f64> = args.iter().map(|arg| arg.eval(bindings)).collect();
                    function.apply(&values)
                }
            },
        }
    }
}

static PRATT_PARSER: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left)
            | Op::infix(Rule::implicit, Assoc::Left))
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::plus))
        .op(Op::infix(Rule::pow, Assoc::Right))
});

/// Rewrites alternate notations into the grammar's canonical spelling:
/// `**` becomes `^`, `PI`/`Pi`/`π` become `pi`, and a standalone `E` becomes `e`.
/// Numeric literals are copied untouched so `1E5` keeps its exponent.
pub fn normalize_notation(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '*' && chars.get(i + 1) == Some(&'*') {
            out.push('^');
            i += 2;
        } else if c == 'π' {
            out.push_str("pi");
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            out.extend(&chars[start..i]);
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            out.push_str(match ident.as_str() {
                "PI" | "Pi" => "pi",
                "E" => "e",
                other => other,
            });
        } else {
            out.push(c);
            i += 1;
        }
    }

    out
}

pub fn compile(source: &str) -> Result<Expr, EvalError> {
    let normalized = normalize_notation(source);
    if normalized.trim().is_empty() {
        return Err(EvalError::Empty);
    }

    let mut pairs = ExprParser::parse(Rule::program, &normalized).map_err(Box::new)?;
    let program = pairs.next().ok_or(EvalError::Empty)?;
    let expr = program.into_inner().next().ok_or(EvalError::Empty)?;
    build_expr(expr.into_inner())
}

fn build_expr(pairs: Pairs<'_, Rule>) -> Result<Expr, EvalError> {
    PRATT_PARSER
        .map_primary(build_primary)
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::neg => Ok(Expr::Negate(Box::new(rhs?))),
            _ => rhs,
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul | Rule::implicit => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                Rule::rem => BinaryOp::Rem,
                Rule::pow => BinaryOp::Pow,
                rule => unreachable!("grammar produced infix {rule:?}"),
            };
            Ok(Expr::Binary(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pairs)
}

fn build_primary(pair: Pair<'_, Rule>) -> Result<Expr, EvalError> {
    match pair.as_rule() {
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| EvalError::InvalidNumber(pair.as_str().to_string())),
        Rule::ident => resolve_symbol(pair.as_str()),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner.next().ok_or(EvalError::Empty)?.as_str();
            let function =
                Function::from_name(name).ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
            let args = inner
                .map(|arg| build_expr(arg.into_inner()))
                .collect::<Result<Vec<_>, _>>()?;
            function.check_arity(args.len())?;
            Ok(Expr::Call(function, args))
        }
        Rule::expr => build_expr(pair.into_inner()),
        rule => unreachable!("grammar produced primary {rule:?}"),
    }
}

fn resolve_symbol(name: &str) -> Result<Expr, EvalError> {
    match name {
        "x" => Ok(Expr::Variable(Variable::X)),
        "y" => Ok(Expr::Variable(Variable::Y)),
        "t" => Ok(Expr::Variable(Variable::T)),
        "pi" => Ok(Expr::Number(std::f64::consts::PI)),
        "e" => Ok(Expr::Number(std::f64::consts::E)),
        "tau" => Ok(Expr::Number(std::f64::consts::TAU)),
        "phi" => Ok(Expr::Number(1.618_033_988_749_895)),
        other => Err(EvalError::UndefinedSymbol(other.to_string())),
    }
}

pub trait Evaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<f64, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &Bindings) -> Result<f64, EvalError>,
{
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<f64, EvalError> {
        self(expression, bindings)
    }
}

struct CompiledExpr {
    source: String,
    program: Result<Arc<Expr>, EvalError>,
}

/// Grammar-backed evaluator. The most recent expression is compiled once and
/// reused until a different source string arrives.
#[derive(Default)]
pub struct ExprEvaluator {
    cache: Mutex<Option<CompiledExpr>>,
}

impl ExprEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn program(&self, expression: &str) -> Result<Arc<Expr>, EvalError> {
        let mut cache = self.cache.lock();
        if let Some(compiled) = cache.as_ref() {
            if compiled.source == expression {
                return compiled.program.clone();
            }
        }

        let program = compile(expression).map(Arc::new);
        match &program {
            Ok(_) => log::debug!(target: "surface3d::expr", "compiled `{}`", expression),
            Err(err) => log::debug!(target: "surface3d::expr", "cannot compile `{}`: {}", expression, err),
        }
        *cache = Some(CompiledExpr {
            source: expression.to_string(),
            program: program.clone(),
        });
        program
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<f64, EvalError> {
        let value = self.program(expression)?.eval(bindings);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFinite(value))
        }
    }
}

#[derive(Debug, Default)]
pub struct FailureTally {
    count: usize,
    first: Option<EvalError>,
}

impl FailureTally {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn first(&self) -> Option<&EvalError> {
        self.first.as_ref()
    }

    fn record(&mut self, err: EvalError) {
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(err);
        }
    }
}

/// Evaluates one sample, substituting `0` for any failure so a single bad
/// point never aborts a sampling pass.
pub fn evaluate_or_zero<E: Evaluator + ?Sized>(
    evaluator: &E,
    expression: &str,
    bindings: &Bindings,
    failures: &mut FailureTally,
) -> f64 {
    let err = match evaluator.evaluate(expression, bindings) {
        Ok(value) if value.is_finite() => return value,
        Ok(value) => EvalError::NonFinite(value),
        Err(err) => err,
    };
    log::debug!(
        target: "surface3d::expr",
        "evaluation failed at (x={}, y={}, t={}): {}",
        bindings.x,
        bindings.y,
        bindings.t,
        err
    );
    failures.record(err);
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn eval_at(source: &str, x: f64, y: f64, t: f64) -> f64 {
        compile(source)
            .unwrap_or_else(|e| panic!("`{source}` failed to compile: {e}"))
            .eval(&Bindings::new(x, y, t))
    }

    fn eval(source: &str) -> f64 {
        eval_at(source, 0.0, 0.0, 0.0)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn operator_precedence() {
        assert_close(eval("1 + 2 * 3"), 7.0);
        assert_close(eval("(1 + 2) * 3"), 9.0);
        assert_close(eval("8 / 4 / 2"), 1.0);
        assert_close(eval("2 - 3 - 4"), -5.0);
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_negation() {
        assert_close(eval("2^3^2"), 512.0);
        assert_close(eval("-2^2"), -4.0);
        assert_close(eval("2^-1"), 0.5);
        assert_close(eval("2 ** 3"), 8.0);
    }

    #[test]
    fn modulo_follows_the_divisor_sign() {
        assert_close(eval("10 % 3"), 1.0);
        assert_close(eval("-7 % 3"), 2.0);
        assert_close(eval("mod(7, -3)"), -2.0);
        assert_close(eval("5 % 0"), 5.0);
    }

    #[test]
    fn implicit_multiplication() {
        assert_close(eval_at("2x", 3.0, 0.0, 0.0), 6.0);
        assert_close(eval_at("(x - 1)(x + 1)", 3.0, 0.0, 0.0), 8.0);
        assert_close(eval_at("3 sin(x)", std::f64::consts::FRAC_PI_2, 0.0, 0.0), 3.0);
    }

    #[test]
    fn variables_are_bound() {
        assert_close(eval_at("x*x + y*y", -1.0, -1.0, 0.0), 2.0);
        assert_close(eval_at("x - y + t", 1.0, 2.0, 10.0), 9.0);
    }

    #[test]
    fn constants() {
        assert_close(eval("pi"), std::f64::consts::PI);
        assert_close(eval("PI"), std::f64::consts::PI);
        assert_close(eval("E"), std::f64::consts::E);
        assert_close(eval("tau / 2"), std::f64::consts::PI);
        assert_close(eval("π"), std::f64::consts::PI);
    }

    #[test]
    fn functions() {
        assert_close(eval("sqrt(16)"), 4.0);
        assert_close(eval("log(8, 2)"), 3.0);
        assert_close(eval("log(e)"), 1.0);
        assert_close(eval("max(1, 5, 3)"), 5.0);
        assert_close(eval("min(4, -2)"), -2.0);
        assert_close(eval("atan2(1, 1)"), std::f64::consts::FRAC_PI_4);
        assert_close(eval("sign(0)"), 0.0);
        assert_close(eval("sign(-3)"), -1.0);
        assert_close(eval("hypot(3, 4)"), 5.0);
        assert_close(eval("abs(-2.5)"), 2.5);
    }

    #[test]
    fn scientific_notation_numbers() {
        assert_close(eval("1e3"), 1000.0);
        assert_close(eval("2.5E-1"), 0.25);
        assert_close(eval(".5 + 1."), 1.5);
    }

    #[test]
    fn normalization_is_token_aware() {
        assert_eq!(normalize_notation("x**2"), "x^2");
        assert_eq!(normalize_notation("sin(PI*x)"), "sin(pi*x)");
        assert_eq!(normalize_notation("E^x"), "e^x");
        assert_eq!(normalize_notation("1E5 + EXP"), "1E5 + EXP");
        assert_eq!(normalize_notation("Pi/2"), "pi/2");
    }

    #[test]
    fn undefined_symbol_is_reported() {
        assert!(matches!(compile("x + z"), Err(EvalError::UndefinedSymbol(name)) if name == "z"));
    }

    #[test]
    fn unknown_function_and_arity_are_reported() {
        assert!(matches!(compile("foo(x)"), Err(EvalError::UnknownFunction(name)) if name == "foo"));
        assert!(matches!(
            compile("sin(1, 2)"),
            Err(EvalError::Arity { name: "sin", found: 2, .. })
        ));
        assert!(matches!(compile("atan2(1)"), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        assert!(matches!(compile("x +"), Err(EvalError::Parse(_))));
        assert!(matches!(compile("sin(x"), Err(EvalError::Parse(_))));
        assert!(matches!(compile("   "), Err(EvalError::Empty)));
    }

    #[test]
    fn evaluator_rejects_non_finite_results() {
        let evaluator = ExprEvaluator::new();
        let at_origin = Bindings::default();
        assert!(matches!(
            evaluator.evaluate("1 / x", &at_origin),
            Err(EvalError::NonFinite(_))
        ));
        assert!(matches!(
            evaluator.evaluate("sqrt(-1)", &at_origin),
            Err(EvalError::NonFinite(_))
        ));
    }

    #[test]
    fn evaluator_recompiles_when_the_expression_changes() {
        let evaluator = ExprEvaluator::new();
        let bindings = Bindings::new(2.0, 5.0, 0.0);
        assert_close(evaluator.evaluate("x", &bindings).unwrap(), 2.0);
        assert_close(evaluator.evaluate("y", &bindings).unwrap(), 5.0);
        assert_close(evaluator.evaluate("x", &bindings).unwrap(), 2.0);
    }

    #[test]
    fn evaluate_or_zero_substitutes_and_counts_failures() {
        let evaluator = ExprEvaluator::new();
        let mut failures = FailureTally::default();

        let ok = evaluate_or_zero(&evaluator, "x + 1", &Bindings::new(1.0, 0.0, 0.0), &mut failures);
        assert_close(ok, 2.0);
        assert_eq!(failures.count(), 0);

        for _ in 0..3 {
            let value = evaluate_or_zero(&evaluator, "x + q", &Bindings::default(), &mut failures);
            assert_eq!(value, 0.0);
        }
        assert_eq!(failures.count(), 3);
        assert!(matches!(failures.first(), Some(EvalError::UndefinedSymbol(_))));
    }

    #[test]
    fn closures_are_evaluators() {
        let constant = |_: &str, _: &Bindings| -> Result<f64, EvalError> { Ok(f64::INFINITY) };
        let mut failures = FailureTally::default();
        assert_eq!(evaluate_or_zero(&constant, "ignored", &Bindings::default(), &mut failures), 0.0);
        assert!(matches!(failures.first(), Some(EvalError::NonFinite(_))));
    }

    #[test]
    fn default_ripple_expression_compiles() {
        let value = eval_at("sin(sqrt(x*x + y*y) - t) / sqrt(x*x + y*y + 0.1)", 0.0, 0.0, 0.0);
        assert_close(value, 0.0);
    }
}
