//! Fit function families and a small formula language
//!
//! Built-in families are `polN` (N = 0..9), `expo` (`exp([0] + [1]*x)`) and
//! `powerlaw` (`[0] * x^[1]`). Anything else is parsed as an expression in
//! `x` and parameters `[k]` with `+ - * / ^`, parentheses, numbers and the
//! functions `exp log sqrt abs sin cos pow`.

use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
pub enum FormulaError {
    #[error("Unexpected character '{ch}' at position {position} in '{formula}'")]
    #[diagnostic(code(plotit::formula::character))]
    UnexpectedChar {
        formula: String,
        ch: char,
        position: usize,
    },

    #[error("Expected {expected} at position {position} in '{formula}'")]
    #[diagnostic(code(plotit::formula::syntax))]
    Expected {
        formula: String,
        expected: &'static str,
        position: usize,
    },

    #[error("Unknown function '{name}' in '{formula}'")]
    #[diagnostic(
        code(plotit::formula::function),
        help("available functions: exp, log, sqrt, abs, sin, cos, pow")
    )]
    UnknownFunction { formula: String, name: String },

    #[error("'{name}' takes {expected} argument(s), {found} given")]
    #[diagnostic(code(plotit::formula::arity))]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Formula '{formula}' has no [k] parameters to fit")]
    #[diagnostic(code(plotit::formula::parameters))]
    NoParameters { formula: String },

    #[error("Polynomial order {order} is not supported")]
    #[diagnostic(code(plotit::formula::polynomial), help("use pol0 to pol9"))]
    PolynomialOrder { order: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Exp,
    Log,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Pow,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Func::Exp,
            "log" => Func::Log,
            "sqrt" => Func::Sqrt,
            "abs" | "fabs" => Func::Abs,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "pow" => Func::Pow,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    X,
    Param(usize),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn eval(&self, x: f64, p: &[f64]) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::X => x,
            Expr::Param(k) => p.get(*k).copied().unwrap_or(0.0),
            Expr::Neg(e) => -e.eval(x, p),
            Expr::Binary(op, a, b) => {
                let (a, b) = (a.eval(x, p), b.eval(x, p));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(func, args) => {
                let a = args[0].eval(x, p);
                match func {
                    Func::Exp => a.exp(),
                    Func::Log => a.ln(),
                    Func::Sqrt => a.sqrt(),
                    Func::Abs => a.abs(),
                    Func::Sin => a.sin(),
                    Func::Cos => a.cos(),
                    Func::Pow => a.powf(args[1].eval(x, p)),
                }
            }
        }
    }

    fn max_param(&self) -> Option<usize> {
        match self {
            Expr::Number(_) | Expr::X => None,
            Expr::Param(k) => Some(*k),
            Expr::Neg(e) => e.max_param(),
            Expr::Binary(_, a, b) => a.max_param().max(b.max_param()),
            Expr::Call(_, args) => args.iter().filter_map(Expr::max_param).max(),
        }
    }
}

struct Parser<'a> {
    formula: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(formula: &'a str) -> Self {
        Self {
            formula,
            chars: formula.chars().collect(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expected(&self, expected: &'static str) -> FormulaError {
        FormulaError::Expected {
            formula: self.formula.to_string(),
            expected,
            position: self.pos,
        }
    }

    fn expect(&mut self, c: char, expected: &'static str) -> Result<(), FormulaError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn parse(mut self) -> Result<Expr, FormulaError> {
        let expr = self.expression()?;
        match self.peek() {
            None => Ok(expr),
            Some(ch) => Err(FormulaError::UnexpectedChar {
                formula: self.formula.to_string(),
                ch,
                position: self.pos,
            }),
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some('+') => BinOp::Add,
                Some('-') => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some('*') => BinOp::Mul,
                Some('/') => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat('-') {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    // `^` binds tighter than unary minus and is right-associative
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(')', "')'")?;
                Ok(inner)
            }
            Some('[') => {
                self.pos += 1;
                self.skip_whitespace();
                let start = self.pos;
                while self.chars.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| self.expected("a parameter index"))?;
                self.expect(']', "']'")?;
                Ok(Expr::Param(index))
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.identifier(),
            Some(ch) => Err(FormulaError::UnexpectedChar {
                formula: self.formula.to_string(),
                ch,
                position: self.pos,
            }),
            None => Err(self.expected("a value")),
        }
    }

    fn number(&mut self) -> Result<Expr, FormulaError> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == '.')
        {
            self.pos += 1;
        }
        // exponent part, e.g. 1e-3
        if matches!(self.chars.get(self.pos), Some('e') | Some('E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.chars.get(self.pos), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if self.chars.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                while self.chars.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>().map(Expr::Number).map_err(|_| {
            self.pos = start;
            self.expected("a number")
        })
    }

    fn identifier(&mut self) -> Result<Expr, FormulaError> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        if name == "x" {
            return Ok(Expr::X);
        }
        if name == "pi" {
            return Ok(Expr::Number(std::f64::consts::PI));
        }
        let func = Func::lookup(&name).ok_or_else(|| FormulaError::UnknownFunction {
            formula: self.formula.to_string(),
            name: name.clone(),
        })?;
        self.expect('(', "'(' after a function name")?;
        let mut args = vec![self.expression()?];
        while self.eat(',') {
            args.push(self.expression()?);
        }
        self.expect(')', "')'")?;
        if args.len() != func.arity() {
            return Err(FormulaError::WrongArity {
                name,
                expected: func.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(func, args))
    }
}

/// A parsed formula in `x` and `[k]`
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
    n_params: usize,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let expr = Parser::new(source).parse()?;
        let n_params = expr
            .max_param()
            .map(|k| k + 1)
            .ok_or_else(|| FormulaError::NoParameters {
                formula: source.to_string(),
            })?;
        Ok(Self {
            source: source.to_string(),
            expr,
            n_params,
        })
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn eval(&self, x: f64, params: &[f64]) -> f64 {
        self.expr.eval(x, params)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A function family that can be fitted
#[derive(Debug, Clone, PartialEq)]
pub enum FitModel {
    /// `[0] + [1]*x + ... + [N]*x^N`
    Polynomial(usize),
    /// `exp([0] + [1]*x)`
    Exponential,
    /// `[0] * x^[1]`
    PowerLaw,
    Formula(Formula),
}

impl FitModel {
    /// Parse a family name or a formula
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let text = text.trim();
        if let Some(order) = text
            .strip_prefix("pol")
            .and_then(|rest| rest.parse::<usize>().ok())
        {
            if order > 9 {
                return Err(FormulaError::PolynomialOrder { order });
            }
            return Ok(FitModel::Polynomial(order));
        }
        match text {
            "expo" => Ok(FitModel::Exponential),
            "powerlaw" => Ok(FitModel::PowerLaw),
            _ => Formula::parse(text).map(FitModel::Formula),
        }
    }

    pub fn n_params(&self) -> usize {
        match self {
            FitModel::Polynomial(order) => order + 1,
            FitModel::Exponential | FitModel::PowerLaw => 2,
            FitModel::Formula(f) => f.n_params(),
        }
    }

    pub fn eval(&self, x: f64, p: &[f64]) -> f64 {
        match self {
            FitModel::Polynomial(_) => p.iter().rev().fold(0.0, |acc, c| acc * x + c),
            FitModel::Exponential => (p[0] + p[1] * x).exp(),
            FitModel::PowerLaw => p[0] * x.powf(p[1]),
            FitModel::Formula(f) => f.eval(x, p),
        }
    }

    /// Partial derivatives with respect to each parameter at `x`
    pub fn gradient(&self, x: f64, p: &[f64]) -> Vec<f64> {
        match self {
            FitModel::Polynomial(order) => {
                let mut powers = Vec::with_capacity(order + 1);
                let mut xn = 1.0;
                for _ in 0..=*order {
                    powers.push(xn);
                    xn *= x;
                }
                powers
            }
            FitModel::Exponential => {
                let f = (p[0] + p[1] * x).exp();
                vec![f, x * f]
            }
            FitModel::PowerLaw => {
                let xp = x.powf(p[1]);
                vec![xp, p[0] * xp * x.ln()]
            }
            FitModel::Formula(f) => numeric_gradient(|q| f.eval(x, q), p),
        }
    }

    /// Starting point for the minimizer
    ///
    /// Polynomials start from the mean; `expo` and `powerlaw` from a straight
    /// line fitted in log space; formulas from 1 for every parameter.
    pub fn initial_parameters(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        let mean = if ys.is_empty() {
            0.0
        } else {
            ys.iter().sum::<f64>() / ys.len() as f64
        };
        match self {
            FitModel::Polynomial(order) => {
                let mut p = vec![0.0; order + 1];
                p[0] = mean;
                p
            }
            FitModel::Exponential => match log_linear(xs, ys, |x| Some(x)) {
                Some((a, b)) => vec![a, b],
                None => vec![mean.abs().max(f64::MIN_POSITIVE).ln(), 0.0],
            },
            FitModel::PowerLaw => match log_linear(xs, ys, |x| (x > 0.0).then(|| x.ln())) {
                Some((a, b)) => vec![a.exp(), b],
                None => vec![mean, 0.0],
            },
            FitModel::Formula(f) => vec![1.0; f.n_params()],
        }
    }
}

impl fmt::Display for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitModel::Polynomial(order) => write!(f, "pol{}", order),
            FitModel::Exponential => write!(f, "expo"),
            FitModel::PowerLaw => write!(f, "powerlaw"),
            FitModel::Formula(formula) => write!(f, "{}", formula.source()),
        }
    }
}

/// Central-difference gradient of `f` at `p`
pub fn numeric_gradient<F: Fn(&[f64]) -> f64>(f: F, p: &[f64]) -> Vec<f64> {
    let mut q = p.to_vec();
    (0..p.len())
        .map(|k| {
            let h = 6e-6 * p[k].abs().max(1.0);
            q[k] = p[k] + h;
            let up = f(&q);
            q[k] = p[k] - h;
            let down = f(&q);
            q[k] = p[k];
            (up - down) / (2.0 * h)
        })
        .collect()
}

/// Unweighted fit of `ln y = a + b * t(x)` over points with `y > 0`
fn log_linear(xs: &[f64], ys: &[f64], t: impl Fn(f64) -> Option<f64>) -> Option<(f64, f64)> {
    let points: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|(_, y)| **y > 0.0)
        .filter_map(|(x, y)| t(*x).map(|tx| (tx, y.ln())))
        .collect();
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_t = points.iter().map(|(t, _)| t).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|(t, _)| (t - mean_t).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|(t, y)| (t - mean_t) * (y - mean_y))
        .sum();
    let b = sxy / sxx;
    Some((mean_y - b * mean_t, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(formula: &str, x: f64, p: &[f64]) -> f64 {
        Formula::parse(formula).unwrap().eval(x, p)
    }

    #[test]
    fn test_families() {
        assert_eq!(FitModel::parse("pol1").unwrap(), FitModel::Polynomial(1));
        assert_eq!(FitModel::parse("pol0").unwrap().n_params(), 1);
        assert_eq!(FitModel::parse(" expo ").unwrap(), FitModel::Exponential);
        assert_eq!(FitModel::parse("powerlaw").unwrap().n_params(), 2);
        assert!(matches!(
            FitModel::parse("pol12"),
            Err(FormulaError::PolynomialOrder { order: 12 })
        ));
    }

    #[test]
    fn test_polynomial_eval() {
        let model = FitModel::Polynomial(2);
        assert_eq!(model.eval(2.0, &[1.0, 2.0, 3.0]), 17.0);
        assert_eq!(model.gradient(2.0, &[1.0, 2.0, 3.0]), vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("[0] + 2*3^2", 0.0, &[1.0]), 19.0);
        assert_eq!(eval("-[0]^2", 0.0, &[3.0]), -9.0);
        assert_eq!(eval("2^3^2 * [0]", 0.0, &[1.0]), 512.0);
        assert_eq!(eval("([0] - x) / 2", 4.0, &[10.0]), 3.0);
        assert_eq!(eval("[0]*1e-2 + 2.5E1", 0.0, &[100.0]), 26.0);
    }

    #[test]
    fn test_functions() {
        assert!((eval("[0]*exp([1]*x)", 1.0, &[2.0, 0.0]) - 2.0).abs() < 1e-12);
        assert!((eval("pow(x, [0])", 3.0, &[2.0]) - 9.0).abs() < 1e-12);
        assert!((eval("sqrt(abs([0]))", 0.0, &[-16.0]) - 4.0).abs() < 1e-12);
        assert!((eval("[0]*sin(pi/2) + cos(0)", 0.0, &[1.0]) - 2.0).abs() < 1e-12);
        assert!((eval("log(exp([0]))", 0.0, &[1.5]) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_parameter_count_from_highest_index() {
        let f = Formula::parse("[0] + [2]*x").unwrap();
        assert_eq!(f.n_params(), 3);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Formula::parse("1 + x"),
            Err(FormulaError::NoParameters { .. })
        ));
        assert!(matches!(
            Formula::parse("foo([0])"),
            Err(FormulaError::UnknownFunction { .. })
        ));
        assert!(matches!(
            Formula::parse("pow([0])"),
            Err(FormulaError::WrongArity { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            Formula::parse("[0] +"),
            Err(FormulaError::Expected { .. })
        ));
        assert!(matches!(
            Formula::parse("[0] $ 2"),
            Err(FormulaError::UnexpectedChar { ch: '$', .. })
        ));
        assert!(matches!(
            Formula::parse("([0]"),
            Err(FormulaError::Expected { .. })
        ));
    }

    #[test]
    fn test_numeric_gradient_matches_analytic() {
        let formula = FitModel::parse("exp([0] + [1]*x)").unwrap();
        let p = [0.5, -0.2];
        let numeric = formula.gradient(3.0, &p);
        let analytic = FitModel::Exponential.gradient(3.0, &p);
        for (n, a) in numeric.iter().zip(&analytic) {
            assert!((n - a).abs() < 1e-6);
        }
    }

    #[test]
    fn test_initial_parameters_for_exponential() {
        let xs = [1.0_f64, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|x| (1.0 - 0.5 * x).exp()).collect();
        let p = FitModel::Exponential.initial_parameters(&xs, &ys);
        assert!((p[0] - 1.0).abs() < 1e-9);
        assert!((p[1] + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_display_round_trips_family_names() {
        for name in ["pol3", "expo", "powerlaw", "[0]*x"] {
            assert_eq!(FitModel::parse(name).unwrap().to_string(), name);
        }
    }
}
