//! Expression parsing and tree-walking evaluation.
//!
//! Expressions are written the way a user types them into a graphing tool:
//! `2x^2 + 3(x - 1)`, `r x (1 - x)`, `sin(x)/x`. The tokenizer performs the
//! light normalization such input needs (whitespace removal, `^` as power,
//! implicit multiplication) and the parser builds an [`Expr`] tree. Nothing
//! outside the grammar below is accepted:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | variable | function '(' expr ')' | '(' expr ')'
//! ```
//!
//! Variable names are single letters optionally followed by digits or
//! underscores (`x`, `x1`, `a_0`); a run such as `xy` is read as `x*y`.
//! The constants `pi` and `e` are peeled out of such runs first, so `2pix`
//! is `2*pi*x` and `ex` is `e*x`. Nesting is limited to [`MAX_DEPTH`] levels.

use crate::error::EvalError;
use crate::traits::Scalar;
use std::collections::BTreeSet;
use std::fmt;

/// Allow-listed math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Log2,
    Sqrt,
    Abs,
    Floor,
    Ceil,
}

const FUNCTION_NAMES: &[(&str, MathFunction)] = &[
    ("sin", MathFunction::Sin),
    ("cos", MathFunction::Cos),
    ("tan", MathFunction::Tan),
    ("asin", MathFunction::Asin),
    ("acos", MathFunction::Acos),
    ("atan", MathFunction::Atan),
    ("sinh", MathFunction::Sinh),
    ("cosh", MathFunction::Cosh),
    ("tanh", MathFunction::Tanh),
    ("exp", MathFunction::Exp),
    ("ln", MathFunction::Ln),
    ("log", MathFunction::Ln),
    ("log10", MathFunction::Log10),
    ("log2", MathFunction::Log2),
    ("sqrt", MathFunction::Sqrt),
    ("abs", MathFunction::Abs),
    ("floor", MathFunction::Floor),
    ("ceil", MathFunction::Ceil),
];

const CONSTANTS: &[(&str, f64)] = &[("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

impl MathFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        FUNCTION_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, func)| *func)
    }

    pub fn name(self) -> &'static str {
        FUNCTION_NAMES
            .iter()
            .find(|(_, func)| *func == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }

    fn apply<T: Scalar>(self, x: T) -> Result<T, EvalError> {
        let zero = T::zero();
        let one = T::one();
        let domain = |x: T| EvalError::domain(self.name(), x.to_f64().unwrap_or(f64::NAN));
        let value = match self {
            MathFunction::Sin => x.sin(),
            MathFunction::Cos => x.cos(),
            MathFunction::Tan => x.tan(),
            MathFunction::Asin | MathFunction::Acos if x < -one || x > one => {
                return Err(domain(x))
            }
            MathFunction::Asin => x.asin(),
            MathFunction::Acos => x.acos(),
            MathFunction::Atan => x.atan(),
            MathFunction::Sinh => x.sinh(),
            MathFunction::Cosh => x.cosh(),
            MathFunction::Tanh => x.tanh(),
            MathFunction::Exp => x.exp(),
            MathFunction::Ln | MathFunction::Log10 | MathFunction::Log2 if x <= zero => {
                return Err(domain(x))
            }
            MathFunction::Ln => x.ln(),
            MathFunction::Log10 => x.log10(),
            MathFunction::Log2 => x.log2(),
            MathFunction::Sqrt if x < zero => return Err(domain(x)),
            MathFunction::Sqrt => x.sqrt(),
            MathFunction::Abs => x.abs(),
            MathFunction::Floor => x.floor(),
            MathFunction::Ceil => x.ceil(),
        };
        if value.is_infinite() && x.is_finite() {
            return Err(EvalError::Overflow);
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Call(MathFunction, Box<Expr>),
}

impl Expr {
    /// Evaluates the tree. `lookup` is the only way a variable gets a value.
    pub fn eval<T, F>(&self, lookup: &F) -> Result<T, EvalError>
    where
        T: Scalar,
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Number(n) => T::from_f64(*n).ok_or(EvalError::Overflow),
            Expr::Variable(name) => {
                let value =
                    lookup(name).ok_or_else(|| EvalError::UndefinedVariable(name.clone()))?;
                T::from_f64(value).ok_or(EvalError::Overflow)
            }
            Expr::Unary(op, operand) => {
                let value: T = operand.eval(lookup)?;
                Ok(match op {
                    UnaryOp::Neg => -value,
                    UnaryOp::Plus => value,
                })
            }
            Expr::Binary(left, op, right) => {
                let a: T = left.eval(lookup)?;
                let b: T = right.eval(lookup)?;
                apply_binary(*op, a, b)
            }
            Expr::Call(func, arg) => {
                let value: T = arg.eval(lookup)?;
                func.apply(value)
            }
        }
    }

    /// Names of every variable the expression reads.
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                names.insert(name.clone());
            }
            Expr::Unary(_, operand) | Expr::Call(_, operand) => operand.collect_variables(names),
            Expr::Binary(left, _, right) => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
        }
    }
}

fn apply_binary<T: Scalar>(op: BinaryOp, a: T, b: T) -> Result<T, EvalError> {
    let zero = T::zero();
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => {
            if b == zero {
                return Err(EvalError::DivisionByZero);
            }
            Ok(a / b)
        }
        BinaryOp::Pow => {
            if a == zero && b < zero {
                return Err(EvalError::DivisionByZero);
            }
            if a < zero && b.fract() != zero {
                return Err(EvalError::domain("pow", a.to_f64().unwrap_or(f64::NAN)));
            }
            let value = a.powf(b);
            if value.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(EvalError::Overflow);
            }
            Ok(value)
        }
    }
}

// --- Tokenizer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Variable(String),
    Function(MathFunction),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    /// Tokens after which a value-starting token implies multiplication.
    fn ends_operand(&self) -> bool {
        matches!(self, Token::Number(_) | Token::Variable(_) | Token::RParen)
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self,
            Token::Number(_) | Token::Variable(_) | Token::Function(_) | Token::LParen
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Variable(name) => f.write_str(name),
            Token::Function(func) => f.write_str(func.name()),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Caret => f.write_str("**"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut raw = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_ascii_digit() || c == '.' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let text: String = chars[start..pos].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| EvalError::UnsupportedSyntax(format!("malformed number '{text}'")))?;
            raw.push(Token::Number(value));
        } else if c.is_ascii_alphabetic() {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let run: String = chars[start..pos].iter().collect();
            let before_paren = chars.get(pos) == Some(&'(');
            split_identifier(&run, before_paren, &mut raw);
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' if chars.get(pos + 1) == Some(&'*') => {
                    pos += 1;
                    Token::Caret
                }
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => {
                    return Err(EvalError::UnsupportedSyntax(format!(
                        "unexpected character '{other}'"
                    )))
                }
            };
            raw.push(token);
            pos += 1;
        }
    }

    let mut tokens = Vec::with_capacity(raw.len());
    for token in raw {
        let implicit = tokens
            .last()
            .map_or(false, |prev: &Token| prev.ends_operand() && token.starts_operand());
        if implicit {
            tokens.push(Token::Star);
        }
        tokens.push(token);
    }
    Ok(tokens)
}

/// Resolves an identifier run into function, constant and variable tokens.
fn split_identifier(run: &str, before_paren: bool, out: &mut Vec<Token>) {
    if before_paren {
        if let Some(func) = MathFunction::from_name(run) {
            out.push(Token::Function(func));
            return;
        }
        // `xsin(` reads as `x*sin(`
        for split in 1..run.len() {
            if let Some(func) = MathFunction::from_name(&run[split..]) {
                split_variables(&run[..split], out);
                out.push(Token::Function(func));
                return;
            }
        }
    }
    split_variables(run, out);
}

fn split_variables(run: &str, out: &mut Vec<Token>) {
    if let Some((_, value)) = CONSTANTS.iter().find(|(name, _)| *name == run) {
        out.push(Token::Number(*value));
        return;
    }
    let chars: Vec<char> = run.chars().collect();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphabetic() && !current.is_empty() {
            out.push(variable_token(std::mem::take(&mut current)));
        }
        // `pi` followed by a digit or `_` is `p` times a subscripted `i`
        let pi = c == 'p'
            && chars.get(i + 1) == Some(&'i')
            && chars.get(i + 2).map_or(true, |next| next.is_ascii_alphabetic());
        if pi {
            out.push(Token::Number(std::f64::consts::PI));
            i += 2;
            continue;
        }
        current.push(c);
        i += 1;
    }
    if !current.is_empty() {
        out.push(variable_token(current));
    }
}

fn variable_token(name: String) -> Token {
    match CONSTANTS.iter().find(|(constant, _)| *constant == name) {
        Some((_, value)) => Token::Number(*value),
        None => Token::Variable(name),
    }
}

/// Returns the normalized form of `input` (explicit `*` and `**`), failing on
/// anything outside the grammar's alphabet.
pub fn normalize(input: &str) -> Result<String, EvalError> {
    Ok(tokenize(input)?.iter().map(Token::to_string).collect())
}

// --- Parser ---

/// Deepest operator or parenthesis nesting the parser accepts.
pub const MAX_DEPTH: usize = 256;

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvalError::UnsupportedSyntax("empty expression".to_string()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(EvalError::UnsupportedSyntax(format!(
            "unexpected token '{token}'"
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Enters one level of nesting. Callers restore `depth` on the way out.
    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::UnsupportedSyntax(format!(
                "expression nested more than {MAX_DEPTH} levels deep"
            )));
        }
        Ok(())
    }

    fn expect_rparen(&mut self) -> Result<(), EvalError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(EvalError::UnsupportedSyntax("expected ')'".to_string())),
        }
    }

    // Each operator in a chain deepens the left-leaning tree by one level.
    fn parse_expression(&mut self) -> Result<Expr, EvalError> {
        let depth = self.depth;
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.parse_power(),
        };
        self.consume();
        self.descend()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    // Right-associative and tighter than unary minus on its left: -x^2 == -(x^2).
    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            self.descend()?;
            let exponent = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Function(func)) => {
                match self.consume() {
                    Some(Token::LParen) => {}
                    _ => {
                        return Err(EvalError::UnsupportedSyntax(format!(
                            "expected '(' after {}",
                            func.name()
                        )))
                    }
                }
                self.descend()?;
                let arg = self.parse_expression()?;
                self.expect_rparen()?;
                self.depth -= 1;
                Ok(Expr::Call(func, Box::new(arg)))
            }
            Some(Token::LParen) => {
                self.descend()?;
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                self.depth -= 1;
                Ok(expr)
            }
            Some(token) => Err(EvalError::UnsupportedSyntax(format!(
                "unexpected token '{token}'"
            ))),
            None => Err(EvalError::UnsupportedSyntax(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_with(expr: &str, bindings: &[(&str, f64)]) -> Result<f64, EvalError> {
        let parsed = parse(expr)?;
        parsed.eval(&|name: &str| {
            bindings
                .iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, value)| *value)
        })
    }

    #[test]
    fn normalizes_implicit_multiplication_and_power() {
        assert_eq!(normalize("2x^2").unwrap(), "2*x**2");
        assert_eq!(normalize("3 (x + 1)").unwrap(), "3*(x+1)");
        assert_eq!(normalize("(x+1)2").unwrap(), "(x+1)*2");
        assert_eq!(normalize("(x+1)y").unwrap(), "(x+1)*y");
        assert_eq!(normalize("rx(1-x)").unwrap(), "r*x*(1-x)");
        assert_eq!(normalize("x**3").unwrap(), "x**3");
    }

    #[test]
    fn function_names_are_not_split() {
        assert_eq!(normalize("sin(x)").unwrap(), "sin(x)");
        assert_eq!(normalize("2xcos(x)").unwrap(), "2*x*cos(x)");
        assert_eq!(normalize("x1 y_2").unwrap(), "x1*y_2");
    }

    #[test]
    fn evaluates_squares() {
        assert_eq!(eval_with("x^2", &[("x", 3.0)]).unwrap(), 9.0);
        assert_eq!(eval_with("2x^2 + 1", &[("x", 2.0)]).unwrap(), 9.0);
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_negation() {
        assert_eq!(eval_with("2^3^2", &[]).unwrap(), 512.0);
        assert_eq!(eval_with("-x^2", &[("x", 3.0)]).unwrap(), -9.0);
        assert_eq!(eval_with("2^-1", &[]).unwrap(), 0.5);
    }

    #[test]
    fn constants_and_functions_evaluate() {
        let value = eval_with("sin(pi/2) + ln(e)", &[]).unwrap();
        assert!((value - 2.0).abs() < 1e-12);
        assert_eq!(eval_with("sqrt(16) + abs(-2)", &[]).unwrap(), 6.0);
    }

    #[test]
    fn pi_is_peeled_from_letter_runs() {
        let value = eval_with("2pix", &[("x", 1.0)]).unwrap();
        assert!((value - 2.0 * std::f64::consts::PI).abs() < 1e-12);
        let value = eval_with("xpi", &[("x", 2.0)]).unwrap();
        assert!((value - 2.0 * std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(eval_with("pi_1", &[("p", 2.0), ("i_1", 3.0)]).unwrap(), 6.0);
    }

    #[test]
    fn deep_nesting_is_rejected_without_overflowing() {
        let parens = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        let negations = format!("{}x", "-".repeat(10_000));
        let chain = vec!["x"; 10_000].join("+");
        for source in [parens, negations, chain] {
            assert!(matches!(
                parse(&source),
                Err(EvalError::UnsupportedSyntax(ref msg)) if msg.contains("nested")
            ));
        }
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let source = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval_with(&source, &[("x", 4.0)]).unwrap(), 4.0);
        let sum = vec!["x"; 50].join("+");
        assert_eq!(eval_with(&sum, &[("x", 1.0)]).unwrap(), 50.0);
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(
            eval_with("1/x", &[("x", 0.0)]).unwrap_err(),
            EvalError::DivisionByZero
        );
        assert_eq!(
            eval_with("0^-1", &[]).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn domain_errors_are_reported() {
        assert!(matches!(
            eval_with("ln(x)", &[("x", 0.0)]),
            Err(EvalError::Domain { .. })
        ));
        assert!(matches!(
            eval_with("sqrt(x)", &[("x", -1.0)]),
            Err(EvalError::Domain { .. })
        ));
        assert!(matches!(
            eval_with("(-8)^(1/3)", &[]),
            Err(EvalError::Domain { .. })
        ));
        assert_eq!(eval_with("10^400", &[]).unwrap_err(), EvalError::Overflow);
    }

    #[test]
    fn undefined_variables_are_reported() {
        assert_eq!(
            eval_with("x + y", &[("x", 1.0)]).unwrap_err(),
            EvalError::UndefinedVariable("y".to_string())
        );
    }

    #[test]
    fn rejects_anything_outside_the_grammar() {
        for input in [
            "__import__('os')",
            "x; y",
            "x, y",
            "x == 1",
            "1 +",
            "",
            "1..2",
            "(x",
            "sin()",
        ] {
            assert!(
                matches!(parse(input), Err(EvalError::UnsupportedSyntax(_))),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn free_variables_are_collected() {
        let expr = parse("r x (1 - x) + sin(y)").unwrap();
        let names: Vec<String> = expr.free_variables().into_iter().collect();
        assert_eq!(names, vec!["r", "x", "y"]);
    }

    #[test]
    fn evaluates_over_f32() {
        let expr = parse("x/4").unwrap();
        let value: f32 = expr.eval(&|_: &str| Some(2.0)).unwrap();
        assert_eq!(value, 0.5);
    }
}
