//! Arithmetic expression evaluator.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary | implicit)*
//! unary   := '-' unary | '+' unary | power
//! power   := postfix ('^' unary)?
//! postfix := atom '%'*
//! atom    := number | 'x' | func '(' expr ')' | '(' expr ')'
//! ```
//!
//! Implicit multiplication covers `2x`, `3(4+1)` and `(1+1)(2+2)`.

use std::fmt;

/// Nesting allowed through parentheses, signs, powers and function calls.
const MAX_DEPTH: usize = 64;
const MAX_INPUT_CHARS: usize = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    UnexpectedChar(char),
    UnexpectedEnd,
    UnexpectedToken(String),
    UnknownFunction(String),
    FreeVariable,
    DivisionByZero,
    NotFinite,
    TooDeep,
    TooLong,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnexpectedChar(c) => write!(f, "carattere non valido '{}'", c),
            EvalError::UnexpectedEnd => write!(f, "espressione incompleta"),
            EvalError::UnexpectedToken(t) => write!(f, "simbolo inatteso '{}'", t),
            EvalError::UnknownFunction(name) => write!(f, "funzione sconosciuta '{}'", name),
            EvalError::FreeVariable => write!(f, "l'espressione contiene la variabile x"),
            EvalError::DivisionByZero => write!(f, "divisione per zero"),
            EvalError::NotFinite => write!(f, "risultato non finito"),
            EvalError::TooDeep => write!(f, "espressione troppo annidata"),
            EvalError::TooLong => write!(f, "espressione troppo lunga"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{}", n),
            Token::Ident(s) => f.write_str(s),
            Token::Op(c) => write!(f, "{}", c),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let normalized = input
        .replace("**", "^")
        .replace(['×', '·'], "*")
        .replace([':', '÷'], "/");
    let chars: Vec<char> = normalized.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '0'..='9' | '.' | ',' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == ',') {
                    i += 1;
                }
                // Italian decimal comma
                let text: String = chars[start..i].iter().collect::<String>().replace(',', ".");
                let n = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Num(n));
            }
            '+' | '-' | '*' | '/' | '^' | '%' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' | '[' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' | ']' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_alphabetic() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect::<String>().to_lowercase();
                tokens.push(Token::Ident(word));
            }
            other => return Err(EvalError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    x: Option<f64>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    /// Run one level of recursion, failing once `MAX_DEPTH` is exceeded.
    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<f64, EvalError>,
    ) -> Result<f64, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Op('*')) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Op('/')) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    value /= rhs;
                }
                Some(Token::Num(_)) | Some(Token::Ident(_)) | Some(Token::LParen) => {
                    value *= self.power()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, EvalError> {
        self.nested(Self::signed)
    }

    fn signed(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.postfix()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<f64, EvalError> {
        let mut value = self.atom()?;
        while let Some(Token::Op('%')) = self.peek() {
            self.pos += 1;
            value /= 100.0;
        }
        Ok(value)
    }

    fn atom(&mut self) -> Result<f64, EvalError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.nested(Self::expr)?;
                match self.next() {
                    Some(Token::RParen) => Ok(v),
                    Some(t) => Err(EvalError::UnexpectedToken(t.to_string())),
                    None => Err(EvalError::UnexpectedEnd),
                }
            }
            Some(Token::Ident(name)) => self.ident(&name),
            Some(t) => Err(EvalError::UnexpectedToken(t.to_string())),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn ident(&mut self, name: &str) -> Result<f64, EvalError> {
        match name {
            "x" => self.x.ok_or(EvalError::FreeVariable),
            "pi" => Ok(std::f64::consts::PI),
            "e" => Ok(std::f64::consts::E),
            "sqrt" | "radice" | "abs" | "ln" | "log" | "sin" | "cos" | "tan" => {
                let arg = self.nested(Self::atom)?;
                Ok(match name {
                    "sqrt" | "radice" => arg.sqrt(),
                    "abs" => arg.abs(),
                    "ln" => arg.ln(),
                    "log" => arg.log10(),
                    "sin" => arg.sin(),
                    "cos" => arg.cos(),
                    _ => arg.tan(),
                })
            }
            other => Err(EvalError::UnknownFunction(other.to_string())),
        }
    }
}

/// Evaluate `input`, substituting `x` when given.
pub fn evaluate(input: &str, x: Option<f64>) -> Result<f64, EvalError> {
    if input.chars().count() > MAX_INPUT_CHARS {
        return Err(EvalError::TooLong);
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvalError::UnexpectedEnd);
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        x,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(EvalError::UnexpectedToken(t.to_string()));
    }
    if !value.is_finite() {
        return Err(EvalError::NotFinite);
    }
    Ok(value)
}
