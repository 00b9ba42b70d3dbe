//! Local calculator: arithmetic, percentages, unit conversions and
//! polynomial equations in `x` up to degree two.

pub mod expr;
pub mod units;

use std::fmt;
use std::str::FromStr;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::Provider;

use crate::http::required_str;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcType {
    Arithmetic,
    Percentage,
    Conversion,
    Equation,
}

impl CalcType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalcType::Arithmetic => "ARITHMETIC",
            CalcType::Percentage => "PERCENTAGE",
            CalcType::Conversion => "CONVERSION",
            CalcType::Equation => "EQUATION",
        }
    }

    /// Marker prefixed to the result line.
    pub fn marker(&self) -> &'static str {
        match self {
            CalcType::Arithmetic => "🔢",
            CalcType::Percentage => "📊",
            CalcType::Conversion => "🔄",
            CalcType::Equation => "📐",
        }
    }
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalcType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ARITHMETIC" => Ok(CalcType::Arithmetic),
            "PERCENTAGE" => Ok(CalcType::Percentage),
            "CONVERSION" => Ok(CalcType::Conversion),
            "EQUATION" => Ok(CalcType::Equation),
            other => Err(format!("unknown calculation type '{}'", other)),
        }
    }
}

/// Integers print without decimals; everything else with up to six.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let s = format!("{:.6}", n);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Solve `lhs = rhs` (or `expr = 0` when there is no `=`) for `x`.
///
/// The equation is sampled at a few points to recover the coefficients of
/// `a*x^2 + b*x + c`; anything that does not fit a polynomial of degree two
/// is rejected.
pub fn solve_equation(expression: &str) -> std::result::Result<String, String> {
    let (lhs, rhs) = match expression.split_once('=') {
        Some((l, r)) => (l.to_string(), r.to_string()),
        None => (expression.to_string(), "0".to_string()),
    };
    let f = |x: f64| -> std::result::Result<f64, String> {
        let l = expr::evaluate(&lhs, Some(x)).map_err(|e| e.to_string())?;
        let r = expr::evaluate(&rhs, Some(x)).map_err(|e| e.to_string())?;
        Ok(l - r)
    };

    let (f0, f1, f2) = (f(0.0)?, f(1.0)?, f(2.0)?);
    let a = (f2 - 2.0 * f1 + f0) / 2.0;
    let b = f1 - f0 - a;
    let c = f0;

    for probe in [-1.0, 3.0, 0.5] {
        let expected = a * probe * probe + b * probe + c;
        if (f(probe)? - expected).abs() > 1e-6 * (1.0 + expected.abs()) {
            return Err("Posso risolvere solo equazioni di primo o secondo grado in x".into());
        }
    }

    if a.abs() < EPS {
        if b.abs() < EPS {
            return Ok(if c.abs() < EPS {
                "Infinite soluzioni".into()
            } else {
                "Nessuna soluzione trovata".into()
            });
        }
        return Ok(format!("x = {}", format_number(-c / b)));
    }

    let disc = b * b - 4.0 * a * c;
    if disc < -EPS {
        return Ok("Nessuna soluzione reale".into());
    }
    if disc.abs() <= EPS {
        return Ok(format!("x = {}", format_number(-b / (2.0 * a))));
    }
    let sq = disc.sqrt();
    let mut roots = [(-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)];
    roots.sort_by(|p, q| p.total_cmp(q));
    Ok(format!(
        "x = {}, {}",
        format_number(roots[0]),
        format_number(roots[1])
    ))
}

/// Evaluate one calculation of the given type.
pub fn calculate(kind: CalcType, expression: &str) -> std::result::Result<String, String> {
    match kind {
        CalcType::Conversion => units::convert(expression),
        CalcType::Equation => solve_equation(expression),
        CalcType::Arithmetic | CalcType::Percentage => expr::evaluate(expression, None)
            .map(format_number)
            .map_err(|e| format!("Impossibile valutare l'espressione '{}': {}", expression, e)),
    }
}

/// Local provider wrapping [`calculate`].
///
/// Input: `{"type": "ARITHMETIC", "expression": "2+2"}`.
/// Output: `{"type": "ARITHMETIC", "result": "4"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorProvider;

impl Provider for CalculatorProvider {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Arithmetic, percentages, unit conversions and simple equations"
    }

    fn fetch(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        let out = (|| -> Result<Value> {
            let expression = required_str(&input, "expression")?;
            let kind = match input.get("type").and_then(Value::as_str) {
                Some(t) => t.parse::<CalcType>().map_err(ConciergeError::ProviderInput)?,
                None => CalcType::Arithmetic,
            };
            let result =
                calculate(kind, expression).map_err(|e| ConciergeError::provider("calculator", e))?;
            Ok(json!({ "type": kind.as_str(), "result": result }))
        })();
        Box::pin(std::future::ready(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_linear_equation() {
        assert_eq!(solve_equation("2*x+5-13").unwrap(), "x = 4");
        assert_eq!(solve_equation("2x+5=13").unwrap(), "x = 4");
        assert_eq!(solve_equation("3x = 1").unwrap(), "x = 0.333333");
    }

    #[test]
    fn test_quadratic_equation() {
        assert_eq!(solve_equation("x^2=16").unwrap(), "x = -4, 4");
        assert_eq!(solve_equation("x^2 - 2x + 1").unwrap(), "x = 1");
        assert_eq!(solve_equation("x^2 + 1").unwrap(), "Nessuna soluzione reale");
    }

    #[test]
    fn test_degenerate_and_unsupported_equations() {
        assert_eq!(solve_equation("x = x + 1").unwrap(), "Nessuna soluzione trovata");
        assert_eq!(solve_equation("2x = x + x").unwrap(), "Infinite soluzioni");
        assert!(solve_equation("x^3 = 8").is_err());
    }

    #[tokio::test]
    async fn test_provider_dispatches_on_type() {
        let p = CalculatorProvider;
        let out = p
            .fetch(json!({"type": "PERCENTAGE", "expression": "100 * 0.20"}))
            .await
            .unwrap();
        assert_eq!(out["result"], "20");

        let out = p
            .fetch(json!({"type": "conversion", "expression": "10 km to mi"}))
            .await
            .unwrap();
        assert_eq!(out["result"], "10 chilometri = 6.21 miglia");

        let err = p
            .fetch(json!({"type": "ARITHMETIC", "expression": "2 +"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Provider { .. }));
    }
}
