use std::sync::OnceLock;

use regex::Regex;

use super::format_number;

/// Italian unit names and singulars mapped to the short codes.
const ALIASES: &[(&str, &str)] = &[
    ("celsius", "c"),
    ("fahrenheit", "f"),
    ("chilometri", "km"),
    ("chilometro", "km"),
    ("miglia", "mi"),
    ("miglio", "mi"),
    ("metri", "m"),
    ("metro", "m"),
    ("piedi", "ft"),
    ("piede", "ft"),
    ("centimetri", "cm"),
    ("centimetro", "cm"),
    ("pollici", "in"),
    ("pollice", "in"),
    ("chilogrammi", "kg"),
    ("chilogrammo", "kg"),
    ("chili", "kg"),
    ("libbre", "lb"),
    ("libbra", "lb"),
    ("grammi", "g"),
    ("grammo", "g"),
    ("once", "oz"),
    ("oncia", "oz"),
    ("litri", "l"),
    ("litro", "l"),
    ("galloni", "gal"),
    ("gallone", "gal"),
];

#[derive(Debug, Clone, Copy)]
enum Factor {
    Linear(f64),
    CelsiusToFahrenheit,
    FahrenheitToCelsius,
}

/// (from, to, from name, to name, factor)
const CONVERSIONS: &[(&str, &str, &str, &str, Factor)] = &[
    ("km", "mi", "chilometri", "miglia", Factor::Linear(0.621371)),
    ("mi", "km", "miglia", "chilometri", Factor::Linear(1.60934)),
    ("m", "ft", "metri", "piedi", Factor::Linear(3.28084)),
    ("ft", "m", "piedi", "metri", Factor::Linear(0.3048)),
    ("cm", "in", "centimetri", "pollici", Factor::Linear(0.393701)),
    ("in", "cm", "pollici", "centimetri", Factor::Linear(2.54)),
    ("kg", "lb", "chilogrammi", "libbre", Factor::Linear(2.20462)),
    ("lb", "kg", "libbre", "chilogrammi", Factor::Linear(0.453592)),
    ("g", "oz", "grammi", "once", Factor::Linear(0.035274)),
    ("oz", "g", "once", "grammi", Factor::Linear(28.3495)),
    ("c", "f", "Celsius", "Fahrenheit", Factor::CelsiusToFahrenheit),
    ("f", "c", "Fahrenheit", "Celsius", Factor::FahrenheitToCelsius),
    ("l", "gal", "litri", "galloni", Factor::Linear(0.264172)),
    ("gal", "l", "galloni", "litri", Factor::Linear(3.78541)),
];

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(-?\d+(?:[.,]\d+)?)\s*(\w+)\s+(?:to|in|a)\s+(\w+)").unwrap())
}

fn canonical(unit: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == unit)
        .map(|(_, code)| *code)
        .unwrap_or(unit)
}

/// Convert an expression like `"10 km to mi"` or `"25 celsius in fahrenheit"`.
///
/// Returns the sentence shown to the user, e.g. `"10 chilometri = 6.21 miglia"`.
pub fn convert(expression: &str) -> Result<String, String> {
    let lower = expression.to_lowercase();
    let caps = pattern().captures(&lower).ok_or_else(|| {
        format!(
            "Formato conversione non riconosciuto: '{}'. Usa: 'numero unità_origine to unità_destinazione'",
            expression
        )
    })?;

    let value: f64 = caps[1]
        .replace(',', ".")
        .parse()
        .map_err(|_| format!("numero non valido '{}'", &caps[1]))?;
    let from = canonical(&caps[2]);
    let to = canonical(&caps[3]);

    let (_, _, from_name, to_name, factor) = CONVERSIONS
        .iter()
        .find(|(f, t, ..)| *f == from && *t == to)
        .ok_or_else(|| format!("Conversione da {} a {} non supportata", from, to))?;

    let result = match factor {
        Factor::Linear(k) => value * k,
        Factor::CelsiusToFahrenheit => value * 9.0 / 5.0 + 32.0,
        Factor::FahrenheitToCelsius => (value - 32.0) * 5.0 / 9.0,
    };
    let result = if result.fract() == 0.0 {
        format_number(result)
    } else {
        format!("{:.2}", result)
    };

    Ok(format!("{} {} = {} {}", format_number(value), from_name, result, to_name))
}
