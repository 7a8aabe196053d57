use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInt {
    pub value: i64,
    pub warned: bool,
}

impl ParsedInt {
    const fn ok(value: i64) -> Self {
        Self {
            value,
            warned: false,
        }
    }

    const fn warned(value: i64) -> Self {
        Self {
            value,
            warned: true,
        }
    }
}

pub fn coerce_int(value: &Value, default: i64) -> ParsedInt {
    match value {
        Value::Null => ParsedInt::ok(default),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() => ParsedInt::ok(f.round() as i64),
            _ => ParsedInt::warned(default),
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return ParsedInt::ok(default);
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => ParsedInt::ok(f.round() as i64),
                _ => ParsedInt::warned(default),
            }
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => ParsedInt::warned(default),
    }
}

pub fn safe_parse_int(value: &Value, default: i64) -> ParsedInt {
    let parsed = coerce_int(value, default);
    ParsedInt {
        value: parsed.value.max(0),
        warned: parsed.warned,
    }
}
