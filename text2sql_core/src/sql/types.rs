use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Integer,
    Real,
    Text,
}

/// A scalar cell value. Seed rows in TOML map onto the first matching variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Real),
            Value::Text(_) => Some(DataType::Text),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn from_bool(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }

    /// Numeric view of the value. Text that does not parse as a number reads as zero.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => Some(s.trim().parse().unwrap_or(0.0)),
            Value::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Text(s) => Some(s.trim().parse().unwrap_or(0)),
            Value::Null => None,
        }
    }

    /// Truth value under SQL three-valued logic; `None` is UNKNOWN.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Text(s) => Some(s.trim().parse::<f64>().map(|f| f != 0.0).unwrap_or(false)),
        }
    }

    /// Applies column affinity the way the store keeps seeded values.
    pub fn coerce(self, data_type: DataType) -> Value {
        match (self, data_type) {
            (Value::Integer(i), DataType::Real) => Value::Float(i as f64),
            (Value::Float(f), DataType::Integer) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Value::Integer(f as i64)
            }
            (Value::Integer(i), DataType::Text) => Value::Text(i.to_string()),
            (Value::Float(f), DataType::Text) => Value::Text(Value::Float(f).to_string()),
            (value, _) => value,
        }
    }

    /// Total ordering used by ORDER BY, MIN/MAX and comparisons.
    /// NULL sorts first, numbers before text, numbers compare numerically.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Integer(l), Value::Integer(r)) => l.cmp(r),
            (Value::Text(l), Value::Text(r)) => l.cmp(r),
            (Value::Text(_), _) => Ordering::Greater,
            (_, Value::Text(_)) => Ordering::Less,
            (l, r) => {
                let l = l.as_f64().unwrap_or(0.0);
                let r = r.as_f64().unwrap_or(0.0);
                l.partial_cmp(&r).unwrap_or(Ordering::Equal)
            }
        }
    }

    /// Comparison for predicates: UNKNOWN when either side is NULL. Text
    /// that reads as a number compares numerically against a number, so
    /// `id = '1'` matches an INTEGER column.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        let ordering = match (self, other) {
            (Value::Text(s), Value::Integer(_) | Value::Float(_)) => match parse_number(s) {
                Some(number) => number.sort_cmp(other),
                None => self.sort_cmp(other),
            },
            (Value::Integer(_) | Value::Float(_), Value::Text(s)) => match parse_number(s) {
                Some(number) => self.sort_cmp(&number),
                None => self.sort_cmp(other),
            },
            _ => self.sort_cmp(other),
        };
        Some(ordering)
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    s.parse::<i64>()
        .map(Value::Integer)
        .or_else(|_| s.parse::<f64>().map(Value::Float))
        .ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{:.1}", v)
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Null => f.write_str("NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}
