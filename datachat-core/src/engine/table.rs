//! Column-major tables and the number formatting used in message payloads.

use serde_json::{Map, Value as Json};

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the cell; text is not coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) if !r.is_nan() => Some(*r),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Payload form: numbers are stringified, NaN and NULL become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Int(i) => Json::String(i.to_string()),
            Value::Real(r) if r.is_nan() => Json::Null,
            Value::Real(r) => Json::String(stringify_number(*r)),
            Value::Text(s) => Json::String(s.clone()),
        }
    }

    /// Key used when counting value frequencies.
    pub fn label(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::Int(i) => i.to_string(),
            Value::Real(r) => stringify_number(*r),
            Value::Text(s) => s.clone(),
        }
    }
}

/// Format a number for display in a chat payload.
///
/// Integral values print without a fractional part; other values print with
/// three decimals, switching to scientific notation for magnitudes above 1e6
/// or below 1e-6.
pub fn stringify_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        return format!("{value:.0}");
    }
    let magnitude = value.abs();
    if magnitude > 1e6 || magnitude < 1e-6 {
        format!("{value:.3e}")
    } else {
        format!("{value:.3}")
    }
}

/// A named column and its values in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    /// `true` when every non-null value is a number and at least one exists.
    pub fn is_numeric(&self) -> bool {
        let mut seen = false;
        for v in &self.values {
            match v {
                Value::Null => {}
                Value::Int(_) | Value::Real(_) => seen = true,
                Value::Text(_) => return false,
            }
        }
        seen
    }

    /// Non-null numeric values, in row order.
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(Value::as_f64).collect()
    }
}

/// Column-major table: column name → ordered values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn with_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names
                .into_iter()
                .map(|name| Column {
                    name: name.into(),
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Append one row.  Missing trailing cells become NULL; extra cells are
    /// dropped.
    pub fn push_row(&mut self, row: Vec<Value>) {
        let mut cells = row.into_iter();
        for col in &mut self.columns {
            col.values.push(cells.next().unwrap_or(Value::Null));
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Row `idx` as a vector of cells.
    pub fn row(&self, idx: usize) -> Option<Vec<&Value>> {
        if idx >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[idx]).collect())
    }

    /// Copy of the first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values.iter().take(n).cloned().collect(),
                })
                .collect(),
        }
    }

    /// `{column: [values...]}` with numbers stringified.
    pub fn to_json_data(&self) -> Json {
        let mut map = Map::with_capacity(self.columns.len());
        for col in &self.columns {
            map.insert(
                col.name.clone(),
                Json::Array(col.values.iter().map(Value::to_json).collect()),
            );
        }
        Json::Object(map)
    }
}
