//! Raw spreadsheet cell values

use std::fmt;

use chrono::NaiveDate;

/// One raw cell as read from a sheet, before any field parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Blank cell, or a blank marker such as `-` or `N/A`
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Replace blank markers with `Empty`; markers are compared after trimming
    pub fn blank_out(self, markers: &[String]) -> Cell {
        match self {
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() || markers.iter().any(|m| m == trimmed) {
                    Cell::Empty
                } else {
                    Cell::Text(s)
                }
            }
            Cell::Number(n) if n.is_nan() => Cell::Empty,
            other => other,
        }
    }

    /// Integral value of a numeric cell
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(*n as i64),
            _ => None,
        }
    }

    /// Cell content as trimmed text; numbers print without a trailing `.0`
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.trim().to_string()),
            Cell::Number(n) => Some(match self.as_integer() {
                Some(i) => i.to_string(),
                None => n.to_string(),
            }),
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => write!(f, "{}", text),
            None => Ok(()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["".into(), "-".into(), "N/A".into()]
    }

    #[test]
    fn test_blank_out() {
        assert_eq!(Cell::from(" - ").blank_out(&markers()), Cell::Empty);
        assert_eq!(Cell::from("   ").blank_out(&markers()), Cell::Empty);
        assert_eq!(Cell::Number(f64::NAN).blank_out(&markers()), Cell::Empty);
        assert_eq!(Cell::from("A1-1-1").blank_out(&markers()), Cell::from("A1-1-1"));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Cell::Number(94.0).to_text().as_deref(), Some("94"));
        assert_eq!(Cell::Number(150.5).to_text().as_deref(), Some("150.5"));
        assert_eq!(Cell::from("  x ").to_text().as_deref(), Some("x"));
        assert_eq!(Cell::Empty.to_text(), None);
    }
}
