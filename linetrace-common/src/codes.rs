//! Code normalization
//!
//! Scanned and stored codes arrive as whatever scalar the source produced
//! (scanner text, spreadsheet cells, JSON rows). Everything is canonicalized
//! to a trimmed string before comparison, classification or storage.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Characters that may not appear in a storage path segment
const PATH_RESERVED: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Placeholder used when a path segment would otherwise be empty
pub const EMPTY_SEGMENT: &str = "NA";

/// Canonical scanned code (serial number or production order)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Code(String);

/// Deserialized codes are normalized on the way in, whatever scalar they were
impl<'de> Deserialize<'de> for Code {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(normalize_value(&value))
    }
}

impl Code {
    /// Wrap an already-normalized value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters (scanners may emit non-ASCII padding)
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(value: &str) -> Self {
        normalize_code(Some(value))
    }
}

/// Normalize a textual code
///
/// Trims surrounding whitespace and strips a trailing `.0` fraction left
/// behind when an integer code was re-typed as a float by a spreadsheet.
/// Absent input yields an empty code. Never fails.
///
/// # Examples
/// ```
/// use linetrace_common::normalize_code;
///
/// assert_eq!(normalize_code(Some(" 123456789.0 ")).as_str(), "123456789");
/// assert_eq!(normalize_code(None).as_str(), "");
/// ```
pub fn normalize_code(raw: Option<&str>) -> Code {
    let Some(raw) = raw else {
        return Code::default();
    };

    let trimmed = raw.trim();
    Code(strip_float_artifact(trimmed).to_string())
}

/// Normalize a JSON scalar into a code
///
/// Strings go through [`normalize_code`]; integers are rendered as-is;
/// integer-valued floats lose their fraction. Null, arrays and objects
/// yield an empty code.
pub fn normalize_value(value: &Value) -> Code {
    match value {
        Value::String(s) => normalize_code(Some(s)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Code(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Code(u.to_string())
            } else {
                normalize_code(Some(&n.to_string()))
            }
        }
        Value::Bool(b) => Code(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => Code::default(),
    }
}

fn strip_float_artifact(s: &str) -> &str {
    if let Some((whole, fraction)) = s.split_once('.') {
        let is_integer_part = !whole.is_empty()
            && whole
                .strip_prefix('-')
                .unwrap_or(whole)
                .chars()
                .all(|c| c.is_ascii_digit());
        let is_zero_fraction = !fraction.is_empty() && fraction.chars().all(|c| c == '0');
        if is_integer_part && is_zero_fraction {
            return whole;
        }
    }
    s
}

/// Make a value safe to embed as one storage path segment
///
/// Path-reserved characters and whitespace become `_`. A segment made only of
/// dots is rewritten to underscores so it cannot address a parent directory.
/// Empty input becomes [`EMPTY_SEGMENT`].
///
/// # Examples
/// ```
/// use linetrace_common::sanitize_for_path;
///
/// assert_eq!(sanitize_for_path("A/B:C"), "A_B_C");
/// assert_eq!(sanitize_for_path(""), "NA");
/// ```
pub fn sanitize_for_path(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return EMPTY_SEGMENT.to_string();
    }

    let cleaned: String = trimmed
        .chars()
        .map(|c| {
            if PATH_RESERVED.contains(&c) || c.is_whitespace() || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        return "_".repeat(cleaned.chars().count());
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_strips_float_artifact() {
        assert_eq!(normalize_code(Some("123456789.0")).as_str(), "123456789");
        assert_eq!(normalize_code(Some("98765432109.00")).as_str(), "98765432109");
    }

    #[test]
    fn test_normalize_keeps_real_fractions() {
        assert_eq!(normalize_code(Some("12.5")).as_str(), "12.5");
        assert_eq!(normalize_code(Some("AB.0")).as_str(), "AB.0");
        assert_eq!(normalize_code(Some(".0")).as_str(), ".0");
    }

    #[test]
    fn test_normalize_trims_and_handles_absent() {
        assert_eq!(normalize_code(Some("  123456789\n")).as_str(), "123456789");
        assert_eq!(normalize_code(None).as_str(), "");
        assert_eq!(normalize_code(Some("   ")).as_str(), "");
    }

    #[test]
    fn test_normalize_value_scalars() {
        assert_eq!(normalize_value(&json!(123456789)).as_str(), "123456789");
        assert_eq!(normalize_value(&json!(123456789.0)).as_str(), "123456789");
        assert_eq!(normalize_value(&json!(" 42 ")).as_str(), "42");
        assert_eq!(normalize_value(&Value::Null).as_str(), "");
        assert_eq!(normalize_value(&json!([1, 2])).as_str(), "");
    }

    #[test]
    fn test_deserialize_normalizes() {
        let codes: Vec<Code> = serde_json::from_str(r#"[" 123456789 ", 98765432109, 123456789.0, null]"#).unwrap();
        let codes: Vec<&str> = codes.iter().map(Code::as_str).collect();
        assert_eq!(codes, vec!["123456789", "98765432109", "123456789", ""]);
    }

    #[test]
    fn test_char_len_counts_characters() {
        assert_eq!(Code::from("ÁBC").char_len(), 3);
    }

    #[test]
    fn test_sanitize_reserved_characters() {
        assert_eq!(sanitize_for_path("A/B:C"), "A_B_C");
        assert_eq!(sanitize_for_path(r#"a\b*c?d"e<f>g|h"#), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize_for_path("Operador Logado"), "Operador_Logado");
    }

    #[test]
    fn test_sanitize_empty_and_traversal() {
        assert_eq!(sanitize_for_path(""), "NA");
        assert_eq!(sanitize_for_path("  "), "NA");
        assert_eq!(sanitize_for_path(".."), "__");
        assert_eq!(sanitize_for_path("../etc"), ".._etc");
    }
}
