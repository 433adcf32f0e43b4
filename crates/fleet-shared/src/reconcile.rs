//! Field reconciliation across collector dialects.
//!
//! Windows and macOS collectors name the same fact differently (`macAddress`,
//! `mac_address`, `MacAddress`, `ether`), nest it at different depths, and
//! sometimes send placeholder strings instead of nothing. Every normalizer
//! resolves raw values through a [`Field`]: a canonical name plus an ordered
//! list of dotted paths. The first present value wins.
//!
//! "Present" excludes `null`, empty strings and the literal strings `"null"` /
//! `"undefined"` that some serializers emit for missing values. Absence is
//! always reported as `None`, never as a placeholder.

use serde_json::Value;
use tracing::warn;

/// A logical field and the raw paths that may carry it, in priority order.
///
/// Paths are dotted (`"memory.totalBytes"`); numeric segments index arrays
/// (`"volumes.0.name"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub paths: &'static [&'static str],
}

impl Field {
    pub const fn new(name: &'static str, paths: &'static [&'static str]) -> Self {
        Self { name, paths }
    }

    /// First present raw value.
    pub fn resolve<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        resolve(record, self.paths)
    }

    /// First path whose value survives `convert`.
    ///
    /// Used for typed fields where an early alias may hold a differently
    /// shaped value (an object where a number was expected, say).
    pub fn find_map<'a, T>(
        &self,
        record: &'a Value,
        convert: impl Fn(&'a Value) -> Option<T>,
    ) -> Option<T> {
        self.paths
            .iter()
            .filter_map(|path| lookup(record, path))
            .filter(|value| !is_absent(value))
            .find_map(convert)
    }

    pub fn string(&self, record: &Value) -> Option<String> {
        self.find_map(record, value_to_string)
    }

    pub fn bool(&self, record: &Value) -> Option<bool> {
        self.find_map(record, as_bool)
    }

    pub fn f64(&self, record: &Value) -> Option<f64> {
        self.find_map(record, as_f64)
    }

    pub fn u64(&self, record: &Value) -> Option<u64> {
        self.find_map(record, as_u64)
    }

    pub fn i64(&self, record: &Value) -> Option<i64> {
        self.find_map(record, as_i64)
    }

    /// First present object.
    pub fn object<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.find_map(record, |v| v.is_object().then_some(v))
    }

    /// Object records under the first path holding an array.
    ///
    /// A present value of the wrong shape degrades to an empty list and is
    /// logged; it never poisons sibling fields.
    pub fn records<'a>(&self, record: &'a Value) -> Vec<&'a Value> {
        match self.resolve(record) {
            None => Vec::new(),
            Some(value) => records_of(value, self.name),
        }
    }

    /// Object records under every path that holds an array, concatenated.
    pub fn all_records<'a>(&self, record: &'a Value) -> Vec<&'a Value> {
        self.paths
            .iter()
            .filter_map(|path| lookup(record, path))
            .filter(|value| !is_absent(value))
            .flat_map(|value| records_of(value, self.name))
            .collect()
    }

    /// String list from an array of scalars or a single comma-separated string.
    pub fn strings(&self, record: &Value) -> Vec<String> {
        match self.resolve(record) {
            Some(Value::Array(items)) => items.iter().filter_map(value_to_string).collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !is_absent_str(s))
                .map(str::to_string)
                .collect(),
            Some(other) => value_to_string(other).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// Walk a dotted path. Missing segments yield `None`, never a panic.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// First present value among `paths`, in order.
pub fn resolve<'a>(record: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup(record, path))
        .find(|value| !is_absent(value))
}

/// Whether a raw value counts as "not reported".
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => is_absent_str(s),
        _ => false,
    }
}

fn is_absent_str(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("undefined")
}

/// Scalar to trimmed string. Objects and arrays are not strings.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_absent_str(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lenient boolean coercion covering the spellings collectors actually send.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" | "enabled" | "enable" | "up" | "active"
            | "connected" => Some(true),
            "false" | "no" | "n" | "0" | "off" | "disabled" | "disable" | "down"
            | "inactive" | "disconnected" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Non-negative integer; fractional values truncate, negatives are rejected.
pub fn as_u64(value: &Value) -> Option<u64> {
    if let Value::Number(n) = value {
        if let Some(u) = n.as_u64() {
            return Some(u);
        }
    }
    let f = as_f64(value)?;
    (f >= 0.0 && f <= u64::MAX as f64).then(|| f.trunc() as u64)
}

pub fn as_i64(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    let f = as_f64(value)?;
    (f >= i64::MIN as f64 && f <= i64::MAX as f64).then(|| f.trunc() as i64)
}

fn records_of<'a>(value: &'a Value, field: &str) -> Vec<&'a Value> {
    match value {
        Value::Array(items) => items.iter().filter(|item| item.is_object()).collect(),
        other => {
            warn!(field, kind = json_kind(other), "expected an array, ignoring field");
            Vec::new()
        }
    }
}

/// Short JSON type name for diagnostics.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAC: Field = Field::new("mac", &["macAddress", "mac_address", "MacAddress", "hw.ether"]);

    #[test]
    fn test_first_present_alias_wins() {
        let record = json!({"mac_address": "aa:bb", "MacAddress": "cc:dd"});
        assert_eq!(MAC.string(&record), Some("aa:bb".to_string()));
    }

    #[test]
    fn test_placeholders_are_absent() {
        for placeholder in [json!(null), json!(""), json!("  "), json!("null"), json!("undefined")] {
            let record = json!({"macAddress": placeholder, "MacAddress": "cc:dd"});
            assert_eq!(MAC.string(&record), Some("cc:dd".to_string()));
        }
    }

    #[test]
    fn test_nested_path_and_missing_segments() {
        let record = json!({"hw": {"ether": "ee:ff"}});
        assert_eq!(MAC.string(&record), Some("ee:ff".to_string()));

        let broken = json!({"hw": "not an object"});
        assert_eq!(MAC.resolve(&broken), None);
    }

    #[test]
    fn test_lookup_indexes_arrays() {
        let record = json!({"volumes": [{"name": "C:"}, {"name": "D:"}]});
        assert_eq!(lookup(&record, "volumes.1.name"), Some(&json!("D:")));
        assert_eq!(lookup(&record, "volumes.9.name"), None);
        assert_eq!(lookup(&record, "volumes.x.name"), None);
    }

    #[test]
    fn test_zero_is_not_absent() {
        let record = json!({"count": 0, "flag": false});
        let count = Field::new("count", &["count"]);
        let flag = Field::new("flag", &["flag"]);
        assert_eq!(count.u64(&record), Some(0));
        assert_eq!(flag.bool(&record), Some(false));
    }

    #[test]
    fn test_find_map_skips_wrong_shapes() {
        let memory = Field::new("memory", &["memory", "totalMemory"]);
        let record = json!({"memory": {"slots": 2}, "totalMemory": 17179869184u64});
        assert_eq!(memory.u64(&record), Some(17179869184));
    }

    #[test]
    fn test_bool_spellings() {
        assert_eq!(as_bool(&json!(1)), Some(true));
        assert_eq!(as_bool(&json!(0)), Some(false));
        assert_eq!(as_bool(&json!("Up")), Some(true));
        assert_eq!(as_bool(&json!("Disconnected")), Some(false));
        assert_eq!(as_bool(&json!("maybe")), None);
    }

    #[test]
    fn test_numbers_from_strings() {
        assert_eq!(as_f64(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(as_u64(&json!("42")), Some(42));
        assert_eq!(as_u64(&json!(-3)), None);
        assert_eq!(as_i64(&json!("-3")), Some(-3));
        assert_eq!(as_f64(&json!("NaN")), None);
    }

    #[test]
    fn test_records_degrade_on_wrong_shape() {
        let items = Field::new("items", &["items"]);
        assert!(items.records(&json!({"items": {"a": 1}})).is_empty());
        assert_eq!(items.records(&json!({"items": [{"a": 1}, 7, {"b": 2}]})).len(), 2);
        assert!(items.records(&json!({})).is_empty());
    }

    #[test]
    fn test_strings_accepts_list_or_csv() {
        let dns = Field::new("dns", &["dns"]);
        assert_eq!(dns.strings(&json!({"dns": ["1.1.1.1", null, "8.8.8.8"]})).len(), 2);
        assert_eq!(
            dns.strings(&json!({"dns": "1.1.1.1, 8.8.8.8"})),
            vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]
        );
    }
}
