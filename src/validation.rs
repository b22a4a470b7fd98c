//! Field-level structural validation of inbound bodies.
//!
//! Each body is parsed into a `serde_json::Value` first, then every field is decoded on
//! its own so that all problems are reported together, keyed by their path in the body
//! (`range.from`, `targets[1].type`, ...). Nothing downstream sees a body that failed here.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{FieldError, Result, SimpleJsonError};
use crate::models::{
    Annotation, AnnotationRequest, Filter, QueryRequest, SearchRequest, TagValuesRequest, Target,
    TimeRange,
};

/// Builds a typed body out of a JSON value, recording problems in the validator.
pub trait Validate: Sized {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self>;
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    pub fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value.as_object() {
            Some(obj) => Some(obj),
            None => {
                let field = if path.is_empty() { "$" } else { path };
                self.error(field, "expected an object");
                None
            }
        }
    }

    fn leaf<T: DeserializeOwned>(&mut self, value: &Value, path: &str) -> Option<T> {
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                self.error(path, err.to_string());
                None
            }
        }
    }

    /// A scalar field that must be present and non-null.
    pub fn required<T: DeserializeOwned>(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        name: &str,
    ) -> Option<T> {
        let path = join(prefix, name);
        match obj.get(name) {
            None | Some(Value::Null) => {
                self.error(path, "field is required");
                None
            }
            Some(value) => self.leaf(value, &path),
        }
    }

    /// A scalar field that may be absent or null. The outer `Option` is `None` on a decode failure.
    pub fn optional<T: DeserializeOwned>(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        name: &str,
    ) -> Option<Option<T>> {
        match obj.get(name) {
            None | Some(Value::Null) => Some(None),
            Some(value) => self.leaf(value, &join(prefix, name)).map(Some),
        }
    }

    pub fn nested<T: Validate>(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        name: &str,
    ) -> Option<T> {
        let path = join(prefix, name);
        match obj.get(name) {
            None | Some(Value::Null) => {
                self.error(path, "field is required");
                None
            }
            Some(value) => T::validate(value, &path, self),
        }
    }

    /// A list of nested structures. Absent or null lists decode to `default_empty`
    /// when allowed, otherwise they are reported as missing.
    pub fn list<T: Validate>(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        name: &str,
        default_empty: bool,
    ) -> Option<Vec<T>> {
        let path = join(prefix, name);
        let items = match obj.get(name) {
            None | Some(Value::Null) if default_empty => return Some(Vec::new()),
            None | Some(Value::Null) => {
                self.error(path, "field is required");
                return None;
            }
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.error(path, "expected an array");
                return None;
            }
        };

        let mut decoded = Vec::with_capacity(items.len());
        let mut complete = true;
        for (index, item) in items.iter().enumerate() {
            match T::validate(item, &format!("{}[{}]", path, index), self) {
                Some(value) => decoded.push(value),
                None => complete = false,
            }
        }
        complete.then_some(decoded)
    }

    pub fn finish<T>(self, value: Option<T>) -> Result<T> {
        match value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ if self.errors.is_empty() => Err(SimpleJsonError::Internal(
                "validation produced no value and no errors".to_string(),
            )),
            _ => Err(SimpleJsonError::Validation(self.errors)),
        }
    }
}

/// Decodes and validates a raw request body.
///
/// Returns `Ok(None)` when the body is empty or the JSON literal `null`; callers decide
/// whether a missing body is acceptable.
pub fn decode_body<T: Validate>(body: &[u8]) -> Result<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(body)?;
    if value.is_null() {
        return Ok(None);
    }

    let mut validator = Validator::new();
    let decoded = T::validate(&value, "", &mut validator);
    validator.finish(decoded).map(Some)
}

impl Validate for TimeRange {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let from = v.required::<DateTime<Utc>>(obj, path, "from");
        let to = v.required::<DateTime<Utc>>(obj, path, "to");
        let (from, to) = (from?, to?);
        if from > to {
            let field = if path.is_empty() { "$" } else { path };
            v.error(field, "`from` must not be after `to`");
            return None;
        }
        Some(TimeRange::new(from, to))
    }
}

impl Validate for Filter {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let key = v.required(obj, path, "key");
        let operator = v.required(obj, path, "operator");
        let value = v.required(obj, path, "value");
        Some(Filter {
            key: key?,
            operator: operator?,
            value: value?,
        })
    }
}

impl Validate for Target {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let name = v.required(obj, path, "target");
        let ref_id = v.optional::<String>(obj, path, "refId");
        let kind = v.required(obj, path, "type");
        Some(Target {
            name: name?,
            ref_id: ref_id?.unwrap_or_default(),
            kind: kind?,
        })
    }
}

impl Validate for QueryRequest {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let panel_id = v.optional::<i64>(obj, path, "panelId");
        let range = v.nested::<TimeRange>(obj, path, "range");
        let interval_ms = v.optional::<u64>(obj, path, "intervalMs");
        let targets = v.list::<Target>(obj, path, "targets", false);
        let adhoc_filters = v.list::<Filter>(obj, path, "adhocFilters", true);
        let max_data_points = v.optional::<u32>(obj, path, "maxDataPoints");
        Some(QueryRequest {
            panel_id: panel_id?.unwrap_or_default(),
            range: range?,
            interval_ms: interval_ms?.unwrap_or_default(),
            targets: targets?,
            adhoc_filters: adhoc_filters?,
            max_data_points: max_data_points?,
        })
    }
}

impl Validate for SearchRequest {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let target = v.optional::<String>(obj, path, "target");
        Some(SearchRequest { target: target? })
    }
}

impl Validate for Annotation {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let name = v.required(obj, path, "name");
        let datasource = v.optional(obj, path, "datasource");
        let enable = v.optional(obj, path, "enable");
        let icon_color = v.optional(obj, path, "iconColor");
        let query = v.optional(obj, path, "query");
        Some(Annotation {
            name: name?,
            datasource: datasource?,
            enable: enable?,
            icon_color: icon_color?,
            query: query?,
        })
    }
}

impl Validate for AnnotationRequest {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let range = v.nested(obj, path, "range");
        let annotation = v.nested(obj, path, "annotation");
        Some(AnnotationRequest {
            range: range?,
            annotation: annotation?,
        })
    }
}

impl Validate for TagValuesRequest {
    fn validate(value: &Value, path: &str, v: &mut Validator) -> Option<Self> {
        let obj = v.object(value, path)?;
        let key = v.required(obj, path, "key");
        Some(TagValuesRequest { key: key? })
    }
}
