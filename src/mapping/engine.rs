//! Schema-driven request construction

use serde_json::{Map, Number, Value};
use tracing::debug;

use super::{MappingError, ParameterConfig, ProviderRequest, ProviderSchema};
use crate::native::request::CanonicalRequest;

/// Build a provider request body from `request` according to `schema`
///
/// For every schema key, each of its configs is applied in declared order:
/// the canonical value (or the config's default) is resolved, clamped to the
/// declared range, optionally transformed against the full request and
/// written to the target field. Out-of-range numbers are always clamped.
pub fn build_request(
    schema: &ProviderSchema,
    request: &CanonicalRequest,
) -> Result<ProviderRequest, MappingError> {
    let mut output = Map::new();

    for (key, param) in schema.iter() {
        for config in param.configs() {
            if let Some(value) = resolve_config(key, config, request)? {
                set_path(&mut output, &config.target_field, value);
            }
        }
    }

    Ok(output)
}

/// Compute the value one config writes, or `None` to leave the target unset
fn resolve_config(
    key: &str,
    config: &ParameterConfig,
    request: &CanonicalRequest,
) -> Result<Option<Value>, MappingError> {
    let (value, from_request) = match request.get(key) {
        Some(value) if !value.is_null() => (value.clone(), true),
        _ => match config.default.as_ref().and_then(|d| d.resolve(request)) {
            Some(value) => (value, false),
            None if config.required => {
                return Err(MappingError::MissingRequiredParameter(key.to_string()))
            }
            None => return Ok(None),
        },
    };

    let value = match clamp_number(&value, config.min, config.max) {
        Some(clamped) => {
            debug!(key = %key, from = %value, to = %clamped, "Clamped out-of-range parameter");
            clamped
        }
        None => value,
    };

    // Defaults are already in provider shape
    if !from_request {
        return Ok(Some(value));
    }

    match &config.transform {
        Some(rule) if request.get(key) == Some(&value) => Ok(rule.compute(request)),
        Some(rule) => Ok(rule.compute(&request.with(key, value))),
        None => Ok(Some(value)),
    }
}

/// Clamp a numeric value into `[min, max]`
///
/// Returns `None` when the value is not a number or already in range.
/// Integers stay integers when the bound they are clamped to is integral.
pub fn clamp_number(value: &Value, min: Option<f64>, max: Option<f64>) -> Option<Value> {
    if min.is_none() && max.is_none() {
        return None;
    }
    let number = value.as_f64()?;

    let bound = match (min, max) {
        (Some(lo), _) if number < lo => lo,
        (_, Some(hi)) if number > hi => hi,
        _ => return None,
    };

    if (value.is_i64() || value.is_u64()) && bound.fract() == 0.0 {
        return Some(Value::from(bound as i64));
    }
    Number::from_f64(bound).map(Value::Number)
}

/// Write `value` at a dotted path, creating intermediate objects
///
/// A non-object found along the path is replaced by an object.
pub fn set_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }

        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
}
