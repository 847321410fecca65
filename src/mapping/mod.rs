//! Declarative parameter mapping
//!
//! A [`ProviderSchema`] maps canonical request keys to provider target fields.
//! Each key carries one [`ParameterConfig`] or an ordered list of them, so a
//! single canonical key can populate several independent target fields.
//!
//! Defaults and transforms are [`Rule`]s: anything that can compute a value
//! from the full canonical request. Closures implement `Rule` directly.

mod engine;
mod error;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::native::request::CanonicalRequest;

pub use engine::{build_request, clamp_number, set_path};
pub use error::MappingError;

/// Provider request body built by the engine
pub type ProviderRequest = Map<String, Value>;

/// Kind of upstream call a schema describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Chat,
    Complete,
    Embed,
    Image,
    Speech,
    Transcription,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Chat => "chat",
            Operation::Complete => "complete",
            Operation::Embed => "embed",
            Operation::Image => "image",
            Operation::Speech => "speech",
            Operation::Transcription => "transcription",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A computed value derived from the full canonical request
///
/// Returning `None` means "no value": the target field is left unwritten.
pub trait Rule: Send + Sync {
    fn compute(&self, request: &CanonicalRequest) -> Option<Value>;
}

impl<F> Rule for F
where
    F: Fn(&CanonicalRequest) -> Option<Value> + Send + Sync,
{
    fn compute(&self, request: &CanonicalRequest) -> Option<Value> {
        self(request)
    }
}

/// Shared handle to a rule
#[derive(Clone)]
pub struct RuleRef(Arc<dyn Rule>);

impl RuleRef {
    pub fn new(rule: impl Rule + 'static) -> Self {
        Self(Arc::new(rule))
    }

    pub fn compute(&self, request: &CanonicalRequest) -> Option<Value> {
        self.0.compute(request)
    }
}

impl fmt::Debug for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rule(..)")
    }
}

/// Default used when the canonical request lacks a key
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Literal(Value),
    Computed(RuleRef),
}

impl DefaultValue {
    pub fn resolve(&self, request: &CanonicalRequest) -> Option<Value> {
        match self {
            DefaultValue::Literal(value) => Some(value.clone()),
            DefaultValue::Computed(rule) => rule.compute(request),
        }
    }
}

/// How one canonical key is written into a provider request
#[derive(Debug, Clone)]
pub struct ParameterConfig {
    /// Target field; dots address nested objects (`metadata.user_id`)
    pub target_field: String,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub transform: Option<RuleRef>,
}

impl ParameterConfig {
    /// Pass-through config writing to `target_field`
    pub fn new(target_field: impl Into<String>) -> Self {
        Self {
            target_field: target_field.into(),
            required: false,
            default: None,
            min: None,
            max: None,
            transform: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Literal(value));
        self
    }

    pub fn default_with(mut self, rule: impl Rule + 'static) -> Self {
        self.default = Some(DefaultValue::Computed(RuleRef::new(rule)));
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.min(min).max(max)
    }

    pub fn transform(mut self, rule: impl Rule + 'static) -> Self {
        self.transform = Some(RuleRef::new(rule));
        self
    }

    /// Share an existing rule (several keys recomputing one target)
    pub fn transform_ref(mut self, rule: RuleRef) -> Self {
        self.transform = Some(rule);
        self
    }
}

/// One or an ordered list of configs for a canonical key
#[derive(Debug, Clone)]
pub enum ParamSpec {
    Single(ParameterConfig),
    Multi(Vec<ParameterConfig>),
}

impl ParamSpec {
    pub fn configs(&self) -> &[ParameterConfig] {
        match self {
            ParamSpec::Single(config) => std::slice::from_ref(config),
            ParamSpec::Multi(configs) => configs,
        }
    }
}

/// Static mapping from canonical keys to provider fields
#[derive(Debug, Clone, Default)]
pub struct ProviderSchema {
    params: BTreeMap<String, ParamSpec>,
}

impl ProviderSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `key` through a single config
    pub fn param(mut self, key: impl Into<String>, config: ParameterConfig) -> Self {
        self.params.insert(key.into(), ParamSpec::Single(config));
        self
    }

    /// Map `key` through several configs, applied in declared order
    pub fn params(mut self, key: impl Into<String>, configs: Vec<ParameterConfig>) -> Self {
        self.params.insert(key.into(), ParamSpec::Multi(configs));
        self
    }

    /// Map each key to a same-named pass-through field
    pub fn passthrough(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.params
                .insert((*key).to_string(), ParamSpec::Single(ParameterConfig::new(*key)));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamSpec> {
        self.params.get(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.params.iter()
    }

    /// Build a provider request from a canonical request
    pub fn build(&self, request: &CanonicalRequest) -> Result<ProviderRequest, MappingError> {
        build_request(self, request)
    }
}
