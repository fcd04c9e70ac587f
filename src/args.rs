//! Operation signatures and per-call argument bindings.

use crate::error::Result;
use crate::serialization;
use crate::value::KeyValue;
use serde::Serialize;

/// Name of the implicit receiver parameter of method-style operations.
pub const RECEIVER: &str = "self";

/// A declared parameter of a cached operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    /// Declared default value, if the parameter has one.
    pub default: Option<KeyValue>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<KeyValue>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Name and parameter list of a cached operation.
///
/// Key templates may only reference declared parameters, and the derived
/// namespace of an operation is `"<name>:<param,param,...>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    name: String,
    params: Vec<Param>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Signature {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Signature of a method: the receiver is the first parameter.
    pub fn method(name: impl Into<String>) -> Self {
        Self::new(name).param(RECEIVER)
    }

    pub fn param(self, name: impl Into<String>) -> Self {
        self.with_param(Param::new(name))
    }

    pub fn param_with_default(self, name: impl Into<String>, default: impl Into<KeyValue>) -> Self {
        self.with_param(Param::new(name).with_default(default))
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }
}

/// One bound argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: KeyValue,
    /// Pre-encoded storage form, present for values bound with
    /// [`CallArgs::bind_entity`].
    payload: Option<Vec<u8>>,
}

impl Binding {
    /// Bytes to store when this argument is the value of a put.
    ///
    /// Returns `Ok(None)` for a `None` argument, which is never cached.
    pub fn payload(&self) -> Result<Option<Vec<u8>>> {
        if self.value.is_none() {
            return Ok(None);
        }
        match &self.payload {
            Some(bytes) => Ok(Some(bytes.clone())),
            None => serialization::encode(&self.value).map(Some),
        }
    }
}

/// Ordered binding of argument names to values for one call.
///
/// # Example
///
/// ```
/// use cache_intent::args::CallArgs;
///
/// let args = CallArgs::new().bind("user_id", "42").bind("active", true);
/// assert_eq!(args.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    bindings: Vec<Binding>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value by name. Rebinding a name replaces the earlier value in
    /// place.
    pub fn bind(self, name: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.push(name.into(), value.into(), None)
    }

    /// Bind a serde value: its fields are available to templates
    /// (`{user.id}`) and it is stored as-is when selected by a put.
    ///
    /// # Errors
    ///
    /// - `Error::KeyFormatError`: the value has no key representation
    /// - `Error::SerializationError`: the value can't be encoded for storage
    pub fn bind_entity<T: Serialize>(self, name: impl Into<String>, value: &T) -> Result<Self> {
        let key_value = KeyValue::from_serialize(value)?;
        let payload = serialization::encode(value)?;
        Ok(self.push(name.into(), key_value, Some(payload)))
    }

    fn push(mut self, name: String, value: KeyValue, payload: Option<Vec<u8>>) -> Self {
        let binding = Binding {
            name,
            value,
            payload,
        };
        match self.bindings.iter_mut().find(|b| b.name == binding.name) {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&KeyValue> {
        self.binding(name).map(|b| &b.value)
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
