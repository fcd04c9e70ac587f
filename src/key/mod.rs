//! Cache key generation.
//!
//! A key is built from a namespace and a template rendered against the bound
//! arguments of a call:
//!
//! ```text
//! "<namespace>:<rendered template>"
//! ```
//!
//! Rendered parts that would push the key past `max_key_length` are replaced
//! by a SHA-1 digest, so keys stay bounded whatever the inputs.

mod format;
pub mod template;

use crate::args::{CallArgs, Signature};
use crate::error::{Error, Result};
use crate::setting::Setting;
use crate::value::{sha1_b64, KeyValue};
use md5::{Digest, Md5};
use template::{Accessor, Field, Segment};

/// Default upper bound for `len(namespace) + len(rendered)`.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 250;

/// Default upper bound for derived namespaces.
pub const DEFAULT_MAX_NAMESPACE_LENGTH: usize = 60;

/// Length of the digest suffix on truncated namespaces.
const NAMESPACE_DIGEST_LEN: usize = 8;

/// Limits applied by [`KeyCodec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    pub max_key_length: usize,
    pub max_namespace_length: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            max_namespace_length: DEFAULT_MAX_NAMESPACE_LENGTH,
        }
    }
}

impl CodecConfig {
    /// Build from the environment.
    ///
    /// Reads `CACHE_INTENT_MAX_KEY_LENGTH` and
    /// `CACHE_INTENT_MAX_NAMESPACE_LENGTH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Missing, unparseable or too small
    /// values fall back to the defaults; a namespace limit must leave room
    /// for the digest suffix.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |var: &str, min: usize, default: usize| {
            lookup(var)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|value| *value >= min)
                .unwrap_or(default)
        };

        CodecConfig {
            max_key_length: read("CACHE_INTENT_MAX_KEY_LENGTH", 1, DEFAULT_MAX_KEY_LENGTH),
            max_namespace_length: read(
                "CACHE_INTENT_MAX_NAMESPACE_LENGTH",
                NAMESPACE_DIGEST_LEN,
                DEFAULT_MAX_NAMESPACE_LENGTH,
            ),
        }
    }
}

/// Turns key templates into cache keys.
///
/// Implement this to plug a different key scheme into a policy.
pub trait KeyGenerator: Send + Sync {
    /// Check a template against the operation signature.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyFormatError` for templates that could never render.
    fn validate(&self, template: Option<&str>, signature: &Signature) -> Result<()>;

    /// Render the key for one call.
    fn generate(
        &self,
        namespace: &Setting<Option<String>>,
        template: &str,
        signature: &Signature,
        args: &CallArgs,
    ) -> Result<String>;
}

/// Template-based key generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyCodec {
    config: CodecConfig,
}

impl KeyCodec {
    pub fn new(config: CodecConfig) -> Self {
        KeyCodec { config }
    }

    /// Render a template, substituting only the given values.
    pub fn render(template: &str, values: &[(&str, &KeyValue)]) -> Result<String> {
        let mut out = String::new();
        for segment in template::parse(template)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Field(field) => {
                    let root = values
                        .iter()
                        .find(|(name, _)| *name == field.root)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| {
                            Error::KeyFormatError(format!(
                                "Argument '{}' is not bound for key '{}'",
                                field.root, template
                            ))
                        })?;
                    let value = resolve(root, &field)?;
                    out.push_str(&format::format_field(value, field.conversion, &field.spec)?);
                }
            }
        }
        Ok(out)
    }
}

impl KeyGenerator for KeyCodec {
    fn validate(&self, template: Option<&str>, signature: &Signature) -> Result<()> {
        let Some(template) = template else {
            return Ok(());
        };

        if template.is_empty() {
            return Err(Error::KeyFormatError(format!(
                "'key' must not be empty: function='{}'",
                describe(signature)
            )));
        }

        for segment in template::parse(template)? {
            let Segment::Field(field) = segment else {
                continue;
            };

            if field.name.is_empty() {
                return Err(Error::KeyFormatError(format!(
                    "Blank field in key: '{template}'"
                )));
            }
            if field.root.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::KeyFormatError(
                    "Field numbering not supported. Use field names.".to_string(),
                ));
            }
            if let Some(conversion) = field.conversion {
                if !matches!(conversion, 's' | 'r') {
                    return Err(Error::KeyFormatError(format!(
                        "Unknown conversion specifier '{conversion}' in key: '{template}'"
                    )));
                }
            }

            let param = signature.get(&field.root).ok_or_else(|| {
                Error::KeyFormatError(format!(
                    "Argument '{}' is not present in function: '{}'",
                    field.root,
                    describe(signature)
                ))
            })?;
            if let Some(default) = param.default.as_ref().filter(|d| d.is_mutable_container()) {
                return Err(Error::KeyFormatError(format!(
                    "Mutable argument type not permitted for caching: '{}={}'. Function='{}'",
                    param.name,
                    default.type_name(),
                    describe(signature)
                )));
            }
        }
        Ok(())
    }

    fn generate(
        &self,
        namespace: &Setting<Option<String>>,
        template: &str,
        signature: &Signature,
        args: &CallArgs,
    ) -> Result<String> {
        let values: Vec<(&str, &KeyValue)> = signature
            .params()
            .iter()
            .filter_map(|param| {
                args.get(&param.name)
                    .or(param.default.as_ref())
                    .map(|value| (param.name.as_str(), value))
            })
            .collect();

        let namespace = match namespace {
            Setting::Unset => Some(generate_namespace(
                signature,
                self.config.max_namespace_length,
            )),
            Setting::Value(None) => None,
            Setting::Value(Some(ns)) if ns.is_empty() => {
                return Err(Error::NamespaceError("Namespace must not be empty".to_string()))
            }
            Setting::Value(Some(ns)) => Some(ns.clone()),
        };

        let rendered = Self::render(template, &values)?;
        Ok(generate_key(
            namespace.as_deref(),
            rendered,
            self.config.max_key_length,
        ))
    }
}

/// `"<name>:<param,param,...>"`, shortened with a digest suffix when longer
/// than `max_len`. Never longer than `max_len`.
pub fn generate_namespace(signature: &Signature, max_len: usize) -> String {
    let params: Vec<&str> = signature.param_names().collect();
    let full = format!("{}:{}", signature.name(), params.join(","));
    if full.chars().count() <= max_len {
        return full;
    }

    let mut hasher = Md5::new();
    hasher.update(full.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let suffix = NAMESPACE_DIGEST_LEN.min(max_len);
    let prefix: String = full.chars().take(max_len - suffix).collect();
    format!("{}{}", prefix, &digest[digest.len() - suffix..])
}

/// Join namespace and rendered part, hashing the rendered part if the key
/// would exceed `max_len`.
pub fn generate_key(namespace: Option<&str>, rendered: String, max_len: usize) -> String {
    let ns_len = namespace.map_or(0, |ns| ns.chars().count());
    let key = if rendered.chars().count() + ns_len > max_len {
        sha1_b64(rendered.as_bytes())
    } else {
        rendered
    };
    match namespace {
        Some(ns) => format!("{ns}:{key}"),
        None => key,
    }
}

fn resolve<'a>(root: &'a KeyValue, field: &Field) -> Result<&'a KeyValue> {
    let mut current = root;
    for accessor in &field.path {
        current = match accessor {
            Accessor::Attr(name) => current.attr(name),
            Accessor::Item(index) => current.item(index),
        }
        .ok_or_else(|| {
            Error::KeyFormatError(format!(
                "Field '{}' can not be resolved on a {} value",
                field.name,
                current.type_name()
            ))
        })?;
    }
    Ok(current)
}

fn describe(signature: &Signature) -> String {
    let params: Vec<&str> = signature.param_names().collect();
    format!("{}({})", signature.name(), params.join(", "))
}
