//! Dynamic values bound to key template fields.
//!
//! Every argument of a cached call is converted into a [`KeyValue`] before
//! key generation. Scalars render to their natural text; composites fall back
//! to a SHA-1 digest of a canonical serialization so that equal inputs always
//! produce equal keys regardless of map or set iteration order.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use sha1::{Digest, Sha1};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{Display, Write as _};
use std::io;
use uuid::Uuid;

/// Marker placed in front of set members in the canonical form.
const SET_TAG: &str = "__set__";

/// A value that can take part in a cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Timezone-aware timestamp; rendered in UTC.
    DateTime(DateTime<FixedOffset>),
    NaiveDateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Time of day with an offset. Can't be rendered into a key.
    TimeTz(NaiveTime, FixedOffset),
    /// Duration as total seconds.
    Duration(f64),
    /// Arbitrary-precision decimal in its canonical string form.
    Decimal(String),
    Uuid(Uuid),
    List(Vec<KeyValue>),
    Map(BTreeMap<String, KeyValue>),
    /// Unordered collection; members are sorted when serialized.
    Set(Vec<KeyValue>),
}

impl KeyValue {
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        KeyValue::Bytes(bytes.into())
    }

    pub fn decimal(value: impl Display) -> Self {
        KeyValue::Decimal(value.to_string())
    }

    pub fn set<I, T>(members: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<KeyValue>,
    {
        KeyValue::Set(members.into_iter().map(Into::into).collect())
    }

    pub fn time_with_offset(time: NaiveTime, offset: FixedOffset) -> Self {
        KeyValue::TimeTz(time, offset)
    }

    /// Convert any serde value (structs become maps).
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyFormatError` if the value has no JSON representation
    /// (for example a map with composite keys).
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value).map_err(|e| {
            Error::KeyFormatError(format!(
                "Objects of type '{}' can not be used in keys: {}",
                std::any::type_name::<T>(),
                e
            ))
        })?;
        Ok(Self::from(json))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, KeyValue::None)
    }

    /// Containers whose content may change between calls without the
    /// caller noticing. Not allowed as parameter defaults in key templates.
    pub fn is_mutable_container(&self) -> bool {
        matches!(self, KeyValue::List(_) | KeyValue::Map(_) | KeyValue::Set(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            KeyValue::None => "none",
            KeyValue::Bool(_) => "bool",
            KeyValue::Int(_) | KeyValue::UInt(_) => "int",
            KeyValue::Float(_) => "float",
            KeyValue::Str(_) => "str",
            KeyValue::Bytes(_) => "bytes",
            KeyValue::DateTime(_) | KeyValue::NaiveDateTime(_) => "datetime",
            KeyValue::Date(_) => "date",
            KeyValue::Time(_) | KeyValue::TimeTz(..) => "time",
            KeyValue::Duration(_) => "duration",
            KeyValue::Decimal(_) => "decimal",
            KeyValue::Uuid(_) => "uuid",
            KeyValue::List(_) => "list",
            KeyValue::Map(_) => "map",
            KeyValue::Set(_) => "set",
        }
    }

    /// Attribute lookup used by dotted template fields (`{user.id}`).
    pub fn attr(&self, name: &str) -> Option<&KeyValue> {
        match self {
            KeyValue::Map(map) => map.get(name),
            _ => None,
        }
    }

    /// Index lookup used by bracketed template fields (`{ids[0]}`).
    pub fn item(&self, index: &str) -> Option<&KeyValue> {
        match self {
            KeyValue::List(items) => index.parse::<usize>().ok().and_then(|i| items.get(i)),
            KeyValue::Map(map) => map.get(index),
            _ => None,
        }
    }

    /// Canonical text of the value as it appears inside a key.
    ///
    /// # Errors
    ///
    /// - `Error::KeyFormatError`: timezone-aware time of day, or a composite
    ///   containing something without a canonical form
    pub fn to_key_text(&self) -> Result<String> {
        if let Some(text) = self.scalar_text()? {
            return Ok(text);
        }
        match self {
            KeyValue::None => Ok("None".to_string()),
            KeyValue::Bool(true) => Ok("True".to_string()),
            KeyValue::Bool(false) => Ok("False".to_string()),
            KeyValue::Int(v) => Ok(v.to_string()),
            KeyValue::UInt(v) => Ok(v.to_string()),
            KeyValue::Float(v) => Ok(float_repr(*v)),
            KeyValue::Str(v) => Ok(v.clone()),
            KeyValue::Bytes(v) => Ok(bytes_repr(v)),
            _ => self.hash_digest(),
        }
    }

    /// Text for the date/time, duration, decimal and uuid family; `None` for
    /// everything else.
    fn scalar_text(&self) -> Result<Option<String>> {
        let text = match self {
            KeyValue::DateTime(dt) => {
                iso_datetime(&dt.with_timezone(&Utc).naive_utc(), 'T') + "+00:00"
            }
            KeyValue::NaiveDateTime(dt) => iso_datetime(dt, 'T'),
            KeyValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            KeyValue::Time(t) => iso_time(t),
            KeyValue::TimeTz(..) => {
                return Err(Error::KeyFormatError(
                    "Timezone-aware times can not be used in keys".to_string(),
                ))
            }
            KeyValue::Duration(secs) => float_repr(*secs),
            KeyValue::Decimal(v) => v.clone(),
            KeyValue::Uuid(v) => v.hyphenated().to_string(),
            _ => return Ok(None),
        };
        Ok(Some(text))
    }

    /// URL-safe, unpadded base64 of the SHA-1 of the canonical serialization.
    pub fn hash_digest(&self) -> Result<String> {
        let serialized = self.canonical_json()?;
        Ok(sha1_b64(serialized.as_bytes()))
    }

    /// Canonical JSON form: sorted map keys, `", "` and `": "` separators,
    /// ASCII-only strings and tagged, sorted sets.
    pub fn canonical_json(&self) -> Result<String> {
        let value = self.canonical_value()?;
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
        value
            .serialize(&mut serializer)
            .map_err(|e| Error::KeyFormatError(format!("Can not serialize key value: {e}")))?;
        String::from_utf8(out).map_err(|e| Error::KeyFormatError(e.to_string()))
    }

    fn canonical_value(&self) -> Result<serde_json::Value> {
        use serde_json::Value;
        let value = match self {
            KeyValue::None => Value::Null,
            KeyValue::Bool(v) => Value::Bool(*v),
            KeyValue::Int(v) => Value::from(*v),
            KeyValue::UInt(v) => Value::from(*v),
            // non-finite floats become null
            KeyValue::Float(v) => Value::from(*v),
            KeyValue::Str(v) => Value::String(v.clone()),
            KeyValue::Bytes(_) => {
                return Err(Error::KeyFormatError(
                    "Objects of type 'bytes' can not be used in composite keys".to_string(),
                ))
            }
            KeyValue::DateTime(_)
            | KeyValue::NaiveDateTime(_)
            | KeyValue::Date(_)
            | KeyValue::Time(_)
            | KeyValue::TimeTz(..)
            | KeyValue::Duration(_)
            | KeyValue::Decimal(_)
            | KeyValue::Uuid(_) => Value::String(self.to_key_text()?),
            KeyValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(Self::canonical_value)
                    .collect::<Result<_>>()?,
            ),
            KeyValue::Set(members) => {
                let mut sorted: Vec<&KeyValue> = members.iter().collect();
                sorted.sort_by(|a, b| canonical_cmp(a, b));
                let mut items = vec![Value::from(SET_TAG)];
                for member in sorted {
                    items.push(member.canonical_value()?);
                }
                Value::Array(items)
            }
            KeyValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), value.canonical_value()?)))
                    .collect::<Result<serde_json::Map<_, _>>>()?,
            ),
        };
        Ok(value)
    }
}

/// JSON layout of the canonical form: spaced separators, float text matching
/// key rendering, and everything outside printable ASCII escaped.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() && !c.is_ascii_control() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Ordering of set members: none, then numbers, then strings, then
/// everything else by canonical text.
fn canonical_cmp(a: &KeyValue, b: &KeyValue) -> Ordering {
    fn rank(v: &KeyValue) -> u8 {
        match v {
            KeyValue::None => 0,
            KeyValue::Bool(_) | KeyValue::Int(_) | KeyValue::UInt(_) | KeyValue::Float(_) => 1,
            KeyValue::Str(_) => 2,
            _ => 3,
        }
    }
    fn number(v: &KeyValue) -> f64 {
        match v {
            KeyValue::Bool(b) => f64::from(u8::from(*b)),
            KeyValue::Int(i) => *i as f64,
            KeyValue::UInt(u) => *u as f64,
            KeyValue::Float(f) => *f,
            _ => 0.0,
        }
    }

    match (a, b) {
        (KeyValue::Int(x), KeyValue::Int(y)) => x.cmp(y),
        (KeyValue::UInt(x), KeyValue::UInt(y)) => x.cmp(y),
        (KeyValue::Str(x), KeyValue::Str(y)) => x.cmp(y),
        _ => match rank(a).cmp(&rank(b)) {
            Ordering::Equal if rank(a) == 1 => number(a).total_cmp(&number(b)),
            Ordering::Equal => {
                let x = a.canonical_json().unwrap_or_default();
                let y = b.canonical_json().unwrap_or_default();
                x.cmp(&y)
            }
            other => other,
        },
    }
}

pub(crate) fn sha1_b64(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

pub(crate) fn iso_time(t: &NaiveTime) -> String {
    let micros = (t.nanosecond() % 1_000_000_000) / 1_000;
    let base = t.format("%H:%M:%S").to_string();
    if micros == 0 {
        base
    } else {
        format!("{base}.{micros:06}")
    }
}

pub(crate) fn iso_datetime(dt: &NaiveDateTime, sep: char) -> String {
    format!("{}{}{}", dt.date().format("%Y-%m-%d"), sep, iso_time(&dt.time()))
}

/// Shortest round-trip float text, always with a fractional part or an
/// exponent (`1.0`, `0.5`, `1e+16`).
pub(crate) fn float_repr(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = v.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let text = format!("{v:e}");
        let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    let text = v.to_string();
    if text.contains('.') {
        text
    } else {
        text + ".0"
    }
}

fn bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('\'');
    out
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeyValue::None => serializer.serialize_none(),
            KeyValue::Bool(v) => serializer.serialize_bool(*v),
            KeyValue::Int(v) => serializer.serialize_i64(*v),
            KeyValue::UInt(v) => serializer.serialize_u64(*v),
            KeyValue::Float(v) | KeyValue::Duration(v) => serializer.serialize_f64(*v),
            KeyValue::Str(v) | KeyValue::Decimal(v) => serializer.serialize_str(v),
            KeyValue::Bytes(v) => serializer.serialize_bytes(v),
            KeyValue::DateTime(v) => v.serialize(serializer),
            KeyValue::NaiveDateTime(v) => v.serialize(serializer),
            KeyValue::Date(v) => v.serialize(serializer),
            KeyValue::Time(v) => v.serialize(serializer),
            KeyValue::TimeTz(t, offset) => {
                serializer.collect_str(&format_args!("{}{}", iso_time(t), offset))
            }
            KeyValue::Uuid(v) => v.serialize(serializer),
            KeyValue::List(items) | KeyValue::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            KeyValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl From<serde_json::Value> for KeyValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => KeyValue::None,
            Value::Bool(b) => KeyValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    KeyValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    KeyValue::UInt(u)
                } else {
                    KeyValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => KeyValue::Str(s),
            Value::Array(items) => KeyValue::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                KeyValue::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty; $($t:ty),*) => {
        $(
            impl From<$t> for KeyValue {
                fn from(v: $t) -> Self {
                    KeyValue::$variant(v as $target)
                }
            }
        )*
    };
}

impl_from_int!(Int, i64; i8, i16, i32, i64, isize);
impl_from_int!(UInt, u64; u8, u16, u32, u64, usize);

impl From<bool> for KeyValue {
    fn from(v: bool) -> Self {
        KeyValue::Bool(v)
    }
}

impl From<f32> for KeyValue {
    fn from(v: f32) -> Self {
        KeyValue::Float(f64::from(v))
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Float(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Str(v)
    }
}

impl From<&String> for KeyValue {
    fn from(v: &String) -> Self {
        KeyValue::Str(v.clone())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for KeyValue {
    fn from(v: DateTime<Tz>) -> Self {
        KeyValue::DateTime(v.fixed_offset())
    }
}

impl From<NaiveDateTime> for KeyValue {
    fn from(v: NaiveDateTime) -> Self {
        KeyValue::NaiveDateTime(v)
    }
}

impl From<NaiveDate> for KeyValue {
    fn from(v: NaiveDate) -> Self {
        KeyValue::Date(v)
    }
}

impl From<NaiveTime> for KeyValue {
    fn from(v: NaiveTime) -> Self {
        KeyValue::Time(v)
    }
}

impl From<std::time::Duration> for KeyValue {
    fn from(v: std::time::Duration) -> Self {
        KeyValue::Duration(v.as_secs_f64())
    }
}

impl From<chrono::TimeDelta> for KeyValue {
    fn from(v: chrono::TimeDelta) -> Self {
        let secs = v.num_seconds() as f64;
        let micros = f64::from(v.subsec_nanos() / 1_000) / 1e6;
        KeyValue::Duration(secs + micros)
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        KeyValue::Uuid(v)
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(KeyValue::None, Into::into)
    }
}

impl<T: Into<KeyValue>> From<Vec<T>> for KeyValue {
    fn from(v: Vec<T>) -> Self {
        KeyValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<KeyValue> + Clone> From<&[T]> for KeyValue {
    fn from(v: &[T]) -> Self {
        KeyValue::List(v.iter().cloned().map(Into::into).collect())
    }
}

impl<V: Into<KeyValue>> From<BTreeMap<String, V>> for KeyValue {
    fn from(v: BTreeMap<String, V>) -> Self {
        KeyValue::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<KeyValue>, S> From<HashMap<String, V, S>> for KeyValue {
    fn from(v: HashMap<String, V, S>) -> Self {
        KeyValue::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<KeyValue>> From<BTreeSet<T>> for KeyValue {
    fn from(v: BTreeSet<T>) -> Self {
        KeyValue::set(v)
    }
}

impl<T: Into<KeyValue>, S> From<HashSet<T, S>> for KeyValue {
    fn from(v: HashSet<T, S>) -> Self {
        KeyValue::set(v)
    }
}
