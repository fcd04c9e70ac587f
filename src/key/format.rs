//! Conversions and format specs applied to template fields.

use crate::error::{Error, Result};
use crate::value::{float_repr, iso_datetime, iso_time, KeyValue};
use std::fmt::Write as _;

/// Render a field value honoring its conversion flag and format spec.
pub(crate) fn format_field(
    value: &KeyValue,
    conversion: Option<char>,
    spec: &str,
) -> Result<String> {
    match conversion {
        Some(conversion) => {
            let text = convert(value, conversion)?;
            if spec.is_empty() {
                Ok(text)
            } else {
                FormatSpec::parse(spec)?.apply_str(&text)
            }
        }
        None if spec.is_empty() => value.to_key_text(),
        None => format_with_spec(value, spec),
    }
}

/// `!s` and `!r` conversions.
///
/// `!r` quotes strings and wraps decimals and uuids in their constructor
/// form (`Decimal('1.5')`, `UUID('..')`). Lists, maps and sets render as
/// their canonical JSON under both conversions, with double-quoted strings.
fn convert(value: &KeyValue, conversion: char) -> Result<String> {
    let text = match (conversion, value) {
        ('s' | 'r', KeyValue::NaiveDateTime(dt)) => iso_datetime(dt, ' '),
        ('s' | 'r', KeyValue::DateTime(dt)) => {
            format!("{}{}", iso_datetime(&dt.naive_local(), ' '), dt.offset())
        }
        ('s' | 'r', KeyValue::TimeTz(t, offset)) => format!("{}{}", iso_time(t), offset),
        ('s' | 'r', KeyValue::List(_) | KeyValue::Map(_) | KeyValue::Set(_)) => {
            value.canonical_json()?
        }
        ('r', KeyValue::Str(s)) => {
            format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
        }
        ('r', KeyValue::Decimal(d)) => format!("Decimal('{d}')"),
        ('r', KeyValue::Uuid(u)) => format!("UUID('{}')", u.hyphenated()),
        ('s' | 'r', _) => value.to_key_text()?,
        (other, _) => {
            return Err(Error::KeyFormatError(format!(
                "Unknown conversion specifier '{other}'"
            )))
        }
    };
    Ok(text)
}

fn format_with_spec(value: &KeyValue, spec: &str) -> Result<String> {
    match value {
        KeyValue::DateTime(dt) => strftime(dt.format(spec), spec),
        KeyValue::NaiveDateTime(dt) => strftime(dt.format(spec), spec),
        KeyValue::Date(d) => strftime(d.format(spec), spec),
        KeyValue::Time(t) => strftime(t.format(spec), spec),
        KeyValue::TimeTz(..) => Err(Error::KeyFormatError(
            "Timezone-aware times can not be used in keys".to_string(),
        )),
        KeyValue::Bool(b) => FormatSpec::parse(spec)?.apply_int(i128::from(*b)),
        KeyValue::Int(v) => FormatSpec::parse(spec)?.apply_int(i128::from(*v)),
        KeyValue::UInt(v) => FormatSpec::parse(spec)?.apply_int(i128::from(*v)),
        KeyValue::Float(v) | KeyValue::Duration(v) => FormatSpec::parse(spec)?.apply_float(*v),
        KeyValue::Decimal(d) => {
            let parsed: f64 = d
                .parse()
                .map_err(|_| Error::KeyFormatError(format!("Invalid decimal value '{d}'")))?;
            FormatSpec::parse(spec)?.apply_float(parsed)
        }
        KeyValue::List(_) | KeyValue::Map(_) | KeyValue::Set(_) => Err(Error::KeyFormatError(
            format!("Format spec '{spec}' can not be applied to a {}", value.type_name()),
        )),
        _ => FormatSpec::parse(spec)?.apply_str(&value.to_key_text()?),
    }
}

fn strftime(formatted: impl std::fmt::Display, spec: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{formatted}")
        .map_err(|_| Error::KeyFormatError(format!("Invalid date format '{spec}'")))?;
    Ok(out)
}

/// `[[fill]align][sign][0][width][.precision][type]`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    ty: Option<char>,
}

impl FormatSpec {
    pub(crate) fn parse(spec: &str) -> Result<Self> {
        let invalid = || Error::KeyFormatError(format!("Invalid format specifier '{spec}'"));
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;

        let mut fill = ' ';
        let mut align = None;
        if chars.len() >= 2 && is_align(chars[1]) {
            fill = chars[0];
            align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            align = Some(chars[0]);
            i = 1;
        }

        let mut sign = None;
        if let Some(&c) = chars.get(i) {
            if matches!(c, '+' | '-' | ' ') {
                sign = Some(c);
                i += 1;
            }
        }

        let mut zero = false;
        if chars.get(i) == Some(&'0') {
            zero = true;
            i += 1;
        }

        let width_start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        let width = if i > width_start {
            chars[width_start..i]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| invalid())?
        } else {
            0
        };

        let mut precision = None;
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            if i == start {
                return Err(invalid());
            }
            precision = Some(
                chars[start..i]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| invalid())?,
            );
        }

        let ty = match chars.get(i) {
            Some(&c) if "sdfFxXob%".contains(c) => {
                i += 1;
                Some(c)
            }
            Some(_) => return Err(invalid()),
            None => None,
        };
        if i != chars.len() {
            return Err(invalid());
        }

        Ok(FormatSpec {
            fill,
            align,
            sign,
            zero,
            width,
            precision,
            ty,
        })
    }

    pub(crate) fn apply_str(&self, text: &str) -> Result<String> {
        if !matches!(self.ty, None | Some('s')) || self.sign.is_some() {
            return Err(self.mismatch("str"));
        }
        let body: String = match self.precision {
            Some(p) => text.chars().take(p).collect(),
            None => text.to_string(),
        };
        Ok(self.pad("", body, '<'))
    }

    pub(crate) fn apply_int(&self, v: i128) -> Result<String> {
        let digits = match self.ty {
            None | Some('d') => v.unsigned_abs().to_string(),
            Some('x') => format!("{:x}", v.unsigned_abs()),
            Some('X') => format!("{:X}", v.unsigned_abs()),
            Some('o') => format!("{:o}", v.unsigned_abs()),
            Some('b') => format!("{:b}", v.unsigned_abs()),
            Some('f' | 'F' | '%') => return self.apply_float(v as f64),
            _ => return Err(self.mismatch("int")),
        };
        if self.precision.is_some() {
            return Err(Error::KeyFormatError(
                "Precision not allowed in integer format specifier".to_string(),
            ));
        }
        Ok(self.pad(self.sign_prefix(v < 0), digits, '>'))
    }

    pub(crate) fn apply_float(&self, v: f64) -> Result<String> {
        let negative = v.is_sign_negative() && v != 0.0;
        let abs = v.abs();
        let digits = match (self.ty, self.precision) {
            (None, None) => float_repr(abs),
            (None | Some('f' | 'F'), p) => format!("{:.*}", p.unwrap_or(6), abs),
            (Some('%'), p) => format!("{:.*}%", p.unwrap_or(6), abs * 100.0),
            _ => return Err(self.mismatch("float")),
        };
        Ok(self.pad(self.sign_prefix(negative), digits, '>'))
    }

    fn sign_prefix(&self, negative: bool) -> &'static str {
        match (negative, self.sign) {
            (true, _) => "-",
            (false, Some('+')) => "+",
            (false, Some(' ')) => " ",
            _ => "",
        }
    }

    fn pad(&self, sign: &str, body: String, default_align: char) -> String {
        let len = sign.chars().count() + body.chars().count();
        if len >= self.width {
            return format!("{sign}{body}");
        }
        let missing = self.width - len;

        if self.zero && self.align.is_none() {
            return format!("{sign}{}{body}", "0".repeat(missing));
        }

        let fill = if self.zero && self.align.is_some() && self.fill == ' ' {
            '0'
        } else {
            self.fill
        };
        let fill_str = |n: usize| fill.to_string().repeat(n);
        match self.align.unwrap_or(default_align) {
            '<' => format!("{sign}{body}{}", fill_str(missing)),
            '^' => {
                let left = missing / 2;
                format!("{}{sign}{body}{}", fill_str(left), fill_str(missing - left))
            }
            '=' => format!("{sign}{}{body}", fill_str(missing)),
            _ => format!("{}{sign}{body}", fill_str(missing)),
        }
    }

    fn mismatch(&self, kind: &str) -> Error {
        Error::KeyFormatError(format!(
            "Unknown format code '{}' for value of type '{kind}'",
            self.ty.unwrap_or(' ')
        ))
    }
}

fn is_align(c: char) -> bool {
    matches!(c, '<' | '>' | '^' | '=')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_date_spec() {
        let dt = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let value = KeyValue::from(dt);
        assert_eq!(format_field(&value, None, "%Y-%m-%d").unwrap(), "2024-05-17");
        assert_eq!(format_field(&value, Some('s'), "").unwrap(), "2024-05-17 09:30:00");
    }

    #[test]
    fn test_number_specs() {
        assert_eq!(format_field(&KeyValue::from(42), None, "05d").unwrap(), "00042");
        assert_eq!(format_field(&KeyValue::from(-42), None, "05d").unwrap(), "-0042");
        assert_eq!(format_field(&KeyValue::from(255), None, "x").unwrap(), "ff");
        assert_eq!(format_field(&KeyValue::from(3.14159), None, ".2f").unwrap(), "3.14");
        assert_eq!(format_field(&KeyValue::from(0.5), None, ".0%").unwrap(), "50%");
        assert_eq!(format_field(&KeyValue::from(7), None, "+").unwrap(), "+7");
    }

    #[test]
    fn test_string_specs() {
        let value = KeyValue::from("ab");
        assert_eq!(format_field(&value, None, ">4").unwrap(), "  ab");
        assert_eq!(format_field(&value, None, "*^6").unwrap(), "**ab**");
        assert_eq!(format_field(&value, None, ".1").unwrap(), "a");
        assert_eq!(format_field(&value, Some('r'), "").unwrap(), "'ab'");
    }

    #[test]
    fn test_repr_conversion() {
        let decimal = KeyValue::decimal("10.50");
        assert_eq!(format_field(&decimal, Some('s'), "").unwrap(), "10.50");
        assert_eq!(format_field(&decimal, Some('r'), "").unwrap(), "Decimal('10.50')");

        let id = uuid::Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            format_field(&KeyValue::from(id), Some('r'), "").unwrap(),
            "UUID('67e55044-10b1-426f-9247-bb680e5fe0c8')"
        );

        let bytes = KeyValue::bytes(b"a'b".to_vec());
        assert_eq!(format_field(&bytes, Some('r'), "").unwrap(), "b'a\\'b'");
        assert_eq!(
            format_field(&KeyValue::from(vec!["x"]), Some('s'), "").unwrap(),
            r#"["x"]"#
        );
    }

    #[test]
    fn test_spec_errors() {
        assert!(format_field(&KeyValue::from("ab"), None, "d").is_err());
        assert!(format_field(&KeyValue::from(vec![1]), None, ">3").is_err());
        assert!(format_field(&KeyValue::from(1), None, "q").is_err());
        assert!(format_field(&KeyValue::from(1), Some('a'), "").is_err());
        assert!(FormatSpec::parse("5.").is_err());
    }
}
