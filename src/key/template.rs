//! Key template parser.
//!
//! Templates are literal text with `{field}` substitutions. `{{` and `}}`
//! produce literal braces. A field is
//!
//! ```text
//! root ( "." attr | "[" index "]" )* [ "!" conversion ] [ ":" format_spec ]
//! ```

use crate::error::{Error, Result};

/// Step from a field's root value to a nested value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Attr(String),
    Item(String),
}

/// One `{...}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Text between the braces up to the conversion / format spec.
    pub name: String,
    pub root: String,
    pub path: Vec<Accessor>,
    pub conversion: Option<char>,
    pub spec: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Field(Field),
}

/// Split a template into literal and field segments.
///
/// Only syntax is checked here; whether the field names make sense for an
/// operation is decided by `KeyCodec::validate`.
pub fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(Error::KeyFormatError(format!(
                    "Single '}}' encountered in key: '{template}'"
                )))
            }
            '{' => {
                let mut body = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(Error::KeyFormatError(format!(
                                "Nested fields are not supported in key: '{template}'"
                            )))
                        }
                        c => body.push(c),
                    }
                }
                if !closed {
                    return Err(Error::KeyFormatError(format!(
                        "Single '{{' encountered in key: '{template}'"
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(parse_field(&body, template)?));
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_field(body: &str, template: &str) -> Result<Field> {
    let name_end = body.find(['!', ':']).unwrap_or(body.len());
    let (name, rest) = body.split_at(name_end);

    let (conversion, spec) = match rest.strip_prefix('!') {
        Some(after) => {
            let mut it = after.chars();
            let conversion = it.next().ok_or_else(|| {
                Error::KeyFormatError(format!("Missing conversion after '!' in key: '{template}'"))
            })?;
            let remainder = it.as_str();
            let spec = match remainder.strip_prefix(':') {
                Some(spec) => spec,
                None if remainder.is_empty() => "",
                None => {
                    return Err(Error::KeyFormatError(format!(
                        "Expected ':' after conversion in key: '{template}'"
                    )))
                }
            };
            (Some(conversion), spec)
        }
        None => (None, rest.strip_prefix(':').unwrap_or("")),
    };

    let (root, path) = split_field_name(name, template)?;
    Ok(Field {
        name: name.to_string(),
        root,
        path,
        conversion,
        spec: spec.to_string(),
    })
}

fn split_field_name(name: &str, template: &str) -> Result<(String, Vec<Accessor>)> {
    let root_end = name.find(['.', '[']).unwrap_or(name.len());
    let root = name[..root_end].to_string();
    let mut path = Vec::new();
    let mut rest = &name[root_end..];

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            let attr = &after[..end];
            if attr.is_empty() {
                return Err(Error::KeyFormatError(format!(
                    "Empty attribute in field '{name}' of key: '{template}'"
                )));
            }
            path.push(Accessor::Attr(attr.to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').ok_or_else(|| {
                Error::KeyFormatError(format!("Missing ']' in field '{name}' of key: '{template}'"))
            })?;
            let index = &after[..end];
            if index.is_empty() {
                return Err(Error::KeyFormatError(format!(
                    "Empty index in field '{name}' of key: '{template}'"
                )));
            }
            path.push(Accessor::Item(index.to_string()));
            rest = &after[end + 1..];
        } else {
            return Err(Error::KeyFormatError(format!(
                "Only '.' or '[' may follow ']' in field '{name}' of key: '{template}'"
            )));
        }
    }

    Ok((root, path))
}
