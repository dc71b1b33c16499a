//! Multipart form data.
//!
//! [`Form`] is both a request body (see [`Body::Multipart`](crate::Body))
//! and the decoded shape of `multipart/form-data` responses.

use bytes::Bytes;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        bytes: Bytes,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

/// An ordered list of named form fields. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    fields: Vec<FormField>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value: FormValue::Text(value.into()),
        });
        self
    }

    pub fn with_file(
        mut self,
        name: impl Into<String>,
        bytes: impl Into<Bytes>,
        file_name: Option<String>,
    ) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value: FormValue::File {
                bytes: bytes.into(),
                file_name,
                content_type: None,
            },
        });
        self
    }

    pub fn push(&mut self, field: FormField) {
        self.fields.push(field);
    }

    /// First field with the given name.
    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Text value of the first field with the given name.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FormValue::Text(text) => Some(text),
            FormValue::File { .. } => None,
        }
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<FormField> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a `multipart/form-data` body. The boundary comes from the
    /// content type's `boundary` parameter.
    pub fn parse(content_type: &str, body: &[u8]) -> Result<Self> {
        let boundary = boundary_of(content_type).ok_or_else(|| Error::Multipart {
            message: format!("no boundary in content type '{}'", content_type),
        })?;
        let delimiter = format!("--{}", boundary);
        let delimiter = delimiter.as_bytes();

        let start = find(body, delimiter).ok_or_else(|| Error::Multipart {
            message: "missing opening boundary".to_string(),
        })?;
        let mut rest = &body[start + delimiter.len()..];
        let mut form = Form::new();

        loop {
            if rest.starts_with(b"--") {
                break;
            }
            rest = rest.strip_prefix(b"\r\n").unwrap_or(rest);

            let end = find(rest, delimiter).ok_or_else(|| Error::Multipart {
                message: "unterminated part".to_string(),
            })?;
            let part = &rest[..end];
            let part = part.strip_suffix(b"\r\n").unwrap_or(part);
            form.push(parse_part(part)?);

            rest = &rest[end + delimiter.len()..];
        }

        Ok(form)
    }
}

fn boundary_of(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
            .filter(|b| !b.is_empty())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_part(part: &[u8]) -> Result<FormField> {
    let split = find(part, b"\r\n\r\n").ok_or_else(|| Error::Multipart {
        message: "part without header terminator".to_string(),
    })?;
    let head = std::str::from_utf8(&part[..split]).map_err(|e| Error::Multipart {
        message: e.to_string(),
    })?;
    let content = &part[split + 4..];

    let mut name = None;
    let mut file_name = None;
    let mut content_type = None;

    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for param in value.split(';').skip(1) {
                    if let Some((k, v)) = param.trim().split_once('=') {
                        let v = v.trim().trim_matches('"').to_string();
                        match k.trim() {
                            "name" => name = Some(v),
                            "filename" => file_name = Some(v),
                            _ => {}
                        }
                    }
                }
            }
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| Error::Multipart {
        message: "part without a name".to_string(),
    })?;

    let value = if file_name.is_some() || content_type.is_some() {
        FormValue::File {
            bytes: Bytes::copy_from_slice(content),
            file_name,
            content_type,
        }
    } else {
        FormValue::Text(String::from_utf8_lossy(content).into_owned())
    };

    Ok(FormField { name, value })
}
