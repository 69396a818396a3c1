//! Parsing and building of `Content-Type` header values.

use crate::version::{SOAP11_MEDIA_TYPE, SOAP12_MEDIA_TYPE, SoapVersion};

pub const DEFAULT_TEXT_CHARSET: &str = "us-ascii";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    media_type: String,
    parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Parses `type/subtype; name=value; name="quoted value"`.
    ///
    /// Media type and parameter names are case-insensitive and stored lowercased;
    /// parameter values keep their case with surrounding quotes removed.
    pub fn parse(value: &str) -> Self {
        let mut parts = split_parameters(value).into_iter();
        let media_type = parts
            .next()
            .map(|media| media.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let parameters = parts
            .filter_map(|part| {
                let (name, value) = part.split_once('=')?;
                let name = name.trim().to_ascii_lowercase();
                if name.is_empty() {
                    return None;
                }
                Some((name, unquote(value.trim())))
            })
            .collect();

        Self {
            media_type,
            parameters,
        }
    }

    /// Content type for an outgoing envelope; the action rides along as a parameter in 1.2 only.
    pub fn for_envelope(version: SoapVersion, charset: &str, action: Option<&str>) -> Self {
        let mut parameters = vec![("charset".to_owned(), charset.to_owned())];
        if let (SoapVersion::Soap12, Some(action)) = (version, action) {
            parameters.push(("action".to_owned(), action.to_owned()));
        }
        Self {
            media_type: version.media_type().to_owned(),
            parameters,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Charset to decode with: the explicit parameter, else ASCII for `text/*`,
    /// else nothing.
    pub fn effective_charset(&self) -> Option<&str> {
        self.charset().or_else(|| {
            self.media_type
                .starts_with("text/")
                .then_some(DEFAULT_TEXT_CHARSET)
        })
    }

    pub fn action(&self) -> Option<&str> {
        self.parameter("action")
    }

    pub fn is_media_type(&self, media_type: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type)
    }

    /// The SOAP version implied by the media type, if it is a SOAP media type at all.
    pub fn soap_version(&self) -> Option<SoapVersion> {
        if self.is_media_type(SOAP11_MEDIA_TYPE) {
            Some(SoapVersion::Soap11)
        } else if self.is_media_type(SOAP12_MEDIA_TYPE) {
            Some(SoapVersion::Soap12)
        } else {
            None
        }
    }

    pub fn is_soap(&self) -> bool {
        self.soap_version().is_some()
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.media_type)?;
        for (name, value) in &self.parameters {
            if value.contains([' ', ';', ',', '"']) || name == "action" {
                write!(f, "; {name}=\"{}\"", value.replace('"', "\\\""))?;
            } else {
                write!(f, "; {name}={value}")?;
            }
        }
        Ok(())
    }
}

fn split_parameters(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (index, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(&value[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

pub(crate) fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].replace("\\\"", "\"")
    } else {
        value.to_owned()
    }
}
