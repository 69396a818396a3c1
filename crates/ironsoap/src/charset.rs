//! Text decoding and encoding of message bodies by their `charset` label.
//!
//! A byte order mark wins over the label, as XML requires. Without a label the
//! body is read as UTF-8, the XML default.
use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::{Result, SoapError};

/// The encoding behind a charset label such as `utf-8` or `ISO-8859-1`.
pub fn encoding_for(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| SoapError::UnsupportedCharset(label.to_owned()))
}

/// Decodes `bytes` labelled with `charset`, refusing malformed input.
pub fn decode<'a>(bytes: &'a [u8], charset: Option<&str>) -> Result<Cow<'a, str>> {
    let labelled = charset.map(encoding_for).transpose()?.unwrap_or(UTF_8);
    let (encoding, bom_length) = Encoding::for_bom(bytes).unwrap_or((labelled, 0));
    if encoding != labelled {
        debug!(label = labelled.name(), bom = encoding.name(), "Byte order mark overrides the charset");
    }

    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
        .ok_or(SoapError::MalformedText {
            charset: encoding.name(),
        })
}

/// The encoding behind `label`, provided outgoing text can be written in it.
pub fn output_encoding_for(label: &str) -> Result<&'static Encoding> {
    let encoding = encoding_for(label)?;
    // UTF-16 labels decode but encode as UTF-8.
    if encoding.output_encoding() != encoding {
        return Err(SoapError::UnsupportedCharset(label.to_owned()));
    }
    Ok(encoding)
}

/// Encodes `text` as `charset`. Characters the charset cannot hold become
/// numeric character references.
pub fn encode(text: &str, charset: &str) -> Result<Vec<u8>> {
    let encoding = output_encoding_for(charset)?;
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        debug!(charset = encoding.name(), "Replaced characters the charset cannot encode");
    }
    Ok(bytes.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_latin1() {
        let bytes = b"<m>caf\xE9</m>";
        assert_eq!(decode(bytes, Some("iso-8859-1")).unwrap(), "<m>café</m>");
    }

    #[test]
    fn test_decode_defaults_to_utf8() {
        let bytes = "<m>café</m>".as_bytes();
        assert_eq!(decode(bytes, None).unwrap(), "<m>café</m>");
        assert!(matches!(
            decode(b"<m>caf\xE9</m>", None),
            Err(SoapError::MalformedText { charset: "UTF-8" })
        ));
    }

    #[test]
    fn test_bom_overrides_the_label() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("<m>café</m>".as_bytes());
        assert_eq!(decode(&bytes, Some("iso-8859-1")).unwrap(), "<m>café</m>");
    }

    #[test]
    fn test_unsupported_labels() {
        assert!(matches!(
            decode(b"<m/>", Some("klingon")),
            Err(SoapError::UnsupportedCharset(label)) if label == "klingon"
        ));
        assert!(matches!(encode("<m/>", "utf-16"), Err(SoapError::UnsupportedCharset(_))));
    }

    #[test]
    fn test_encode_latin1() {
        assert_eq!(encode("<m>café</m>", "ISO-8859-1").unwrap(), b"<m>caf\xE9</m>");
        assert_eq!(encode("<m>\u{2603}</m>", "iso-8859-1").unwrap(), b"<m>&#9731;</m>");
    }
}
