use std::borrow::Cow;

use hyper::StatusCode;

use crate::fault::SoapException;

#[derive(Debug, thiserror::Error)]
pub enum SoapError {
    /// A method or service declaration that cannot be served. Raised while compiling contracts.
    #[error("Contract error in {method}: {reason}")]
    Contract {
        method: String,
        reason: Cow<'static, str>,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(Cow<'static, str>),

    #[error("Index {index} is out of range for {what} (count {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },

    #[error("SOAP fault: {0}")]
    Fault(Box<SoapException>),

    #[error("No method is routed to {0}")]
    Routing(String),

    #[error("Unknown envelope namespace: {namespace}")]
    VersionMismatch { namespace: String },

    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(Cow<'static, str>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("The call was aborted")]
    Aborted,

    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    #[error("The message is not valid {charset} text")]
    MalformedText { charset: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    #[error("XML error: {0}")]
    Xml(#[from] ironsoap_xml::XmlError),

    #[error("XML parsing error: {0}")]
    XmlParse(#[from] ironsoap_xml::parser::Error),

    #[error("XML builder error: {0}")]
    XmlBuilder(#[from] ironsoap_xml::builder::XmlBuilderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoapError {
    pub fn contract(method: impl Into<String>, reason: impl Into<Cow<'static, str>>) -> Self {
        SoapError::Contract {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_operation(reason: impl Into<Cow<'static, str>>) -> Self {
        SoapError::InvalidOperation(reason.into())
    }

    pub fn serialization(reason: impl Into<Cow<'static, str>>) -> Self {
        SoapError::Serialization(reason.into())
    }

    /// The fault carried by this error, if it is one.
    pub fn as_fault(&self) -> Option<&SoapException> {
        match self {
            SoapError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Whether the error comes from unreadable input rather than from the local side.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SoapError::Xml(_)
                | SoapError::XmlParse(_)
                | SoapError::Serialization(_)
                | SoapError::UnsupportedCharset(_)
                | SoapError::MalformedText { .. }
        )
    }
}

impl From<SoapException> for SoapError {
    fn from(value: SoapException) -> Self {
        SoapError::Fault(Box::new(value))
    }
}
