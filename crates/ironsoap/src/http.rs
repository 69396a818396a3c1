//! Transport-neutral HTTP request and response values.
//!
//! The protocol never opens a connection itself: the server consumes an
//! [`HttpRequest`] and yields an [`HttpResponse`], the client hands requests to
//! an [`HttpTransport`](crate::client::HttpTransport).
use hyper::{
    Method, StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use percent_encoding::{CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::{
    Result, SoapError,
    content_type::{ContentType, unquote},
};

pub const SOAP_ACTION: &str = "soapaction";

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        insert_header(&mut self.headers, name, value)?;
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.header(CONTENT_TYPE.as_str()).map(ContentType::parse)
    }

    /// The `SOAPAction` header, percent-decoded and unquoted.
    pub fn soap_action(&self) -> Option<String> {
        self.header(SOAP_ACTION)
            .map(|value| unquote(&percent_decode_str(value).decode_utf8_lossy()))
    }

    /// Sets `SOAPAction` to the quoted action, percent-encoding what a header cannot carry.
    pub fn set_soap_action(&mut self, action: &str) -> Result<()> {
        let encoded = utf8_percent_encode(action, CONTROLS).to_string();
        insert_header(
            &mut self.headers,
            HeaderName::from_static(SOAP_ACTION),
            &format!("\"{encoded}\""),
        )
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Result<Self> {
        insert_header(&mut self.headers, CONTENT_TYPE, content_type)?;
        self.body = body;
        Ok(self)
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        self.body = text.as_bytes().to_vec();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        insert_header(&mut self.headers, name, value)?;
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.header(CONTENT_TYPE.as_str()).map(ContentType::parse)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| SoapError::Transport(format!("invalid value for header {name}: {value}")))?;
    headers.insert(name, value);
    Ok(())
}
