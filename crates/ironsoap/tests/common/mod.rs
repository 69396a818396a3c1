//! Shared fixtures: a small calculator service and in-process transports.
#![allow(dead_code)]

use std::{fs, sync::Arc, thread};

use anyhow::Context;
use hyper::header::{CONTENT_TYPE, HeaderName};
use ironsoap::{
    HttpRequest, HttpResponse, HttpTransport, MethodDescriptor, MethodInvocation, MethodOutcome,
    ServerProtocol, ServiceDescription, SoapError, SoapException, Value,
    FaultCodec,
    client::{CallId, pending::CompletionCallback},
    envelope::Envelope,
    contract::{HeaderAttribute, HeaderDirection, MethodAttribute, ParameterDescriptor, SoapMethodOptions},
    http::SOAP_ACTION,
    serializer::XmlTypeCode,
};
use ironsoap_xml::QualifiedName;

pub const TEMPURI: &str = "http://tempuri.org/";
pub const APP: &str = "urn:app";
pub const URL: &str = "http://localhost/calculator.asmx";

pub fn resource(name: &str) -> String {
    fs::read_to_string(format!("tests/resources/{name}")).expect("Failed to read fixture")
}

pub fn add_method(declaring_type: &str) -> MethodDescriptor {
    MethodDescriptor::builder()
        .name("Add")
        .declaring_type(declaring_type)
        .parameters(vec![
            ParameterDescriptor::input("a", XmlTypeCode::Int),
            ParameterDescriptor::input("b", XmlTypeCode::Int),
        ])
        .return_type(XmlTypeCode::Int)
        .build()
}

pub fn divide_method(declaring_type: &str) -> MethodDescriptor {
    MethodDescriptor::builder()
        .name("Divide")
        .declaring_type(declaring_type)
        .parameters(vec![
            ParameterDescriptor::input("a", XmlTypeCode::Int),
            ParameterDescriptor::input("b", XmlTypeCode::Int),
            ParameterDescriptor::output("remainder", XmlTypeCode::Int),
        ])
        .return_type(XmlTypeCode::Int)
        .build()
}

pub fn session_header() -> HeaderAttribute {
    HeaderAttribute::builder()
        .member_name("Session")
        .element(QualifiedName::new("Session", APP))
        .type_code(XmlTypeCode::Int)
        .direction(HeaderDirection::IN)
        .build()
}

/// One-way method requiring the `Session` header.
pub fn notify_method(declaring_type: &str) -> MethodDescriptor {
    MethodDescriptor::builder()
        .name("Notify")
        .declaring_type(declaring_type)
        .parameters(vec![ParameterDescriptor::input("message", XmlTypeCode::String)])
        .attributes(vec![
            MethodAttribute::Document(SoapMethodOptions::builder().one_way(true).build()),
            MethodAttribute::Header(session_header()),
        ])
        .build()
}

/// `Add`, `Divide` and `Notify`, document/literal in the default namespace.
pub fn calculator(name: &str) -> ServiceDescription {
    ServiceDescription::builder()
        .name(name)
        .methods(vec![
            add_method(name).into(),
            divide_method(name).into(),
            notify_method(name).into(),
        ])
        .build()
}

fn int_parameter(invocation: &MethodInvocation, name: &str) -> anyhow::Result<i64> {
    invocation
        .parameter_named(name)
        .and_then(Value::as_i64)
        .with_context(|| format!("parameter {name} is missing"))
}

pub fn calculator_service(invocation: &mut MethodInvocation) -> anyhow::Result<MethodOutcome> {
    match invocation.name() {
        "Add" => Ok(MethodOutcome::returning(
            int_parameter(invocation, "a")? + int_parameter(invocation, "b")?,
        )),
        "Divide" => {
            let a = int_parameter(invocation, "a")?;
            let b = int_parameter(invocation, "b")?;
            if b == 0 {
                return Err(SoapException::client(invocation.method.version, "b must not be zero").into());
            }
            Ok(MethodOutcome::returning(a / b).with_out_value(a % b))
        }
        "Notify" => match invocation.parameter_named("message").and_then(Value::as_str) {
            Some("fail") => anyhow::bail!("notification backend is down"),
            _ => Ok(MethodOutcome::void()),
        },
        other => anyhow::bail!("unexpected method {other}"),
    }
}

pub fn soap11_request(action: &str, xml: String) -> HttpRequest {
    let mut request = HttpRequest::post(URL, xml.into_bytes())
        .with_header(CONTENT_TYPE, "text/xml; charset=utf-8")
        .unwrap();
    request.set_soap_action(action).unwrap();
    request
}

pub fn soap12_request(action: Option<&str>, xml: String) -> HttpRequest {
    let content_type = match action {
        Some(action) => format!("application/soap+xml; charset=utf-8; action=\"{action}\""),
        None => "application/soap+xml; charset=utf-8".to_owned(),
    };
    HttpRequest::post(URL, xml.into_bytes())
        .with_header(CONTENT_TYPE, &content_type)
        .unwrap()
}

pub fn without_action(xml: String) -> HttpRequest {
    HttpRequest::post(URL, xml.into_bytes())
        .with_header(CONTENT_TYPE, "text/xml; charset=utf-8")
        .unwrap()
}

pub fn with_raw_action(request: HttpRequest, value: &str) -> HttpRequest {
    request.with_header(HeaderName::from_static(SOAP_ACTION), value).unwrap()
}

/// Hands requests straight to a server in the same process.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    pub server: Arc<ServerProtocol>,
}

impl LoopbackTransport {
    pub fn new(server: ServerProtocol) -> Self {
        Self {
            server: Arc::new(server),
        }
    }
}

impl HttpTransport for LoopbackTransport {
    fn send(&self, _call: CallId, request: HttpRequest) -> Result<HttpResponse, SoapError> {
        Ok(self.server.handle(request))
    }
}

/// Like [`LoopbackTransport`], but `begin_send` answers from another thread.
#[derive(Debug, Clone)]
pub struct ThreadedTransport {
    pub inner: LoopbackTransport,
}

impl HttpTransport for ThreadedTransport {
    fn send(&self, call: CallId, request: HttpRequest) -> Result<HttpResponse, SoapError> {
        self.inner.send(call, request)
    }

    fn begin_send(
        &self,
        call: CallId,
        request: HttpRequest,
        on_done: Box<dyn FnOnce(Result<HttpResponse, SoapError>) + Send>,
    ) {
        let inner = self.inner.clone();
        thread::spawn(move || on_done(inner.send(call, request)));
    }
}

pub fn counting_callback(counter: Arc<std::sync::atomic::AtomicUsize>) -> CompletionCallback {
    Box::new(move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    })
}

/// Reads the fault out of a fault response.
pub fn decode_fault(response: &HttpResponse) -> SoapException {
    let xml = response.body_text();
    let document = ironsoap_xml::parser::parse(&xml).expect("fault response is XML");
    let envelope = Envelope::from_document(&document).expect("fault response is an envelope");
    let fault = envelope.fault().expect("body carries a fault");
    FaultCodec::new(envelope.version()).decode(fault).expect("fault decodes")
}
