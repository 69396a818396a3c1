mod common;

use common::*;
use hyper::StatusCode;
use ironsoap::{
    FaultKind, MethodDescriptor, MethodInvocation, MethodOutcome, ServerProtocol, ServiceDescription, SoapHeader,
    contract::{HeaderAttribute, HeaderDirection, MethodAttribute},
    serializer::XmlTypeCode,
};
use ironsoap_xml::QualifiedName;

const ADD_WITH_SESSION: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header><h:Session xmlns:h="urn:app">7</h:Session></soap:Header>
  <soap:Body><Add xmlns="http://tempuri.org/"><a>2</a><b>3</b></Add></soap:Body>
</soap:Envelope>"#;

fn error_info() -> QualifiedName {
    QualifiedName::new("ErrorInfo", APP)
}

/// `Add` taking a Session header that may also travel with faults, and an ErrorInfo fault header.
fn add_with_fault_headers(name: &str) -> ServiceDescription {
    let session = HeaderAttribute::builder()
        .member_name("Session")
        .element(QualifiedName::new("Session", APP))
        .type_code(XmlTypeCode::Int)
        .direction(HeaderDirection::IN | HeaderDirection::FAULT)
        .required(false)
        .build();
    let error_info = HeaderAttribute::builder()
        .member_name("ErrorInfo")
        .element(error_info())
        .type_code(XmlTypeCode::Int)
        .direction(HeaderDirection::FAULT)
        .required(false)
        .build();
    let method: MethodDescriptor = {
        let mut method = add_method(name);
        method.attributes.push(MethodAttribute::Header(session));
        method.attributes.push(MethodAttribute::Header(error_info));
        method
    };
    ServiceDescription::builder()
        .name(name)
        .methods(vec![method.into()])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_carries_the_headers_the_method_set() {
        let failing = |invocation: &mut MethodInvocation| -> anyhow::Result<MethodOutcome> {
            invocation.out_headers.push(SoapHeader::known(error_info(), 42));
            anyhow::bail!("disk full")
        };
        let server = ServerProtocol::new(&add_with_fault_headers("FaultHeadersFromMethod"), failing).unwrap();
        let response = server.handle(soap11_request("http://tempuri.org/Add", ADD_WITH_SESSION.to_owned()));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let xml = response.body_text();
        assert!(xml.contains("ErrorInfo"), "{xml}");
        assert!(xml.contains(">42<"), "{xml}");
        assert!(!xml.contains("Session"), "request headers leaked into the fault: {xml}");
        assert_eq!(decode_fault(&response).kind(), Some(FaultKind::Receiver));
    }

    #[test]
    fn test_fault_does_not_echo_request_headers() {
        let failing = |_: &mut MethodInvocation| -> anyhow::Result<MethodOutcome> { anyhow::bail!("disk full") };
        let server = ServerProtocol::new(&add_with_fault_headers("FaultHeadersNotEchoed"), failing).unwrap();
        let response = server.handle(soap11_request("http://tempuri.org/Add", ADD_WITH_SESSION.to_owned()));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let xml = response.body_text();
        assert!(!xml.contains("Session"), "{xml}");
        assert!(!xml.contains("soap:Header"), "{xml}");
    }

    #[test]
    fn test_unreadable_request_fault_has_no_headers() {
        let server = ServerProtocol::new(&add_with_fault_headers("FaultHeadersUnreadable"), calculator_service).unwrap();
        let xml = ADD_WITH_SESSION.replace("<a>2</a>", "<a>two</a>");
        let response = server.handle(soap11_request("http://tempuri.org/Add", xml));

        assert_eq!(decode_fault(&response).kind(), Some(FaultKind::Sender));
        assert!(!response.body_text().contains("Session"));
    }
}
