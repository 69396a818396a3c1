mod common;

use common::*;
use hyper::StatusCode;
use ironsoap::{
    ClientConfig, ClientProtocol, FaultCodec, FaultKind, HttpRequest, HttpResponse, HttpTransport,
    SoapError, SoapException, SoapHeaderCollection, SoapVersion, Value,
    client::CallId,
    envelope::{Envelope, EnvelopeWriter},
    fault::codes,
};
use ironsoap_xml::{QualifiedName, parser::parse};

fn decode_with(codec: FaultCodec, xml: &str) -> Result<SoapException, ironsoap_xml::XmlError> {
    let document = parse(xml).unwrap();
    let envelope = Envelope::from_document(&document).unwrap();
    codec.decode(envelope.fault().expect("a fault"))
}

fn write_fault(version: SoapVersion, fault: &SoapException) -> String {
    let body = FaultCodec::new(version).encode(fault);
    let bytes = EnvelopeWriter::new(version).write(Vec::new(), vec![body], "utf-8").unwrap();
    String::from_utf8(bytes).unwrap()
}

struct FaultingTransport {
    content_type: &'static str,
    body: String,
}

impl HttpTransport for FaultingTransport {
    fn send(&self, _call: CallId, _request: HttpRequest) -> Result<HttpResponse, SoapError> {
        HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR).with_body(self.content_type, self.body.clone().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_soap11_server_fault_with_detail() {
        let fault = decode_with(
            FaultCodec::new(SoapVersion::Soap11),
            &resource("fault_server_soap11.xml"),
        )
        .unwrap();

        assert_eq!(fault.kind(), Some(FaultKind::Receiver));
        assert_eq!(fault.message, "Server was unable to process request.");
        assert!(!fault.is_header_fault());
        let trace = fault.detail.as_ref().unwrap().child_elements().next().unwrap();
        assert_eq!(trace.name, QualifiedName::new("Trace", APP));
        assert_eq!(trace.text(), "stack");
    }

    #[test]
    fn test_decode_soap12_nested_subcodes() {
        let fault = decode_with(
            FaultCodec::new(SoapVersion::Soap12),
            &resource("fault_nested_subcodes_soap12.xml"),
        )
        .unwrap();

        assert_eq!(fault.kind(), Some(FaultKind::Sender));
        assert_eq!(fault.message, "b must not be zero");
        assert_eq!(fault.lang.as_deref(), Some("en"));
        assert_eq!(fault.actor.as_deref(), Some("urn:calculator"));
        let chain: Vec<_> = fault.sub_code.as_ref().unwrap().codes().cloned().collect();
        assert_eq!(
            chain,
            [
                QualifiedName::new(codes::RPC_BAD_ARGUMENTS, codes::RPC_NAMESPACE),
                QualifiedName::new("OutOfRange", APP),
            ]
        );
    }

    #[test]
    fn test_subcode_depth_limit() {
        let xml = resource("fault_nested_subcodes_soap12.xml");
        assert!(decode_with(FaultCodec::new(SoapVersion::Soap12).max_subcode_depth(1), &xml).is_err());
        assert!(decode_with(FaultCodec::new(SoapVersion::Soap12).max_subcode_depth(2), &xml).is_ok());
    }

    #[test]
    fn test_soap11_server_fault_rewritten_as_soap12() {
        let fault = decode_with(
            FaultCodec::new(SoapVersion::Soap11),
            &resource("fault_server_soap11.xml"),
        )
        .unwrap();

        let xml = write_fault(SoapVersion::Soap12, &fault);
        let rewritten = decode_with(FaultCodec::new(SoapVersion::Soap12), &xml).unwrap();
        assert_eq!(rewritten.code.name(), codes::RECEIVER);
        assert_eq!(rewritten.code.namespace(), SoapVersion::Soap12.envelope_namespace());
        assert_eq!(rewritten.message, fault.message);
        assert!(rewritten.detail.is_some());
    }

    #[test]
    fn test_nested_subcodes_survive_rewriting() {
        let fault = decode_with(
            FaultCodec::new(SoapVersion::Soap12),
            &resource("fault_nested_subcodes_soap12.xml"),
        )
        .unwrap();

        let xml = write_fault(SoapVersion::Soap12, &fault);
        let rewritten = decode_with(FaultCodec::new(SoapVersion::Soap12), &xml).unwrap();
        assert_eq!(rewritten.code, fault.code);
        assert_eq!(rewritten.sub_code, fault.sub_code);
        assert_eq!(rewritten.actor, fault.actor);
    }

    #[test]
    fn test_client_reports_the_received_fault() {
        let client = ClientProtocol::new(
            ClientConfig::builder().url(URL).build(),
            &calculator("FaultsClientReceives"),
            FaultingTransport {
                content_type: "text/xml; charset=utf-8",
                body: resource("fault_server_soap11.xml"),
            },
        )
        .unwrap();

        let err = client
            .invoke("Add", vec![Value::from(1), Value::from(2)], SoapHeaderCollection::new())
            .unwrap_err();
        let fault = err.as_fault().expect("a SOAP fault");
        assert_eq!(fault.code.name(), codes::SERVER);
        assert!(fault.detail.is_some());
    }
}
