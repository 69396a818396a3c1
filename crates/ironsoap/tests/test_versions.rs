mod common;

use common::*;
use hyper::StatusCode;
use ironsoap::{
    FaultKind, ServerProtocol, ServiceDescription, SupportedVersions,
    version::{SOAP11_ENVELOPE_NAMESPACE, SOAP12_ENVELOPE_NAMESPACE},
};

fn calculator_with(name: &str, supported_versions: SupportedVersions) -> ServiceDescription {
    let mut description = calculator(name);
    description.supported_versions = supported_versions;
    description
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soap12_envelope_to_soap11_only_server() {
        let server = ServerProtocol::new(
            &calculator_with("VersionsSoap11Only", SupportedVersions::SOAP11_ONLY),
            calculator_service,
        )
        .unwrap();
        let response = server.handle(soap12_request(
            Some("http://tempuri.org/Add"),
            resource("add_request_soap12.xml"),
        ));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.content_type().unwrap().media_type(), "text/xml");
        let xml = response.body_text();
        assert!(xml.contains(SOAP11_ENVELOPE_NAMESPACE));
        assert!(!xml.contains(SOAP12_ENVELOPE_NAMESPACE), "{xml}");

        let fault = decode_fault(&response);
        assert_eq!(fault.kind(), Some(FaultKind::VersionMismatch));
        assert_eq!(fault.code.namespace(), SOAP11_ENVELOPE_NAMESPACE);
        assert!(fault.message.contains(SOAP12_ENVELOPE_NAMESPACE));
    }

    #[test]
    fn test_soap11_envelope_to_soap12_only_server() {
        let server = ServerProtocol::new(
            &calculator_with("VersionsSoap12Only", SupportedVersions::SOAP12_ONLY),
            calculator_service,
        )
        .unwrap();
        let response = server.handle(soap11_request(
            "http://tempuri.org/Add",
            resource("add_request_soap11.xml"),
        ));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.content_type().unwrap().media_type(), "application/soap+xml");
        let fault = decode_fault(&response);
        assert_eq!(fault.kind(), Some(FaultKind::VersionMismatch));
        assert_eq!(fault.code.namespace(), SOAP12_ENVELOPE_NAMESPACE);
    }

    #[test]
    fn test_unknown_envelope_namespace_gets_the_primary_version() {
        let server = ServerProtocol::new(&calculator("VersionsUnknownNamespace"), calculator_service).unwrap();
        let xml = r#"<e:Envelope xmlns:e="urn:not-soap"><e:Body><Add xmlns="http://tempuri.org/"/></e:Body></e:Envelope>"#;
        let response = server.handle(soap11_request("http://tempuri.org/Add", xml.to_owned()));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let fault = decode_fault(&response);
        assert_eq!(fault.kind(), Some(FaultKind::VersionMismatch));
        assert_eq!(fault.code.namespace(), SOAP11_ENVELOPE_NAMESPACE);
        assert!(fault.message.contains("urn:not-soap"));
    }

    #[test]
    fn test_mixed_server_answers_in_kind() {
        let server = ServerProtocol::new(&calculator("VersionsMixed"), calculator_service).unwrap();
        assert!(server.supported_versions().is_mixed());

        let soap11 = server.handle(soap11_request(
            "http://tempuri.org/Add",
            resource("add_request_soap11.xml"),
        ));
        assert_eq!(soap11.status, StatusCode::OK);
        assert_eq!(soap11.content_type().unwrap().media_type(), "text/xml");
        assert!(soap11.body_text().contains(SOAP11_ENVELOPE_NAMESPACE));

        let soap12 = server.handle(soap12_request(
            Some("http://tempuri.org/Add"),
            resource("add_request_soap12.xml"),
        ));
        assert_eq!(soap12.status, StatusCode::OK);
        assert_eq!(soap12.content_type().unwrap().media_type(), "application/soap+xml");
        assert!(soap12.body_text().contains(SOAP12_ENVELOPE_NAMESPACE));
    }

    #[test]
    fn test_envelope_overrides_a_misleading_media_type() {
        let server = ServerProtocol::new(&calculator("VersionsMisleadingMedia"), calculator_service).unwrap();
        // 1.1 media type and SOAPAction, but the envelope is 1.2.
        let response = server.handle(soap11_request(
            "http://tempuri.org/Add",
            resource("add_request_soap12.xml"),
        ));

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body_text().contains(SOAP12_ENVELOPE_NAMESPACE));
    }
}
