use ironsoap_xml::{
    OwnedElement, QualifiedName, XML_NAMESPACE, XmlError,
    builder::{Attribute, Element},
    parser::{Node, NodeDeserializer, XmlVisitor, find_child, resolve_qname_text, text_content},
};
use tracing::debug;

use super::{FaultOrigin, SoapException, SoapFaultSubCode};
use crate::version::SoapVersion;

/// Subcode chains nested deeper than this are rejected when reading a fault.
pub const MAX_SUBCODE_DEPTH: usize = 100;

/// Replaces the fault message when the server hides error details.
pub const SUPPRESSED_FAULT_MESSAGE: &str = "An error occurred on the server.";

const DEFAULT_LANG: &str = "en";
const CODE_PREFIX: &str = "code";

/// Reads and writes `<Fault>` elements for one SOAP version.
#[derive(Debug, Clone, Copy)]
pub struct FaultCodec {
    version: SoapVersion,
    suppress_details: bool,
    max_depth: usize,
}

impl FaultCodec {
    pub fn new(version: SoapVersion) -> Self {
        Self {
            version,
            suppress_details: false,
            max_depth: MAX_SUBCODE_DEPTH,
        }
    }

    pub fn max_subcode_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn suppress_details(mut self, suppress: bool) -> Self {
        self.suppress_details = suppress;
        self
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// The fault as it goes on the wire: code in this version's vocabulary,
    /// message and detail hidden when suppression is on.
    pub fn prepare(&self, exception: &SoapException) -> SoapException {
        let mut fault = exception.translated(self.version);
        if self.suppress_details {
            fault.message = SUPPRESSED_FAULT_MESSAGE.to_owned();
            fault.detail = None;
        }
        fault
    }

    pub fn encode(&self, exception: &SoapException) -> Element<'static> {
        let fault = self.prepare(exception);
        debug!(version = %self.version, code = %fault.code, "Encoding fault");
        match self.version {
            SoapVersion::Soap11 => self.encode_soap11(&fault),
            SoapVersion::Soap12 => self.encode_soap12(&fault),
        }
    }

    fn encode_soap11(&self, fault: &SoapException) -> Element<'static> {
        let ns = self.version.envelope_namespace();
        let mut element = Element::new("Fault")
            .set_namespace(ns)
            .add_namespace_declaration(ns, Some(self.version.prefix()))
            .add_child(self.code_element("faultcode", None, &fault.code));

        let mut faultstring = Element::new("faultstring").set_text(fault.message.clone());
        if let Some(lang) = &fault.lang {
            faultstring = faultstring.add_attribute(lang_attribute(lang));
        }
        element = element.add_child(faultstring);

        if let Some(actor) = &fault.actor {
            element = element.add_child(Element::new("faultactor").set_text(actor.clone()));
        }

        // Header faults must not carry a detail; body faults always do.
        if fault.origin == FaultOrigin::Body {
            element = element.add_child(match &fault.detail {
                Some(detail) => detail_element(detail, QualifiedName::unqualified("detail")),
                None => Element::new("detail"),
            });
        }

        element
    }

    fn encode_soap12(&self, fault: &SoapException) -> Element<'static> {
        let ns = self.version.envelope_namespace();

        let mut code = Element::new("Code")
            .set_namespace(ns)
            .add_child(self.code_element("Value", Some(ns), &fault.code));
        if let Some(sub_code) = &fault.sub_code {
            code = code.add_child(self.subcode_element(sub_code));
        }

        let lang = fault.lang.as_deref().unwrap_or(DEFAULT_LANG);
        let reason = Element::new("Reason").set_namespace(ns).add_child(
            Element::new("Text")
                .set_namespace(ns)
                .add_attribute(lang_attribute(lang))
                .set_text(fault.message.clone()),
        );

        let mut element = Element::new("Fault")
            .set_namespace(ns)
            .add_namespace_declaration(ns, Some(self.version.prefix()))
            .add_child(code)
            .add_child(reason);

        if let Some(node) = &fault.node {
            element = element.add_child(Element::new("Node").set_namespace(ns).set_text(node.clone()));
        }
        if let Some(role) = &fault.actor {
            element = element.add_child(Element::new("Role").set_namespace(ns).set_text(role.clone()));
        }
        if let Some(detail) = &fault.detail {
            element = element.add_child(detail_element(detail, QualifiedName::new("Detail", ns)));
        }

        element
    }

    fn subcode_element(&self, sub_code: &SoapFaultSubCode) -> Element<'static> {
        let ns = self.version.envelope_namespace();
        let codes: Vec<&QualifiedName> = sub_code.codes().take(self.max_depth).collect();

        // Built from the innermost link outwards so the chain never recurses.
        let mut inner: Option<Element<'static>> = None;
        for code in codes.into_iter().rev() {
            let mut element = Element::new("Subcode")
                .set_namespace(ns)
                .add_child(self.code_element("Value", Some(ns), code));
            if let Some(child) = inner.take() {
                element = element.add_child(child);
            }
            inner = Some(element);
        }

        inner.unwrap_or_else(|| Element::new("Subcode").set_namespace(ns))
    }

    fn code_element(
        &self,
        name: &'static str,
        element_namespace: Option<&'static str>,
        code: &QualifiedName,
    ) -> Element<'static> {
        let envelope = self.version.envelope_namespace();
        let element = Element::new(name).set_namespace_optional(element_namespace);
        match code.namespace_opt() {
            None => element.set_text(code.name().to_owned()),
            Some(ns) if ns == envelope => {
                let prefix = self.version.prefix();
                element
                    .add_namespace_declaration(envelope, Some(prefix))
                    .set_text(format!("{prefix}:{}", code.name()))
            }
            Some(ns) => element
                .add_owned_declaration(ns.to_owned(), CODE_PREFIX.to_owned())
                .set_text(format!("{CODE_PREFIX}:{}", code.name())),
        }
    }

    /// Reads a `<Fault>` element written by a peer of this codec's version.
    pub fn decode<'a>(&self, fault: Node<'a, 'a>) -> Result<SoapException, XmlError> {
        NodeDeserializer::new(fault).deserialize(FaultVisitor::new(self.version, self.max_depth))
    }
}

fn lang_attribute(lang: &str) -> Attribute<'static> {
    Attribute::new_with_namespace("lang", lang.to_owned(), Some(XML_NAMESPACE))
}

fn detail_element(detail: &OwnedElement, name: QualifiedName) -> Element<'static> {
    let mut renamed = detail.clone();
    renamed.name = name;
    renamed.to_element()
}

struct FaultVisitor {
    version: SoapVersion,
    max_depth: usize,
    code: Option<QualifiedName>,
    sub_codes: Vec<QualifiedName>,
    message: Option<String>,
    lang: Option<String>,
    actor: Option<String>,
    node: Option<String>,
    detail: Option<OwnedElement>,
}

impl FaultVisitor {
    fn new(version: SoapVersion, max_depth: usize) -> Self {
        Self {
            version,
            max_depth,
            code: None,
            sub_codes: Vec::new(),
            message: None,
            lang: None,
            actor: None,
            node: None,
            detail: None,
        }
    }

    fn visit_soap11_child(&mut self, child: Node<'_, '_>) -> Result<(), XmlError> {
        // 1.1 fault children are unqualified, but some peers qualify them anyway.
        match child.tag_name().name() {
            "faultcode" => self.code = Some(resolve_qname_text(child, &text_content(child))?),
            "faultstring" => {
                self.message = Some(text_content(child));
                self.lang = child
                    .attribute((XML_NAMESPACE, "lang"))
                    .map(str::to_owned);
            }
            "faultactor" => self.actor = Some(text_content(child)),
            "detail" => self.detail = Some(OwnedElement::from_node(child)?),
            other => debug!(tag = other, "Ignoring unknown fault child"),
        }
        Ok(())
    }

    fn visit_soap12_child(&mut self, child: Node<'_, '_>) -> Result<(), XmlError> {
        let ns = self.version.envelope_namespace();
        if child.tag_name().namespace() != Some(ns) {
            debug!(tag = child.tag_name().name(), "Ignoring foreign fault child");
            return Ok(());
        }

        match child.tag_name().name() {
            "Code" => self.read_code(child)?,
            "Reason" => {
                // The first Text wins; translations in other languages are skipped.
                if let Some(text) = find_child(child, "Text", Some(ns)) {
                    self.message = Some(text_content(text));
                    self.lang = text.attribute((XML_NAMESPACE, "lang")).map(str::to_owned);
                }
            }
            "Node" => self.node = Some(text_content(child)),
            "Role" => self.actor = Some(text_content(child)),
            "Detail" => self.detail = Some(OwnedElement::from_node(child)?),
            other => debug!(tag = other, "Ignoring unknown fault child"),
        }
        Ok(())
    }

    fn read_code(&mut self, code: Node<'_, '_>) -> Result<(), XmlError> {
        let ns = self.version.envelope_namespace();
        let value = find_child(code, "Value", Some(ns))
            .ok_or_else(|| XmlError::InvalidXml("fault Code has no Value".to_owned()))?;
        self.code = Some(resolve_qname_text(value, &text_content(value))?);

        let mut current = find_child(code, "Subcode", Some(ns));
        while let Some(subcode) = current {
            if self.sub_codes.len() >= self.max_depth {
                return Err(XmlError::DepthLimitExceeded {
                    tag: "Subcode".to_owned(),
                    limit: self.max_depth,
                });
            }
            let value = find_child(subcode, "Value", Some(ns))
                .ok_or_else(|| XmlError::InvalidXml("fault Subcode has no Value".to_owned()))?;
            self.sub_codes
                .push(resolve_qname_text(value, &text_content(value))?);
            current = find_child(subcode, "Subcode", Some(ns));
        }
        Ok(())
    }
}

impl<'a> XmlVisitor<'a> for FaultVisitor {
    type Value = SoapException;

    fn visit_node(&mut self, node: Node<'a, 'a>) -> Result<(), XmlError> {
        let ns = self.version.envelope_namespace();
        if node.tag_name().name() != "Fault" {
            return Err(XmlError::XmlInvalidTag {
                expected: "Fault".to_owned(),
                found: node.tag_name().name().to_owned(),
            });
        }
        if node.tag_name().namespace() != Some(ns) {
            return Err(XmlError::XmlInvalidNamespace {
                expected: ns.to_owned(),
                found: node.tag_name().namespace().map(str::to_owned),
            });
        }
        Ok(())
    }

    fn visit_children(
        &mut self,
        children: impl Iterator<Item = Node<'a, 'a>>,
    ) -> Result<(), XmlError> {
        for child in children.filter(Node::is_element) {
            match self.version {
                SoapVersion::Soap11 => self.visit_soap11_child(child)?,
                SoapVersion::Soap12 => self.visit_soap12_child(child)?,
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Self::Value, XmlError> {
        let code = self
            .code
            .ok_or_else(|| XmlError::InvalidXml("fault has no code".to_owned()))?;

        let mut exception = SoapException::new(code, self.message.unwrap_or_default());
        exception.sub_code = SoapFaultSubCode::from_chain(self.sub_codes);
        exception.lang = self.lang;
        exception.actor = self.actor;
        exception.node = self.node;

        // 1.1 marks header faults by leaving the detail out.
        exception.origin = match (self.version, &self.detail) {
            (SoapVersion::Soap11, None) => FaultOrigin::Header,
            _ => FaultOrigin::Body,
        };
        exception.detail = self.detail.filter(|detail| !is_empty(detail));
        Ok(exception)
    }
}

fn is_empty(detail: &OwnedElement) -> bool {
    detail.attributes.is_empty()
        && detail.child_elements().next().is_none()
        && detail.text().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use ironsoap_xml::builder::Builder;
    use ironsoap_xml::parser::parse;

    use super::*;
    use crate::fault::{FaultKind, codes};

    fn render(element: Element<'_>) -> String {
        Builder::new(None, element).to_xml_string().unwrap()
    }

    fn round_trip(codec: FaultCodec, exception: &SoapException) -> SoapException {
        let xml = render(codec.encode(exception));
        let doc = parse(&xml).unwrap();
        codec.decode(doc.root_element()).unwrap()
    }

    #[test]
    fn test_soap11_body_fault_has_empty_detail() {
        let codec = FaultCodec::new(SoapVersion::Soap11);
        let xml = render(codec.encode(&SoapException::server(SoapVersion::Soap11, "boom")));
        assert_eq!(
            xml,
            r#"<soap:Fault xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><faultcode>soap:Server</faultcode><faultstring>boom</faultstring><detail/></soap:Fault>"#
        );
    }

    #[test]
    fn test_soap11_header_fault_has_no_detail() {
        let codec = FaultCodec::new(SoapVersion::Soap11);
        let fault = SoapException::must_understand(SoapVersion::Soap11, "header not understood");
        let xml = render(codec.encode(&fault));
        assert!(!xml.contains("detail"));

        let decoded = round_trip(codec, &fault);
        assert!(decoded.is_header_fault());
        assert_eq!(decoded.kind(), Some(FaultKind::MustUnderstand));
    }

    #[test]
    fn test_soap12_fault_translates_server_code() {
        let codec = FaultCodec::new(SoapVersion::Soap12);
        let xml = render(codec.encode(&SoapException::server(SoapVersion::Soap11, "boom")));
        assert!(xml.contains("<soap12:Value>soap12:Receiver</soap12:Value>"), "{xml}");
        assert!(xml.contains(r#"<soap12:Text xml:lang="en">boom</soap12:Text>"#), "{xml}");
    }

    #[test]
    fn test_soap12_round_trip_keeps_sub_codes_and_role() {
        let codec = FaultCodec::new(SoapVersion::Soap12);
        let fault = SoapException::client(SoapVersion::Soap12, "bad args")
            .with_sub_code(
                SoapFaultSubCode::new(QualifiedName::new(
                    codes::RPC_BAD_ARGUMENTS,
                    codes::RPC_NAMESPACE,
                ))
                .with_sub_code(SoapFaultSubCode::new(QualifiedName::new("Range", "urn:app"))),
            )
            .with_actor("urn:role")
            .with_node("urn:node");

        let decoded = round_trip(codec, &fault);
        assert_eq!(decoded.code, fault.code);
        assert_eq!(decoded.sub_code, fault.sub_code);
        assert_eq!(decoded.actor.as_deref(), Some("urn:role"));
        assert_eq!(decoded.node.as_deref(), Some("urn:node"));
        assert_eq!(decoded.lang.as_deref(), Some("en"));
    }

    #[test]
    fn test_detail_survives_round_trip() {
        let codec = FaultCodec::new(SoapVersion::Soap11);
        let detail = OwnedElement::new(QualifiedName::unqualified("detail")).with_child(
            OwnedElement::new(QualifiedName::new("Reason", "urn:app")).with_text("quota"),
        );
        let fault = SoapException::client(SoapVersion::Soap11, "bad").with_detail(detail);

        let decoded = round_trip(codec, &fault);
        let decoded_detail = decoded.detail.unwrap();
        let reason = decoded_detail.child_elements().next().unwrap();
        assert_eq!(reason.name, QualifiedName::new("Reason", "urn:app"));
        assert_eq!(reason.text(), "quota");
    }

    #[test]
    fn test_suppression_hides_message_and_detail() {
        let codec = FaultCodec::new(SoapVersion::Soap11).suppress_details(true);
        let detail = OwnedElement::new(QualifiedName::unqualified("detail"))
            .with_child(OwnedElement::new(QualifiedName::unqualified("stack")).with_text("secret"));
        let fault = SoapException::server(SoapVersion::Soap11, "db password wrong").with_detail(detail);

        let xml = render(codec.encode(&fault));
        assert!(xml.contains(SUPPRESSED_FAULT_MESSAGE));
        assert!(!xml.contains("secret"));
        assert!(!xml.contains("password"));
    }

    #[test]
    fn test_excessive_subcode_nesting_is_rejected() {
        let ns = "http://www.w3.org/2003/05/soap-envelope";
        let depth = MAX_SUBCODE_DEPTH + 1;
        let mut xml = format!(
            r#"<e:Fault xmlns:e="{ns}"><e:Code><e:Value>e:Sender</e:Value>"#
        );
        for _ in 0..depth {
            xml.push_str("<e:Subcode><e:Value>e:Sender</e:Value>");
        }
        for _ in 0..depth {
            xml.push_str("</e:Subcode>");
        }
        xml.push_str("</e:Code><e:Reason><e:Text xml:lang=\"en\">x</e:Text></e:Reason></e:Fault>");

        let doc = parse(&xml).unwrap();
        let result = FaultCodec::new(SoapVersion::Soap12).decode(doc.root_element());
        assert!(matches!(
            result,
            Err(XmlError::DepthLimitExceeded { limit: MAX_SUBCODE_DEPTH, .. })
        ));
    }

    #[test]
    fn test_decoding_wrong_version_fails() {
        let xml = r#"<s:Fault xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><faultcode>s:Client</faultcode></s:Fault>"#;
        let doc = parse(xml).unwrap();
        let result = FaultCodec::new(SoapVersion::Soap12).decode(doc.root_element());
        assert!(matches!(result, Err(XmlError::XmlInvalidNamespace { .. })));
    }
}
