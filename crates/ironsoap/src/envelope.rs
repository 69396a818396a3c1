//! Reading and writing of the `Envelope`/`Header`/`Body` frame.
use ironsoap_xml::{
    QualifiedName, XmlError,
    builder::{Attribute, Builder, Declaration, Element},
    parser::{Document, Node, NodeDeserializer, XmlVisitor, child_elements, first_child_element},
};
use tracing::trace;

use crate::{
    Result, SoapError, charset,
    version::{SoapVersion, XSD_NAMESPACE, XSI_NAMESPACE},
};

const ENVELOPE: &str = "Envelope";
const HEADER: &str = "Header";
const BODY: &str = "Body";
const FAULT: &str = "Fault";
const NOT_UNDERSTOOD: &str = "NotUnderstood";

/// Writes envelopes of one SOAP version.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeWriter {
    version: SoapVersion,
}

impl EnvelopeWriter {
    pub fn new(version: SoapVersion) -> Self {
        Self { version }
    }

    pub fn element(
        &self,
        headers: Vec<Element<'static>>,
        body: Vec<Element<'static>>,
    ) -> Element<'static> {
        let ns = self.version.envelope_namespace();
        let mut envelope = Element::new(ENVELOPE)
            .set_namespace(ns)
            .add_namespace_declaration(ns, Some(self.version.prefix()))
            .add_namespace_declaration(XSI_NAMESPACE, Some("xsi"))
            .add_namespace_declaration(XSD_NAMESPACE, Some("xsd"));

        if !headers.is_empty() {
            envelope = envelope.add_child(Element::new(HEADER).set_namespace(ns).add_children(headers));
        }
        envelope.add_child(Element::new(BODY).set_namespace(ns).add_children(body))
    }

    /// Writes the envelope encoded as `charset`, which the XML declaration names too.
    pub fn write(
        &self,
        headers: Vec<Element<'static>>,
        body: Vec<Element<'static>>,
        charset: &str,
    ) -> Result<Vec<u8>> {
        let envelope = self.element(headers, body);
        let xml = Builder::new(Some(Declaration::new("1.0", charset)), envelope).to_xml_string()?;
        trace!(envelope = %xml, charset, "Wrote envelope");
        charset::encode(&xml, charset)
    }
}

/// SOAP 1.2 `NotUnderstood` header blocks naming the headers of a MustUnderstand fault.
/// SOAP 1.1 has no such block and gets none.
pub fn not_understood_headers(version: SoapVersion, names: &[QualifiedName]) -> Vec<Element<'static>> {
    if version != SoapVersion::Soap12 {
        return Vec::new();
    }
    let ns = version.envelope_namespace();
    names
        .iter()
        .map(|name| {
            let element = Element::new(NOT_UNDERSTOOD).set_namespace(ns);
            match name.namespace_opt() {
                Some(namespace) => element
                    .add_owned_declaration(namespace.to_owned(), "q0".to_owned())
                    .add_attribute(Attribute::new("qname", format!("q0:{}", name.name()))),
                None => element.add_attribute(Attribute::new("qname", name.name().to_owned())),
            }
        })
        .collect()
}

/// What routing needs to know about an envelope before it is read in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopePeek {
    pub namespace: String,
    pub version: Option<SoapVersion>,
    pub first_body_element: Option<QualifiedName>,
}

impl EnvelopePeek {
    pub fn read(xml: &str) -> Result<Self> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        if root.tag_name().name() != ENVELOPE {
            return Err(XmlError::XmlInvalidTag {
                expected: ENVELOPE.to_owned(),
                found: root.tag_name().name().to_owned(),
            }
            .into());
        }

        let namespace = root.tag_name().namespace().unwrap_or_default().to_owned();
        let first_body_element = child_elements(root)
            .find(|child| child.tag_name().name() == BODY && child.tag_name().namespace() == Some(namespace.as_str()))
            .and_then(first_child_element)
            .map(QualifiedName::from_node);

        Ok(Self {
            version: SoapVersion::from_envelope_namespace(&namespace),
            namespace,
            first_body_element,
        })
    }
}

/// A parsed envelope borrowing its document.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    version: SoapVersion,
    header: Option<Node<'a, 'a>>,
    body: Node<'a, 'a>,
}

impl<'a> Envelope<'a> {
    pub fn from_document(document: &'a Document<'a>) -> Result<Self> {
        let root = document.root_element();
        let namespace = root.tag_name().namespace().unwrap_or_default();
        let version = SoapVersion::from_envelope_namespace(namespace).ok_or_else(|| {
            SoapError::VersionMismatch {
                namespace: namespace.to_owned(),
            }
        })?;
        Ok(NodeDeserializer::new(root).deserialize(EnvelopeVisitor::new(version))?)
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn header(&self) -> Option<Node<'a, 'a>> {
        self.header
    }

    pub fn header_elements(&self) -> impl Iterator<Item = Node<'a, 'a>> + use<'a> {
        self.header.into_iter().flat_map(child_elements)
    }

    pub fn body(&self) -> Node<'a, 'a> {
        self.body
    }

    pub fn first_body_element(&self) -> Option<Node<'a, 'a>> {
        first_child_element(self.body)
    }

    /// The body's `Fault` element, when the body carries one.
    pub fn fault(&self) -> Option<Node<'a, 'a>> {
        self.first_body_element().filter(|node| {
            node.tag_name().name() == FAULT
                && node.tag_name().namespace() == Some(self.version.envelope_namespace())
        })
    }
}

struct EnvelopeVisitor<'a> {
    version: SoapVersion,
    header: Option<Node<'a, 'a>>,
    body: Option<Node<'a, 'a>>,
}

impl EnvelopeVisitor<'_> {
    fn new(version: SoapVersion) -> Self {
        Self {
            version,
            header: None,
            body: None,
        }
    }
}

impl<'a> XmlVisitor<'a> for EnvelopeVisitor<'a> {
    type Value = Envelope<'a>;

    fn visit_node(&mut self, node: Node<'a, 'a>) -> Result<(), XmlError> {
        if node.tag_name().name() != ENVELOPE {
            return Err(XmlError::XmlInvalidTag {
                expected: ENVELOPE.to_owned(),
                found: node.tag_name().name().to_owned(),
            });
        }
        Ok(())
    }

    fn visit_children(&mut self, children: impl Iterator<Item = Node<'a, 'a>>) -> Result<(), XmlError> {
        let ns = self.version.envelope_namespace();
        for child in children.filter(Node::is_element) {
            if child.tag_name().namespace() != Some(ns) {
                return Err(XmlError::XmlInvalidNamespace {
                    expected: ns.to_owned(),
                    found: child.tag_name().namespace().map(str::to_owned),
                });
            }
            match child.tag_name().name() {
                HEADER if self.header.is_none() && self.body.is_none() => self.header = Some(child),
                BODY if self.body.is_none() => self.body = Some(child),
                other => return Err(XmlError::UnexpectedTag(other.to_owned())),
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Self::Value, XmlError> {
        let body = self
            .body
            .ok_or_else(|| XmlError::InvalidXml("the envelope has no Body".to_owned()))?;
        Ok(Envelope {
            version: self.version,
            header: self.header,
            body,
        })
    }
}
