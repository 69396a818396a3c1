//! Visitor-based deserialization over `roxmltree` documents.
pub use roxmltree::*;

use crate::{QualifiedName, XmlError};

pub fn parse(xml: &str) -> Result<Document<'_>, roxmltree::Error> {
    roxmltree::Document::parse(xml)
}

pub trait XmlVisitor<'a> {
    type Value;

    fn visit_node(&mut self, node: Node<'a, 'a>) -> Result<(), XmlError>;

    fn visit_children(
        &mut self,
        children: impl Iterator<Item = Node<'a, 'a>>,
    ) -> Result<(), XmlError> {
        let _ = children;
        Ok(())
    }

    fn finish(self) -> Result<Self::Value, XmlError>;
}

pub trait XmlDeserialize<'a>: Sized {
    type Visitor: XmlVisitor<'a, Value = Self>;

    fn visitor() -> Self::Visitor;

    fn from_node(node: Node<'a, 'a>) -> Result<Self, XmlError> {
        NodeDeserializer::new(node).deserialize(Self::visitor())
    }
}

pub struct NodeDeserializer<'a> {
    root: Node<'a, 'a>,
}

impl<'a> NodeDeserializer<'a> {
    pub fn new(root: Node<'a, 'a>) -> Self {
        Self { root }
    }

    /// Drive any visitor over the subtree rooted at `self.root`
    pub fn deserialize<V>(self, mut visitor: V) -> Result<V::Value, XmlError>
    where
        V: XmlVisitor<'a>,
    {
        visitor.visit_node(self.root)?;
        visitor.visit_children(self.root.children())?;
        visitor.finish()
    }
}

/// Element children of `node`, skipping text, comments and processing instructions.
pub fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

pub fn first_child_element<'a, 'input>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    child_elements(node).next()
}

/// Finds the first child element with the given local name and namespace.
pub fn find_child<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
    namespace: Option<&str>,
) -> Option<Node<'a, 'input>> {
    child_elements(node).find(|child| {
        child.tag_name().name() == name && child.tag_name().namespace() == namespace
    })
}

/// Text content of an element, concatenating all text children.
pub fn text_content(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect()
}

/// Resolves a `prefix:local` value (such as a fault code) against the namespaces in scope at `node`.
pub fn resolve_qname_text(node: Node<'_, '_>, value: &str) -> Result<QualifiedName, XmlError> {
    let value = value.trim();
    match value.split_once(':') {
        Some((prefix, local)) => {
            let namespace = node.lookup_namespace_uri(Some(prefix)).ok_or_else(|| {
                XmlError::UndeclaredPrefix {
                    prefix: prefix.to_owned(),
                    value: value.to_owned(),
                }
            })?;
            Ok(QualifiedName::new(local, namespace))
        }
        None => {
            let namespace = node.lookup_namespace_uri(None).unwrap_or_default();
            Ok(QualifiedName::new(value, namespace))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>bad</faultstring>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn test_child_helpers_skip_whitespace() {
        let doc = parse(ENVELOPE).unwrap();
        let root = doc.root_element();
        let body = first_child_element(root).unwrap();
        assert_eq!(body.tag_name().name(), "Body");

        let fault = find_child(body, "Fault", Some("http://schemas.xmlsoap.org/soap/envelope/"));
        assert!(fault.is_some());
        assert!(find_child(body, "Fault", None).is_none());
    }

    #[test]
    fn test_resolve_qname_text() {
        let doc = parse(ENVELOPE).unwrap();
        let code = doc
            .descendants()
            .find(|n| n.has_tag_name("faultcode"))
            .unwrap();
        let qname = resolve_qname_text(code, &text_content(code)).unwrap();
        assert_eq!(
            qname,
            QualifiedName::new("Client", "http://schemas.xmlsoap.org/soap/envelope/")
        );

        let err = resolve_qname_text(code, "missing:Client").unwrap_err();
        assert!(matches!(err, XmlError::UndeclaredPrefix { .. }));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(parse("").is_err());
        assert!(parse("   \n\t").is_err());
    }
}
