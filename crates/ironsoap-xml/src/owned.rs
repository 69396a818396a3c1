//! Owned XML trees.
//!
//! `roxmltree` documents borrow the input buffer. Raw header blocks and fault
//! details outlive the request that carried them, so they are copied into an
//! `OwnedElement` that can be queried and written back out.
use std::borrow::Cow;

use crate::{
    builder::{Attribute, Element, Namespace},
    QualifiedName, XmlError,
};

const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedNode {
    Element(OwnedElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedAttribute {
    pub name: QualifiedName,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedElement {
    pub name: QualifiedName,
    /// Prefixed namespace declarations first introduced at this element.
    pub declarations: Vec<(String, String)>,
    pub attributes: Vec<OwnedAttribute>,
    pub children: Vec<OwnedNode>,
}

impl OwnedElement {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            declarations: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: QualifiedName, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: OwnedElement) -> Self {
        self.children.push(OwnedNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(OwnedNode::Text(text.into()));
        self
    }

    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Result<Self, XmlError> {
        if !node.is_element() {
            return Err(XmlError::InvalidNodeType {
                expected: roxmltree::NodeType::Element,
                found: node.node_type(),
            });
        }
        Self::copy(node, prefixed_namespaces(node), 0)
    }

    fn copy(
        node: roxmltree::Node<'_, '_>,
        declarations: Vec<(String, String)>,
        depth: usize,
    ) -> Result<Self, XmlError> {
        if depth > MAX_DEPTH {
            return Err(XmlError::DepthLimitExceeded {
                tag: node.tag_name().name().to_owned(),
                limit: MAX_DEPTH,
            });
        }

        let attributes = node
            .attributes()
            .map(|attr| OwnedAttribute {
                name: QualifiedName::new(attr.name(), attr.namespace().unwrap_or_default()),
                value: attr.value().to_owned(),
            })
            .collect();

        let scope = prefixed_namespaces(node);
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                let child_scope = prefixed_namespaces(child);
                let child_declarations = child_scope
                    .iter()
                    .filter(|binding| !scope.contains(binding))
                    .cloned()
                    .collect();
                children.push(OwnedNode::Element(Self::copy(
                    child,
                    child_declarations,
                    depth + 1,
                )?));
            } else if let Some(text) = child.text().filter(|_| child.is_text()) {
                children.push(OwnedNode::Text(text.to_owned()));
            }
        }

        Ok(Self {
            name: QualifiedName::from_node(node),
            declarations,
            attributes,
            children,
        })
    }

    pub fn attribute(&self, name: &str, namespace: Option<&str>) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| {
                attr.name.name() == name && attr.name.namespace() == namespace.unwrap_or_default()
            })
            .map(|attr| attr.value.as_str())
    }

    pub fn set_attribute(&mut self, name: QualifiedName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|attr| attr.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(OwnedAttribute { name, value }),
        }
    }

    pub fn remove_attribute(&mut self, name: &QualifiedName) {
        self.attributes.retain(|attr| attr.name != *name);
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &OwnedElement> {
        self.children.iter().filter_map(|child| match child {
            OwnedNode::Element(element) => Some(element),
            OwnedNode::Text(_) => None,
        })
    }

    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                OwnedNode::Text(text) => Some(text.as_str()),
                OwnedNode::Element(_) => None,
            })
            .collect()
    }

    /// Converts the tree back into a builder element.
    ///
    /// Mixed content is not representable by the builder; when an element has
    /// child elements its text nodes are dropped.
    pub fn to_element(&self) -> Element<'static> {
        let mut element = Element::new(self.name.name().to_owned())
            .set_namespace_optional(self.name.namespace_opt().map(|ns| Namespace::new(ns.to_owned())));

        for (prefix, uri) in &self.declarations {
            element = element.add_owned_declaration(uri.clone(), prefix.clone());
        }

        for attr in &self.attributes {
            element = element.add_attribute(Attribute::new_with_namespace(
                Cow::Owned(attr.name.name().to_owned()),
                Cow::Owned(attr.value.clone()),
                attr.name
                    .namespace_opt()
                    .map(|ns| Namespace::new(ns.to_owned())),
            ));
        }

        if self.child_elements().next().is_some() {
            element.add_children(self.child_elements().map(OwnedElement::to_element))
        } else {
            let text = self.text();
            if text.is_empty() {
                element
            } else {
                element.set_text(text)
            }
        }
    }
}

fn prefixed_namespaces(node: roxmltree::Node<'_, '_>) -> Vec<(String, String)> {
    node.namespaces()
        .filter_map(|ns| {
            ns.name()
                .filter(|prefix| *prefix != "xml")
                .map(|prefix| (prefix.to_owned(), ns.uri().to_owned()))
        })
        .collect()
}
