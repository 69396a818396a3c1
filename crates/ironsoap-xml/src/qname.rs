use std::fmt;

/// An XML name qualified by its namespace URI.
///
/// Displayed in Clark notation, `{namespace}name`, or as the bare name when
/// the namespace is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    name: String,
    namespace: String,
}

impl QualifiedName {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self::new(name, String::new())
    }

    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let tag = node.tag_name();
        Self::new(tag.name(), tag.namespace().unwrap_or_default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn namespace_opt(&self) -> Option<&str> {
        (!self.namespace.is_empty()).then_some(self.namespace.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.namespace.is_empty()
    }

    pub fn matches(&self, node: roxmltree::Node<'_, '_>) -> bool {
        let tag = node.tag_name();
        tag.name() == self.name && tag.namespace().unwrap_or_default() == self.namespace
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.name)
        }
    }
}
