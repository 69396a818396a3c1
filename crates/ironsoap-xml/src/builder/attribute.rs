use std::borrow::Cow;

use crate::builder::{escape_attribute, Namespace, NamespaceScope, NamespaceWrite, XmlBuilderError};

/// Represents an XML attribute with a name and value.
#[derive(Debug, Clone)]
pub struct Attribute<'a> {
    /// The local name of the attribute.
    name: Cow<'a, str>,
    /// The value of the attribute, unescaped.
    value: Cow<'a, str>,

    namespace: Option<Namespace<'a>>,
}

impl<'a> Attribute<'a> {
    /// Creates a new instance of `Attribute`.
    ///
    /// # Example
    ///
    /// ```
    /// use ironsoap_xml::builder::Attribute;
    /// let attribute = Attribute::new("name", "value");
    /// ```
    pub fn new(name: impl Into<Cow<'a, str>>, value: impl Into<Cow<'a, str>>) -> Self {
        Attribute {
            name: name.into(),
            value: value.into(),
            namespace: None,
        }
    }

    pub fn new_with_namespace(
        name: impl Into<Cow<'a, str>>,
        value: impl Into<Cow<'a, str>>,
        namespace: Option<impl Into<Namespace<'a>>>,
    ) -> Self {
        Attribute {
            name: name.into(),
            value: value.into(),
            namespace: namespace.map(Into::into),
        }
    }

    pub fn set_namespace(mut self, namespace: impl Into<Namespace<'a>>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn namespace(&self) -> Option<&Namespace<'a>> {
        self.namespace.as_ref()
    }

    pub fn into_owned(self) -> Attribute<'static> {
        Attribute {
            name: Cow::Owned(self.name.into_owned()),
            value: Cow::Owned(self.value.into_owned()),
            namespace: self.namespace.map(Namespace::into_owned),
        }
    }
}

impl<'a> NamespaceWrite<'a> for Attribute<'a> {
    fn ns_write<W: std::io::Write>(
        &self,
        w: &mut W,
        scope: &NamespaceScope<'a>,
    ) -> Result<(), XmlBuilderError> {
        let name = match &self.namespace {
            Some(ns) if ns.url == crate::XML_NAMESPACE => format!("xml:{}", self.name),
            Some(ns) => {
                let alias = scope.alias_of(ns).ok_or_else(|| {
                    XmlBuilderError::MissingAliasForAttribute {
                        attr: self.name.to_string(),
                        ns: ns.url.to_string(),
                    }
                })?;
                format!("{alias}:{}", self.name)
            }
            None => self.name.to_string(),
        };

        write!(w, " {}=\"{}\"", name, escape_attribute(&self.value))?;
        Ok(())
    }
}
