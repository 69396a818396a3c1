use std::borrow::Cow;

use crate::builder::{
    escape_text, Attribute, Namespace, NamespaceScope, NamespaceWrite, XmlBuilderError,
};

#[derive(Debug, Clone)]
pub enum Content<'a> {
    /// Represents a text content within an XML element.
    Text(Cow<'a, str>),
    /// Represents a child element within an XML element.
    Elements(Vec<Element<'a>>),

    None,
}

/// Represents an XML element.
#[derive(Debug, Clone)]
pub struct Element<'a> {
    /// The local name of the element.
    name: Cow<'a, str>,
    /// The namespace the element belongs to.
    namespace: Option<Namespace<'a>>,
    /// Namespace declarations written on this element, in insertion order.
    declarations: Vec<(Namespace<'a>, Option<Cow<'a, str>>)>,
    /// The attributes of the element.
    attributes: Vec<Attribute<'a>>,
    /// The child elements of the element.
    content: Content<'a>,
}

impl<'a> Element<'a> {
    /// Creates a new instance of `Element` with the given name.
    ///
    /// # Example
    ///
    /// ```
    /// use ironsoap_xml::builder::Element;
    /// let element = Element::new("root");
    /// ```
    pub fn new(name: impl Into<Cow<'a, str>>) -> Self {
        Element {
            name: name.into(),
            namespace: None,
            declarations: Vec::new(),
            attributes: Vec::new(),
            content: Content::None,
        }
    }

    /// Sets the namespace of the element.
    ///
    /// If no prefix is declared for the namespace when the element is written,
    /// the namespace is declared as the default namespace on the element itself.
    pub fn set_namespace(mut self, namespace: impl Into<Namespace<'a>>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn set_namespace_optional(mut self, namespace: Option<impl Into<Namespace<'a>>>) -> Self {
        self.namespace = namespace.map(Into::into);
        self
    }

    /// Declares `url` on this element, bound to `alias` or as the default namespace when `alias` is `None`.
    pub fn add_namespace_declaration(
        mut self,
        url: impl Into<Cow<'a, str>>,
        alias: Option<&'a str>,
    ) -> Self {
        self.declarations
            .push((Namespace::new(url), alias.map(Cow::Borrowed)));
        self
    }

    /// Same as [`Element::add_namespace_declaration`] for a prefix that is not borrowed.
    pub fn add_owned_declaration(mut self, url: String, alias: String) -> Self {
        self.declarations
            .push((Namespace::new(url), Some(Cow::Owned(alias))));
        self
    }

    pub fn add_attribute(mut self, attribute: Attribute<'a>) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn add_child(mut self, child: Element<'a>) -> Self {
        match self.content {
            Content::None | Content::Text(_) => {
                self.content = Content::Elements(vec![child]);
            }
            Content::Elements(ref mut children) => {
                children.push(child);
            }
        }
        self
    }

    pub fn add_children(mut self, children: impl IntoIterator<Item = Element<'a>>) -> Self {
        for child in children {
            self = self.add_child(child);
        }
        self
    }

    /// Sets the text content of the element, replacing any children.
    pub fn set_text(mut self, text: impl Into<Cow<'a, str>>) -> Self {
        self.content = Content::Text(text.into());
        self
    }

    pub fn with_text(&mut self, text: impl Into<Cow<'a, str>>) -> &mut Self {
        self.content = Content::Text(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&Namespace<'a>> {
        self.namespace.as_ref()
    }

    pub fn attributes(&self) -> &[Attribute<'a>] {
        &self.attributes
    }

    pub fn content(&self) -> &Content<'a> {
        &self.content
    }

    pub fn children(&self) -> &[Element<'a>] {
        match &self.content {
            Content::Elements(children) => children,
            Content::Text(_) | Content::None => &[],
        }
    }

    pub fn into_owned(self) -> Element<'static> {
        Element {
            name: Cow::Owned(self.name.into_owned()),
            namespace: self.namespace.map(Namespace::into_owned),
            declarations: self
                .declarations
                .into_iter()
                .map(|(ns, alias)| (ns.into_owned(), alias.map(|a| Cow::Owned(a.into_owned()))))
                .collect(),
            attributes: self
                .attributes
                .into_iter()
                .map(Attribute::into_owned)
                .collect(),
            content: match self.content {
                Content::Text(text) => Content::Text(Cow::Owned(text.into_owned())),
                Content::Elements(children) => {
                    Content::Elements(children.into_iter().map(Element::into_owned).collect())
                }
                Content::None => Content::None,
            },
        }
    }
}

impl<'a> NamespaceWrite<'a> for Element<'a> {
    fn ns_write<W: std::io::Write>(
        &self,
        w: &mut W,
        parent_scope: &NamespaceScope<'a>,
    ) -> Result<(), XmlBuilderError> {
        let mut scope = parent_scope.clone();
        let mut declarations = Vec::with_capacity(self.declarations.len());

        // Bindings the enclosing elements already made are not repeated.
        for (ns, alias) in &self.declarations {
            let in_scope = match alias {
                Some(alias) => scope.alias_of(ns) == Some(alias.as_ref()),
                None => scope.default_namespace() == Some(ns),
            };
            if in_scope {
                continue;
            }
            declarations.push((ns.clone(), alias.clone()));
            scope.declare(ns.clone(), alias.clone());
        }

        // Element namespaces fall back to a default declaration, never to a generated prefix.
        let prefix = match &self.namespace {
            Some(ns) => {
                if let Some(alias) = scope.alias_of(ns) {
                    Some(alias.to_string())
                } else {
                    if scope.default_namespace() != Some(ns) {
                        declarations.push((ns.clone(), None));
                        scope.declare(ns.clone(), None);
                    }
                    None
                }
            }
            None => {
                if scope.default_namespace().is_some() {
                    declarations.push((Namespace::new(""), None));
                    scope.declare(Namespace::new(""), None);
                }
                None
            }
        };

        for attribute in &self.attributes {
            let Some(ns) = attribute.namespace() else {
                continue;
            };
            if ns.url == crate::XML_NAMESPACE || scope.alias_of(ns).is_some() {
                continue;
            }
            let alias = scope.generate_alias();
            declarations.push((ns.clone(), Some(Cow::Owned(alias.clone()))));
            scope.declare(ns.clone(), Some(Cow::Owned(alias)));
        }

        let name = match &prefix {
            Some(alias) => format!("{alias}:{}", self.name),
            None => self.name.to_string(),
        };

        write!(w, "<{name}")?;

        for (ns, alias) in &declarations {
            match alias {
                Some(alias) => write!(w, " xmlns:{alias}=\"{}\"", ns.url)?,
                None => write!(w, " xmlns=\"{}\"", ns.url)?,
            }
        }

        for attribute in &self.attributes {
            attribute.ns_write(w, &scope)?;
        }

        match &self.content {
            Content::None => {
                write!(w, "/>")?;
            }
            Content::Text(value) => {
                write!(w, ">{}</{name}>", escape_text(value))?;
            }
            Content::Elements(children) => {
                write!(w, ">")?;
                for child in children {
                    child.ns_write(w, &scope)?;
                }
                write!(w, "</{name}>")?;
            }
        }
        Ok(())
    }
}
