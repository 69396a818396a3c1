//! Builder for well-formed XML documents.
//!
//! Namespaces are resolved when the tree is written: declared prefixes are
//! inherited by children, element namespaces without a prefix become default
//! namespace declarations, and namespaced attributes without a prefix get a
//! generated one.
mod attribute;
mod builder;
mod declaration;
mod element;
mod namespace;

use std::{borrow::Cow, collections::HashMap};

pub use self::attribute::*;
pub use self::builder::*;
pub use self::declaration::*;
pub use self::element::*;
pub use self::namespace::*;

#[derive(Debug, thiserror::Error)]
pub enum XmlBuilderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
    #[error("Missing alias for attribute '{attr}' in namespace '{ns}'")]
    MissingAliasForAttribute { attr: String, ns: String },
}

/// Prefix bindings in effect while writing an element.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope<'a> {
    aliases: HashMap<Namespace<'a>, Cow<'a, str>>,
    default: Option<Namespace<'a>>,
}

impl<'a> NamespaceScope<'a> {
    pub fn declare(&mut self, namespace: Namespace<'a>, alias: Option<Cow<'a, str>>) {
        match alias {
            Some(alias) => {
                // A redeclared prefix shadows whatever namespace it was bound to before.
                self.aliases.retain(|_, existing| *existing != alias);
                self.aliases.insert(namespace, alias);
            }
            None if namespace.url.is_empty() => self.default = None,
            None => self.default = Some(namespace),
        }
    }

    pub fn alias_of(&self, namespace: &Namespace<'_>) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(ns, _)| ns.url == namespace.url)
            .map(|(_, alias)| alias.as_ref())
    }

    pub fn default_namespace(&self) -> Option<&Namespace<'a>> {
        self.default.as_ref()
    }

    pub fn generate_alias(&self) -> String {
        let mut index = 0usize;
        loop {
            let candidate = format!("q{index}");
            if !self.aliases.values().any(|alias| *alias == candidate) {
                return candidate;
            }
            index += 1;
        }
    }
}

pub trait NamespaceWrite<'a> {
    fn ns_write<W: std::io::Write>(
        &self,
        w: &mut W,
        scope: &NamespaceScope<'a>,
    ) -> Result<(), XmlBuilderError>;
}

pub fn escape_text(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\n', '\t']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#xA;"),
            '\t' => escaped.push_str("&#x9;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(element: Element<'_>) -> String {
        Builder::new(None, element).to_xml_string().unwrap()
    }

    #[test]
    fn test_simple_xml() {
        assert_eq!(render(Element::new("root")), "<root/>");
    }

    #[test]
    fn test_xml_with_attributes() {
        let element = Element::new("root").add_attribute(Attribute::new("attr1", "value1"));
        assert_eq!(render(element), r#"<root attr1="value1"/>"#);
    }

    #[test]
    fn test_xml_with_child_elements() {
        let element = Element::new("root").add_child(Element::new("child"));
        assert_eq!(render(element), "<root><child/></root>");
    }

    #[test]
    fn test_xml_with_namespaces() {
        let element = Element::new("root")
            .set_namespace(Namespace::new("http://example.com/ns1"))
            .add_namespace_declaration("http://example.com/ns1", Some("ns1"));

        assert_eq!(
            render(element),
            r#"<ns1:root xmlns:ns1="http://example.com/ns1"/>"#
        );
    }

    #[test]
    fn test_undeclared_element_namespace_becomes_default() {
        let element = Element::new("AddResponse")
            .set_namespace("http://tempuri.org/")
            .add_child(
                Element::new("AddResult")
                    .set_namespace("http://tempuri.org/")
                    .set_text("5"),
            );

        assert_eq!(
            render(element),
            r#"<AddResponse xmlns="http://tempuri.org/"><AddResult>5</AddResult></AddResponse>"#
        );
    }

    #[test]
    fn test_unqualified_child_resets_default_namespace() {
        let element = Element::new("Add")
            .set_namespace("urn:calc")
            .add_child(Element::new("a").set_text("2"));

        assert_eq!(
            render(element),
            r#"<Add xmlns="urn:calc"><a xmlns="">2</a></Add>"#
        );
    }

    #[test]
    fn test_full_xml_document() {
        let declaration = Declaration::new("1.0", "utf-8").with_standalone(true);
        let child = Element::new("child")
            .set_namespace(Namespace::new("http://example.com/ns2"))
            .add_attribute(Attribute::new("attr2", "value2"));
        let element = Element::new("root")
            .set_namespace(Namespace::new("http://example.com/ns1"))
            .add_namespace_declaration("http://example.com/ns1", Some("ns1"))
            .add_namespace_declaration("http://example.com/ns2", Some("ns2"))
            .add_attribute(Attribute::new("attr1", "value1"))
            .add_child(child);

        let xml_string = Builder::new(Some(declaration), element)
            .to_xml_string()
            .unwrap();
        assert_eq!(
            xml_string,
            concat!(
                r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#,
                r#"<ns1:root xmlns:ns1="http://example.com/ns1" xmlns:ns2="http://example.com/ns2" attr1="value1">"#,
                r#"<ns2:child attr2="value2"/></ns1:root>"#
            )
        );
    }

    #[test]
    fn test_element_with_text_and_attributes() {
        let element = Element::new("message")
            .add_attribute(Attribute::new("lang", "en"))
            .set_text("Hello, world!");

        assert_eq!(
            render(element),
            r#"<message lang="en">Hello, world!</message>"#
        );
    }

    #[test]
    fn test_adding_child_overwrites_text() {
        let element = Element::new("container")
            .set_text("Initial text")
            .add_child(Element::new("item"));
        assert_eq!(render(element), "<container><item/></container>");
    }

    #[test]
    fn test_setting_text_overwrites_children() {
        let element = Element::new("container")
            .add_child(Element::new("item"))
            .set_text("New text");
        assert_eq!(render(element), "<container>New text</container>");
    }

    #[test]
    fn test_attribute_with_declared_namespace() {
        let attr = Attribute::new_with_namespace("attr", "value", Some("http://example.com"));
        let element = Element::new("test")
            .add_attribute(attr)
            .add_namespace_declaration("http://example.com", Some("ex"));

        assert_eq!(
            render(element),
            r#"<test xmlns:ex="http://example.com" ex:attr="value"/>"#
        );
    }

    #[test]
    fn test_attribute_with_undeclared_namespace_gets_generated_prefix() {
        let element = Element::new("test")
            .add_attribute(Attribute::new("attr", "value").set_namespace("http://example.com"));

        assert_eq!(
            render(element),
            r#"<test xmlns:q0="http://example.com" q0:attr="value"/>"#
        );
    }

    #[test]
    fn test_xml_lang_attribute_uses_reserved_prefix() {
        let element = Element::new("Text")
            .add_attribute(Attribute::new("lang", "en").set_namespace(crate::XML_NAMESPACE))
            .set_text("boom");

        assert_eq!(render(element), r#"<Text xml:lang="en">boom</Text>"#);
    }

    #[test]
    fn test_inherited_namespace_declarations() {
        let grandchild = Element::new("grandchild").set_namespace("http://example.com/ns1");
        let child = Element::new("child")
            .set_namespace("http://example.com/ns2")
            .add_child(grandchild);
        let root = Element::new("root")
            .add_namespace_declaration("http://example.com/ns1", Some("ns1"))
            .add_namespace_declaration("http://example.com/ns2", Some("ns2"))
            .add_child(child);

        assert_eq!(
            render(root),
            r#"<root xmlns:ns1="http://example.com/ns1" xmlns:ns2="http://example.com/ns2"><ns2:child><ns1:grandchild/></ns2:child></root>"#
        );
    }

    #[test]
    fn test_redeclared_prefix_shadows_parent_binding() {
        let child = Element::new("child")
            .set_namespace("http://example.com/ns2")
            .add_namespace_declaration("http://example.com/ns2", Some("p"))
            .add_child(Element::new("inner").set_namespace("http://example.com/ns1"));
        let root = Element::new("root")
            .set_namespace("http://example.com/ns1")
            .add_namespace_declaration("http://example.com/ns1", Some("p"))
            .add_child(child);

        assert_eq!(
            render(root),
            r#"<p:root xmlns:p="http://example.com/ns1"><p:child xmlns:p="http://example.com/ns2"><inner xmlns="http://example.com/ns1"/></p:child></p:root>"#
        );
    }

    #[test]
    fn test_repeated_declaration_is_not_written_twice() {
        let child = Element::new("child")
            .set_namespace("http://example.com/ns1")
            .add_namespace_declaration("http://example.com/ns1", Some("p"));
        let root = Element::new("root")
            .add_namespace_declaration("http://example.com/ns1", Some("p"))
            .add_child(child);

        assert_eq!(
            render(root),
            r#"<root xmlns:p="http://example.com/ns1"><p:child/></root>"#
        );
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let element = Element::new("test")
            .add_attribute(Attribute::new("name", "a \"quoted\" <value> & more"))
            .set_text("Text with <>& characters");

        assert_eq!(
            render(element),
            r#"<test name="a &quot;quoted&quot; &lt;value&gt; &amp; more">Text with &lt;&gt;&amp; characters</test>"#
        );
    }

    #[test]
    fn test_unicode_content() {
        let element = Element::new("test").set_text("Hello 世界 🌍");
        assert_eq!(render(element), "<test>Hello 世界 🌍</test>");
    }

    #[test]
    fn test_namespace_equality_and_hash() {
        let mut map = HashMap::new();
        map.insert(Namespace::new("http://example.com"), "value1");
        assert_eq!(map.get(&Namespace::new(String::from("http://example.com"))), Some(&"value1"));
        assert_ne!(Namespace::new("http://a"), Namespace::new("http://b"));
    }

    #[test]
    fn test_declaration_with_standalone_false() {
        let declaration = Declaration::new("1.0", "UTF-8").with_standalone(false);
        assert_eq!(
            declaration.to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#
        );
    }
}
