//! SOAP header blocks.
use ironsoap_xml::{
    OwnedElement, QualifiedName,
    builder::{Attribute, Element},
};

use crate::{Result, SoapError, serializer::Value, version::SoapVersion};

const MUST_UNDERSTAND: &str = "mustUnderstand";
const RELAY: &str = "relay";

/// A header block kept as raw XML because no binding claimed it.
///
/// Its flags are read from the element on demand, using the attribute names of
/// the envelope version it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapUnknownHeader {
    element: OwnedElement,
    version: SoapVersion,
}

impl SoapUnknownHeader {
    pub fn new(element: OwnedElement, version: SoapVersion) -> Self {
        Self { element, version }
    }

    pub fn element(&self) -> &OwnedElement {
        &self.element
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.element
            .attribute(name, Some(self.version.envelope_namespace()))
    }

    fn flag(&self, name: &str) -> bool {
        matches!(self.attribute(name).map(str::trim), Some("1" | "true"))
    }

    /// The raw element without the envelope-level header attributes of either version.
    fn stripped(&self) -> OwnedElement {
        let mut element = self.element.clone();
        for version in [SoapVersion::Soap11, SoapVersion::Soap12] {
            let ns = version.envelope_namespace();
            for name in [MUST_UNDERSTAND, version.actor_attribute(), RELAY] {
                element.remove_attribute(&QualifiedName::new(name, ns));
            }
        }
        element
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoapHeaderValue {
    Known { name: QualifiedName, value: Value },
    Unknown(SoapUnknownHeader),
}

/// One header block with its processing flags.
///
/// `actor` and `role` are the same property under the 1.1 and 1.2 names.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapHeader {
    value: SoapHeaderValue,
    must_understand: Option<bool>,
    actor: Option<String>,
    relay: Option<bool>,
    did_understand: bool,
}

impl SoapHeader {
    pub fn known(name: QualifiedName, value: impl Into<Value>) -> Self {
        Self {
            value: SoapHeaderValue::Known {
                name,
                value: value.into(),
            },
            must_understand: Some(false),
            actor: None,
            relay: Some(false),
            did_understand: false,
        }
    }

    pub fn unknown(element: OwnedElement, version: SoapVersion) -> Self {
        Self {
            value: SoapHeaderValue::Unknown(SoapUnknownHeader::new(element, version)),
            must_understand: None,
            actor: None,
            relay: None,
            did_understand: false,
        }
    }

    pub fn name(&self) -> &QualifiedName {
        match &self.value {
            SoapHeaderValue::Known { name, .. } => name,
            SoapHeaderValue::Unknown(header) => &header.element.name,
        }
    }

    pub fn value(&self) -> &SoapHeaderValue {
        &self.value
    }

    /// The bound value, for headers a binding understood.
    pub fn known_value(&self) -> Option<&Value> {
        match &self.value {
            SoapHeaderValue::Known { value, .. } => Some(value),
            SoapHeaderValue::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.value, SoapHeaderValue::Unknown(_))
    }

    pub fn must_understand(&self) -> bool {
        match (self.must_understand, &self.value) {
            (Some(flag), _) => flag,
            (None, SoapHeaderValue::Unknown(header)) => header.flag(MUST_UNDERSTAND),
            (None, SoapHeaderValue::Known { .. }) => false,
        }
    }

    pub fn set_must_understand(&mut self, must_understand: bool) {
        self.must_understand = Some(must_understand);
    }

    pub fn with_must_understand(mut self, must_understand: bool) -> Self {
        self.set_must_understand(must_understand);
        self
    }

    pub fn actor(&self) -> Option<&str> {
        match (&self.actor, &self.value) {
            (Some(actor), _) => Some(actor.as_str()).filter(|actor| !actor.is_empty()),
            (None, SoapHeaderValue::Unknown(header)) => {
                header.attribute(header.version.actor_attribute())
            }
            (None, SoapHeaderValue::Known { .. }) => None,
        }
    }

    pub fn role(&self) -> Option<&str> {
        self.actor()
    }

    pub fn set_actor(&mut self, actor: impl Into<String>) {
        self.actor = Some(actor.into());
    }

    pub fn set_role(&mut self, role: impl Into<String>) {
        self.set_actor(role);
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.set_actor(actor);
        self
    }

    pub fn relay(&self) -> bool {
        match (self.relay, &self.value) {
            (Some(flag), _) => flag,
            (None, SoapHeaderValue::Unknown(header)) => {
                header.version == SoapVersion::Soap12 && header.flag(RELAY)
            }
            (None, SoapHeaderValue::Known { .. }) => false,
        }
    }

    pub fn set_relay(&mut self, relay: bool) {
        self.relay = Some(relay);
    }

    pub fn did_understand(&self) -> bool {
        self.did_understand
    }

    pub fn set_did_understand(&mut self, did_understand: bool) {
        self.did_understand = did_understand;
    }

    /// Whether this header would force a MustUnderstand fault on `version`'s node.
    pub fn is_unprocessed_requirement(&self, version: SoapVersion) -> bool {
        self.must_understand() && !self.did_understand && version.targets_this_node(self.actor())
    }

    /// Writes the envelope-level flags onto `element`.
    pub fn write_attributes(
        &self,
        mut element: Element<'static>,
        version: SoapVersion,
    ) -> Result<Element<'static>> {
        let ns = version.envelope_namespace();

        if self.must_understand() {
            let value = match version {
                SoapVersion::Soap11 => "1",
                SoapVersion::Soap12 => "true",
            };
            element = element.add_attribute(Attribute::new_with_namespace(MUST_UNDERSTAND, value, Some(ns)));
        }

        if let Some(actor) = self.actor() {
            element = element.add_attribute(Attribute::new_with_namespace(
                version.actor_attribute(),
                actor.to_owned(),
                Some(ns),
            ));
        }

        if self.relay() {
            if version == SoapVersion::Soap11 {
                return Err(SoapError::invalid_operation(
                    "the relay attribute is only defined for SOAP 1.2",
                ));
            }
            element = element.add_attribute(Attribute::new_with_namespace(RELAY, "true", Some(ns)));
        }

        Ok(element)
    }

    /// The raw element of an unknown header, flags included.
    pub fn unknown_to_element(&self, version: SoapVersion) -> Result<Option<Element<'static>>> {
        match &self.value {
            SoapHeaderValue::Unknown(header) => {
                let element = header.stripped().to_element();
                self.write_attributes(element, version).map(Some)
            }
            SoapHeaderValue::Known { .. } => Ok(None),
        }
    }
}

/// Ordered headers of one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoapHeaderCollection {
    headers: Vec<SoapHeader>,
}

impl SoapHeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: SoapHeader) {
        self.headers.push(header);
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SoapHeader> {
        self.headers.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, SoapHeader> {
        self.headers.iter_mut()
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&SoapHeader> {
        self.headers.iter().find(|header| header.name() == name)
    }

    pub fn get_all<'a>(&'a self, name: &'a QualifiedName) -> impl Iterator<Item = &'a SoapHeader> {
        self.headers.iter().filter(move |header| header.name() == name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.get(name).is_some()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Names of mustUnderstand headers addressed to this node that nothing processed.
    pub fn not_understood(&self, version: SoapVersion) -> Vec<QualifiedName> {
        self.headers
            .iter()
            .filter(|header| header.is_unprocessed_requirement(version))
            .map(|header| header.name().clone())
            .collect()
    }
}

impl<'a> IntoIterator for &'a SoapHeaderCollection {
    type Item = &'a SoapHeader;
    type IntoIter = std::slice::Iter<'a, SoapHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

impl IntoIterator for SoapHeaderCollection {
    type Item = SoapHeader;
    type IntoIter = std::vec::IntoIter<SoapHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.into_iter()
    }
}

impl Extend<SoapHeader> for SoapHeaderCollection {
    fn extend<T: IntoIterator<Item = SoapHeader>>(&mut self, iter: T) {
        self.headers.extend(iter);
    }
}

impl FromIterator<SoapHeader> for SoapHeaderCollection {
    fn from_iter<T: IntoIterator<Item = SoapHeader>>(iter: T) -> Self {
        Self {
            headers: iter.into_iter().collect(),
        }
    }
}
