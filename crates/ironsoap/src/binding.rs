//! Moves header blocks between envelopes and a method's header bindings.
use ironsoap_xml::{OwnedElement, QualifiedName, builder::Element};
use tracing::{debug, warn};

use crate::{
    Result, SoapError,
    contract::{HeaderBinding, HeaderDirection},
    envelope::Envelope,
    fault::SoapException,
    header::{SoapHeader, SoapHeaderCollection},
    serializer::{IgnoreUnknownNodes, Value, XmlMembersMapping},
    version::SoapVersion,
};

/// Reads every header block of `envelope`.
///
/// Blocks claimed by a binding become known headers marked as understood. A
/// block whose content does not fit its binding is kept as unknown, so a
/// required binding stays unsatisfied.
pub(crate) fn read_headers(
    envelope: &Envelope<'_>,
    bindings: &[HeaderBinding],
    mapping: &XmlMembersMapping,
) -> Result<SoapHeaderCollection> {
    let version = envelope.version();
    let mut headers = SoapHeaderCollection::new();

    for node in envelope.header_elements() {
        let name = QualifiedName::from_node(node);
        let raw = SoapHeader::unknown(OwnedElement::from_node(node)?, version);

        let value = bindings
            .iter()
            .find(|binding| binding.is_custom_type && binding.element == name)
            .and_then(|binding| binding.mapping_index)
            .and_then(|index| {
                mapping
                    .deserialize_member(index, node, &mut IgnoreUnknownNodes)
                    .inspect_err(|err| warn!(header = %name, %err, "Unreadable header kept as unknown"))
                    .ok()
            });

        let header = match value {
            Some(value) => {
                let mut header = SoapHeader::known(name, value).with_must_understand(raw.must_understand());
                if let Some(actor) = raw.actor() {
                    header.set_actor(actor);
                }
                header.set_relay(raw.relay());
                header.set_did_understand(true);
                header
            }
            None => raw,
        };
        headers.push(header);
    }

    debug!(count = headers.len(), "Read header blocks");
    Ok(headers)
}

/// Writes the headers that a binding allows in `direction`.
pub(crate) fn write_headers(
    headers: &SoapHeaderCollection,
    bindings: &[HeaderBinding],
    mapping: &XmlMembersMapping,
    direction: HeaderDirection,
    version: SoapVersion,
) -> Result<Vec<Element<'static>>> {
    let mut elements = Vec::new();
    for header in headers {
        let binding = bindings.iter().find(|binding| {
            binding.direction.intersects(direction)
                && if header.is_unknown() {
                    !binding.is_custom_type
                } else {
                    binding.is_custom_type && binding.element == *header.name()
                }
        });
        let Some(binding) = binding else {
            debug!(header = %header.name(), ?direction, "No binding sends this header");
            continue;
        };

        let element = match (header.known_value(), binding.mapping_index) {
            (Some(value), Some(index)) => {
                let element = mapping.serialize_member(index, value, version)?;
                header.write_attributes(element, version)?
            }
            _ => match header.unknown_to_element(version)? {
                Some(element) => element,
                None => continue,
            },
        };
        elements.push(element);
    }
    Ok(elements)
}

/// Reads the parameter values of a body. Wrapped mappings read the first body element.
pub(crate) fn read_body(envelope: &Envelope<'_>, mapping: &XmlMembersMapping) -> Result<Vec<Value>> {
    let parent = if mapping.wrapped {
        envelope
            .first_body_element()
            .ok_or_else(|| SoapError::serialization("the body is empty"))?
    } else {
        envelope.body()
    };
    mapping.deserialize(parent, &mut IgnoreUnknownNodes)
}

/// Fails with a MustUnderstand header fault when a required binding got no readable header.
pub(crate) fn check_required(
    bindings: &[HeaderBinding],
    headers: &SoapHeaderCollection,
    version: SoapVersion,
) -> std::result::Result<(), SoapException> {
    for binding in bindings.iter().filter(|binding| binding.required && binding.is_custom_type) {
        let present = headers
            .get_all(&binding.element)
            .any(|header| !header.is_unknown());
        if !present {
            return Err(SoapException::must_understand(
                version,
                format!("Required header {} is missing or unreadable", binding.element),
            )
            .with_not_understood(vec![binding.element.clone()]));
        }
    }
    Ok(())
}

/// Fails with a MustUnderstand header fault for mustUnderstand headers nothing processed.
pub(crate) fn check_understood(
    headers: &SoapHeaderCollection,
    version: SoapVersion,
) -> std::result::Result<(), SoapException> {
    let not_understood = headers.not_understood(version);
    match not_understood.first() {
        None => Ok(()),
        Some(first) => Err(SoapException::must_understand(
            version,
            format!("Header {first} was not understood"),
        )
        .with_not_understood(not_understood.clone())),
    }
}

/// The fault a peer should see for `error`.
pub(crate) fn fault_for(error: SoapError, version: SoapVersion) -> SoapException {
    match error {
        SoapError::Fault(fault) => *fault,
        error if error.is_input_error() => {
            SoapException::client(version, format!("Unable to read the request: {error}"))
        }
        error => SoapException::server(version, error.to_string()),
    }
}
