use ironsoap_xml::QualifiedName;
use tracing::{debug, instrument};

use super::{
    AttributeKind, HeaderAttribute, HeaderDirection, MethodAttribute, MethodContract,
    ServiceDescription, SoapBindingStyle, SoapBindingUse, SoapMethodOptions, SoapParameterStyle,
};
use crate::{
    Result, SoapError,
    extension::{ExtensionDescriptor, ExtensionGroup, sort_extensions},
    serializer::{XmlMemberMapping, XmlMembersMapping, XmlTypeCode},
    version::SoapVersion,
};

const ENCODED_TYPES_SUFFIX: &str = "/encodedTypes";
const LITERAL_TYPES_SUFFIX: &str = "/literalTypes";

/// A header member bound to a method, in one direction or more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBinding {
    pub member_name: String,
    /// Header element; identifies the header type.
    pub element: QualifiedName,
    pub type_code: XmlTypeCode,
    pub direction: HeaderDirection,
    pub required: bool,
    pub repeats: bool,
    /// `false` for the catch-all binding that collects unknown headers.
    pub is_custom_type: bool,
    /// Member of the header mapping; `None` for the catch-all binding.
    pub mapping_index: Option<usize>,
}

/// Everything the protocol needs to read and write one method's messages.
#[derive(Debug, Clone)]
pub struct SoapMethodContract {
    pub method: MethodContract,
    pub version: SoapVersion,
    pub action: String,
    pub request_element: QualifiedName,
    pub response_element: QualifiedName,
    pub binding_use: SoapBindingUse,
    pub style: SoapBindingStyle,
    pub parameter_style: SoapParameterStyle,
    pub one_way: bool,
    pub request_mapping: XmlMembersMapping,
    pub response_mapping: XmlMembersMapping,
    pub in_header_bindings: Vec<HeaderBinding>,
    pub out_header_bindings: Vec<HeaderBinding>,
    pub in_header_mapping: XmlMembersMapping,
    pub out_header_mapping: XmlMembersMapping,
    pub extensions: Vec<ExtensionDescriptor>,
}

impl SoapMethodContract {
    pub fn name(&self) -> &str {
        self.method.message_name()
    }

    pub fn is_encoded(&self) -> bool {
        self.binding_use == SoapBindingUse::Encoded
    }

    pub fn is_rpc(&self) -> bool {
        self.style == SoapBindingStyle::Rpc
    }

    /// Catch-all binding for headers no other binding claims.
    pub fn unknown_header_binding(&self) -> Option<&HeaderBinding> {
        self.in_header_bindings
            .iter()
            .find(|binding| !binding.is_custom_type)
    }
}

/// Turns [`MethodContract`]s into [`SoapMethodContract`]s under one service's defaults.
pub struct SoapContractBuilder<'a> {
    service: &'a ServiceDescription,
    version: SoapVersion,
}

impl<'a> SoapContractBuilder<'a> {
    pub fn new(service: &'a ServiceDescription, version: SoapVersion) -> Self {
        Self { service, version }
    }

    /// Builds the contract. `client` selects the request element default of RPC methods.
    #[instrument(skip(self, method), fields(method = %method.name()))]
    pub fn build(&self, method: MethodContract, client: bool) -> Result<SoapMethodContract> {
        let name = method.name().to_owned();
        let (style, options) = self.resolve_style(&method)?;

        let binding_use = match (options.binding_use, style) {
            (SoapBindingUse::Default, SoapBindingStyle::Rpc) => SoapBindingUse::Encoded,
            (SoapBindingUse::Default, _) => self.service.resolved_default_use(),
            (binding_use, _) => binding_use,
        };
        let parameter_style = match (style, options.parameter_style) {
            (SoapBindingStyle::Rpc, _) => SoapParameterStyle::Wrapped,
            (_, SoapParameterStyle::Default) => match self.service.default_parameter_style {
                SoapParameterStyle::Default => SoapParameterStyle::Wrapped,
                style => style,
            },
            (_, style) => style,
        };

        let binding_namespace = match &options.binding {
            Some(binding) => Some(
                self.service
                    .binding(binding)
                    .ok_or_else(|| SoapError::contract(&name, format!("unknown binding {binding}")))?
                    .namespace
                    .clone(),
            ),
            None => None,
        };
        let types_namespace = self.types_namespace(binding_use);
        let default_namespace = binding_namespace.clone().unwrap_or_else(|| types_namespace.clone());
        let request_namespace = options.request_namespace.clone().unwrap_or_else(|| default_namespace.clone());
        let response_namespace = options.response_namespace.clone().unwrap_or_else(|| default_namespace.clone());

        let one_way = options.one_way;
        if one_way && (!method.out_params().is_empty() || !method.is_void()) {
            return Err(SoapError::contract(
                &name,
                "one-way methods cannot have out parameters or a return value",
            ));
        }

        let request_name = match (&options.request_element_name, style) {
            (Some(explicit), _) => explicit.clone(),
            (None, SoapBindingStyle::Rpc) if client => method.name().to_owned(),
            (None, _) => method.message_name().to_owned(),
        };
        // RPC/literal keys the response on the method name, everything else on the message name.
        let response_name = match (&options.response_element_name, style, binding_use) {
            (Some(explicit), _, _) => explicit.clone(),
            (None, SoapBindingStyle::Rpc, SoapBindingUse::Literal) => format!("{}Response", method.name()),
            (None, _, _) => format!("{}Response", method.message_name()),
        };

        let action = options.action.clone().unwrap_or_else(|| {
            let namespace = binding_namespace.as_deref().unwrap_or(&self.service.namespace);
            default_action(namespace, method.message_name())
        });

        let qualify = style == SoapBindingStyle::Document;
        let member = |name: &str, type_code: &XmlTypeCode, namespace: &str| {
            let mapping = XmlMemberMapping::new(name, type_code.clone());
            if qualify { mapping.qualified(namespace) } else { mapping }
        };

        let request_members: Vec<_> = method
            .in_params()
            .iter()
            .map(|param| member(&param.name, &param.type_code, &request_namespace))
            .collect();
        let mut response_members = Vec::new();
        if !one_way {
            if let Some(return_type) = method.return_type() {
                response_members.push(member(&format!("{}Result", method.name()), return_type, &response_namespace));
            }
            response_members.extend(
                method
                    .out_params()
                    .iter()
                    .map(|param| member(&param.name, &param.type_code, &response_namespace)),
            );
        }

        let request_element = self.element_name(&request_name, &request_namespace, parameter_style, &request_members);
        let response_element = self.element_name(&response_name, &response_namespace, parameter_style, &response_members);
        let request_mapping = members_mapping(&request_element, request_members, binding_use, parameter_style, &types_namespace);
        let response_mapping = members_mapping(&response_element, response_members, binding_use, parameter_style, &types_namespace);

        let headers = header_attributes(&method);
        let (in_header_bindings, out_header_bindings) = bind_headers(&name, headers, one_way)?;
        let in_header_mapping = header_mapping(&in_header_bindings, binding_use, &types_namespace);
        let out_header_mapping = header_mapping(&out_header_bindings, binding_use, &types_namespace);

        let method_extensions: Vec<ExtensionDescriptor> = method
            .custom_attributes(AttributeKind::Extension)
            .filter_map(|attribute| match attribute {
                MethodAttribute::Extension(descriptor) => Some(descriptor.clone()),
                _ => None,
            })
            .collect();
        let extensions = sort_extensions(
            &self.service.extensions_in(ExtensionGroup::High),
            &method_extensions,
            &self.service.extensions_in(ExtensionGroup::Low),
        );

        debug!(
            %action,
            request = %request_element,
            response = %response_element,
            ?style,
            ?binding_use,
            one_way,
            "Built SOAP method contract"
        );

        Ok(SoapMethodContract {
            method,
            version: self.version,
            action,
            request_element,
            response_element,
            binding_use,
            style,
            parameter_style,
            one_way,
            request_mapping,
            response_mapping,
            in_header_bindings,
            out_header_bindings,
            in_header_mapping,
            out_header_mapping,
            extensions,
        })
    }

    fn resolve_style(&self, method: &MethodContract) -> Result<(SoapBindingStyle, SoapMethodOptions)> {
        let rpc = method
            .custom_attributes(AttributeKind::RpcMethod)
            .find_map(|attribute| match attribute {
                MethodAttribute::Rpc(options) => Some(options),
                _ => None,
            });
        let document = method
            .custom_attributes(AttributeKind::DocumentMethod)
            .find_map(|attribute| match attribute {
                MethodAttribute::Document(options) => Some(options),
                _ => None,
            });

        match (rpc, document) {
            (Some(_), Some(_)) => Err(SoapError::contract(
                method.name(),
                "a method cannot be both RPC and document style",
            )),
            (Some(options), None) => Ok((SoapBindingStyle::Rpc, options.clone())),
            (None, Some(options)) => Ok((SoapBindingStyle::Document, options.clone())),
            (None, None) => Ok((self.service.resolved_default_style(), SoapMethodOptions::default())),
        }
    }

    /// Service namespace, suffixed when `binding_use` differs from the service default.
    fn types_namespace(&self, binding_use: SoapBindingUse) -> String {
        let namespace = &self.service.namespace;
        match (binding_use, self.service.resolved_default_use()) {
            (SoapBindingUse::Encoded, SoapBindingUse::Literal) => join_namespace(namespace, ENCODED_TYPES_SUFFIX),
            (SoapBindingUse::Literal, SoapBindingUse::Encoded) => join_namespace(namespace, LITERAL_TYPES_SUFFIX),
            _ => namespace.clone(),
        }
    }

    fn element_name(
        &self,
        name: &str,
        namespace: &str,
        parameter_style: SoapParameterStyle,
        members: &[XmlMemberMapping],
    ) -> QualifiedName {
        match parameter_style {
            // Bare messages are routed on their first parameter element.
            SoapParameterStyle::Bare => members
                .first()
                .map(XmlMemberMapping::element_name)
                .unwrap_or_default(),
            _ => QualifiedName::new(name, namespace),
        }
    }
}

fn join_namespace(namespace: &str, suffix: &str) -> String {
    format!("{}{suffix}", namespace.trim_end_matches('/'))
}

/// `namespace/message`, without doubling a trailing slash.
pub fn default_action(namespace: &str, message_name: &str) -> String {
    if namespace.ends_with('/') {
        format!("{namespace}{message_name}")
    } else {
        format!("{namespace}/{message_name}")
    }
}

fn members_mapping(
    element: &QualifiedName,
    members: Vec<XmlMemberMapping>,
    binding_use: SoapBindingUse,
    parameter_style: SoapParameterStyle,
    types_namespace: &str,
) -> XmlMembersMapping {
    let mapping = match parameter_style {
        SoapParameterStyle::Bare => XmlMembersMapping::bare(members, binding_use),
        _ => XmlMembersMapping::wrapped(element.clone(), members, binding_use),
    };
    mapping.with_types_namespace(types_namespace)
}

fn header_attributes(method: &MethodContract) -> Vec<HeaderAttribute> {
    let mut headers: Vec<HeaderAttribute> = method
        .custom_attributes(AttributeKind::Header)
        .filter_map(|attribute| match attribute {
            MethodAttribute::Header(header) => Some(header.clone()),
            _ => None,
        })
        .collect();
    // Attribute order is not significant; member order is.
    headers.sort_by(|a, b| a.member_name.cmp(&b.member_name));
    headers
}

fn bind_headers(
    method_name: &str,
    headers: Vec<HeaderAttribute>,
    one_way: bool,
) -> Result<(Vec<HeaderBinding>, Vec<HeaderBinding>)> {
    for (index, header) in headers.iter().enumerate() {
        if header.direction.is_empty() {
            return Err(SoapError::contract(
                method_name,
                format!("header {} has no direction", header.member_name),
            ));
        }
        if one_way && header.direction.intersects(HeaderDirection::OUT | HeaderDirection::FAULT) {
            return Err(SoapError::contract(
                method_name,
                format!("one-way methods cannot send header {}", header.member_name),
            ));
        }
        let duplicate = headers[..index].iter().find(|other| {
            other.is_unknown == header.is_unknown
                && (header.is_unknown || other.element == header.element)
                && other.direction.intersects(header.direction)
        });
        if let Some(other) = duplicate {
            return Err(SoapError::contract(
                method_name,
                format!(
                    "header type {} is bound by both {} and {}",
                    header.element, other.member_name, header.member_name
                ),
            ));
        }
    }

    let mut in_bindings = Vec::new();
    let mut out_bindings = Vec::new();
    for header in headers {
        if header.direction.contains(HeaderDirection::IN) {
            let index = (!header.is_unknown).then(|| count_custom(&in_bindings));
            in_bindings.push(binding(&header, index));
        }
        if header.direction.intersects(HeaderDirection::OUT | HeaderDirection::FAULT) {
            let index = (!header.is_unknown).then(|| count_custom(&out_bindings));
            out_bindings.push(binding(&header, index));
        }
    }
    Ok((in_bindings, out_bindings))
}

fn count_custom(bindings: &[HeaderBinding]) -> usize {
    bindings.iter().filter(|binding| binding.is_custom_type).count()
}

fn binding(header: &HeaderAttribute, mapping_index: Option<usize>) -> HeaderBinding {
    HeaderBinding {
        member_name: header.member_name.clone(),
        element: header.element.clone(),
        type_code: header.type_code.clone(),
        direction: header.direction,
        required: header.required && !header.is_unknown,
        repeats: header.repeats,
        is_custom_type: !header.is_unknown,
        mapping_index,
    }
}

fn header_mapping(
    bindings: &[HeaderBinding],
    binding_use: SoapBindingUse,
    types_namespace: &str,
) -> XmlMembersMapping {
    let members = bindings
        .iter()
        .filter(|binding| binding.is_custom_type)
        .map(|binding| {
            XmlMemberMapping::new(binding.element.name(), binding.type_code.clone())
                .qualified(binding.element.namespace())
        })
        .collect();
    XmlMembersMapping::bare(members, binding_use).with_types_namespace(types_namespace)
}
