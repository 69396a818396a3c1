//! Method and service contracts.
//!
//! Services declare their methods with [`MethodDescriptor`]s. Compiling a
//! service walks those descriptors once and produces immutable
//! [`SoapMethodContract`]s plus the routing tables the server dispatches on.
pub mod method;
pub mod service;
pub mod soap;

use std::ops::BitOr;

use ironsoap_xml::QualifiedName;
use typed_builder::TypedBuilder;

use crate::{extension::ExtensionDescriptor, serializer::XmlTypeCode};

pub use method::{MethodContract, ParameterInfo};
pub use service::{RouteLookup, RoutingStyle, ServiceContract, ServiceDescription};
pub use soap::{HeaderBinding, SoapContractBuilder, SoapMethodContract};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoapBindingUse {
    #[default]
    Default,
    Literal,
    Encoded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoapBindingStyle {
    #[default]
    Default,
    Rpc,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoapParameterStyle {
    #[default]
    Default,
    Wrapped,
    Bare,
}

/// Direction flags of a header binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HeaderDirection(u8);

impl HeaderDirection {
    pub const IN: Self = Self(0b001);
    pub const OUT: Self = Self(0b010);
    pub const FAULT: Self = Self(0b100);
    pub const IN_OUT: Self = Self(0b011);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for HeaderDirection {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// How a parameter travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    #[default]
    In,
    Out,
    Ref,
}

/// Parameter types, including the slots of an async begin/end pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterType {
    Xml(XmlTypeCode),
    AsyncCallback,
    AsyncState,
    AsyncResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub parameter_type: ParameterType,
    pub direction: ParameterDirection,
}

impl ParameterDescriptor {
    pub fn input(name: impl Into<String>, type_code: XmlTypeCode) -> Self {
        Self::with_direction(name, type_code, ParameterDirection::In)
    }

    pub fn output(name: impl Into<String>, type_code: XmlTypeCode) -> Self {
        Self::with_direction(name, type_code, ParameterDirection::Out)
    }

    pub fn by_ref(name: impl Into<String>, type_code: XmlTypeCode) -> Self {
        Self::with_direction(name, type_code, ParameterDirection::Ref)
    }

    pub fn async_callback() -> Self {
        Self::special("callback", ParameterType::AsyncCallback)
    }

    pub fn async_state() -> Self {
        Self::special("asyncState", ParameterType::AsyncState)
    }

    pub fn async_result() -> Self {
        Self::special("asyncResult", ParameterType::AsyncResult)
    }

    fn with_direction(
        name: impl Into<String>,
        type_code: XmlTypeCode,
        direction: ParameterDirection,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_type: ParameterType::Xml(type_code),
            direction,
        }
    }

    fn special(name: &str, parameter_type: ParameterType) -> Self {
        Self {
            name: name.to_owned(),
            parameter_type,
            direction: ParameterDirection::In,
        }
    }
}

/// Per-method options of `Rpc`/`Document` attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct SoapMethodOptions {
    #[builder(default, setter(into, strip_option))]
    pub action: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub request_element_name: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub request_namespace: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub response_element_name: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub response_namespace: Option<String>,
    #[builder(default)]
    pub binding_use: SoapBindingUse,
    #[builder(default)]
    pub parameter_style: SoapParameterStyle,
    #[builder(default)]
    pub one_way: bool,
    /// Name of a [`WebServiceBinding`] declared on the service.
    #[builder(default, setter(into, strip_option))]
    pub binding: Option<String>,
}

/// A header member bound to a method.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct HeaderAttribute {
    /// Name of the service member that holds the header value.
    #[builder(setter(into))]
    pub member_name: String,
    /// Header element name; also the header's type identity.
    pub element: QualifiedName,
    pub type_code: XmlTypeCode,
    #[builder(default = HeaderDirection::IN)]
    pub direction: HeaderDirection,
    /// Whether the header must be present in a request.
    #[builder(default = true)]
    pub required: bool,
    /// Binds every header of the element's type, as an array.
    #[builder(default)]
    pub repeats: bool,
    /// Catch-all binding that receives unknown headers.
    #[builder(default)]
    pub is_unknown: bool,
}

/// Named binding a service declares; methods refer to it by name.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct WebServiceBinding {
    #[builder(setter(into))]
    pub name: String,
    #[builder(setter(into))]
    pub namespace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    RpcMethod,
    DocumentMethod,
    Header,
    Extension,
}

impl AttributeKind {
    /// Kinds that may be added on an implementation on top of its declaration.
    pub fn is_mergeable(self) -> bool {
        matches!(self, AttributeKind::Header | AttributeKind::Extension)
    }
}

#[derive(Debug, Clone)]
pub enum MethodAttribute {
    Rpc(SoapMethodOptions),
    Document(SoapMethodOptions),
    Header(HeaderAttribute),
    Extension(ExtensionDescriptor),
}

impl MethodAttribute {
    pub fn kind(&self) -> AttributeKind {
        match self {
            MethodAttribute::Rpc(_) => AttributeKind::RpcMethod,
            MethodAttribute::Document(_) => AttributeKind::DocumentMethod,
            MethodAttribute::Header(_) => AttributeKind::Header,
            MethodAttribute::Extension(_) => AttributeKind::Extension,
        }
    }
}

/// A statically declared service method.
///
/// `declaration` is the interface or base method this one implements, when
/// the contract is declared separately from the implementation.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MethodDescriptor {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default, setter(into, strip_option))]
    pub message_name: Option<String>,
    #[builder(setter(into))]
    pub declaring_type: String,
    #[builder(default)]
    pub parameters: Vec<ParameterDescriptor>,
    #[builder(default, setter(strip_option))]
    pub return_type: Option<XmlTypeCode>,
    #[builder(default)]
    pub is_static: bool,
    #[builder(default)]
    pub attributes: Vec<MethodAttribute>,
    #[builder(default, setter(strip_option))]
    pub declaration: Option<Box<MethodDescriptor>>,
}

/// Either a plain method or an async begin/end pair.
#[derive(Debug, Clone)]
pub enum MethodShape {
    Sync(MethodDescriptor),
    Async {
        begin: MethodDescriptor,
        end: MethodDescriptor,
    },
}

impl MethodShape {
    pub fn name(&self) -> &str {
        match self {
            MethodShape::Sync(method) => &method.name,
            MethodShape::Async { begin, .. } => &begin.name,
        }
    }
}

impl From<MethodDescriptor> for MethodShape {
    fn from(value: MethodDescriptor) -> Self {
        MethodShape::Sync(value)
    }
}
