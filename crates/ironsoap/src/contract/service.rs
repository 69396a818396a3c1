use std::{collections::HashMap, sync::Arc};

use ironsoap_xml::QualifiedName;
use tracing::{info, instrument, warn};
use typed_builder::TypedBuilder;

use super::{
    MethodShape, SoapBindingStyle, SoapBindingUse, SoapContractBuilder, SoapMethodContract,
    SoapParameterStyle, WebServiceBinding,
};
use crate::{
    Result, SoapError, cache,
    extension::{ExtensionDescriptor, ExtensionGroup},
    version::{SoapVersion, SupportedVersions},
};

pub const DEFAULT_NAMESPACE: &str = "http://tempuri.org/";

/// Which request property selects the target method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoutingStyle {
    #[default]
    SoapAction,
    /// Qualified name of the first child of `Body`.
    RequestElement,
}

/// Static description of a service: its defaults and its methods.
///
/// `name` identifies the service type; compiled contracts are cached under it.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceDescription {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default = DEFAULT_NAMESPACE.to_owned(), setter(into))]
    pub namespace: String,
    #[builder(default)]
    pub default_use: SoapBindingUse,
    #[builder(default)]
    pub default_style: SoapBindingStyle,
    #[builder(default)]
    pub default_parameter_style: SoapParameterStyle,
    #[builder(default)]
    pub routing_style: RoutingStyle,
    #[builder(default)]
    pub supported_versions: SupportedVersions,
    #[builder(default)]
    pub bindings: Vec<WebServiceBinding>,
    /// Service-level extensions; [`ExtensionDescriptor::group`] places them before or after method ones.
    #[builder(default)]
    pub extensions: Vec<ExtensionDescriptor>,
    #[builder(default)]
    pub methods: Vec<MethodShape>,
}

impl ServiceDescription {
    pub fn binding(&self, name: &str) -> Option<&WebServiceBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }

    pub fn resolved_default_style(&self) -> SoapBindingStyle {
        match self.default_style {
            SoapBindingStyle::Default => SoapBindingStyle::Document,
            style => style,
        }
    }

    /// RPC services default to encoded use, document services to literal.
    pub fn resolved_default_use(&self) -> SoapBindingUse {
        match (self.default_use, self.resolved_default_style()) {
            (SoapBindingUse::Default, SoapBindingStyle::Rpc) => SoapBindingUse::Encoded,
            (SoapBindingUse::Default, _) => SoapBindingUse::Literal,
            (binding_use, _) => binding_use,
        }
    }

    pub fn extensions_in(&self, group: ExtensionGroup) -> Vec<ExtensionDescriptor> {
        self.extensions
            .iter()
            .filter(|extension| extension.group() == group)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Route {
    Unique(usize),
    Duplicate(Vec<usize>),
}

impl Route {
    fn add(&mut self, index: usize) {
        match self {
            Self::Unique(first) => *self = Self::Duplicate(vec![*first, index]),
            Self::Duplicate(indices) => indices.push(index),
        }
    }
}

/// Outcome of a routing table lookup.
#[derive(Debug)]
pub enum RouteLookup<'a> {
    Found(&'a Arc<SoapMethodContract>),
    /// More than one method registered under the key.
    Ambiguous(Vec<&'a str>),
    NotFound,
}

/// All method contracts of one service for one SOAP version, with routing tables.
#[derive(Debug)]
pub struct ServiceContract {
    name: String,
    namespace: String,
    version: SoapVersion,
    routing_style: RoutingStyle,
    supported_versions: SupportedVersions,
    methods: Vec<Arc<SoapMethodContract>>,
    by_action: HashMap<String, Route>,
    by_element: HashMap<QualifiedName, Route>,
    by_name: HashMap<String, usize>,
}

impl ServiceContract {
    /// Compiles every method of `service`. `client` selects client-side element defaults.
    #[instrument(skip(service), fields(service = %service.name))]
    pub fn compile(service: &ServiceDescription, version: SoapVersion, client: bool) -> Result<Self> {
        let builder = SoapContractBuilder::new(service, version);
        let mut methods = Vec::with_capacity(service.methods.len());
        for shape in &service.methods {
            let method = cache::method_contract(shape)?;
            methods.push(Arc::new(builder.build(method.as_ref().clone(), client)?));
        }

        let mut by_name = HashMap::new();
        let mut by_action: HashMap<String, Route> = HashMap::new();
        let mut by_element: HashMap<QualifiedName, Route> = HashMap::new();

        for (index, method) in methods.iter().enumerate() {
            if by_name.insert(method.name().to_owned(), index).is_some() {
                return Err(SoapError::contract(
                    method.name(),
                    "another method already uses this message name",
                ));
            }

            let clash = methods[..index].iter().find(|other| {
                other.action == method.action && other.request_element == method.request_element
            });
            if let Some(other) = clash {
                return Err(SoapError::contract(
                    method.name(),
                    format!(
                        "action {} and request element {} are both already used by {}",
                        method.action,
                        method.request_element,
                        other.name()
                    ),
                ));
            }

            by_action
                .entry(method.action.clone())
                .and_modify(|route| route.add(index))
                .or_insert(Route::Unique(index));
            by_element
                .entry(method.request_element.clone())
                .and_modify(|route| route.add(index))
                .or_insert(Route::Unique(index));
        }

        let duplicates = by_action
            .values()
            .chain(by_element.values())
            .filter(|route| matches!(route, Route::Duplicate(_)))
            .count();
        if duplicates > 0 {
            warn!(duplicates, "Service registers routing keys more than once");
        }
        info!(methods = methods.len(), %version, "Compiled service contract");

        Ok(Self {
            name: service.name.clone(),
            namespace: service.namespace.clone(),
            version,
            routing_style: service.routing_style,
            supported_versions: service.supported_versions,
            methods,
            by_action,
            by_element,
            by_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn routing_style(&self) -> RoutingStyle {
        self.routing_style
    }

    pub fn supported_versions(&self) -> SupportedVersions {
        self.supported_versions
    }

    pub fn methods(&self) -> &[Arc<SoapMethodContract>] {
        &self.methods
    }

    /// Looks a method up by message name.
    pub fn method(&self, name: &str) -> Option<&Arc<SoapMethodContract>> {
        self.by_name.get(name).map(|index| &self.methods[*index])
    }

    pub fn route_by_action(&self, action: &str) -> RouteLookup<'_> {
        self.lookup(self.by_action.get(action))
    }

    pub fn route_by_element(&self, element: &QualifiedName) -> RouteLookup<'_> {
        self.lookup(self.by_element.get(element))
    }

    fn lookup(&self, route: Option<&Route>) -> RouteLookup<'_> {
        match route {
            Some(Route::Unique(index)) => RouteLookup::Found(&self.methods[*index]),
            Some(Route::Duplicate(indices)) => {
                RouteLookup::Ambiguous(indices.iter().map(|index| self.methods[*index].name()).collect())
            }
            None => RouteLookup::NotFound,
        }
    }
}
