//! Server side of the protocol.
//!
//! [`ServerProtocol::handle`] takes one HTTP request to one HTTP response. It
//! never touches a socket, so any listener can drive it.
pub mod one_way;
mod router;

use std::{collections::HashMap, sync::Arc};

use ironsoap_xml::QualifiedName;
use tracing::info;

pub use one_way::{ErrorTrap, LogErrorTrap, TrappedFault};

use crate::{
    Result, SoapError, cache, charset,
    config::ProtocolSettings,
    contract::{ServiceContract, ServiceDescription, SoapMethodContract},
    fault::SoapException,
    header::{SoapHeader, SoapHeaderCollection},
    http::{HttpRequest, HttpResponse},
    serializer::Value,
    version::{SoapVersion, SupportedVersions},
};

/// The business implementation behind a service.
///
/// Returning a [`SoapException`] (directly or as the source of the error)
/// sends it unchanged; any other error becomes a Server fault.
pub trait SoapService: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<MethodOutcome>;
}

impl<F> SoapService for F
where
    F: Fn(&mut MethodInvocation) -> anyhow::Result<MethodOutcome> + Send + Sync,
{
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<MethodOutcome> {
        self(invocation)
    }
}

/// One call as the service sees it.
#[derive(Debug)]
pub struct MethodInvocation {
    pub method: Arc<SoapMethodContract>,
    pub parameters: Vec<Value>,
    /// Headers of the request. Set `did_understand` on the unknown ones the method handled.
    pub in_headers: SoapHeaderCollection,
    /// Headers for the answer, sent ahead of [`MethodOutcome::out_headers`]. When the
    /// method fails, the ones bound for faults go out with the fault.
    pub out_headers: SoapHeaderCollection,
}

impl MethodInvocation {
    pub fn name(&self) -> &str {
        self.method.name()
    }

    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.parameters.get(index)
    }

    pub fn parameter_named(&self, name: &str) -> Option<&Value> {
        let index = self
            .method
            .method
            .in_params()
            .iter()
            .position(|param| param.name == name)?;
        self.parameters.get(index)
    }

    pub fn header(&self, name: &QualifiedName) -> Option<&SoapHeader> {
        self.in_headers.get(name)
    }
}

/// What a method produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodOutcome {
    pub return_value: Option<Value>,
    pub out_values: Vec<Value>,
    pub out_headers: SoapHeaderCollection,
}

impl MethodOutcome {
    pub fn void() -> Self {
        Self::default()
    }

    pub fn returning(value: impl Into<Value>) -> Self {
        Self {
            return_value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_out_value(mut self, value: impl Into<Value>) -> Self {
        self.out_values.push(value.into());
        self
    }

    pub fn with_header(mut self, header: SoapHeader) -> Self {
        self.out_headers.push(header);
        self
    }

    /// Return value then out values, the order of the response members.
    pub(crate) fn into_values(self, has_return: bool) -> (Vec<Value>, SoapHeaderCollection) {
        let mut values = Vec::with_capacity(self.out_values.len() + 1);
        if has_return {
            values.push(self.return_value.unwrap_or_default());
        }
        values.extend(self.out_values);
        (values, self.out_headers)
    }
}

/// Serves one [`ServiceDescription`] with one [`SoapService`].
pub struct ServerProtocol {
    supported: SupportedVersions,
    contracts: HashMap<SoapVersion, Arc<ServiceContract>>,
    service: Arc<dyn SoapService>,
    settings: ProtocolSettings,
    trap: Arc<dyn ErrorTrap>,
}

impl std::fmt::Debug for ServerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProtocol")
            .field("supported", &self.supported)
            .field("contracts", &self.contracts)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ServerProtocol {
    /// Compiles (or fetches from the cache) the contracts of every supported version.
    pub fn new(description: &ServiceDescription, service: impl SoapService + 'static) -> Result<Self> {
        let supported = description.supported_versions;
        if !supported.soap11 && !supported.soap12 {
            return Err(SoapError::contract(
                &description.name,
                "the service supports no SOAP version",
            ));
        }

        let mut contracts = HashMap::new();
        for version in supported.iter() {
            contracts.insert(version, cache::service_contract(description, version, false)?);
        }
        info!(service = %description.name, versions = contracts.len(), "Server protocol ready");

        Ok(Self {
            supported,
            contracts,
            service: Arc::new(service),
            settings: ProtocolSettings::default(),
            trap: Arc::new(LogErrorTrap),
        })
    }

    /// Replaces the settings; the outgoing charset must be one envelopes can be written in.
    pub fn with_settings(mut self, settings: ProtocolSettings) -> Result<Self> {
        charset::output_encoding_for(&settings.charset)?;
        self.settings = settings;
        Ok(self)
    }

    pub fn with_error_trap(mut self, trap: impl ErrorTrap + 'static) -> Self {
        self.trap = Arc::new(trap);
        self
    }

    pub fn supported_versions(&self) -> SupportedVersions {
        self.supported
    }

    pub fn contract(&self, version: SoapVersion) -> Option<&Arc<ServiceContract>> {
        self.contracts.get(&version)
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn handle(&self, request: HttpRequest) -> HttpResponse {
        router::ServerRouter::new(self, request).run()
    }
}

/// The fault to send for an error returned by a [`SoapService`].
pub(crate) fn fault_from_service_error(error: anyhow::Error, version: SoapVersion) -> SoapException {
    let error = match error.downcast::<SoapException>() {
        Ok(fault) => return fault,
        Err(error) => error,
    };
    match error.downcast::<SoapError>() {
        Ok(SoapError::Fault(fault)) => *fault,
        Ok(other) => SoapException::server(version, other.to_string()),
        Err(error) => SoapException::server(version, format!("{error:#}")),
    }
}
