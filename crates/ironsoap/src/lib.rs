mod binding;

pub mod cache;
pub mod charset;
pub mod client;
pub mod config;
pub mod content_type;
pub mod contract;
pub mod envelope;
pub mod error;
pub mod extension;
pub mod fault;
pub mod header;
pub mod http;
pub mod message;
pub mod serializer;
pub mod server;
pub mod version;

pub use client::{ClientProtocol, ClientResult, HttpTransport, PendingCall};
pub use config::{ClientConfig, ProtocolSettings};
pub use contract::{
    MethodContract, MethodDescriptor, MethodShape, ServiceDescription, SoapContractBuilder,
    SoapMethodContract,
};
pub use error::SoapError;
pub use extension::{ExtensionChain, ExtensionDescriptor, MessageStream, SoapExtension};
pub use fault::{FaultCodec, FaultKind, SoapException};
pub use header::{SoapHeader, SoapHeaderCollection};
pub use http::{HttpRequest, HttpResponse};
pub use message::{SoapMessage, SoapMessageStage};
pub use serializer::Value;
pub use server::{MethodInvocation, MethodOutcome, ServerProtocol, SoapService};
pub use version::{SoapProtocolVersion, SoapVersion, SupportedVersions};

pub(crate) type Result<T, E = SoapError> = std::result::Result<T, E>;
