use typed_builder::TypedBuilder;

use crate::{
    fault::{FaultCodec, MAX_SUBCODE_DEPTH},
    version::{SoapProtocolVersion, SoapVersion},
};

pub const DEFAULT_CHARSET: &str = "utf-8";

/// Knobs shared by the client and server protocols.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ProtocolSettings {
    /// Replace outgoing fault text and detail with a generic message.
    #[builder(default)]
    pub suppress_fault_details: bool,
    #[builder(default = MAX_SUBCODE_DEPTH)]
    pub max_subcode_depth: usize,
    /// Charset of outgoing envelopes.
    #[builder(default = DEFAULT_CHARSET.to_owned(), setter(into))]
    pub charset: String,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProtocolSettings {
    pub fn fault_codec(&self, version: SoapVersion) -> FaultCodec {
        FaultCodec::new(version)
            .suppress_details(self.suppress_fault_details)
            .max_subcode_depth(self.max_subcode_depth)
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ClientConfig {
    #[builder(setter(into))]
    pub url: String,
    #[builder(default)]
    pub version: SoapProtocolVersion,
    #[builder(default)]
    pub settings: ProtocolSettings,
}

impl ClientConfig {
    pub fn soap_version(&self) -> SoapVersion {
        self.version.resolve()
    }
}
