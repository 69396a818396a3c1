//! SOAP envelope versions and the well-known namespaces that go with them.

pub const SOAP11_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_ENVELOPE_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const SOAP11_ENCODING_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const SOAP12_ENCODING_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-encoding";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

pub const SOAP11_MEDIA_TYPE: &str = "text/xml";
pub const SOAP12_MEDIA_TYPE: &str = "application/soap+xml";

pub const SOAP11_ACTOR_NEXT: &str = "http://schemas.xmlsoap.org/soap/actor/next";
pub const SOAP12_ROLE_NEXT: &str = "http://www.w3.org/2003/05/soap-envelope/role/next";
pub const SOAP12_ROLE_ULTIMATE_RECEIVER: &str =
    "http://www.w3.org/2003/05/soap-envelope/role/ultimateReceiver";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SoapVersion {
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn envelope_namespace(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_ENVELOPE_NAMESPACE,
            SoapVersion::Soap12 => SOAP12_ENVELOPE_NAMESPACE,
        }
    }

    pub fn encoding_namespace(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_ENCODING_NAMESPACE,
            SoapVersion::Soap12 => SOAP12_ENCODING_NAMESPACE,
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_MEDIA_TYPE,
            SoapVersion::Soap12 => SOAP12_MEDIA_TYPE,
        }
    }

    /// Prefix used for the envelope namespace in written messages.
    pub fn prefix(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "soap",
            SoapVersion::Soap12 => "soap12",
        }
    }

    /// `actor` in 1.1, `role` in 1.2. Both name the same header property.
    pub fn actor_attribute(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "actor",
            SoapVersion::Soap12 => "role",
        }
    }

    pub fn from_envelope_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            SOAP11_ENVELOPE_NAMESPACE => Some(SoapVersion::Soap11),
            SOAP12_ENVELOPE_NAMESPACE => Some(SoapVersion::Soap12),
            _ => None,
        }
    }

    /// Whether a header targeted at `actor` is addressed to this node.
    pub fn targets_this_node(self, actor: Option<&str>) -> bool {
        match actor {
            None | Some("") => true,
            Some(actor) => match self {
                SoapVersion::Soap11 => actor == SOAP11_ACTOR_NEXT,
                SoapVersion::Soap12 => {
                    actor == SOAP12_ROLE_NEXT || actor == SOAP12_ROLE_ULTIMATE_RECEIVER
                }
            },
        }
    }
}

impl std::fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoapVersion::Soap11 => write!(f, "SOAP 1.1"),
            SoapVersion::Soap12 => write!(f, "SOAP 1.2"),
        }
    }
}

/// Version selection in client configuration. `Default` resolves to 1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoapProtocolVersion {
    #[default]
    Default,
    Soap11,
    Soap12,
}

impl SoapProtocolVersion {
    pub fn resolve(self) -> SoapVersion {
        match self {
            SoapProtocolVersion::Default | SoapProtocolVersion::Soap11 => SoapVersion::Soap11,
            SoapProtocolVersion::Soap12 => SoapVersion::Soap12,
        }
    }
}

impl From<SoapVersion> for SoapProtocolVersion {
    fn from(value: SoapVersion) -> Self {
        match value {
            SoapVersion::Soap11 => SoapProtocolVersion::Soap11,
            SoapVersion::Soap12 => SoapProtocolVersion::Soap12,
        }
    }
}

/// The set of envelope versions a service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SupportedVersions {
    pub soap11: bool,
    pub soap12: bool,
}

impl SupportedVersions {
    pub const BOTH: Self = Self {
        soap11: true,
        soap12: true,
    };
    pub const SOAP11_ONLY: Self = Self {
        soap11: true,
        soap12: false,
    };
    pub const SOAP12_ONLY: Self = Self {
        soap11: false,
        soap12: true,
    };

    pub fn supports(self, version: SoapVersion) -> bool {
        match version {
            SoapVersion::Soap11 => self.soap11,
            SoapVersion::Soap12 => self.soap12,
        }
    }

    pub fn is_mixed(self) -> bool {
        self.soap11 && self.soap12
    }

    /// The version every client of this service can parse; 1.1 wins when both are enabled.
    pub fn primary(self) -> SoapVersion {
        if self.soap11 {
            SoapVersion::Soap11
        } else {
            SoapVersion::Soap12
        }
    }

    pub fn iter(self) -> impl Iterator<Item = SoapVersion> {
        [SoapVersion::Soap11, SoapVersion::Soap12]
            .into_iter()
            .filter(move |version| self.supports(*version))
    }
}

impl Default for SupportedVersions {
    fn default() -> Self {
        Self::BOTH
    }
}
