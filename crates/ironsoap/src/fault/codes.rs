//! Fault code vocabularies of both SOAP versions and the translation between them.

use ironsoap_xml::QualifiedName;

use crate::version::{SOAP11_ENVELOPE_NAMESPACE, SOAP12_ENVELOPE_NAMESPACE, SoapVersion};

pub const VERSION_MISMATCH: &str = "VersionMismatch";
pub const MUST_UNDERSTAND: &str = "MustUnderstand";
pub const CLIENT: &str = "Client";
pub const SERVER: &str = "Server";
pub const SENDER: &str = "Sender";
pub const RECEIVER: &str = "Receiver";
pub const DATA_ENCODING_UNKNOWN: &str = "DataEncodingUnknown";

/// Namespace of the SOAP 1.2 RPC subcodes.
pub const RPC_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-rpc";
pub const RPC_BAD_ARGUMENTS: &str = "BadArguments";
pub const RPC_PROCEDURE_NOT_PRESENT: &str = "ProcedureNotPresent";

/// The logical fault categories shared by both wire vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    VersionMismatch,
    MustUnderstand,
    /// `Client` in 1.1, `Sender` in 1.2.
    Sender,
    /// `Server` in 1.1, `Receiver` in 1.2.
    Receiver,
    /// 1.2 only.
    DataEncodingUnknown,
}

impl FaultKind {
    pub fn code(self, version: SoapVersion) -> QualifiedName {
        let ns = version.envelope_namespace();
        let name = match (self, version) {
            (FaultKind::VersionMismatch, _) => VERSION_MISMATCH,
            (FaultKind::MustUnderstand, _) => MUST_UNDERSTAND,
            (FaultKind::Sender, SoapVersion::Soap11) => CLIENT,
            (FaultKind::Sender, SoapVersion::Soap12) => SENDER,
            (FaultKind::Receiver, SoapVersion::Soap11) => SERVER,
            (FaultKind::Receiver, SoapVersion::Soap12) => RECEIVER,
            (FaultKind::DataEncodingUnknown, SoapVersion::Soap11) => CLIENT,
            (FaultKind::DataEncodingUnknown, SoapVersion::Soap12) => DATA_ENCODING_UNKNOWN,
        };
        QualifiedName::new(name, ns)
    }

    pub fn from_code(code: &QualifiedName) -> Option<Self> {
        match (code.namespace(), code.name()) {
            (SOAP11_ENVELOPE_NAMESPACE | SOAP12_ENVELOPE_NAMESPACE, VERSION_MISMATCH) => {
                Some(FaultKind::VersionMismatch)
            }
            (SOAP11_ENVELOPE_NAMESPACE | SOAP12_ENVELOPE_NAMESPACE, MUST_UNDERSTAND) => {
                Some(FaultKind::MustUnderstand)
            }
            (SOAP11_ENVELOPE_NAMESPACE, CLIENT) | (SOAP12_ENVELOPE_NAMESPACE, SENDER) => {
                Some(FaultKind::Sender)
            }
            (SOAP11_ENVELOPE_NAMESPACE, SERVER) | (SOAP12_ENVELOPE_NAMESPACE, RECEIVER) => {
                Some(FaultKind::Receiver)
            }
            (SOAP12_ENVELOPE_NAMESPACE, DATA_ENCODING_UNKNOWN) => {
                Some(FaultKind::DataEncodingUnknown)
            }
            _ => None,
        }
    }

    fn is_translatable(self) -> bool {
        !matches!(self, FaultKind::DataEncodingUnknown)
    }
}

/// Maps the four canonical codes into `version`'s vocabulary. Anything else,
/// including user-defined codes, passes through unchanged.
pub fn translate(code: &QualifiedName, version: SoapVersion) -> QualifiedName {
    match FaultKind::from_code(code) {
        Some(kind) if kind.is_translatable() => kind.code(version),
        _ => code.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_translates_to_receiver() {
        let server = QualifiedName::new(SERVER, SOAP11_ENVELOPE_NAMESPACE);
        let translated = translate(&server, SoapVersion::Soap12);
        assert_eq!(translated, QualifiedName::new(RECEIVER, SOAP12_ENVELOPE_NAMESPACE));
        assert_eq!(translate(&translated, SoapVersion::Soap11), server);
    }

    #[test]
    fn test_all_canonical_kinds_round_trip() {
        for kind in [
            FaultKind::VersionMismatch,
            FaultKind::MustUnderstand,
            FaultKind::Sender,
            FaultKind::Receiver,
        ] {
            let soap11 = kind.code(SoapVersion::Soap11);
            let soap12 = translate(&soap11, SoapVersion::Soap12);
            assert_eq!(FaultKind::from_code(&soap12), Some(kind));
            assert_eq!(translate(&soap12, SoapVersion::Soap11), soap11);
        }
    }

    #[test]
    fn test_user_codes_pass_through() {
        let custom = QualifiedName::new("QuotaExceeded", "urn:billing");
        assert_eq!(translate(&custom, SoapVersion::Soap12), custom);

        let data_encoding = FaultKind::DataEncodingUnknown.code(SoapVersion::Soap12);
        assert_eq!(translate(&data_encoding, SoapVersion::Soap11), data_encoding);
    }
}
