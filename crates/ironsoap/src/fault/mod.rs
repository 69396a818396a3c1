//! SOAP faults: the exception model, the code vocabularies and the wire codec.
pub mod codec;
pub mod codes;

use ironsoap_xml::{OwnedElement, QualifiedName};

use crate::version::SoapVersion;

pub use codec::{FaultCodec, MAX_SUBCODE_DEPTH, SUPPRESSED_FAULT_MESSAGE};
pub use codes::FaultKind;

/// Where in the message processing a fault was raised.
///
/// A 1.1 body fault always carries a `<detail>` element; a header fault never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultOrigin {
    #[default]
    Body,
    Header,
}

/// A link in the 1.2 subcode chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFaultSubCode {
    pub code: QualifiedName,
    pub sub_code: Option<Box<SoapFaultSubCode>>,
}

impl SoapFaultSubCode {
    pub fn new(code: QualifiedName) -> Self {
        Self {
            code,
            sub_code: None,
        }
    }

    pub fn with_sub_code(mut self, sub_code: SoapFaultSubCode) -> Self {
        self.sub_code = Some(Box::new(sub_code));
        self
    }

    /// Builds a chain from outermost to innermost code.
    pub fn from_chain(codes: Vec<QualifiedName>) -> Option<Self> {
        codes.into_iter().rev().fold(None, |inner, code| {
            Some(SoapFaultSubCode {
                code,
                sub_code: inner.map(Box::new),
            })
        })
    }

    /// Codes of the chain, outermost first.
    pub fn codes(&self) -> impl Iterator<Item = &QualifiedName> {
        std::iter::successors(Some(self), |current| current.sub_code.as_deref())
            .map(|current| &current.code)
    }

    pub fn depth(&self) -> usize {
        self.codes().count()
    }
}

/// A SOAP fault, raised locally or received from the peer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct SoapException {
    pub code: QualifiedName,
    pub sub_code: Option<SoapFaultSubCode>,
    pub message: String,
    /// `faultactor` in 1.1, `Role` in 1.2.
    pub actor: Option<String>,
    /// 1.2 only.
    pub node: Option<String>,
    pub lang: Option<String>,
    pub detail: Option<OwnedElement>,
    pub origin: FaultOrigin,
    /// Headers reported back through 1.2 `NotUnderstood` blocks.
    pub not_understood: Vec<QualifiedName>,
}

impl SoapException {
    pub fn new(code: QualifiedName, message: impl Into<String>) -> Self {
        Self {
            code,
            sub_code: None,
            message: message.into(),
            actor: None,
            node: None,
            lang: None,
            detail: None,
            origin: FaultOrigin::Body,
            not_understood: Vec::new(),
        }
    }

    pub fn of_kind(kind: FaultKind, version: SoapVersion, message: impl Into<String>) -> Self {
        let exception = Self::new(kind.code(version), message);
        match kind {
            FaultKind::MustUnderstand => exception.header_fault(),
            _ => exception,
        }
    }

    /// Sender side error: `Client` in 1.1, `Sender` in 1.2.
    pub fn client(version: SoapVersion, message: impl Into<String>) -> Self {
        Self::of_kind(FaultKind::Sender, version, message)
    }

    /// Receiver side error: `Server` in 1.1, `Receiver` in 1.2.
    pub fn server(version: SoapVersion, message: impl Into<String>) -> Self {
        Self::of_kind(FaultKind::Receiver, version, message)
    }

    pub fn must_understand(version: SoapVersion, message: impl Into<String>) -> Self {
        Self::of_kind(FaultKind::MustUnderstand, version, message)
    }

    pub fn version_mismatch(version: SoapVersion, message: impl Into<String>) -> Self {
        Self::of_kind(FaultKind::VersionMismatch, version, message)
    }

    pub fn with_sub_code(mut self, sub_code: SoapFaultSubCode) -> Self {
        self.sub_code = Some(sub_code);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_detail(mut self, detail: OwnedElement) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_not_understood(mut self, headers: Vec<QualifiedName>) -> Self {
        self.not_understood = headers;
        self
    }

    pub fn header_fault(mut self) -> Self {
        self.origin = FaultOrigin::Header;
        self
    }

    pub fn kind(&self) -> Option<FaultKind> {
        FaultKind::from_code(&self.code)
    }

    pub fn is_header_fault(&self) -> bool {
        self.origin == FaultOrigin::Header
    }

    /// The same fault with its code expressed in `version`'s vocabulary.
    pub fn translated(&self, version: SoapVersion) -> Self {
        let mut translated = self.clone();
        translated.code = codes::translate(&self.code, version);
        translated
    }
}
