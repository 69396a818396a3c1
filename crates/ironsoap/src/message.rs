//! Per-call message state shared by the protocol and its extensions.
use std::sync::Arc;

use tracing::trace;

use crate::{
    Result, SoapError,
    contract::SoapMethodContract,
    extension::MessageStream,
    fault::SoapException,
    header::SoapHeaderCollection,
    serializer::Value,
    version::SoapVersion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoapMessageStage {
    BeforeSerialize,
    AfterSerialize,
    BeforeDeserialize,
    AfterDeserialize,
}

impl SoapMessageStage {
    pub fn is_deserialize(self) -> bool {
        matches!(
            self,
            SoapMessageStage::BeforeDeserialize | SoapMessageStage::AfterDeserialize
        )
    }

    pub fn is_serialize(self) -> bool {
        !self.is_deserialize()
    }
}

/// Which end of the call a message belongs to. Decides the stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSide {
    /// Serializes the request, then deserializes the response.
    Client,
    /// Deserializes the request, then serializes the response.
    Server,
}

impl MessageSide {
    fn rank(self, stage: SoapMessageStage) -> u8 {
        let rank = match stage {
            SoapMessageStage::BeforeSerialize => 0,
            SoapMessageStage::AfterSerialize => 1,
            SoapMessageStage::BeforeDeserialize => 2,
            SoapMessageStage::AfterDeserialize => 3,
        };
        match self {
            MessageSide::Client => rank,
            MessageSide::Server => (rank + 2) % 4,
        }
    }
}

/// Message bound to exactly one in-flight call.
///
/// Stages only move forward. The content type and encoding can be touched
/// only before serializing or before deserializing; afterwards they are
/// committed to the wire.
#[derive(Debug)]
pub struct SoapMessage {
    side: MessageSide,
    version: SoapVersion,
    stage: Option<SoapMessageStage>,
    action: String,
    url: String,
    method: Option<Arc<SoapMethodContract>>,
    headers: SoapHeaderCollection,
    stream: MessageStream,
    content_type: String,
    content_encoding: Option<String>,
    in_values: Option<Vec<Value>>,
    out_values: Option<Vec<Value>>,
    exception: Option<SoapException>,
}

impl SoapMessage {
    pub fn new(side: MessageSide, version: SoapVersion) -> Self {
        Self {
            side,
            version,
            stage: None,
            action: String::new(),
            url: String::new(),
            method: None,
            headers: SoapHeaderCollection::new(),
            stream: MessageStream::new(),
            content_type: version.media_type().to_owned(),
            content_encoding: None,
            in_values: None,
            out_values: None,
            exception: None,
        }
    }

    pub fn side(&self) -> MessageSide {
        self.side
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn stage(&self) -> Option<SoapMessageStage> {
        self.stage
    }

    /// Advances to `stage`. Going back, or staying, is an error.
    pub fn set_stage(&mut self, stage: SoapMessageStage) -> Result<()> {
        if let Some(current) = self.stage {
            if self.side.rank(stage) <= self.side.rank(current) {
                return Err(SoapError::invalid_operation(format!(
                    "cannot move a {:?} message from {current:?} to {stage:?}",
                    self.side
                )));
            }
        }
        trace!(?stage, "Message stage");
        self.stage = Some(stage);
        Ok(())
    }

    fn ensure_metadata_stage(&self) -> Result<()> {
        match self.stage {
            Some(SoapMessageStage::BeforeSerialize | SoapMessageStage::BeforeDeserialize) => Ok(()),
            stage => Err(SoapError::invalid_operation(format!(
                "content type and encoding are not accessible at stage {stage:?}"
            ))),
        }
    }

    pub fn content_type(&self) -> Result<&str> {
        self.ensure_metadata_stage()?;
        Ok(&self.content_type)
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> Result<()> {
        self.ensure_metadata_stage()?;
        self.content_type = content_type.into();
        Ok(())
    }

    pub fn content_encoding(&self) -> Result<Option<&str>> {
        self.ensure_metadata_stage()?;
        Ok(self.content_encoding.as_deref())
    }

    pub fn set_content_encoding(&mut self, encoding: Option<String>) -> Result<()> {
        self.ensure_metadata_stage()?;
        self.content_encoding = encoding;
        Ok(())
    }

    /// Ungated read for the protocol itself, once the stage is settled.
    pub(crate) fn committed_content_type(&self) -> &str {
        &self.content_type
    }

    pub(crate) fn committed_content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub(crate) fn init_content_type(&mut self, content_type: String, encoding: Option<String>) {
        self.content_type = content_type;
        self.content_encoding = encoding;
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub(crate) fn set_action(&mut self, action: impl Into<String>) {
        self.action = action.into();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn method(&self) -> Option<&Arc<SoapMethodContract>> {
        self.method.as_ref()
    }

    pub(crate) fn set_method(&mut self, method: Arc<SoapMethodContract>) {
        self.method = Some(method);
    }

    pub fn is_one_way(&self) -> bool {
        self.method.as_ref().is_some_and(|method| method.one_way)
    }

    pub fn headers(&self) -> &SoapHeaderCollection {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut SoapHeaderCollection {
        &mut self.headers
    }

    pub fn stream(&self) -> &MessageStream {
        &self.stream
    }

    pub(crate) fn set_stream(&mut self, stream: MessageStream) {
        self.stream = stream;
    }

    pub fn exception(&self) -> Option<&SoapException> {
        self.exception.as_ref()
    }

    pub fn set_exception(&mut self, exception: SoapException) {
        self.exception = Some(exception);
    }

    pub(crate) fn set_in_values(&mut self, values: Vec<Value>) {
        self.in_values = Some(values);
    }

    pub(crate) fn set_out_values(&mut self, values: Vec<Value>) {
        self.out_values = Some(values);
    }

    pub(crate) fn in_values(&self) -> &[Value] {
        self.in_values.as_deref().unwrap_or_default()
    }

    fn ensure_no_exception(&self) -> Result<()> {
        match &self.exception {
            Some(exception) => Err(SoapError::invalid_operation(format!(
                "parameter values are unavailable because the message holds a fault: {exception}"
            ))),
            None => Ok(()),
        }
    }

    fn has_return_value(&self) -> bool {
        self.method
            .as_ref()
            .is_some_and(|method| method.method.return_type().is_some())
    }

    pub fn in_parameter_count(&self) -> usize {
        self.in_values.as_ref().map_or(0, Vec::len)
    }

    pub fn get_in_parameter_value(&self, index: usize) -> Result<&Value> {
        self.ensure_no_exception()?;
        let values = self
            .in_values
            .as_ref()
            .ok_or_else(|| SoapError::invalid_operation("in parameters are not available yet"))?;
        values.get(index).ok_or(SoapError::IndexOutOfRange {
            what: "in parameters",
            index,
            count: values.len(),
        })
    }

    /// Out parameter `index`. The return value, when there is one, sits before the out parameters.
    pub fn get_out_parameter_value(&self, index: usize) -> Result<&Value> {
        self.ensure_no_exception()?;
        let values = self
            .out_values
            .as_ref()
            .ok_or_else(|| SoapError::invalid_operation("out parameters are not available yet"))?;
        let offset = usize::from(self.has_return_value());
        index
            .checked_add(offset)
            .and_then(|position| values.get(position))
            .ok_or(SoapError::IndexOutOfRange {
                what: "out parameters",
                index,
                count: values.len().saturating_sub(offset),
            })
    }

    pub fn get_return_value(&self) -> Result<&Value> {
        self.ensure_no_exception()?;
        if !self.has_return_value() {
            return Err(SoapError::invalid_operation("the method has no return value"));
        }
        self.out_values
            .as_ref()
            .and_then(|values| values.first())
            .ok_or_else(|| SoapError::invalid_operation("the return value is not available yet"))
    }
}
