//! Message interceptors.
//!
//! Extensions run at the four message stages. Each one may wrap the message
//! stream when the chain is set up; the deserialize stages visit them from the
//! first to the last, the serialize stages from the last to the first.
use std::{
    fmt,
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    Result, SoapError,
    contract::SoapMethodContract,
    fault::SoapException,
    message::{SoapMessage, SoapMessageStage},
};

/// In-memory message body shared between the protocol and the extension layers.
///
/// Clones share the same buffer and position.
#[derive(Clone, Default)]
pub struct MessageStream {
    inner: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl MessageStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cursor::new(bytes))),
        }
    }

    /// Copy of the whole buffer, independent of the position.
    pub fn to_vec(&self) -> Vec<u8> {
        self.inner.lock().get_ref().clone()
    }

    /// Bytes from the current position to the end, leaving the position there.
    pub fn read_remaining(&self) -> Vec<u8> {
        let mut guard = self.inner.lock();
        let position = guard.position() as usize;
        let remaining = guard.get_ref().get(position..).unwrap_or_default().to_vec();
        let end = guard.get_ref().len() as u64;
        guard.set_position(end);
        remaining
    }

    pub fn len(&self) -> usize {
        self.inner.lock().get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position()
    }

    pub fn set_position(&self, position: u64) {
        self.inner.lock().set_position(position);
    }

    pub fn rewind(&self) {
        self.set_position(0);
    }

    /// Replaces the contents and rewinds.
    pub fn reset(&self, bytes: Vec<u8>) {
        *self.inner.lock() = Cursor::new(bytes);
    }

    pub fn ptr_eq(&self, other: &MessageStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("MessageStream")
            .field("len", &guard.get_ref().len())
            .field("position", &guard.position())
            .finish()
    }
}

impl Read for MessageStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().read(buf)
    }
}

impl Write for MessageStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MessageStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}

pub trait SoapExtension: Send {
    /// Wraps `stream`. The returned stream is the one the layer above reads or writes.
    fn chain_stream(&mut self, stream: MessageStream) -> MessageStream {
        stream
    }

    fn process_message(
        &mut self,
        message: &mut SoapMessage,
        stage: SoapMessageStage,
    ) -> std::result::Result<(), SoapException>;
}

pub type ExtensionFactory = Arc<dyn Fn(&SoapMethodContract) -> Box<dyn SoapExtension> + Send + Sync>;

/// Where a service-level extension sits relative to the method's own extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExtensionGroup {
    High,
    #[default]
    Low,
}

/// Registration of an extension type with its ordering.
///
/// Lower priorities run first in the forward direction.
#[derive(Clone)]
pub struct ExtensionDescriptor {
    name: String,
    priority: i32,
    group: ExtensionGroup,
    factory: ExtensionFactory,
}

impl ExtensionDescriptor {
    pub fn new<F>(name: impl Into<String>, priority: i32, factory: F) -> Self
    where
        F: Fn(&SoapMethodContract) -> Box<dyn SoapExtension> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            group: ExtensionGroup::default(),
            factory: Arc::new(factory),
        }
    }

    pub fn with_group(mut self, group: ExtensionGroup) -> Self {
        self.group = group;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn group(&self) -> ExtensionGroup {
        self.group
    }

    pub fn create(&self, method: &SoapMethodContract) -> Box<dyn SoapExtension> {
        (self.factory)(method)
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Orders `[high, method, low]` by priority. Ties keep that order.
pub fn sort_extensions(
    high: &[ExtensionDescriptor],
    method: &[ExtensionDescriptor],
    low: &[ExtensionDescriptor],
) -> Vec<ExtensionDescriptor> {
    let mut all: Vec<ExtensionDescriptor> = high.iter().chain(method).chain(low).cloned().collect();
    all.sort_by_key(ExtensionDescriptor::priority);
    all
}

/// Extension instances of one call, in execution order.
pub struct ExtensionChain {
    extensions: Vec<(String, Box<dyn SoapExtension>)>,
}

impl ExtensionChain {
    pub fn new(method: &SoapMethodContract) -> Self {
        let extensions = method
            .extensions
            .iter()
            .map(|descriptor| (descriptor.name().to_owned(), descriptor.create(method)))
            .collect();
        Self { extensions }
    }

    pub fn empty() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Lets every extension wrap the stream, the first one wrapping `base`.
    pub fn init_stream_chain(&mut self, base: MessageStream) -> MessageStream {
        self.extensions
            .iter_mut()
            .fold(base, |stream, (_, extension)| extension.chain_stream(stream))
    }

    /// Moves `message` to `stage` and runs the extensions for it.
    ///
    /// A fault raised by an extension is stored on the message. With
    /// `throw_on_exception` the first fault raised during this run stops it and
    /// is returned; a fault already on the message does not.
    pub fn run(
        &mut self,
        message: &mut SoapMessage,
        stage: SoapMessageStage,
        throw_on_exception: bool,
    ) -> Result<()> {
        message.set_stage(stage)?;
        if self.extensions.is_empty() {
            return Ok(());
        }

        let count = self.extensions.len();
        for step in 0..count {
            let index = if stage.is_deserialize() {
                step
            } else {
                count - 1 - step
            };
            let (name, extension) = &mut self.extensions[index];
            debug!(extension = %name, ?stage, "Running extension");
            let before = message.exception().cloned();
            if let Err(exception) = extension.process_message(message, stage) {
                message.set_exception(exception);
            }

            // Extensions may also record a fault on the message directly.
            let raised = message.exception().filter(|exception| Some(*exception) != before.as_ref());
            let Some(exception) = raised else {
                continue;
            };
            if throw_on_exception {
                return Err(SoapError::from(exception.clone()));
            }
            warn!(extension = %name, ?stage, %exception, "Extension fault recorded");
        }
        Ok(())
    }
}

impl fmt::Debug for ExtensionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.extensions.iter().map(|(name, _)| name))
            .finish()
    }
}
