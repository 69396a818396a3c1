//! Client side of the protocol.
//!
//! [`ClientProtocol`] turns a method name and parameter values into an
//! [`HttpRequest`], hands it to an [`HttpTransport`] and reads the response.
mod call;
pub mod pending;

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::channel::oneshot;
use tracing::{info, instrument};

pub use pending::{CallId, CompletionCallback, PendingCall};

use crate::{
    Result, SoapError, cache, charset,
    config::ClientConfig,
    contract::{ServiceContract, ServiceDescription, SoapMethodContract},
    header::SoapHeaderCollection,
    http::{HttpRequest, HttpResponse},
    serializer::Value,
    version::SoapVersion,
};
use call::ClientCall;

/// Moves requests to a server.
pub trait HttpTransport: Send + Sync {
    fn send(&self, call: CallId, request: HttpRequest) -> Result<HttpResponse>;

    /// Starts a request and reports its response through `on_done`.
    ///
    /// The default sends on the calling thread, so the call completes before
    /// `begin_send` returns.
    fn begin_send(
        &self,
        call: CallId,
        request: HttpRequest,
        on_done: Box<dyn FnOnce(Result<HttpResponse>) + Send>,
    ) {
        on_done(self.send(call, request));
    }

    /// Cancels an in-flight request. Transports that cannot cancel ignore this.
    fn abort(&self, _call: CallId) {}
}

/// What a successful call returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientResult {
    pub return_value: Option<Value>,
    pub out_values: Vec<Value>,
    pub out_headers: SoapHeaderCollection,
}

/// Calls the methods of one [`ServiceDescription`] over one transport.
pub struct ClientProtocol {
    config: ClientConfig,
    contract: Arc<ServiceContract>,
    transport: Arc<dyn HttpTransport>,
    next_call: AtomicU64,
}

impl std::fmt::Debug for ClientProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientProtocol")
            .field("config", &self.config)
            .field("contract", &self.contract.name())
            .finish_non_exhaustive()
    }
}

impl ClientProtocol {
    pub fn new(
        config: ClientConfig,
        description: &ServiceDescription,
        transport: impl HttpTransport + 'static,
    ) -> Result<Self> {
        charset::output_encoding_for(&config.settings.charset)?;
        let version = config.soap_version();
        let contract = cache::service_contract(description, version, true)?;
        info!(service = %description.name, url = %config.url, %version, "Client protocol ready");
        Ok(Self {
            config,
            contract,
            transport: Arc::new(transport),
            next_call: AtomicU64::new(1),
        })
    }

    pub fn version(&self) -> SoapVersion {
        self.contract.version()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn contract(&self) -> &Arc<ServiceContract> {
        &self.contract
    }

    fn method(&self, name: &str) -> Result<Arc<SoapMethodContract>> {
        self.contract
            .method(name)
            .cloned()
            .ok_or_else(|| SoapError::Routing(format!("{name} is not a method of {}", self.contract.name())))
    }

    fn prepare(
        &self,
        method_name: &str,
        parameters: Vec<Value>,
        headers: SoapHeaderCollection,
    ) -> Result<(CallId, ClientCall, HttpRequest)> {
        let method = self.method(method_name)?;
        let id = CallId(self.next_call.fetch_add(1, Ordering::Relaxed));
        let mut call = ClientCall::new(method, &self.config.url, self.config.settings.clone());
        let request = call.write_request(parameters, headers)?;
        Ok((id, call, request))
    }

    /// Calls `method_name` and blocks until the response is read.
    #[instrument(skip(self, parameters, headers))]
    pub fn invoke(
        &self,
        method_name: &str,
        parameters: Vec<Value>,
        headers: SoapHeaderCollection,
    ) -> Result<ClientResult> {
        let (id, call, request) = self.prepare(method_name, parameters, headers)?;
        let response = self.transport.send(id, request)?;
        call.read_response(response)
    }

    /// Starts `method_name`. Serialization errors are returned at once; the
    /// rest of the outcome arrives through the [`PendingCall`].
    #[instrument(skip(self, parameters, headers, callback))]
    pub fn begin_invoke(
        &self,
        method_name: &str,
        parameters: Vec<Value>,
        headers: SoapHeaderCollection,
        callback: Option<CompletionCallback>,
    ) -> Result<PendingCall> {
        let (id, call, request) = self.prepare(method_name, parameters, headers)?;
        let pending = PendingCall::new(id, method_name, Arc::clone(&self.transport), callback);

        let completer = pending.clone();
        self.transport.begin_send(
            id,
            request,
            Box::new(move |response| {
                completer.complete(response.and_then(|response| call.read_response(response)));
            }),
        );
        pending.mark_returned();
        Ok(pending)
    }

    pub fn end_invoke(&self, pending: &PendingCall) -> Result<ClientResult> {
        pending.end_invoke()
    }

    /// Awaitable form of [`ClientProtocol::begin_invoke`].
    pub fn invoke_async(
        &self,
        method_name: &str,
        parameters: Vec<Value>,
        headers: SoapHeaderCollection,
    ) -> impl Future<Output = Result<ClientResult>> + Send + use<> {
        let (sender, receiver) = oneshot::channel();
        let callback: CompletionCallback = Box::new(move |pending: &PendingCall| {
            // The receiver is gone when the future was dropped.
            let _ = sender.send(pending.end_invoke());
        });
        let started = self.begin_invoke(method_name, parameters, headers, Some(callback));

        async move {
            let _pending = started?;
            receiver.await.unwrap_or(Err(SoapError::Aborted))
        }
    }

    pub fn abort(&self, pending: &PendingCall) {
        pending.abort();
    }
}
