//! Request routing and dispatch.
//!
//! [`ServerRouter`] walks one request through a small state machine: guess the
//! version, route to a method, read the parameters, invoke, and write either the
//! response or a fault. Every failure after the version is known ends in
//! `WritingFault`.
use std::{io::Write, mem, sync::Arc};

use hyper::{
    StatusCode,
    header::{CONTENT_ENCODING, CONTENT_TYPE},
};
use ironsoap_xml::{QualifiedName, parser::parse};
use tracing::{debug, error, info, instrument, warn};

use super::{MethodInvocation, MethodOutcome, ServerProtocol, SoapService, fault_from_service_error, one_way};
use crate::{
    Result, SoapError,
    binding::{check_required, check_understood, fault_for, read_body, read_headers, write_headers},
    charset,
    config::ProtocolSettings,
    content_type::ContentType,
    contract::{HeaderDirection, RouteLookup, RoutingStyle, SoapMethodContract},
    envelope::{Envelope, EnvelopePeek, EnvelopeWriter, not_understood_headers},
    extension::{ExtensionChain, MessageStream},
    fault::{SoapException, SoapFaultSubCode, codes},
    header::SoapHeaderCollection,
    http::{HttpRequest, HttpResponse},
    message::{MessageSide, SoapMessage, SoapMessageStage},
    version::{SOAP12_MEDIA_TYPE, SoapVersion},
};

#[derive(Debug, Default)]
enum ServerState {
    #[default]
    Taken,
    GuessingVersion {
        request: HttpRequest,
    },
    RoutingMethod {
        request: HttpRequest,
        version: SoapVersion,
    },
    ReadingParameters {
        request: HttpRequest,
        /// use box to avoid large enum variant
        call: Box<ServerCall>,
    },
    Invoked {
        call: Box<ServerCall>,
        invocation: MethodInvocation,
    },
    WritingResponse {
        call: Box<ServerCall>,
        outcome: MethodOutcome,
    },
    WritingFault {
        version: SoapVersion,
        fault: Box<SoapException>,
        call: Option<Box<ServerCall>>,
    },
    Done(HttpResponse),
}

impl ServerState {
    fn state_name(&self) -> &'static str {
        match self {
            ServerState::Taken => "Taken",
            ServerState::GuessingVersion { .. } => "GuessingVersion",
            ServerState::RoutingMethod { .. } => "RoutingMethod",
            ServerState::ReadingParameters { .. } => "ReadingParameters",
            ServerState::Invoked { .. } => "Invoked",
            ServerState::WritingResponse { .. } => "WritingResponse",
            ServerState::WritingFault { .. } => "WritingFault",
            ServerState::Done(_) => "Done",
        }
    }

    fn fault(version: SoapVersion, fault: SoapException, call: Option<Box<ServerCall>>) -> Self {
        ServerState::WritingFault {
            version,
            fault: Box::new(fault),
            call,
        }
    }
}

pub(super) struct ServerRouter<'a> {
    protocol: &'a ServerProtocol,
    state: ServerState,
}

impl<'a> ServerRouter<'a> {
    pub(super) fn new(protocol: &'a ServerProtocol, request: HttpRequest) -> Self {
        Self {
            protocol,
            state: ServerState::GuessingVersion { request },
        }
    }

    fn set_state(&mut self, state: ServerState) {
        info!(state = state.state_name(), "Setting server state");
        self.state = state;
    }

    #[instrument(skip(self), name = "ServerRouter::run")]
    pub(super) fn run(mut self) -> HttpResponse {
        loop {
            let state = mem::take(&mut self.state);
            let next = match state {
                ServerState::Done(response) => {
                    debug!(status = %response.status, "Request handled");
                    return response;
                }
                ServerState::Taken => {
                    error!("Server router stepped without a state");
                    return HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
                        .with_text("the request could not be processed");
                }
                ServerState::GuessingVersion { request } => self.guess_version(request),
                ServerState::RoutingMethod { request, version } => self.route(request, version),
                ServerState::ReadingParameters { request, mut call } => {
                    let throw = !call.method.one_way;
                    match call.read_request(request, throw) {
                        Ok(invocation) => ServerState::Invoked { call, invocation },
                        Err(fault) => {
                            // Request headers never go back out.
                            call.message.headers_mut().clear();
                            ServerState::fault(call.version(), fault, Some(call))
                        }
                    }
                }
                ServerState::Invoked { mut call, mut invocation } => {
                    match call.invoke(self.protocol.service.as_ref(), &mut invocation) {
                        Ok(outcome) => ServerState::WritingResponse { call, outcome },
                        Err(fault) => ServerState::fault(call.version(), fault, Some(call)),
                    }
                }
                ServerState::WritingResponse { mut call, outcome } => {
                    match call.write_response(outcome, &self.protocol.settings) {
                        Ok(response) => ServerState::Done(response),
                        Err(fault) => ServerState::fault(call.version(), fault, Some(call)),
                    }
                }
                ServerState::WritingFault { version, fault, call } => {
                    ServerState::Done(self.write_fault(version, *fault, call))
                }
            };
            self.set_state(next);
        }
    }

    fn guess_version(&self, request: HttpRequest) -> ServerState {
        let content_type = request.content_type();
        if let Some(content_type) = content_type.as_ref().filter(|content_type| !content_type.is_soap()) {
            warn!(media_type = content_type.media_type(), "Request is not a SOAP message");
            let response = HttpResponse::new(StatusCode::UNSUPPORTED_MEDIA_TYPE).with_text(&format!(
                "Unsupported media type {}; expected a SOAP envelope.",
                content_type.media_type()
            ));
            return ServerState::Done(response);
        }

        let supported = self.protocol.supported;
        let version = if supported.is_mixed() {
            let soap12_media = content_type
                .as_ref()
                .is_some_and(|content_type| content_type.is_media_type(SOAP12_MEDIA_TYPE));
            if request.soap_action().is_none() || soap12_media {
                SoapVersion::Soap12
            } else {
                SoapVersion::Soap11
            }
        } else {
            supported.primary()
        };
        debug!(%version, "Guessed the request version");
        ServerState::RoutingMethod { request, version }
    }

    fn route(&self, request: HttpRequest, guessed: SoapVersion) -> ServerState {
        let charset = request
            .content_type()
            .and_then(|content_type| content_type.effective_charset().map(str::to_owned));
        let peek = match charset::decode(&request.body, charset.as_deref()) {
            Ok(text) => EnvelopePeek::read(&text),
            Err(err) => return unreadable(guessed, &err.to_string()),
        };
        let peek = match peek {
            Ok(peek) => peek,
            Err(err) => return unreadable(guessed, &err.to_string()),
        };

        let supported = self.protocol.supported;
        let version = match peek.version {
            Some(version) if supported.supports(version) => version,
            _ => {
                let reply = supported.primary();
                warn!(namespace = %peek.namespace, %reply, "Envelope namespace is not supported");
                let fault = SoapException::version_mismatch(
                    reply,
                    format!(
                        "Possible SOAP version mismatch: Envelope namespace {} was unexpected. Expecting {}.",
                        peek.namespace,
                        reply.envelope_namespace()
                    ),
                );
                return ServerState::fault(reply, fault, None);
            }
        };
        if version != guessed {
            debug!(%guessed, %version, "Envelope settled the version");
        }

        let Some(contract) = self.protocol.contract(version) else {
            let fault = SoapException::server(version, format!("no contract compiled for {version}"));
            return ServerState::fault(version, fault, None);
        };

        let action = match version {
            SoapVersion::Soap11 => request.soap_action(),
            SoapVersion::Soap12 => request
                .content_type()
                .and_then(|content_type| content_type.action().map(str::to_owned))
                .or_else(|| request.soap_action()),
        }
        .filter(|action| !action.is_empty());
        let element = peek.first_body_element.unwrap_or_default();

        let (lookup, key) = match (contract.routing_style(), action.as_deref()) {
            (RoutingStyle::SoapAction, Some(action)) => {
                (contract.route_by_action(action), format!("the value of SOAPAction: {action}"))
            }
            (RoutingStyle::SoapAction, None) if version == SoapVersion::Soap11 => {
                let fault = SoapException::client(
                    version,
                    "Unable to handle request without a valid action parameter. Please supply a valid soap action.",
                );
                return ServerState::fault(version, fault, None);
            }
            _ => (
                contract.route_by_element(&element),
                format!("the request element: {element}"),
            ),
        };

        match lookup {
            RouteLookup::Found(method) => {
                info!(method = method.name(), %version, "Routed request");
                let call = ServerCall::new(Arc::clone(method), version, &request, action.unwrap_or_default());
                if call.method.one_way {
                    return self.dispatch_one_way(request, call);
                }
                ServerState::ReadingParameters {
                    request,
                    call: Box::new(call),
                }
            }
            RouteLookup::Ambiguous(names) => {
                warn!(?names, "Request matches several methods");
                let fault = SoapException::server(
                    version,
                    format!("Server found more than one method for {key}: {}.", names.join(", ")),
                );
                ServerState::fault(version, fault, None)
            }
            RouteLookup::NotFound => {
                let mut fault = SoapException::client(version, format!("Server did not recognize {key}."));
                if version == SoapVersion::Soap12 {
                    fault = fault.with_sub_code(SoapFaultSubCode::new(QualifiedName::new(
                        codes::RPC_PROCEDURE_NOT_PRESENT,
                        codes::RPC_NAMESPACE,
                    )));
                }
                ServerState::fault(version, fault, None)
            }
        }
    }

    /// Acknowledges a one-way call at once and serves it on its own thread.
    fn dispatch_one_way(&self, request: HttpRequest, mut call: ServerCall) -> ServerState {
        let service = Arc::clone(&self.protocol.service);
        let version = call.version();
        let method = call.method.name().to_owned();

        one_way::dispatch(method, version, Arc::clone(&self.protocol.trap), move || {
            let mut invocation = call.read_request(request, false)?;
            call.invoke(service.as_ref(), &mut invocation).map(drop)
        });
        ServerState::Done(HttpResponse::new(StatusCode::ACCEPTED))
    }

    fn write_fault(&self, version: SoapVersion, fault: SoapException, call: Option<Box<ServerCall>>) -> HttpResponse {
        warn!(%version, code = %fault.code, message = %fault.message, "Answering with a fault");
        let settings = &self.protocol.settings;
        let written = match call {
            Some(mut call) => call.write_fault(fault, settings),
            None => bare_fault(version, &fault, settings),
        };
        written.unwrap_or_else(|err| {
            error!(%err, "Could not write the fault");
            HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR).with_text(&err.to_string())
        })
    }
}

/// A request that never became an envelope: 1.1 answers at the HTTP level, 1.2 with a Sender fault.
fn unreadable(version: SoapVersion, reason: &str) -> ServerState {
    warn!(%version, reason, "Unreadable request");
    match version {
        SoapVersion::Soap11 => ServerState::Done(HttpResponse::new(StatusCode::BAD_REQUEST).with_text(reason)),
        SoapVersion::Soap12 => ServerState::fault(
            version,
            SoapException::client(version, format!("Unable to read the request: {reason}")),
            None,
        ),
    }
}

fn bare_fault(version: SoapVersion, fault: &SoapException, settings: &ProtocolSettings) -> Result<HttpResponse> {
    let headers = not_understood_headers(version, &fault.not_understood);
    let body = settings.fault_codec(version).encode(fault);
    let bytes = EnvelopeWriter::new(version).write(headers, vec![body], &settings.charset)?;
    let content_type = ContentType::for_envelope(version, &settings.charset, None).to_string();
    HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR).with_body(&content_type, bytes)
}

/// Everything that belongs to one routed call.
#[derive(Debug)]
struct ServerCall {
    method: Arc<SoapMethodContract>,
    message: SoapMessage,
    chain: ExtensionChain,
}

impl ServerCall {
    fn new(method: Arc<SoapMethodContract>, version: SoapVersion, request: &HttpRequest, action: String) -> Self {
        let mut message = SoapMessage::new(MessageSide::Server, version);
        message.set_method(Arc::clone(&method));
        message.set_url(request.url.as_str());
        message.set_action(action);
        let chain = ExtensionChain::new(&method);
        Self { method, message, chain }
    }

    fn version(&self) -> SoapVersion {
        self.message.version()
    }

    fn run_stage(&mut self, stage: SoapMessageStage, throw: bool) -> std::result::Result<(), SoapException> {
        let version = self.version();
        self.chain
            .run(&mut self.message, stage, throw)
            .map_err(|err| fault_for(err, version))?;
        // Without `throw` the stage still fails the call once every extension had its turn.
        match self.message.exception() {
            Some(fault) if !throw => Err(fault.clone()),
            _ => Ok(()),
        }
    }

    /// Runs the deserialize stages and reads the headers and parameters.
    fn read_request(
        &mut self,
        request: HttpRequest,
        throw: bool,
    ) -> std::result::Result<MethodInvocation, SoapException> {
        let version = self.version();
        let method = Arc::clone(&self.method);

        let content_type = request
            .header(CONTENT_TYPE.as_str())
            .map_or_else(|| version.media_type().to_owned(), str::to_owned);
        let encoding = request.header(CONTENT_ENCODING.as_str()).map(str::to_owned);
        self.message.init_content_type(content_type, encoding);
        let stream = self.chain.init_stream_chain(MessageStream::from_bytes(request.body));
        self.message.set_stream(stream);
        self.run_stage(SoapMessageStage::BeforeDeserialize, throw)?;

        let bytes = self.message.stream().to_vec();
        let content_type = ContentType::parse(self.message.committed_content_type());
        let text =
            charset::decode(&bytes, content_type.effective_charset()).map_err(|err| fault_for(err, version))?;
        let document = parse(&text).map_err(|err| fault_for(err.into(), version))?;
        let envelope = Envelope::from_document(&document).map_err(|err| fault_for(err, version))?;

        let headers = read_headers(&envelope, &method.in_header_bindings, &method.in_header_mapping)
            .map_err(|err| fault_for(err, version))?;
        // 1.1 reports header faults before looking at the body, 1.2 after.
        if version == SoapVersion::Soap11 {
            check_required(&method.in_header_bindings, &headers, version)?;
        }
        let parameters =
            read_body(&envelope, &method.request_mapping).map_err(|err| fault_for(err, version))?;
        if version == SoapVersion::Soap12 {
            check_required(&method.in_header_bindings, &headers, version)?;
        }

        *self.message.headers_mut() = headers;
        self.message.set_in_values(parameters.clone());
        self.run_stage(SoapMessageStage::AfterDeserialize, throw)?;

        if method.unknown_header_binding().is_none() {
            check_understood(self.message.headers(), version)?;
        }

        Ok(MethodInvocation {
            method,
            parameters,
            in_headers: self.message.headers().clone(),
            out_headers: SoapHeaderCollection::new(),
        })
    }

    /// Calls the service. On failure the message keeps the headers the service set
    /// so far, for the fault.
    fn invoke(
        &mut self,
        service: &dyn SoapService,
        invocation: &mut MethodInvocation,
    ) -> std::result::Result<MethodOutcome, SoapException> {
        let version = self.version();
        debug!(method = self.method.name(), "Invoking method");
        let result = service.invoke(invocation);
        let mut out_headers = mem::take(&mut invocation.out_headers);
        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                *self.message.headers_mut() = out_headers;
                return Err(fault_from_service_error(err, version));
            }
        };

        // A method taking unknown headers had its chance to mark them.
        let understood = match self.method.unknown_header_binding() {
            Some(_) => check_understood(&invocation.in_headers, version),
            None => Ok(()),
        };
        if let Err(fault) = understood {
            *self.message.headers_mut() = out_headers;
            return Err(fault);
        }
        out_headers.extend(mem::take(&mut outcome.out_headers));
        outcome.out_headers = out_headers;
        Ok(outcome)
    }

    fn write_response(
        &mut self,
        outcome: MethodOutcome,
        settings: &ProtocolSettings,
    ) -> std::result::Result<HttpResponse, SoapException> {
        let version = self.version();
        let method = Arc::clone(&self.method);
        let fault = |err: SoapError| fault_for(err, version);

        let (values, out_headers) = outcome.into_values(method.method.return_type().is_some());
        self.message.set_out_values(values.clone());
        *self.message.headers_mut() = out_headers;
        let content_type = ContentType::for_envelope(version, &settings.charset, None).to_string();
        self.message.init_content_type(content_type, None);
        self.run_stage(SoapMessageStage::BeforeSerialize, true)?;

        let headers = write_headers(
            self.message.headers(),
            &method.out_header_bindings,
            &method.out_header_mapping,
            HeaderDirection::OUT,
            version,
        )
        .map_err(fault)?;
        let body = method.response_mapping.serialize(&values, version).map_err(fault)?;
        let charset = self.outgoing_charset(settings);
        let bytes = EnvelopeWriter::new(version)
            .write(headers, body, &charset)
            .map_err(fault)?;

        let base = MessageStream::new();
        let mut stream = self.chain.init_stream_chain(base.clone());
        stream.write_all(&bytes).map_err(|err| fault(err.into()))?;
        self.message.set_stream(stream);
        self.run_stage(SoapMessageStage::AfterSerialize, true)?;

        self.response(StatusCode::OK, base.to_vec()).map_err(fault)
    }

    /// Writes `fault` with the FAULT headers, giving extensions a best-effort look.
    fn write_fault(&mut self, fault: SoapException, settings: &ProtocolSettings) -> Result<HttpResponse> {
        let version = self.version();
        let method = Arc::clone(&self.method);

        self.message.set_exception(fault);
        let content_type = ContentType::for_envelope(version, &settings.charset, None).to_string();
        self.message.init_content_type(content_type, None);
        // Fails when the fault came out of the serialize stages; extensions are skipped then.
        let staged = self
            .chain
            .run(&mut self.message, SoapMessageStage::BeforeSerialize, false)
            .inspect_err(|err| debug!(%err, "Extensions skipped for the fault"))
            .is_ok();

        let fault = self
            .message
            .exception()
            .cloned()
            .unwrap_or_else(|| SoapException::server(version, "fault lost by an extension"));
        let mut headers = not_understood_headers(version, &fault.not_understood);
        match write_headers(
            self.message.headers(),
            &method.out_header_bindings,
            &method.out_header_mapping,
            HeaderDirection::FAULT,
            version,
        ) {
            Ok(bound) => headers.extend(bound),
            Err(err) => warn!(%err, "Fault headers dropped"),
        }
        let body = settings.fault_codec(version).encode(&fault);
        let charset = self.outgoing_charset(settings);
        let mut bytes = EnvelopeWriter::new(version).write(headers, vec![body], &charset)?;

        if staged {
            let base = MessageStream::new();
            let mut stream = self.chain.init_stream_chain(base.clone());
            stream.write_all(&bytes)?;
            self.message.set_stream(stream);
            if let Err(err) = self.chain.run(&mut self.message, SoapMessageStage::AfterSerialize, false) {
                debug!(%err, "Extensions skipped after the fault");
            }
            bytes = base.to_vec();
        }

        self.response(StatusCode::INTERNAL_SERVER_ERROR, bytes)
    }

    /// The charset the committed content type names; extensions may have relabelled it.
    fn outgoing_charset(&self, settings: &ProtocolSettings) -> String {
        ContentType::parse(self.message.committed_content_type())
            .charset()
            .unwrap_or(&settings.charset)
            .to_owned()
    }

    fn response(&self, status: StatusCode, body: Vec<u8>) -> Result<HttpResponse> {
        let response = HttpResponse::new(status).with_body(self.message.committed_content_type(), body)?;
        match self.message.committed_content_encoding() {
            Some(encoding) => response.with_header(CONTENT_ENCODING, encoding),
            None => Ok(response),
        }
    }
}
