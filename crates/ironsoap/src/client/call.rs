use std::{io::Write, sync::Arc};

use hyper::{
    StatusCode,
    header::{CONTENT_ENCODING, CONTENT_TYPE},
};
use ironsoap_xml::parser::parse;
use tracing::{debug, instrument, warn};

use super::ClientResult;
use crate::{
    Result, SoapError,
    binding::{check_understood, read_body, read_headers, write_headers},
    charset,
    config::ProtocolSettings,
    content_type::ContentType,
    contract::{HeaderDirection, SoapMethodContract},
    envelope::{Envelope, EnvelopeWriter},
    extension::{ExtensionChain, MessageStream},
    header::SoapHeaderCollection,
    http::{HttpRequest, HttpResponse},
    message::{MessageSide, SoapMessage, SoapMessageStage},
    serializer::Value,
    version::SoapVersion,
};

/// One outgoing call, from request serialization to response reading.
#[derive(Debug)]
pub(crate) struct ClientCall {
    method: Arc<SoapMethodContract>,
    message: SoapMessage,
    chain: ExtensionChain,
    settings: ProtocolSettings,
}

impl ClientCall {
    pub(crate) fn new(method: Arc<SoapMethodContract>, url: &str, settings: ProtocolSettings) -> Self {
        let mut message = SoapMessage::new(MessageSide::Client, method.version);
        message.set_method(Arc::clone(&method));
        message.set_url(url);
        message.set_action(method.action.as_str());
        let chain = ExtensionChain::new(&method);
        Self {
            method,
            message,
            chain,
            settings,
        }
    }

    #[instrument(skip_all, fields(method = self.method.name()))]
    pub(crate) fn write_request(
        &mut self,
        parameters: Vec<Value>,
        headers: SoapHeaderCollection,
    ) -> Result<HttpRequest> {
        let method = Arc::clone(&self.method);
        let version = method.version;
        let expected = method.request_mapping.len();
        if parameters.len() != expected {
            return Err(SoapError::invalid_operation(format!(
                "{} takes {expected} parameters, {} given",
                method.name(),
                parameters.len()
            )));
        }

        self.message.set_in_values(parameters);
        *self.message.headers_mut() = headers;
        let content_type =
            ContentType::for_envelope(version, &self.settings.charset, Some(method.action.as_str())).to_string();
        self.message.init_content_type(content_type, None);
        self.chain.run(&mut self.message, SoapMessageStage::BeforeSerialize, true)?;

        let header_elements = write_headers(
            self.message.headers(),
            &method.in_header_bindings,
            &method.in_header_mapping,
            HeaderDirection::IN,
            version,
        )?;
        let body = method.request_mapping.serialize(self.message.in_values(), version)?;
        let charset = ContentType::parse(self.message.committed_content_type())
            .charset()
            .unwrap_or(&self.settings.charset)
            .to_owned();
        let bytes = EnvelopeWriter::new(version).write(header_elements, body, &charset)?;

        let base = MessageStream::new();
        let mut stream = self.chain.init_stream_chain(base.clone());
        stream.write_all(&bytes)?;
        self.message.set_stream(stream);
        self.chain.run(&mut self.message, SoapMessageStage::AfterSerialize, true)?;

        let mut request = HttpRequest::post(self.message.url(), base.to_vec())
            .with_header(CONTENT_TYPE, self.message.committed_content_type())?;
        if let Some(encoding) = self.message.committed_content_encoding() {
            request = request.with_header(CONTENT_ENCODING, encoding)?;
        }
        if version == SoapVersion::Soap11 {
            request.set_soap_action(&method.action)?;
        }
        debug!(url = %request.url, bytes = request.body.len(), "Request ready");
        Ok(request)
    }

    #[instrument(skip_all, fields(method = self.method.name(), status = %response.status))]
    pub(crate) fn read_response(mut self, response: HttpResponse) -> Result<ClientResult> {
        let method = Arc::clone(&self.method);
        let status = response.status;

        if method.one_way && status.is_success() {
            debug!("One-way call accepted");
            return Ok(ClientResult::default());
        }
        if status.as_u16() >= 300
            && status != StatusCode::INTERNAL_SERVER_ERROR
            && status != StatusCode::BAD_REQUEST
        {
            return Err(SoapError::HttpStatus {
                status,
                body: response.body_text(),
            });
        }

        let Some(content_type) = response.content_type().filter(ContentType::is_soap) else {
            return Err(SoapError::InvalidResponse(
                format!(
                    "expected a SOAP envelope but got {} ({status}): {}",
                    response.header(CONTENT_TYPE.as_str()).unwrap_or("no content type"),
                    response.body_text()
                )
                .into(),
            ));
        };

        let encoding = response.header(CONTENT_ENCODING.as_str()).map(str::to_owned);
        self.message.init_content_type(content_type.to_string(), encoding);
        let stream = self.chain.init_stream_chain(MessageStream::from_bytes(response.body));
        self.message.set_stream(stream);
        self.chain.run(&mut self.message, SoapMessageStage::BeforeDeserialize, true)?;

        let bytes = self.message.stream().to_vec();
        let content_type = ContentType::parse(self.message.committed_content_type());
        let text = charset::decode(&bytes, content_type.effective_charset())
            .map_err(|err| SoapError::InvalidResponse(format!("unreadable response body: {err}").into()))?;
        let document = parse(&text)?;
        let envelope = Envelope::from_document(&document)?;
        let version = envelope.version();
        if version != self.message.version() {
            warn!(sent = %self.message.version(), received = %version, "Response uses another SOAP version");
        }

        let headers = read_headers(&envelope, &method.out_header_bindings, &method.out_header_mapping)?;
        *self.message.headers_mut() = headers;

        if let Some(fault) = envelope.fault() {
            let fault = self.settings.fault_codec(version).decode(fault)?;
            warn!(code = %fault.code, message = %fault.message, "Server answered with a fault");
            self.message.set_exception(fault.clone());
            if let Err(err) = self.chain.run(&mut self.message, SoapMessageStage::AfterDeserialize, false) {
                debug!(%err, "Extensions skipped for the fault");
            }
            return Err(SoapError::from(fault));
        }

        let mut values = read_body(&envelope, &method.response_mapping)?;
        self.message.set_out_values(values.clone());
        self.chain.run(&mut self.message, SoapMessageStage::AfterDeserialize, true)?;
        check_understood(self.message.headers(), version)?;

        let return_value = if method.method.return_type().is_some() && !values.is_empty() {
            Some(values.remove(0))
        } else {
            None
        };
        Ok(ClientResult {
            return_value,
            out_values: values,
            out_headers: self.message.headers().clone(),
        })
    }
}
