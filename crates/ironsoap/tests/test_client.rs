mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use common::*;
use hyper::StatusCode;
use ironsoap::{
    ClientConfig, ClientProtocol, FaultKind, HttpRequest, HttpResponse, HttpTransport, MethodDescriptor,
    MethodInvocation, MethodOutcome, ServerProtocol, ServiceDescription, SoapError, SoapHeader,
    SoapHeaderCollection, SoapProtocolVersion, Value,
    client::CallId,
    contract::{HeaderAttribute, HeaderDirection, MethodAttribute},
    serializer::XmlTypeCode,
};
use ironsoap_xml::QualifiedName;
use parking_lot::Mutex;

fn loopback_client(name: &str, version: SoapProtocolVersion) -> ClientProtocol {
    let server = ServerProtocol::new(&calculator(name), calculator_service).unwrap();
    ClientProtocol::new(
        ClientConfig::builder().url(URL).version(version).build(),
        &calculator(name),
        LoopbackTransport::new(server),
    )
    .unwrap()
}

fn threaded_client(name: &str) -> ClientProtocol {
    let server = ServerProtocol::new(&calculator(name), calculator_service).unwrap();
    ClientProtocol::new(
        ClientConfig::builder().url(URL).build(),
        &calculator(name),
        ThreadedTransport {
            inner: LoopbackTransport::new(server),
        },
    )
    .unwrap()
}

/// Answers every request with a fixed response.
struct CannedTransport(HttpResponse);

impl HttpTransport for CannedTransport {
    fn send(&self, _call: CallId, _request: HttpRequest) -> Result<HttpResponse, SoapError> {
        Ok(self.0.clone())
    }
}

/// Never answers; remembers aborts.
#[derive(Default, Clone)]
struct HangingTransport {
    aborted: Arc<Mutex<Vec<CallId>>>,
}

impl HttpTransport for HangingTransport {
    fn send(&self, _call: CallId, _request: HttpRequest) -> Result<HttpResponse, SoapError> {
        Err(SoapError::Transport("the server never answers".to_owned()))
    }

    fn begin_send(
        &self,
        _call: CallId,
        _request: HttpRequest,
        _on_done: Box<dyn FnOnce(Result<HttpResponse, SoapError>) + Send>,
    ) {
    }

    fn abort(&self, call: CallId) {
        self.aborted.lock().push(call);
    }
}

/// Answers even calls inline and odd calls from a worker thread.
struct MixedTransport {
    inner: LoopbackTransport,
}

impl HttpTransport for MixedTransport {
    fn send(&self, call: CallId, request: HttpRequest) -> Result<HttpResponse, SoapError> {
        self.inner.send(call, request)
    }

    fn begin_send(
        &self,
        call: CallId,
        request: HttpRequest,
        on_done: Box<dyn FnOnce(Result<HttpResponse, SoapError>) + Send>,
    ) {
        if call.0 % 2 == 0 {
            on_done(self.inner.send(call, request));
        } else {
            let inner = self.inner.clone();
            thread::spawn(move || on_done(inner.send(call, request)));
        }
    }
}

fn wait_for_callback(fired: &AtomicUsize) -> usize {
    // The outcome is published before the callback runs on the completing thread.
    let deadline = Instant::now() + Duration::from_secs(5);
    while fired.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::yield_now();
    }
    fired.load(Ordering::SeqCst)
}

fn canned_client(name: &str, response: HttpResponse) -> ClientProtocol {
    ClientProtocol::new(
        ClientConfig::builder().url(URL).build(),
        &calculator(name),
        CannedTransport(response),
    )
    .unwrap()
}

fn add_args(a: i64, b: i64) -> Vec<Value> {
    vec![Value::from(a), Value::from(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_add() {
        let client = loopback_client("ClientAdd", SoapProtocolVersion::Default);
        let result = client.invoke("Add", add_args(2, 3), SoapHeaderCollection::new()).unwrap();

        assert_eq!(result.return_value, Some(Value::Int(5)));
        assert!(result.out_values.is_empty());
    }

    #[test]
    fn test_invoke_divide_returns_out_values() {
        let client = loopback_client("ClientDivide", SoapProtocolVersion::Default);
        let result = client.invoke("Divide", add_args(7, 2), SoapHeaderCollection::new()).unwrap();

        assert_eq!(result.return_value, Some(Value::Int(3)));
        assert_eq!(result.out_values, [Value::Int(1)]);
    }

    #[test]
    fn test_server_fault_surfaces_as_an_error() {
        let client = loopback_client("ClientFault", SoapProtocolVersion::Default);
        let err = client
            .invoke("Divide", add_args(7, 0), SoapHeaderCollection::new())
            .unwrap_err();

        let fault = err.as_fault().expect("a SOAP fault");
        assert_eq!(fault.kind(), Some(FaultKind::Sender));
        assert_eq!(fault.message, "b must not be zero");
    }

    #[test]
    fn test_soap12_client() {
        let client = loopback_client("ClientSoap12", SoapProtocolVersion::Soap12);
        assert_eq!(client.version(), ironsoap::SoapVersion::Soap12);

        let result = client.invoke("Add", add_args(20, 22), SoapHeaderCollection::new()).unwrap();
        assert_eq!(result.return_value, Some(Value::Int(42)));

        let err = client
            .invoke("Divide", add_args(1, 0), SoapHeaderCollection::new())
            .unwrap_err();
        assert_eq!(err.as_fault().unwrap().code.name(), "Sender");
    }

    #[test]
    fn test_wrong_parameter_count_is_refused_before_sending() {
        let client = loopback_client("ClientParameterCount", SoapProtocolVersion::Default);
        let err = client
            .invoke("Add", vec![Value::from(1)], SoapHeaderCollection::new())
            .unwrap_err();
        assert!(matches!(err, SoapError::InvalidOperation(_)), "{err}");
    }

    #[test]
    fn test_unknown_method_name() {
        let client = loopback_client("ClientUnknownMethod", SoapProtocolVersion::Default);
        let err = client.invoke("Multiply", add_args(1, 2), SoapHeaderCollection::new()).unwrap_err();
        assert!(matches!(err, SoapError::Routing(_)), "{err}");
    }

    #[test]
    fn test_unexpected_http_status() {
        let client = canned_client(
            "ClientNotFound",
            HttpResponse::new(StatusCode::NOT_FOUND).with_text("no such endpoint"),
        );
        match client.invoke("Add", add_args(1, 2), SoapHeaderCollection::new()) {
            Err(SoapError::HttpStatus { status, body }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "no such endpoint");
            }
            other => panic!("expected an HTTP status error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_soap_success_response_is_invalid() {
        let client = canned_client(
            "ClientNotSoap",
            HttpResponse::new(StatusCode::OK).with_text("<html>maintenance</html>"),
        );
        let err = client.invoke("Add", add_args(1, 2), SoapHeaderCollection::new()).unwrap_err();
        match err {
            SoapError::InvalidResponse(message) => assert!(message.contains("maintenance")),
            other => panic!("expected an invalid response, got {other:?}"),
        }
    }

    #[test]
    fn test_out_headers_reach_the_caller() {
        let receipt = QualifiedName::new("Receipt", APP);
        let method = MethodDescriptor::builder()
            .name("Stamp")
            .declaring_type("ClientOutHeaders")
            .return_type(XmlTypeCode::Int)
            .attributes(vec![MethodAttribute::Header(
                HeaderAttribute::builder()
                    .member_name("Receipt")
                    .element(receipt.clone())
                    .type_code(XmlTypeCode::Int)
                    .direction(HeaderDirection::OUT)
                    .required(false)
                    .build(),
            )])
            .build();
        let description = ServiceDescription::builder()
            .name("ClientOutHeaders")
            .methods(vec![method.into()])
            .build();

        let stamp = {
            let receipt = receipt.clone();
            move |_: &mut MethodInvocation| -> anyhow::Result<MethodOutcome> {
                Ok(MethodOutcome::returning(1).with_header(SoapHeader::known(receipt.clone(), 99)))
            }
        };
        let server = ServerProtocol::new(&description, stamp).unwrap();
        let client = ClientProtocol::new(
            ClientConfig::builder().url(URL).build(),
            &description,
            LoopbackTransport::new(server),
        )
        .unwrap();

        let result = client.invoke("Stamp", Vec::new(), SoapHeaderCollection::new()).unwrap();
        assert_eq!(result.return_value, Some(Value::Int(1)));
        let header = result.out_headers.get(&receipt).expect("the Receipt header");
        assert_eq!(header.known_value(), Some(&Value::Int(99)));
    }

    #[test]
    fn test_begin_invoke_over_a_synchronous_transport() {
        let client = loopback_client("ClientBeginSync", SoapProtocolVersion::Default);
        let fired = Arc::new(AtomicUsize::new(0));
        let pending = client
            .begin_invoke(
                "Add",
                add_args(2, 3),
                SoapHeaderCollection::new(),
                Some(counting_callback(Arc::clone(&fired))),
            )
            .unwrap();

        assert!(pending.is_completed());
        assert!(pending.completed_synchronously());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let result = client.end_invoke(&pending).unwrap();
        assert_eq!(result.return_value, Some(Value::Int(5)));
        assert!(matches!(client.end_invoke(&pending), Err(SoapError::InvalidOperation(_))));
    }

    #[test]
    fn test_end_invoke_waits_for_a_threaded_transport() {
        let client = threaded_client("ClientBeginThreaded");
        let pending = client
            .begin_invoke("Divide", add_args(9, 4), SoapHeaderCollection::new(), None)
            .unwrap();

        let result = pending.end_invoke().unwrap();
        assert_eq!(result.return_value, Some(Value::Int(2)));
        assert_eq!(result.out_values, [Value::Int(1)]);
        assert!(pending.is_completed());
    }

    #[test]
    fn test_abort_racing_completion_fires_the_callback_once() {
        let client = threaded_client("ClientAbortRace");
        for _ in 0..200 {
            let fired = Arc::new(AtomicUsize::new(0));
            let pending = client
                .begin_invoke(
                    "Add",
                    add_args(1, 1),
                    SoapHeaderCollection::new(),
                    Some(counting_callback(Arc::clone(&fired))),
                )
                .unwrap();
            client.abort(&pending);

            match pending.end_invoke() {
                Ok(result) => assert_eq!(result.return_value, Some(Value::Int(2))),
                Err(err) => assert!(matches!(err, SoapError::Aborted), "{err}"),
            }
            assert_eq!(wait_for_callback(&fired), 1);
        }
    }

    #[test]
    fn test_concurrent_inline_and_threaded_completions() {
        let name = "ClientMixedCompletions";
        let server = ServerProtocol::new(&calculator(name), calculator_service).unwrap();
        let client = Arc::new(
            ClientProtocol::new(
                ClientConfig::builder().url(URL).build(),
                &calculator(name),
                MixedTransport {
                    inner: LoopbackTransport::new(server),
                },
            )
            .unwrap(),
        );

        let workers: Vec<_> = (0..8_i64)
            .map(|worker| {
                let client = Arc::clone(&client);
                thread::spawn(move || {
                    for round in 0..25_i64 {
                        let fired = Arc::new(AtomicUsize::new(0));
                        let pending = client
                            .begin_invoke(
                                "Add",
                                add_args(worker, round),
                                SoapHeaderCollection::new(),
                                Some(counting_callback(Arc::clone(&fired))),
                            )
                            .unwrap();
                        let inline = pending.id().0 % 2 == 0;
                        assert_eq!(pending.completed_synchronously(), inline, "{pending:?}");

                        let result = client.end_invoke(&pending).unwrap();
                        assert_eq!(result.return_value, Some(Value::Int(worker + round)));
                        assert_eq!(wait_for_callback(&fired), 1, "{pending:?}");
                        assert_eq!(pending.completed_synchronously(), inline, "{pending:?}");
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[test]
    fn test_abort_of_a_hanging_call() {
        let transport = HangingTransport::default();
        let aborted = Arc::clone(&transport.aborted);
        let client = ClientProtocol::new(
            ClientConfig::builder().url(URL).build(),
            &calculator("ClientHanging"),
            transport,
        )
        .unwrap();

        let pending = client
            .begin_invoke("Add", add_args(1, 2), SoapHeaderCollection::new(), None)
            .unwrap();
        assert!(!pending.is_completed());
        assert!(!pending.completed_synchronously());

        client.abort(&pending);
        assert!(matches!(pending.end_invoke(), Err(SoapError::Aborted)));
        assert_eq!(*aborted.lock(), [pending.id()]);

        // A second abort is a no-op.
        client.abort(&pending);
        assert_eq!(aborted.lock().len(), 1);
    }

    #[test]
    fn test_invoke_async() {
        let client = loopback_client("ClientAsync", SoapProtocolVersion::Default);
        let result = futures::executor::block_on(client.invoke_async(
            "Add",
            add_args(4, 5),
            SoapHeaderCollection::new(),
        ))
        .unwrap();
        assert_eq!(result.return_value, Some(Value::Int(9)));

        let threaded = threaded_client("ClientAsyncThreaded");
        let err = futures::executor::block_on(threaded.invoke_async(
            "Divide",
            add_args(4, 0),
            SoapHeaderCollection::new(),
        ))
        .unwrap_err();
        assert!(err.as_fault().is_some());
    }
}
