use {
    std::{convert::Infallible, pin::Pin, sync::{Arc, atomic::{AtomicU64, Ordering}}},
    tracing::{info, warn, error, info_span},
    tokio::{net::TcpListener, sync::oneshot},
    hyper::{Response, StatusCode, body::Bytes, server::conn::http1},
    hyper_util::rt::tokio::{TokioIo, TokioTimer},
    http_body_util::Full,
    rayon::ThreadPool,
    visitor_counter_core::{HttpResponse, InvocationEvent, InvocationContext},
    crate::service::CounterService,
};

/// Every request that reaches this handler is one invocation of the counter function.
#[derive(Clone)]
pub struct HttpHandler {
    service: Arc<CounterService>,
    thread_pool: Arc<ThreadPool>,
    invocations: Arc<AtomicU64>,
}

impl HttpHandler {
    pub fn new(service: Arc<CounterService>, thread_pool: Arc<ThreadPool>) -> Self {
        Self {
            service,
            thread_pool,
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl hyper::service::Service<hyper::Request<hyper::body::Incoming>> for HttpHandler {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: hyper::Request<hyper::body::Incoming>) -> Self::Future {
        let (tx, rx) = oneshot::channel();
        let service = self.service.clone();
        let event = InvocationEvent::new()
            .with_method(req.method().clone())
            .with_url(req.uri().clone());
        let context = InvocationContext::new(self.invocations.fetch_add(1, Ordering::Relaxed));

        self.thread_pool.spawn(move || {
            let span = info_span!("invocation", id = context.invocation_id, method = %event.method, url = %event.url);
            let _entered = span.enter();

            let response = match service.handle(&event, &context) {
                Ok(v) => into_hyper_response(v),
                Err(err) => {
                    error!("invocation failed: {err}");
                    response_invocation_fault()
                },
            };

            // receiver is gone when the client disconnected before the invocation finished
            let _ = tx.send(response);
        });

        Box::pin(async move { Ok(rx.await.unwrap_or_else(|_| response_invocation_fault())) })
    }
}

pub async fn serve(listener: TcpListener, handler: HttpHandler) {
    match listener.local_addr() {
        Ok(addr) => info!("visitor counter is listening on {addr}"),
        Err(err) => warn!("failed to read listener address: {err:?}"),
    }

    loop {
        let (tcp, remote_addr) = match listener.accept().await {
            Ok(v) => v,
            Err(err) => {
                error!("failed to accept connection: {err:?}");
                continue;
            }
        };
        let io = TokioIo::new(tcp);

        let handler = handler.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, handler)
                .await
            {
                warn!("error while serving connection from {remote_addr}: {err:?}");
            }
        });
    }
}

fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut result = Response::new(Full::new(Bytes::from(response.body)));
    *result.status_mut() = response.status;
    *result.headers_mut() = response.headers;
    result
}

/// What the caller sees when the function itself failed: no envelope, no CORS headers.
fn response_invocation_fault() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from("visitor counter: invocation failed.\n")));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response
}
