//! WebSocket front door. The request path names the port (`/bes`,
//! `/bes-download`); text frames carry one JSON message each. Only
//! allowlisted `Origin`s get past the handshake.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, header::ORIGIN};
use tracing::{debug, info, warn};

use crate::metrics::counters::Counters;
use crate::port::{PortHandle, port_pair};
use crate::router::PortRouter;

/// Pause after a failed `accept` (EMFILE and friends) before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub async fn serve(listener: TcpListener, router: Arc<PortRouter>) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "Listening for extension connections");

    accept_loop(|| listener.accept(), router).await
}

async fn accept_loop<A, F>(mut accept: A, router: Arc<PortRouter>) -> anyhow::Result<()>
where
    A: FnMut() -> F,
    F: Future<Output = io::Result<(TcpStream, SocketAddr)>>,
{
    loop {
        let (stream, peer) = match accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(component = "server", error = %e, "Accept failed; retrying");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let router = router.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, router).await {
                warn!(%peer, error = ?e, "Connection ended with error");
            }
        });
    }
}

/// True when `origin` is listed, or matches a `scheme://*.domain` entry.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    let origin = origin.trim_end_matches('/');

    allowed.iter().any(|entry| match entry.split_once("://*.") {
        Some((scheme, domain)) => origin
            .strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix("://"))
            .and_then(|host| host.strip_suffix(domain))
            .and_then(|sub| sub.strip_suffix('.'))
            .is_some_and(|sub| {
                !sub.is_empty()
                    && sub
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            }),
        None => entry.eq_ignore_ascii_case(origin),
    })
}

fn forbidden() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("origin not allowed".to_string()));
    *resp.status_mut() = StatusCode::FORBIDDEN;
    resp
}

async fn handle_connection(stream: TcpStream, router: Arc<PortRouter>) -> anyhow::Result<()> {
    let services = router.services();
    let mut path = String::new();
    let mut refused: Option<String> = None;

    let callback = |req: &Request, resp: Response| {
        let origin = req.headers().get(ORIGIN).and_then(|v| v.to_str().ok());
        if !origin.is_some_and(|o| origin_allowed(o, &services.config.allowed_origins)) {
            refused = Some(origin.unwrap_or("<none>").to_string());
            return Err(forbidden());
        }
        path = req.uri().path().to_string();
        Ok(resp)
    };

    let handshake = tokio_tungstenite::accept_hdr_async(stream, callback).await;
    if let Some(origin) = refused {
        Counters::bump(&services.counters.origins_rejected);
        warn!(
            component = "server",
            event = "origin_rejected",
            %origin,
            "Refusing handshake from unexpected origin"
        );
        return Ok(());
    }
    let mut ws = handshake.context("websocket handshake failed")?;

    let name = path.trim_start_matches('/').to_string();
    let capacity = router.services().config.port_queue_capacity;
    let (port, handle) = port_pair(name, capacity);

    if router.accept(port).await.is_none() {
        ws.close(None).await.ok();
        return Ok(());
    }

    bridge(ws, handle).await
}

/// Pumps frames between the socket and the port until either side ends.
async fn bridge(ws: WebSocketStream<TcpStream>, handle: PortHandle) -> anyhow::Result<()> {
    let (mut sink, mut stream) = ws.split();
    let PortHandle { id, tx, mut rx } = handle;

    let writer = async move {
        while let Some(value) = rx.recv().await {
            let text = serde_json::to_string(&value)?;
            sink.send(Message::Text(text.into())).await?;
        }
        sink.close().await.ok();
        anyhow::Ok(())
    };

    let reader = async move {
        while let Some(frame) = stream.next().await {
            match frame? {
                Message::Text(text) => match serde_json::from_str::<Value>(text.as_str()) {
                    Ok(value) => {
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping non-JSON frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        anyhow::Ok(())
    };

    let result = tokio::select! {
        r = reader => r,
        w = writer => w,
    };
    debug!(%id, "Connection closed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::router::Services;
    use bclient::BandcampClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tracing_test::traced_test;

    fn allowlist() -> Vec<String> {
        AppConfig::default().allowed_origins
    }

    #[test]
    fn listed_origins_are_allowed() {
        let allowed = allowlist();
        assert!(origin_allowed("https://bandcamp.com", &allowed));
        assert!(origin_allowed("https://halfpastvibe.bandcamp.com", &allowed));
        assert!(origin_allowed("https://a.b.bandcamp.com/", &allowed));

        let ext = vec!["chrome-extension://abcdef".to_string()];
        assert!(origin_allowed("chrome-extension://abcdef", &ext));
        assert!(!origin_allowed("chrome-extension://other", &ext));
    }

    #[test]
    fn lookalike_origins_are_refused() {
        let allowed = allowlist();
        assert!(!origin_allowed("https://evil.example", &allowed));
        assert!(!origin_allowed("https://evilbandcamp.com", &allowed));
        assert!(!origin_allowed("http://bandcamp.com", &allowed));
        assert!(!origin_allowed("http://x.bandcamp.com", &allowed));
        assert!(!origin_allowed("https://.bandcamp.com", &allowed));
        assert!(!origin_allowed("https://bandcamp.com.evil.example", &allowed));
        assert!(!origin_allowed("null", &allowed));
    }

    #[tokio::test]
    #[traced_test]
    async fn accept_errors_do_not_stop_the_server() {
        // Never contacted: the handshake alone is under test.
        let client = Arc::new(
            BandcampClient::new("http://127.0.0.1:9".into(), Duration::from_secs(1), None)
                .unwrap(),
        );
        let router = PortRouter::new(Services::new(client.clone(), client, AppConfig::default()));

        let listener = Arc::new(TcpListener::bind("127.0.0.1:0").await.unwrap());
        let addr = listener.local_addr().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));

        let accept = {
            let attempts = attempts.clone();
            move || {
                let listener = listener.clone();
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(io::Error::from(io::ErrorKind::ConnectionAborted));
                    }
                    listener.accept().await
                }
            }
        };
        tokio::spawn(accept_loop(accept, router));

        let mut req = format!("ws://{addr}/bes").into_client_request().unwrap();
        req.headers_mut()
            .insert(ORIGIN, HeaderValue::from_static("https://bandcamp.com"));
        let (_ws, resp) = tokio_tungstenite::connect_async(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert!(logs_contain("Accept failed; retrying"));
    }
}
