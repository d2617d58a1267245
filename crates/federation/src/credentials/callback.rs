//! Loopback listener receiving the authorization code redirect.
//!
//! Listens on `127.0.0.1` (RFC 8252 section 7.3: servers accept any port for
//! the loopback IP literal). The first meaningful request fills a single
//! result slot; later requests are answered but never delivered.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header::CONTENT_TYPE},
    response::{Html, IntoResponse, Response},
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::AuthorizationError;

/// Interface the listener binds to.
pub const LOOPBACK_ADDRESS: [u8; 4] = [127, 0, 0, 1];

const SUCCESS_HTML: &str =
    "<html><title>Success</title><body>You can now close this browser window/tab.</body></html>";

/// How long a closing listener may take to finish in-flight responses.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type CallbackResult = Result<String, AuthorizationError>;

struct CallbackState {
    state: String,
    slot: Mutex<Option<oneshot::Sender<CallbackResult>>>,
}

impl CallbackState {
    /// Deliver a result unless one was already delivered.
    fn deliver(&self, result: CallbackResult) {
        let sender = self.slot.lock().ok().and_then(|mut slot| slot.take());
        match sender {
            Some(sender) => {
                let _ = sender.send(result);
            }
            None => debug!("Authorization callback already delivered, ignoring"),
        }
    }
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn error_page(error: &AuthorizationError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Html(format!(
            "<html><title>Error</title><body>{}</body></html>",
            html_escape(&error.to_string())
        )),
    )
        .into_response()
}

/// Query parameters, overridden by a form-encoded body (`response_mode=form_post`).
fn callback_params(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> HashMap<String, String> {
    let mut params: HashMap<String, String> =
        form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
            .into_owned()
            .collect();

    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        params.extend(form_urlencoded::parse(body).into_owned());
    }
    params
}

async fn handle_callback(
    State(callback): State<Arc<CallbackState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if uri.path() == "/favicon.ico" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let params = callback_params(&uri, &headers, &body);

    let param = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();

    let error = if !param("error").is_empty() {
        AuthorizationError::Provider {
            error: param("error").to_string(),
            description: param("error_description").to_string(),
        }
    } else if param("state") != callback.state {
        AuthorizationError::StateMismatch
    } else if !param("code").is_empty() {
        callback.deliver(Ok(param("code").to_string()));
        return Html(SUCCESS_HTML).into_response();
    } else {
        AuthorizationError::MissingCode
    };

    let page = error_page(&error);
    callback.deliver(Err(error));
    page
}

/// Running callback listener. Closed by [`CallbackSession::close`], or
/// aborted when dropped.
pub struct CallbackSession {
    addr: SocketAddr,
    result: oneshot::Receiver<CallbackResult>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackSession {
    /// Start listening on `127.0.0.1:<port>` for a redirect carrying `state`.
    pub async fn listen(port: u16, state: String) -> Result<Self, AuthorizationError> {
        let listener = TcpListener::bind(SocketAddr::from((LOOPBACK_ADDRESS, port))).await?;
        let addr = listener.local_addr()?;

        let (sender, result) = oneshot::channel();
        let callback = Arc::new(CallbackState {
            state,
            slot: Mutex::new(Some(sender)),
        });
        let app = Router::new()
            .fallback(handle_callback)
            .with_state(callback);

        let (shutdown, signal) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = signal.await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "Authorization callback listener failed");
            }
        });
        debug!(addr = %addr, "Listening for authorization callback");

        Ok(Self {
            addr,
            result,
            shutdown: Some(shutdown),
            server: Some(server),
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Redirect URL pointing at this listener.
    #[must_use]
    pub fn redirect_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for the callback, at most `timeout`.
    pub async fn wait(&mut self, timeout: Duration) -> CallbackResult {
        match tokio::time::timeout(timeout, &mut self.result).await {
            Err(_) => Err(AuthorizationError::Timeout),
            Ok(Err(_)) => Err(AuthorizationError::Cancelled),
            Ok(Ok(result)) => result,
        }
    }

    /// Stop the listener and release its port.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut server) = self.server.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut server).await.is_err() {
                server.abort();
                let _ = server.await;
            }
        }
        debug!(addr = %self.addr, "Closed authorization callback listener");
    }
}

impl Drop for CallbackSession {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}
