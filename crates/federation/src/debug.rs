//! Request/response dump transport.
//!
//! Writes every request that carries a body, together with the response it
//! got, to `<host><path>-<timestamp>-<sequence>.req` in a directory. Meant for
//! inspecting what a peer actually received.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Request, Response, header::HeaderMap};
use tracing::{debug, warn};

use crate::transport::{
    SharedTransport, Transport, TransportError, buffer_response, rebuild_response,
};

const BOUNDARY: &str = "\n\n====================\n\n";

/// Transport dumping exchanges to disk.
pub struct DumpTransport {
    base: SharedTransport,
    dir: PathBuf,
    sequence: AtomicU64,
}

/// Wrap `base` with a dump transport writing to `dir`.
///
/// Returns `base` itself when `dir` is unset or is not an existing directory.
#[must_use]
pub fn wrap(base: SharedTransport, dir: Option<&Path>) -> SharedTransport {
    match dir {
        Some(dir) if dir.is_dir() => Arc::new(DumpTransport {
            base,
            dir: dir.to_path_buf(),
            sequence: AtomicU64::new(0),
        }),
        Some(dir) => {
            warn!(dir = %dir.display(), "Dump directory does not exist, request dumps disabled");
            base
        }
        None => base,
    }
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let _ = write!(out, "{name}: {}\r\n", String::from_utf8_lossy(value.as_bytes()));
    }
    out.push_str("\r\n");
}

/// File name unique per transport: a microsecond timestamp plus a sequence
/// number for exchanges within the same microsecond.
fn dump_file_name(request: &Request, sequence: u64) -> String {
    let url = request.url();
    format!(
        "{}{}-{}-{sequence}.req",
        url.host_str().unwrap_or("unknown"),
        url.path().replace('/', "-"),
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

#[async_trait]
impl Transport for DumpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let Some(body) = request.body().and_then(reqwest::Body::as_bytes) else {
            return self.base.send(request).await;
        };

        let url = request.url();
        let mut dump = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\n",
            request.method(),
            &url[url::Position::BeforePath..],
            url.host_str().unwrap_or_default()
        );
        write_headers(&mut dump, request.headers());
        dump.push_str(&String::from_utf8_lossy(body));
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(dump_file_name(&request, sequence));

        let response = self.base.send(request).await?;
        let (status, headers, body) = buffer_response(response).await?;

        dump.push_str(BOUNDARY);
        let _ = write!(dump, "HTTP/1.1 {status}\r\n");
        write_headers(&mut dump, &headers);
        dump.push_str(&String::from_utf8_lossy(&body));

        match tokio::fs::write(&path, dump).await {
            Ok(()) => debug!(path = %path.display(), "Dumped request"),
            Err(e) => warn!(path = %path.display(), error = %e, "Unable to dump request"),
        }

        Ok(rebuild_response(status, headers, body))
    }
}
