//! Sending the user to the authorization page.

use std::{
    io::{self, Write as _},
    process::ExitStatus,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{process::Command, task::JoinHandle};
use tracing::debug;
use url::Url;

/// Shows the authorization URL to the user.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn open(&self, url: &Url) -> io::Result<()>;
}

/// Opens the URL in the system's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

#[async_trait]
impl AuthorizationPrompt for SystemBrowser {
    async fn open(&self, url: &Url) -> io::Result<()> {
        let mut command = if cfg!(target_os = "windows") {
            let mut command = Command::new("rundll32");
            command.arg("url.dll,FileProtocolHandler");
            command
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(unix) {
            Command::new("xdg-open")
        } else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unsupported platform",
            ));
        };
        spawn_reaped(command.arg(url.as_str()))?;
        Ok(())
    }
}

/// Start `command` and wait for it in the background so it is reaped.
fn spawn_reaped(command: &mut Command) -> io::Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = command.spawn()?;
    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                debug!(status = %status, "Browser opener exited");
                Some(status)
            }
            Err(e) => {
                debug!(error = %e, "Unable to wait for browser opener");
                None
            }
        }
    }))
}

/// Countdown printed while waiting for the browser. Stops when dropped.
pub(crate) struct ProgressIndicator(JoinHandle<()>);

impl ProgressIndicator {
    pub(crate) fn start(total: Duration) -> Self {
        let started = Instant::now();
        Self(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticks.tick().await;
                let remaining = total.saturating_sub(started.elapsed());
                eprint!("Waiting for {}s\r", remaining.as_secs());
                let _ = io::stderr().flush();
            }
        }))
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.0.abort();
    }
}
