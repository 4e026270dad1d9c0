//! Mail transports.
//!
//! `SendmailTransport` pipes a complete message to the local MTA;
//! `LogOnlyTransport` is for development hosts without one.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::dispatch::header_value;
use crate::domain::error::TransportError;
use crate::ports::{MailHeader, MailTransport};

/// Render an RFC 5322 message with recipient and subject headers first.
pub fn render_message(to: &str, subject: &str, body: &str, headers: &[MailHeader]) -> String {
    let mut message = String::with_capacity(body.len() + 512);
    message.push_str(&format!("To: {}\r\n", header_value(to)));
    message.push_str(&format!("Subject: {}\r\n", header_value(subject)));
    for (name, value) in headers {
        message.push_str(&format!("{}: {}\r\n", header_value(name), header_value(value)));
    }
    message.push_str("\r\n");

    // Normalize bare LF to CRLF
    for line in body.lines() {
        message.push_str(line);
        message.push_str("\r\n");
    }
    message
}

/// Delivers through a local `sendmail -t -i`.
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    program: PathBuf,
}

impl SendmailTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MailTransport for SendmailTransport {
    async fn deliver(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        headers: &[MailHeader],
    ) -> Result<bool, TransportError> {
        let message = render_message(to, subject, body, headers);

        let mut child = Command::new(&self.program)
            .arg("-t")
            .arg("-i")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping stdin closes the pipe. A child that exits early is judged
        // by its exit status, not by the broken pipe.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(message.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            debug!(program = %self.program.display(), "sendmail accepted message");
            Ok(true)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                program = %self.program.display(),
                status = %output.status,
                stderr = %stderr.trim(),
                "sendmail rejected message"
            );
            Err(TransportError::Rejected(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )))
        }
    }
}

/// Logs the message envelope and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyTransport;

#[async_trait]
impl MailTransport for LogOnlyTransport {
    async fn deliver(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        _headers: &[MailHeader],
    ) -> Result<bool, TransportError> {
        info!(to, subject, body_len = body.len(), "Mail not sent (log-only transport)");
        Ok(true)
    }
}
