//! Outbound mail delivery for converted documents.
//!
//! Composes a base64 MIME attachment and speaks the minimal SMTP dialogue
//! directly; the relay is assumed to be a trusted local server that needs
//! neither authentication nor TLS.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::info;

use crate::error::{Result, SatchelError};

/// Line width for the encoded attachment body.
const MAX_LINE_LENGTH: usize = 80;

/// Mails converted documents to the configured device address.
#[derive(Debug, Clone)]
pub struct Mailer {
    /// SMTP relay as `host:port`.
    pub server: String,
    pub sender: String,
    pub recipient: String,
}

impl Mailer {
    pub fn new(server: String, sender: String, recipient: String) -> Mailer {
        Mailer { server, sender, recipient }
    }

    /// Mail the document at `path` as an attachment.
    pub async fn send_doc(&self, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let message = self.compose(&filename, &data);
        info!(bytes = message.len(), recipient = %self.recipient, "sending message");
        self.deliver(&message).await
    }

    /// Build the MIME message around the base64-encoded document.
    fn compose(&self, filename: &str, data: &[u8]) -> String {
        let encoded = STANDARD.encode(data);
        let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH + 1);
        let mut rest = encoded.as_str();
        while rest.len() > MAX_LINE_LENGTH {
            let (line, tail) = rest.split_at(MAX_LINE_LENGTH);
            wrapped.push_str(line);
            wrapped.push('\n');
            rest = tail;
        }
        wrapped.push_str(rest);

        format!(
            "From: {}\r\n\
             To: {}\r\n\
             Subject: kindle document\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: application/x-mobipocket-ebook\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; filename=\"{}\";\r\n\
             \r\n\
             {}\r\n",
            self.sender, self.recipient, filename, wrapped
        )
    }

    async fn deliver(&self, message: &str) -> Result<()> {
        let stream = TcpStream::connect(&self.server).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        expect_reply(&mut reader, "220").await?;
        for (command, code) in [
            ("HELO localhost".to_string(), "250"),
            (format!("MAIL FROM:<{}>", self.sender), "250"),
            (format!("RCPT TO:<{}>", self.recipient), "250"),
            ("DATA".to_string(), "354"),
        ] {
            write_half.write_all(format!("{command}\r\n").as_bytes()).await?;
            expect_reply(&mut reader, code).await?;
        }

        write_half.write_all(message.as_bytes()).await?;
        write_half.write_all(b".\r\n").await?;
        expect_reply(&mut reader, "250").await?;
        write_half.write_all(b"QUIT\r\n").await?;
        Ok(())
    }
}

/// Read one (possibly multi-line) SMTP reply and check its status code.
async fn expect_reply<R: AsyncBufReadExt + Unpin>(reader: &mut R, code: &str) -> Result<()> {
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(SatchelError::Mail("connection closed mid-dialogue".to_string()));
        }
        let line = line.trim_end();
        // "250-..." marks a continuation line of the same reply.
        if line.len() >= 4 && line.as_bytes()[3] == b'-' {
            continue;
        }
        if line.starts_with(code) {
            return Ok(());
        }
        return Err(SatchelError::Mail(format!("expected {code}, got {line:?}")));
    }
}
