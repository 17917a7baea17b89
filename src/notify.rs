//! Optional e-mail notification of the training result.
//!
//! Looks up the invoking user's address through the project API and hands a
//! plain-text message to an SMTP relay. Nothing here runs unless
//! notifications are enabled in [`crate::config::NotifyConfig`].

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde::Deserialize;

use crate::config::NotifyConfig;
use crate::report::final_error_line;

pub const EMAIL_SUBJECT: &str = "Your model's final training error";

const USER_SELF_PATH: &str = "/v4/users/self";
const API_KEY_HEADER: &str = "X-Domino-Api-Key";
const DEFAULT_SMTP_PORT: u16 = 25;
const HELO_NAME: &str = "localhost";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("user lookup failed with HTTP {0}")]
    Status(u16),
    #[error("user lookup failed: {0}")]
    Transport(String),
    #[error("invalid user lookup response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not connect to SMTP relay {relay}: {source}")]
    Connect { relay: String, source: io::Error },
    #[error("SMTP conversation failed: {0}")]
    Io(#[from] io::Error),
    #[error("SMTP relay rejected {command}: {reply}")]
    Rejected { command: &'static str, reply: String },
}

#[derive(Debug, Deserialize)]
struct UserSelf {
    email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn final_error(from: &str, to: &str, final_error: f64) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: EMAIL_SUBJECT.to_string(),
            body: final_error_line(final_error),
        }
    }

    /// RFC 5322 text with CRLF line endings and dot-stuffed body lines.
    pub fn to_mime(&self) -> String {
        let mut text = String::new();
        text.push_str("Content-Type: text/plain; charset=\"us-ascii\"\r\n");
        text.push_str("MIME-Version: 1.0\r\n");
        text.push_str("Content-Transfer-Encoding: 7bit\r\n");
        text.push_str(&format!("Subject: {}\r\n", self.subject));
        text.push_str(&format!("From: {}\r\n", self.from));
        text.push_str(&format!("To: {}\r\n", self.to));
        text.push_str("\r\n");
        for line in self.body.lines() {
            if line.starts_with('.') {
                text.push('.');
            }
            text.push_str(line);
            text.push_str("\r\n");
        }
        text
    }
}

pub struct Notifier<'a> {
    config: &'a NotifyConfig,
    agent: ureq::Agent,
}

impl<'a> Notifier<'a> {
    pub fn new(config: &'a NotifyConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(IO_TIMEOUT)
            .timeout_write(IO_TIMEOUT)
            .build();
        Self { config, agent }
    }

    /// E-mail address of the API key's owner, lower-cased.
    pub fn lookup_email(&self) -> Result<String, NotifyError> {
        let url = format!(
            "{}{USER_SELF_PATH}",
            self.config.api_host.trim_end_matches('/')
        );
        tracing::debug!(%url, project = %self.config.project(), "looking up user email");

        let response = match self
            .agent
            .get(&url)
            .set(API_KEY_HEADER, &self.config.api_key)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(NotifyError::Status(code)),
            Err(err) => return Err(NotifyError::Transport(err.to_string())),
        };

        let body = response
            .into_string()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        parse_user_email(&body)
    }

    pub fn notify(&self, final_error: f64) -> Result<(), NotifyError> {
        let to = self.lookup_email()?;
        let message = EmailMessage::final_error(&self.config.from_address, &to, final_error);

        let relay = relay_address(&self.config.smtp_relay);
        let stream = TcpStream::connect(&relay).map_err(|source| NotifyError::Connect {
            relay: relay.clone(),
            source,
        })?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        send_mail(stream, &message)?;
        tracing::info!(%to, %relay, "result e-mail handed to relay");
        Ok(())
    }
}

fn parse_user_email(body: &str) -> Result<String, NotifyError> {
    let user: UserSelf = serde_json::from_str(body)?;
    Ok(user.email.to_lowercase())
}

fn relay_address(relay: &str) -> String {
    if relay.contains(':') {
        relay.to_string()
    } else {
        format!("{relay}:{DEFAULT_SMTP_PORT}")
    }
}

/// Runs one SMTP transaction for `message` over `stream`.
pub fn send_mail<S: Read + Write>(stream: S, message: &EmailMessage) -> Result<(), NotifyError> {
    let mut session = SmtpSession {
        stream: BufReader::new(stream),
    };

    session.expect("greeting", &[220])?;
    session.command("HELO", &format!("HELO {HELO_NAME}"), &[250])?;
    session.command("MAIL FROM", &format!("MAIL FROM:<{}>", message.from), &[250])?;
    session.command("RCPT TO", &format!("RCPT TO:<{}>", message.to), &[250, 251])?;
    session.command("DATA", "DATA", &[354])?;
    session.send_raw(&message.to_mime())?;
    session.command("message body", ".", &[250])?;
    session.command("QUIT", "QUIT", &[221])?;
    Ok(())
}

struct SmtpSession<S> {
    stream: BufReader<S>,
}

impl<S: Read + Write> SmtpSession<S> {
    fn send_raw(&mut self, text: &str) -> io::Result<()> {
        self.stream.get_mut().write_all(text.as_bytes())
    }

    fn command(
        &mut self,
        name: &'static str,
        line: &str,
        accepted: &[u16],
    ) -> Result<(), NotifyError> {
        self.send_raw(line)?;
        self.send_raw("\r\n")?;
        self.stream.get_mut().flush()?;
        self.expect(name, accepted)
    }

    /// Reads a possibly multi-line reply and checks its status code.
    fn expect(&mut self, name: &'static str, accepted: &[u16]) -> Result<(), NotifyError> {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line)? == 0 {
                return Err(NotifyError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "SMTP relay closed the connection",
                )));
            }
            reply.push_str(&line);
            if line.as_bytes().get(3) != Some(&b'-') {
                break;
            }
        }

        let code = reply
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .unwrap_or_default();
        if accepted.contains(&code) {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                command: name,
                reply: reply.trim_end().to_string(),
            })
        }
    }
}
