//! Per-connection command sessions.
//!
//! Each accepted connection runs one [`Session`]: a strictly synchronous,
//! line-delimited exchange where every request line produces exactly one
//! reply line, in order. Sessions share the registration store and the
//! delivery pipeline through the [`CommandServer`](crate::server::CommandServer).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use xaps_types::{Command, CommandName, Notification};

use crate::server::CommandServer;

/// The only subtopic REGISTER accepts.
pub const MAIL_SUBTOPIC: &str = "com.apple.mobilemail";

/// NOTIFY event name that signals new mail.
const EVENT_MESSAGE_NEW: &str = "MessageNew";

/// One reply line: `OK` or `ERROR`, with an optional message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The request succeeded.
    Ok(String),
    /// The request failed; the session stays open.
    Error(String),
}

impl Reply {
    /// Wire form of the reply. The status/message separator is always
    /// written, even for an empty message.
    fn to_line(&self) -> String {
        match self {
            Reply::Ok(message) => format!("OK {message}\n"),
            Reply::Error(message) => format!("ERROR {message}\n"),
        }
    }
}

/// A per-connection session.
pub struct Session {
    server: Arc<CommandServer>,
}

impl Session {
    /// Create a session backed by the shared server state.
    pub fn new(server: Arc<CommandServer>) -> Self {
        Self { server }
    }

    /// Run the session until the peer disconnects.
    pub async fn run<S>(self, stream: S) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let reply = self.handle_line(&line).await;
            writer.write_all(reply.to_line().as_bytes()).await?;
        }

        tracing::debug!("Command connection closed");
        Ok(())
    }

    /// Process one request line into one reply.
    pub async fn handle_line(&self, line: &str) -> Reply {
        tracing::debug!("Received request: {}", line);

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("Cannot parse command: {}", e);
                return Reply::Error(format!("Cannot parse command: {e}"));
            }
        };

        match CommandName::from_name(&command.name) {
            Some(CommandName::Register) => self.handle_register(&command).await,
            Some(CommandName::Notify) => self.handle_notify(&command).await,
            None => Reply::Error("Unknown command".to_string()),
        }
    }

    /// Handle REGISTER: validate the subtopic, upsert the registration,
    /// and reply with the notification topic.
    async fn handle_register(&self, command: &Command) -> Reply {
        let Some(account_id) = command.str_arg("aps-account-id") else {
            return missing("aps-account-id");
        };
        let Some(device_token) = command.str_arg("aps-device-token") else {
            return missing("aps-device-token");
        };
        let Some(subtopic) = command.str_arg("aps-subtopic") else {
            return missing("aps-subtopic");
        };
        let Some(username) = command.str_arg("dovecot-username") else {
            return missing("dovecot-username");
        };
        let Some(mailboxes) = command.list_arg("dovecot-mailboxes") else {
            return missing("dovecot-mailboxes");
        };

        if subtopic != MAIL_SUBTOPIC {
            return Reply::Error("Unknown aps-subtopic".to_string());
        }

        let mut store = self.server.registry().lock().await;
        match store.add_registration(username, account_id, device_token, mailboxes.to_vec()) {
            Ok(()) => {
                tracing::info!(
                    "Registered device {} for {} ({} mailboxes)",
                    device_token,
                    username,
                    mailboxes.len()
                );
                Reply::Ok(self.server.topic().to_string())
            }
            Err(e) => {
                tracing::error!("Failed to register {}: {}", username, e);
                Reply::Error(format!("Failed to register: {e}"))
            }
        }
    }

    /// Handle NOTIFY: enqueue one notification per registered device that
    /// subscribes to the mailbox. Always replies OK; delivery is
    /// fire-and-forget and never surfaces back to the command channel.
    async fn handle_notify(&self, command: &Command) -> Reply {
        let Some(username) = command.str_arg("dovecot-username") else {
            return missing("dovecot-username");
        };
        let Some(mailbox) = command.str_arg("dovecot-mailbox") else {
            return missing("dovecot-mailbox");
        };

        // Older plugins send no events list; treat that as new mail.
        if let Some(events) = command.list_arg("events") {
            if !events.iter().any(|event| event == EVENT_MESSAGE_NEW) {
                tracing::debug!("Ignoring NOTIFY without {} event", EVENT_MESSAGE_NEW);
                return Reply::Ok(String::new());
            }
        }

        let store = self.server.registry().lock().await;
        let mut queued = 0;
        for (device_token, account_id) in store.find_registrations(username, mailbox) {
            self.server
                .pipeline()
                .enqueue(Notification::new_mail(device_token, account_id));
            queued += 1;
        }

        if queued == 0 {
            tracing::debug!("No registrations for {}/{}", username, mailbox);
        } else {
            tracing::debug!("Queued {} notifications for {}/{}", queued, username, mailbox);
        }
        Reply::Ok(String::new())
    }
}

fn missing(name: &str) -> Reply {
    Reply::Error(format!("Missing {name} argument"))
}
