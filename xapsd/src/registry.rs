//! On-disk registration store.
//!
//! Maps username → account → device → subscribed mailboxes. The whole state
//! lives in memory and is rewritten to one pretty-printed JSON file on every
//! mutation; the file shape is
//!
//! ```json
//! { "user": { "accounts": { "A1": { "devices": { "TOKEN": { "mailboxes": ["Inbox"] } } } } } }
//! ```
//!
//! The store assumes it is the file's sole writer for the process lifetime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// All registrations of one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    /// Accounts keyed by account id.
    pub accounts: HashMap<String, Account>,
}

/// One mail account, holding its registered devices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Devices keyed by hex device token.
    pub devices: HashMap<String, Device>,
}

/// One registered device and its mailbox subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    /// Mailboxes this device wants notifications for.
    pub mailboxes: Vec<String>,
}

/// Registration store: in-memory index over one persisted JSON file.
#[derive(Debug)]
pub struct RegistrationStore {
    path: PathBuf,
    users: HashMap<String, User>,
}

impl RegistrationStore {
    /// Open the store, loading the persisted file when it exists.
    ///
    /// A missing or empty file yields an empty store; an unreadable or
    /// unparseable file is an error the caller must treat as fatal.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let users = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(StoreError::Read {
                    path,
                    source: e,
                })
            }
        };

        Ok(Self { path, users })
    }

    /// Path of the persisted file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert one registration and persist the full state.
    ///
    /// The mailbox list replaces any previous list for the same
    /// `(username, account, device)` triple. The in-memory index is only
    /// committed after the file rewrite succeeds, so a failed write leaves
    /// the store unchanged.
    pub fn add_registration(
        &mut self,
        username: &str,
        account_id: &str,
        device_token: &str,
        mailboxes: Vec<String>,
    ) -> StoreResult<()> {
        let mut users = self.users.clone();
        users
            .entry(username.to_string())
            .or_default()
            .accounts
            .entry(account_id.to_string())
            .or_default()
            .devices
            .insert(device_token.to_string(), Device { mailboxes });

        self.write(&users)?;
        self.users = users;
        Ok(())
    }

    /// Iterate `(device_token, account_id)` for every device of `username`
    /// subscribed to `mailbox`. Order is unspecified; each call recomputes.
    pub fn find_registrations<'a>(
        &'a self,
        username: &str,
        mailbox: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.users
            .get(username)
            .into_iter()
            .flat_map(|user| user.accounts.iter())
            .flat_map(move |(account_id, account)| {
                account
                    .devices
                    .iter()
                    .filter(move |(_, device)| device.mailboxes.iter().any(|m| m == mailbox))
                    .map(move |(token, _)| (token.as_str(), account_id.as_str()))
            })
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn write(&self, users: &HashMap<String, User>) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(users).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            source: e.into(),
        })?;
        std::fs::write(&self.path, json).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            source: e,
        })
    }
}
