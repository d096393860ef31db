//! File-backed account store.
//!
//! Loads the whole account file into memory once, and rewrites it in full
//! after every mutation.

use super::CredentialRecord;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the account collection inside the state directory.
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// In-memory account collection backed by `accounts.json`.
///
/// # Format
/// ```json
/// [
///   {
///     "account": "me@example.com",
///     "oauth": {
///       "client_id": "...",
///       "client_secret": "...",
///       "refresh_token": "...",
///       "access_token": "...",
///       "access_token_expires_at": "2026-10-19T12:00:00Z"
///     }
///   }
/// ]
/// ```
///
/// Constructed once per process and passed to whichever component needs it.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    records: Vec<CredentialRecord>,
}

impl AccountStore {
    /// Opens the store in `state_dir`, creating the directory if needed.
    ///
    /// # Returns
    /// * `Ok(AccountStore)` - Store with every record currently on disk
    /// * `Err(Error::Storage)` - Directory could not be created or file could not be read
    pub fn open<P: AsRef<Path>>(state_dir: P) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        std::fs::create_dir_all(state_dir).map_err(|e| Error::storage(state_dir, e))?;

        let path = state_dir.join(ACCOUNTS_FILE);
        let records = Self::load_or_empty(&path)?;
        debug!(path = %path.display(), accounts = records.len(), "Account store loaded");

        Ok(Self { path, records })
    }

    /// Reads the persisted records.
    ///
    /// A missing file is an empty store. A file whose content does not parse
    /// is also treated as an empty store: the failure is logged as a warning
    /// and not surfaced, so a corrupt file never blocks the CLI. Any other
    /// read failure (permissions, I/O) is a storage error.
    pub fn load_or_empty(path: &Path) -> Result<Vec<CredentialRecord>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::storage(path, e)),
        };

        match serde_json::from_str::<Vec<CredentialRecord>>(&contents) {
            Ok(records) => Ok(dedup_by_account(records)),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Account file is not valid, starting with no accounts"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Location of the account file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts or replaces the record for `record.account`, then persists.
    ///
    /// The in-memory collection only changes once the file is written.
    pub fn upsert(&mut self, record: CredentialRecord) -> Result<()> {
        let mut records = self.records.clone();
        match records.iter_mut().find(|r| r.account == record.account) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.persist(&records)?;
        self.records = records;
        Ok(())
    }

    pub fn get(&self, account: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.account == account)
    }

    /// All records. Order is insertion order and carries no meaning.
    pub fn list(&self) -> &[CredentialRecord] {
        &self.records
    }

    /// Deletes the record for `account`.
    ///
    /// # Returns
    /// * `Ok(true)` - Record deleted and file rewritten
    /// * `Ok(false)` - No such account; file untouched
    /// * `Err(Error::Storage)` - File could not be written; record kept
    pub fn remove(&mut self, account: &str) -> Result<bool> {
        if !self.exists(account) {
            return Ok(false);
        }
        let records: Vec<CredentialRecord> = self
            .records
            .iter()
            .filter(|r| r.account != account)
            .cloned()
            .collect();
        self.persist(&records)?;
        self.records = records;
        Ok(true)
    }

    pub fn exists(&self, account: &str) -> bool {
        self.get(account).is_some()
    }

    fn persist(&self, records: &[CredentialRecord]) -> Result<()> {
        let data = serde_json::to_string_pretty(records)
            .map_err(|e| Error::storage(&self.path, std::io::Error::other(e)))?;
        std::fs::write(&self.path, data).map_err(|e| Error::storage(&self.path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::storage(&self.path, e))?;
        }

        debug!(path = %self.path.display(), accounts = records.len(), "Account store written");
        Ok(())
    }
}

/// Keeps the last record for each account, preserving first-seen order.
fn dedup_by_account(records: Vec<CredentialRecord>) -> Vec<CredentialRecord> {
    let mut unique: Vec<CredentialRecord> = Vec::with_capacity(records.len());
    for record in records {
        match unique.iter_mut().find(|r| r.account == record.account) {
            Some(existing) => *existing = record,
            None => unique.push(record),
        }
    }
    unique
}
