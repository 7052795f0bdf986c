use crate::delivery::{DeliveryRecord, DeliverySink};
use crate::error::{InboundError, Result};
use crate::utils::email::split_address;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Spool of per-recipient Maildirs: `<spool>/<domain>/<local>/Maildir`
pub struct MaildirStorage {
    base_path: PathBuf,
}

impl MaildirStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maildir root for `recipient`
    pub fn mailbox_path(&self, recipient: &str) -> PathBuf {
        let lowered = recipient.to_lowercase();
        let (local, domain) = split_address(&lowered).unwrap_or((lowered.as_str(), ""));

        self.base_path
            .join(sanitize_component(domain))
            .join(sanitize_component(local))
            .join("Maildir")
    }

    pub async fn store(&self, recipient: &str, data: &[u8]) -> Result<PathBuf> {
        let mailbox_path = self.mailbox_path(recipient);
        self.ensure_maildir_structure(&mailbox_path).await?;

        let filename = self.generate_filename();
        let tmp_path = mailbox_path.join("tmp").join(&filename);
        let new_path = mailbox_path.join("new").join(&filename);

        // Write to tmp first so readers of new/ never see a partial file
        fs::write(&tmp_path, data).await.map_err(|e| {
            InboundError::Storage(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, &new_path).await.map_err(|e| {
            InboundError::Storage(format!("Failed to move {}: {}", new_path.display(), e))
        })?;

        info!("Stored email for {} as {}", recipient, new_path.display());

        Ok(new_path)
    }

    async fn ensure_maildir_structure(&self, mailbox_path: &Path) -> Result<()> {
        for subdir in &["tmp", "new", "cur"] {
            let dir = mailbox_path.join(subdir);
            fs::create_dir_all(&dir).await.map_err(|e| {
                InboundError::Storage(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    fn generate_filename(&self) -> String {
        // timestamp.unique.hostname
        let timestamp = chrono::Utc::now().timestamp_micros();
        let unique = uuid::Uuid::new_v4().simple();
        let hostname = sanitize_component(&gethostname::gethostname().to_string_lossy());

        format!("{}.{}.{}", timestamp, unique, hostname)
    }
}

#[async_trait]
impl DeliverySink for MaildirStorage {
    async fn deliver(&self, record: &DeliveryRecord) -> Result<()> {
        self.store(&record.recipient, &record.raw_message).await?;
        Ok(())
    }
}

/// Keep `[a-z0-9._-]`, replace everything else with `_`
///
/// An empty component becomes `unknown`, and `.`/`..` cannot escape the spool.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    match cleaned.as_str() {
        "" => "unknown".to_string(),
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned,
    }
}
