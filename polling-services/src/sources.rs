//! Connecting and disconnecting external calendars for a child.

use std::sync::Arc;

use backend::store::{ExternalEventStore, SourceStore};
use sha2::{Digest, Sha256};
use shared::{
    CalendarSource, EventSource, NewCalendarSource, SourceKind, WorkflowError, WorkflowResult,
};
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::crypto::Cipher;
use crate::google::GoogleCredentials;
use crate::ics::FeedError;

/// Canonical form of a subscription URL: `webcal` becomes `https`, the host
/// is lowercased, the fragment and any trailing slash are dropped.
pub fn normalize_ics_url(raw: &str) -> Result<String, FeedError> {
    let trimmed = raw.trim();
    let rewritten = match trimmed.get(..9) {
        Some(scheme) if scheme.eq_ignore_ascii_case("webcal://") => {
            format!("https://{}", &trimmed[9..])
        }
        _ => trimmed.to_string(),
    };

    let mut url = Url::parse(&rewritten).map_err(|_| FeedError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(FeedError::InvalidUrl);
    }
    url.set_fragment(None);

    let mut normalized = url.to_string();
    while normalized.ends_with('/') {
        normalized.pop();
    }
    Ok(normalized)
}

/// SHA-256 hex of a normalized URL; the dedup key for subscriptions.
pub fn hash_ics_url(normalized: &str) -> String {
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Creates and removes calendar sources, keeping their secrets encrypted.
pub struct SourceRegistry {
    sources: Arc<dyn SourceStore>,
    events: Arc<dyn ExternalEventStore>,
    cipher: Arc<Cipher>,
}

impl SourceRegistry {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        events: Arc<dyn ExternalEventStore>,
        cipher: Arc<Cipher>,
    ) -> Self {
        Self {
            sources,
            events,
            cipher,
        }
    }

    /// Subscribe a child to an ICS feed. A feed already subscribed for the
    /// child, in any cosmetic spelling, is a `Conflict`.
    pub async fn connect_ics(
        &self,
        child_id: Uuid,
        owner_id: Uuid,
        name: &str,
        url: &str,
    ) -> WorkflowResult<CalendarSource> {
        let normalized =
            normalize_ics_url(url).map_err(|e| WorkflowError::validation(e.to_string()))?;
        let url_hash = hash_ics_url(&normalized);

        if self
            .sources
            .find_source_by_url_hash(child_id, &url_hash)
            .await?
            .is_some()
        {
            return Err(WorkflowError::conflict(
                "This calendar is already connected",
            ));
        }

        let source = self
            .sources
            .create_source(NewCalendarSource {
                child_id,
                owner_id,
                name: display_name(name, "Apple Calendar"),
                provider: EventSource::Apple,
                kind: SourceKind::Ics { url_hash },
                credentials_encrypted: self.cipher.encrypt(&normalized)?,
            })
            .await?;
        info!(source_id = %source.id, child_id = %child_id, "ICS calendar connected");
        Ok(source)
    }

    pub async fn connect_google(
        &self,
        child_id: Uuid,
        owner_id: Uuid,
        name: &str,
        calendar_id: &str,
        credentials: &GoogleCredentials,
    ) -> WorkflowResult<CalendarSource> {
        let sealed = serde_json::to_string(credentials)
            .map_err(|e| WorkflowError::Internal(e.into()))?;
        let calendar_id = match calendar_id.trim() {
            "" => "primary".to_string(),
            id => id.to_string(),
        };

        let source = self
            .sources
            .create_source(NewCalendarSource {
                child_id,
                owner_id,
                name: display_name(name, "Google Calendar"),
                provider: EventSource::Google,
                kind: SourceKind::Google { calendar_id },
                credentials_encrypted: self.cipher.encrypt(&sealed)?,
            })
            .await?;
        info!(source_id = %source.id, child_id = %child_id, "Google calendar connected");
        Ok(source)
    }

    /// Unlink a source: its imported rows are soft-deleted, its mappings
    /// dropped and the source removed. Returns the number of rows removed.
    pub async fn disconnect(&self, source_id: Uuid) -> WorkflowResult<usize> {
        if self.sources.get_source(source_id).await?.is_none() {
            return Err(WorkflowError::not_found("Calendar source"));
        }
        let removed = self.events.unlink_source(source_id).await?;
        self.sources.delete_source(source_id).await?;
        info!(source_id = %source_id, removed, "Calendar source disconnected");
        Ok(removed)
    }
}

fn display_name(name: &str, fallback: &str) -> String {
    match name.trim() {
        "" => fallback.to_string(),
        name => name.to_string(),
    }
}
