//! Google Calendar adapter: OAuth token upkeep and paginated event fetch.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use async_trait::async_trait;
use backend::store::SourceStore;
use chrono::{DateTime, Duration, Utc};
use google_calendar3::api::{Event, Events};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use shared::{CalendarSource, SourceKind};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::Cipher;
use crate::external::{all_day_span, ExternalEvent, SyncWindow};
use crate::sync::SourceError;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const PAGE_SIZE: i32 = 250;

/// Refresh access tokens with less than this left
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Guard against a server that keeps handing out page tokens
const MAX_PAGES: usize = 50;

/// OAuth token set, stored encrypted as JSON in the source credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl GoogleCredentials {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::minutes(REFRESH_MARGIN_MINUTES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GoogleError {
    #[error("Google access was revoked or expired. Please reconnect the calendar.")]
    Unauthorized,

    #[error("Google calendar connection has no refresh token. Please reconnect the calendar.")]
    MissingRefreshToken,

    #[error("Google Calendar did not respond in time")]
    Timeout,

    #[error("Google Calendar returned HTTP {0}")]
    Http(u16),

    #[error("Could not reach Google Calendar: {0}")]
    Network(String),

    #[error("Unexpected response from Google Calendar: {0}")]
    Decode(String),
}

impl GoogleError {
    /// Whether the user has to reconnect before syncing can resume
    pub fn requires_reauth(&self) -> bool {
        matches!(self, GoogleError::Unauthorized | GoogleError::MissingRefreshToken)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
}

/// The two Google endpoints the adapter needs
#[async_trait]
pub trait GoogleApi: Send + Sync {
    async fn refresh_access_token(&self, refresh_token: &str)
        -> Result<TokenResponse, GoogleError>;

    /// One page of `events.list`, recurring events expanded and
    /// cancellations included.
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        window: SyncWindow,
        page_token: Option<&str>,
    ) -> Result<Events, GoogleError>;
}

/// Token grant over reqwest, event listing through [`CalendarHub`]
pub struct HttpGoogleApi {
    client: reqwest::Client,
    connector: HttpsConnector<HttpConnector>,
    client_id: String,
    client_secret: String,
    timeout: StdDuration,
}

impl HttpGoogleApi {
    pub fn new(
        client_id: String,
        client_secret: String,
        timeout: StdDuration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();
        Ok(Self {
            client,
            connector,
            client_id,
            client_secret,
            timeout,
        })
    }

    /// Hub authorized with a bearer token the caller already holds
    fn hub(&self, access_token: &str) -> CalendarHub<HttpsConnector<HttpConnector>> {
        let client = Client::builder(TokioExecutor::new()).build(self.connector.clone());
        CalendarHub::new(client, access_token.to_string())
    }
}

fn classify(err: reqwest::Error) -> GoogleError {
    if err.is_timeout() {
        GoogleError::Timeout
    } else if err.is_decode() {
        GoogleError::Decode(err.to_string())
    } else {
        GoogleError::Network(err.without_url().to_string())
    }
}

fn classify_hub(err: google_calendar3::Error) -> GoogleError {
    match err {
        google_calendar3::Error::Failure(response) => match response.status().as_u16() {
            401 => GoogleError::Unauthorized,
            code => GoogleError::Http(code),
        },
        google_calendar3::Error::BadRequest(_) => GoogleError::Http(400),
        google_calendar3::Error::MissingToken(_) => GoogleError::Unauthorized,
        google_calendar3::Error::JsonDecodeError(body, e) => {
            GoogleError::Decode(format!("{}: {}", e, body))
        }
        other => GoogleError::Network(other.to_string()),
    }
}

#[async_trait]
impl GoogleApi for HttpGoogleApi {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, GoogleError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(classify)?;
        // invalid_grant comes back as 400
        match response.status().as_u16() {
            200..=299 => response.json().await.map_err(classify),
            400 | 401 => Err(GoogleError::Unauthorized),
            code => Err(GoogleError::Http(code)),
        }
    }

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        window: SyncWindow,
        page_token: Option<&str>,
    ) -> Result<Events, GoogleError> {
        let hub = self.hub(access_token);
        let mut call = hub
            .events()
            .list(calendar_id)
            .single_events(true)
            .show_deleted(true)
            .order_by("startTime")
            .max_results(PAGE_SIZE)
            .time_min(window.start)
            .time_max(window.end);
        if let Some(token) = page_token {
            call = call.page_token(token);
        }

        let (_, events) = tokio::time::timeout(self.timeout, call.doit())
            .await
            .map_err(|_| GoogleError::Timeout)?
            .map_err(classify_hub)?;
        Ok(events)
    }
}

/// Fetches a Google source's events, refreshing its token on the way.
pub struct GoogleCalendar {
    api: Arc<dyn GoogleApi>,
    cipher: Arc<Cipher>,
    sources: Arc<dyn SourceStore>,
}

impl GoogleCalendar {
    pub fn new(api: Arc<dyn GoogleApi>, cipher: Arc<Cipher>, sources: Arc<dyn SourceStore>) -> Self {
        Self {
            api,
            cipher,
            sources,
        }
    }

    /// A bearer token valid for at least a few more minutes. A refreshed
    /// token set is re-encrypted and persisted before it is used.
    pub async fn get_valid_access_token(
        &self,
        source: &CalendarSource,
        now: DateTime<Utc>,
    ) -> Result<String, SourceError> {
        let plain = self.cipher.decrypt(&source.credentials_encrypted)?;
        let credentials: GoogleCredentials = serde_json::from_str(&plain)
            .map_err(|e| GoogleError::Decode(format!("stored credentials: {}", e)))?;
        if !credentials.needs_refresh(now) {
            return Ok(credentials.access_token);
        }

        let refresh_token = credentials
            .refresh_token
            .clone()
            .ok_or(GoogleError::MissingRefreshToken)?;
        let token = self.api.refresh_access_token(&refresh_token).await?;
        let refreshed = GoogleCredentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expires_at: now + Duration::seconds(token.expires_in),
        };

        let sealed = serde_json::to_string(&refreshed)
            .map_err(|e| GoogleError::Decode(e.to_string()))?;
        self.sources
            .update_credentials(source.id, &self.cipher.encrypt(&sealed)?)
            .await?;
        info!(source_id = %source.id, "Refreshed Google access token");
        Ok(refreshed.access_token)
    }

    /// Every event instance in `window`, recurring events expanded upstream.
    pub async fn fetch_events(
        &self,
        source: &CalendarSource,
        window: SyncWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExternalEvent>, SourceError> {
        let SourceKind::Google { calendar_id } = &source.kind else {
            return Err(SourceError::WrongProvider(source.id));
        };
        let token = self.get_valid_access_token(source, now).await?;

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        for page in 0..MAX_PAGES {
            let response = self
                .api
                .list_events(&token, calendar_id, window, page_token.as_deref())
                .await?;
            let items = response.items.unwrap_or_default();
            debug!(source_id = %source.id, page, items = items.len(), "Fetched Google page");
            events.extend(items.into_iter().filter_map(to_external));
            page_token = response.next_page_token;
            if page_token.is_none() {
                return Ok(events);
            }
        }
        // Reconciliation must never see a partial listing
        warn!(source_id = %source.id, pages = MAX_PAGES, "Google kept returning page tokens");
        Err(GoogleError::Decode(format!("too many pages (more than {})", MAX_PAGES)).into())
    }
}

fn to_external(item: Event) -> Option<ExternalEvent> {
    let external_id = item.id?;
    let start = item.start?;
    let end = item.end.unwrap_or_default();
    let (start_at, end_at, all_day) = match (start.date, start.date_time) {
        (Some(date), _) => {
            let (s, e) = all_day_span(date, end.date);
            (s, e, true)
        }
        (None, Some(at)) => (at, end.date_time.filter(|e| *e >= at).unwrap_or(at), false),
        (None, None) => return None,
    };

    Some(ExternalEvent {
        cancelled: item.status.as_deref() == Some("cancelled"),
        title: item
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Busy".to_string()),
        description: item.description.filter(|d| !d.trim().is_empty()),
        location: item.location.filter(|l| !l.trim().is_empty()),
        html_link: item.html_link,
        external_id,
        start_at,
        end_at,
        all_day,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone};
    use google_calendar3::api::EventDateTime;
    use shared::{EventSource, NewCalendarSource};
    use tokio::sync::Mutex;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[derive(Default)]
    struct FakeGoogle {
        pages: Vec<Events>,
        endless: bool,
        refreshes: Mutex<usize>,
        tokens_seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GoogleApi for FakeGoogle {
        async fn refresh_access_token(&self, _: &str) -> Result<TokenResponse, GoogleError> {
            *self.refreshes.lock().await += 1;
            Ok(TokenResponse {
                access_token: "fresh".to_string(),
                expires_in: 3600,
                refresh_token: None,
            })
        }

        async fn list_events(
            &self,
            access_token: &str,
            _: &str,
            _: SyncWindow,
            page_token: Option<&str>,
        ) -> Result<Events, GoogleError> {
            self.tokens_seen.lock().await.push(access_token.to_string());
            let index = page_token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
            if self.endless {
                return Ok(Events {
                    items: Some(Vec::new()),
                    next_page_token: Some((index + 1).to_string()),
                    ..Default::default()
                });
            }
            Ok(self.pages.get(index).cloned().unwrap_or_default())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    async fn google_source(
        store: &MemoryStore,
        cipher: &Cipher,
        expires_at: DateTime<Utc>,
    ) -> CalendarSource {
        let creds = GoogleCredentials {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh-me".to_string()),
            expires_at,
        };
        store
            .create_source(NewCalendarSource {
                child_id: uuid::Uuid::new_v4(),
                owner_id: uuid::Uuid::new_v4(),
                name: "Work".to_string(),
                provider: EventSource::Google,
                kind: SourceKind::Google {
                    calendar_id: "primary".to_string(),
                },
                credentials_encrypted: cipher
                    .encrypt(&serde_json::to_string(&creds).unwrap())
                    .unwrap(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn near_expiry_tokens_are_refreshed_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(Cipher::from_key_material(KEY).unwrap());
        let api = Arc::new(FakeGoogle::default());
        let google = GoogleCalendar::new(api.clone(), cipher.clone(), store.clone());

        let source = google_source(&store, &cipher, now() + Duration::minutes(4)).await;
        let token = google.get_valid_access_token(&source, now()).await.unwrap();
        assert_eq!(token, "fresh");
        assert_eq!(*api.refreshes.lock().await, 1);

        let stored = store.get_source(source.id).await.unwrap().unwrap();
        let creds: GoogleCredentials =
            serde_json::from_str(&cipher.decrypt(&stored.credentials_encrypted).unwrap()).unwrap();
        assert_eq!(creds.access_token, "fresh");
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh-me"));
        assert_eq!(creds.expires_at, now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn fresh_tokens_are_used_as_is() {
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(Cipher::from_key_material(KEY).unwrap());
        let api = Arc::new(FakeGoogle::default());
        let google = GoogleCalendar::new(api.clone(), cipher.clone(), store.clone());

        let source = google_source(&store, &cipher, now() + Duration::minutes(30)).await;
        assert_eq!(google.get_valid_access_token(&source, now()).await.unwrap(), "stale");
        assert_eq!(*api.refreshes.lock().await, 0);
    }

    #[tokio::test]
    async fn pages_are_followed_and_mapped() {
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(Cipher::from_key_material(KEY).unwrap());
        let timed = Event {
            id: Some("a".to_string()),
            summary: Some("Pickup".to_string()),
            start: Some(EventDateTime {
                date_time: Some(now()),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date_time: Some(now() + Duration::hours(1)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let all_day = Event {
            id: Some("b".to_string()),
            status: Some("cancelled".to_string()),
            start: Some(EventDateTime {
                date: NaiveDate::from_ymd_opt(2025, 1, 20),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date: NaiveDate::from_ymd_opt(2025, 1, 21),
                ..Default::default()
            }),
            ..Default::default()
        };
        let untracked = Event {
            id: None,
            ..timed.clone()
        };
        let api = Arc::new(FakeGoogle {
            pages: vec![
                Events {
                    items: Some(vec![timed, untracked]),
                    next_page_token: Some("1".to_string()),
                    ..Default::default()
                },
                Events {
                    items: Some(vec![all_day]),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let google = GoogleCalendar::new(api.clone(), cipher.clone(), store.clone());
        let source = google_source(&store, &cipher, now() + Duration::hours(1)).await;

        let events = google
            .fetch_events(&source, SyncWindow::around(now(), 30, 90), now())
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].end_at - events[0].start_at, Duration::hours(1));
        assert!(events[1].all_day && events[1].cancelled);
        assert_eq!(events[1].title, "Busy");
        assert_eq!(
            events[1].end_at,
            Utc.with_ymd_and_hms(2025, 1, 20, 23, 59, 59).unwrap()
        );
        assert_eq!(api.tokens_seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn endless_pagination_fails_instead_of_truncating() {
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(Cipher::from_key_material(KEY).unwrap());
        let api = Arc::new(FakeGoogle {
            endless: true,
            ..Default::default()
        });
        let google = GoogleCalendar::new(api.clone(), cipher.clone(), store.clone());
        let source = google_source(&store, &cipher, now() + Duration::hours(1)).await;

        let err = google
            .fetch_events(&source, SyncWindow::around(now(), 30, 90), now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Google(GoogleError::Decode(ref m)) if m.contains("too many pages")
        ));
        assert_eq!(api.tokens_seen.lock().await.len(), MAX_PAGES);
    }

    #[test]
    fn reauth_errors_are_flagged() {
        assert!(GoogleError::Unauthorized.requires_reauth());
        assert!(GoogleError::MissingRefreshToken.requires_reauth());
        assert!(!GoogleError::Timeout.requires_reauth());
    }
}
