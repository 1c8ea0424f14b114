//! Postgres implementations of the storage and roster seams.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    scoped_futures::ScopedFutureExt,
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use shared::row::row_to_event;
use shared::{
    CalendarEvent, CalendarSource, EventDetails, EventQuery, EventStatus, EventType, Home,
    NewCalendarEvent, NewCalendarSource, SourceKind, StatusTransition, SyncStatus, WorkflowError,
    WorkflowResult,
};
use uuid::Uuid;

use crate::models::{EventRecord, MappingRecord, SourceRecord};
use crate::roster::Roster;
use crate::schema::{
    calendar_event_mappings, calendar_events, calendar_sources, child_guardians, child_homes,
    homes, profiles,
};
use crate::store::{
    materialize, overlap_error, EventStore, ExternalEventStore, MappedEvent, OverlapGuard,
    SourceStore, UpsertOutcome,
};

pub type DbPool = Pool<AsyncPgConnection>;
pub type DbConnection = Object<AsyncPgConnection>;

/// Roles with confirm/reject authority over a child's calendar
pub const GUARDIAN_ROLES: &[&str] = &["parent", "step_parent", "guardian"];

pub fn establish_connection_pool(database_url: &str, max_size: usize) -> anyhow::Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager)
        .max_size(max_size)
        .build()
        .context("Failed to create database pool")?;

    Ok(pool)
}

async fn connect(pool: &DbPool) -> WorkflowResult<DbConnection> {
    let conn = pool
        .get()
        .await
        .context("Failed to get database connection")?;
    Ok(conn)
}

fn decode(record: EventRecord) -> WorkflowResult<CalendarEvent> {
    let id = record.id;
    row_to_event(record.into())
        .with_context(|| format!("Malformed calendar row {}", id))
        .map_err(WorkflowError::from)
}

fn decode_all(records: Vec<EventRecord>) -> WorkflowResult<Vec<CalendarEvent>> {
    records.into_iter().map(decode).collect()
}

/// Event, mapping and source storage on Postgres
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert(&self, event: NewCalendarEvent) -> WorkflowResult<CalendarEvent> {
        let mut conn = connect(&self.pool).await?;
        let record = EventRecord::from(&materialize(Uuid::new_v4(), event, Utc::now()));

        let inserted = diesel::insert_into(calendar_events::table)
            .values(&record)
            .returning(EventRecord::as_returning())
            .get_result(&mut conn)
            .await
            .context("Failed to insert calendar event")?;

        decode(inserted)
    }

    async fn get(&self, id: Uuid) -> WorkflowResult<Option<CalendarEvent>> {
        let mut conn = connect(&self.pool).await?;

        let record = calendar_events::table
            .find(id)
            .filter(calendar_events::is_deleted.eq(false))
            .select(EventRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .context("Failed to load calendar event")?;

        record.map(decode).transpose()
    }

    async fn list(&self, query: &EventQuery) -> WorkflowResult<Vec<CalendarEvent>> {
        let mut conn = connect(&self.pool).await?;

        let mut q = calendar_events::table
            .filter(calendar_events::child_id.eq(query.child_id))
            .filter(calendar_events::is_deleted.eq(false))
            .select(EventRecord::as_select())
            .into_boxed();

        if let Some((start, end)) = query.range {
            q = q
                .filter(calendar_events::start_at.le(end))
                .filter(calendar_events::end_at.ge(start));
        }
        if let Some(types) = &query.event_types {
            let types: Vec<&str> = types.iter().map(EventType::as_str).collect();
            q = q.filter(calendar_events::event_type.eq_any(types));
        }
        if let Some(statuses) = &query.statuses {
            let statuses: Vec<&str> = statuses.iter().map(EventStatus::as_str).collect();
            q = q.filter(calendar_events::status.eq_any(statuses));
        }
        if !query.include_rejected {
            q = q.filter(calendar_events::status.ne(EventStatus::Rejected.as_str()));
        }

        let records = q
            .order((calendar_events::start_at.asc(), calendar_events::created_at.asc()))
            .load(&mut conn)
            .await
            .context("Failed to list calendar events")?;

        decode_all(records)
    }

    async fn update_details(
        &self,
        id: Uuid,
        details: EventDetails,
    ) -> WorkflowResult<Option<CalendarEvent>> {
        let mut conn = connect(&self.pool).await?;

        let record = diesel::update(
            calendar_events::table
                .find(id)
                .filter(calendar_events::is_deleted.eq(false))
                .filter(calendar_events::is_read_only.eq(false)),
        )
        .set((
            calendar_events::title.eq(details.title),
            calendar_events::description.eq(details.description),
            calendar_events::start_at.eq(details.start_at),
            calendar_events::end_at.eq(details.end_at),
            calendar_events::all_day.eq(details.all_day),
            calendar_events::updated_at.eq(Utc::now()),
        ))
        .returning(EventRecord::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .context("Failed to update calendar event")?;

        record.map(decode).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: StatusTransition,
        guard: Option<OverlapGuard>,
    ) -> WorkflowResult<Option<CalendarEvent>> {
        let mut conn = connect(&self.pool).await?;

        let outcome = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    if let Some(guard) = guard {
                        if confirmed_clash(conn, id, guard).await? {
                            return Ok(Guarded::Clash);
                        }
                    }
                    let record = apply_transition(conn, id, transition).await.optional()?;
                    Ok(Guarded::Applied(record))
                }
                .scope_boxed()
            })
            .await
            .context("Failed to apply status transition")?;

        match outcome {
            Guarded::Applied(record) => record.map(decode).transpose(),
            Guarded::Clash => Err(overlap_error()),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> WorkflowResult<bool> {
        let mut conn = connect(&self.pool).await?;

        let affected = diesel::update(
            calendar_events::table
                .find(id)
                .filter(calendar_events::is_deleted.eq(false)),
        )
        .set((
            calendar_events::is_deleted.eq(true),
            calendar_events::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await
        .context("Failed to delete calendar event")?;

        Ok(affected > 0)
    }
}

enum Guarded {
    Applied(Option<EventRecord>),
    Clash,
}

/// Locks the child's home-days that share the guarded span, then looks for
/// a confirmed one at another home. Clashing confirmations lock the same
/// rows, in id order, so the second one sees the first one's commit.
async fn confirmed_clash(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    guard: OverlapGuard,
) -> QueryResult<bool> {
    let Some(child_id) = calendar_events::table
        .find(id)
        .select(calendar_events::child_id)
        .first::<Uuid>(conn)
        .await
        .optional()?
    else {
        return Ok(false);
    };

    calendar_events::table
        .filter(calendar_events::child_id.eq(child_id))
        .filter(calendar_events::event_type.eq(EventType::HomeDay.as_str()))
        .filter(calendar_events::is_deleted.eq(false))
        .filter(calendar_events::start_at.le(guard.end_at))
        .filter(calendar_events::end_at.ge(guard.start_at))
        .order(calendar_events::id)
        .select(calendar_events::id)
        .for_update()
        .load::<Uuid>(conn)
        .await?;

    diesel::select(diesel::dsl::exists(
        calendar_events::table
            .filter(calendar_events::child_id.eq(child_id))
            .filter(calendar_events::id.ne(id))
            .filter(calendar_events::event_type.eq(EventType::HomeDay.as_str()))
            .filter(calendar_events::status.eq(EventStatus::Confirmed.as_str()))
            .filter(calendar_events::is_deleted.eq(false))
            .filter(calendar_events::home_id.ne(guard.home_id))
            .filter(calendar_events::start_at.le(guard.end_at))
            .filter(calendar_events::end_at.ge(guard.start_at)),
    ))
    .get_result(conn)
    .await
}

/// UPDATE ... WHERE status = 'proposed' RETURNING *; zero rows means
/// someone else decided first
async fn apply_transition(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    transition: StatusTransition,
) -> QueryResult<EventRecord> {
    let target = diesel::update(
        calendar_events::table
            .find(id)
            .filter(calendar_events::is_deleted.eq(false))
            .filter(calendar_events::event_type.eq(EventType::HomeDay.as_str()))
            .filter(calendar_events::status.eq(EventStatus::Proposed.as_str())),
    );

    match transition {
        StatusTransition::Confirm { by, at } => {
            target
                .set((
                    calendar_events::status.eq(EventStatus::Confirmed.as_str()),
                    calendar_events::confirmed_by.eq(Some(by)),
                    calendar_events::confirmed_at.eq(Some(at)),
                    calendar_events::updated_at.eq(at),
                ))
                .returning(EventRecord::as_returning())
                .get_result(conn)
                .await
        }
        StatusTransition::Reject { by, at } => {
            target
                .set((
                    calendar_events::status.eq(EventStatus::Rejected.as_str()),
                    calendar_events::rejected_by.eq(Some(by)),
                    calendar_events::rejected_at.eq(Some(at)),
                    calendar_events::updated_at.eq(at),
                ))
                .returning(EventRecord::as_returning())
                .get_result(conn)
                .await
        }
    }
}

enum Applied {
    Inserted,
    Updated,
    Unchanged,
}

#[async_trait]
impl ExternalEventStore for PgStore {
    async fn upsert_external_event(
        &self,
        source_id: Uuid,
        external_event_id: &str,
        event: NewCalendarEvent,
    ) -> WorkflowResult<UpsertOutcome> {
        let mut conn = connect(&self.pool).await?;
        let now = Utc::now();
        let incoming = EventRecord::from(&materialize(Uuid::new_v4(), event, now));
        let external_id = external_event_id.to_string();

        let (applied, record) = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let existing = calendar_event_mappings::table
                        .inner_join(calendar_events::table)
                        .filter(calendar_event_mappings::source_id.eq(source_id))
                        .filter(calendar_event_mappings::external_event_id.eq(&external_id))
                        .filter(calendar_events::is_deleted.eq(false))
                        .select(EventRecord::as_select())
                        .first(conn)
                        .await
                        .optional()?;

                    if let Some(existing) = existing {
                        if existing.same_import(&incoming) {
                            return Ok((Applied::Unchanged, existing));
                        }
                        let updated = diesel::update(calendar_events::table.find(existing.id))
                            .set((
                                calendar_events::title.eq(&incoming.title),
                                calendar_events::description.eq(&incoming.description),
                                calendar_events::start_at.eq(incoming.start_at),
                                calendar_events::end_at.eq(incoming.end_at),
                                calendar_events::all_day.eq(incoming.all_day),
                                calendar_events::event_type.eq(&incoming.event_type),
                                calendar_events::home_id.eq(incoming.home_id),
                                calendar_events::from_home_id.eq(incoming.from_home_id),
                                calendar_events::to_home_id.eq(incoming.to_home_id),
                                calendar_events::from_location.eq(&incoming.from_location),
                                calendar_events::to_location.eq(&incoming.to_location),
                                calendar_events::external_provider.eq(&incoming.external_provider),
                                calendar_events::external_calendar_id
                                    .eq(&incoming.external_calendar_id),
                                calendar_events::external_event_id.eq(&incoming.external_event_id),
                                calendar_events::external_html_link.eq(&incoming.external_html_link),
                                calendar_events::updated_at.eq(now),
                            ))
                            .returning(EventRecord::as_returning())
                            .get_result(conn)
                            .await?;
                        return Ok((Applied::Updated, updated));
                    }

                    let inserted = diesel::insert_into(calendar_events::table)
                        .values(&incoming)
                        .returning(EventRecord::as_returning())
                        .get_result(conn)
                        .await?;

                    // a mapping left pointing at a deleted row is re-pointed
                    diesel::insert_into(calendar_event_mappings::table)
                        .values(MappingRecord {
                            source_id,
                            external_event_id: external_id.clone(),
                            event_id: inserted.id,
                            created_at: now,
                        })
                        .on_conflict((
                            calendar_event_mappings::source_id,
                            calendar_event_mappings::external_event_id,
                        ))
                        .do_update()
                        .set(calendar_event_mappings::event_id.eq(inserted.id))
                        .execute(conn)
                        .await?;

                    Ok((Applied::Inserted, inserted))
                }
                .scope_boxed()
            })
            .await
            .context("Failed to upsert external event")?;

        let event = decode(record)?;
        Ok(match applied {
            Applied::Inserted => UpsertOutcome::Inserted(event),
            Applied::Updated => UpsertOutcome::Updated(event),
            Applied::Unchanged => UpsertOutcome::Unchanged(event),
        })
    }

    async fn mapped_events(&self, source_id: Uuid) -> WorkflowResult<Vec<MappedEvent>> {
        let mut conn = connect(&self.pool).await?;

        let rows: Vec<(MappingRecord, EventRecord)> = calendar_event_mappings::table
            .inner_join(calendar_events::table)
            .filter(calendar_event_mappings::source_id.eq(source_id))
            .filter(calendar_events::is_deleted.eq(false))
            .order(calendar_events::start_at.asc())
            .select((MappingRecord::as_select(), EventRecord::as_select()))
            .load(&mut conn)
            .await
            .context("Failed to load mapped events")?;

        rows.into_iter()
            .map(|(mapping, record)| {
                Ok(MappedEvent {
                    mapping: mapping.into(),
                    event: decode(record)?,
                })
            })
            .collect()
    }

    async fn remove_mapped_event(
        &self,
        source_id: Uuid,
        external_event_id: &str,
    ) -> WorkflowResult<bool> {
        let mut conn = connect(&self.pool).await?;
        let external_id = external_event_id.to_string();

        let removed = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let event_id: Option<Uuid> = diesel::delete(
                        calendar_event_mappings::table
                            .filter(calendar_event_mappings::source_id.eq(source_id))
                            .filter(calendar_event_mappings::external_event_id.eq(&external_id)),
                    )
                    .returning(calendar_event_mappings::event_id)
                    .get_result(conn)
                    .await
                    .optional()?;

                    let Some(event_id) = event_id else {
                        return Ok(false);
                    };
                    diesel::update(calendar_events::table.find(event_id))
                        .set((
                            calendar_events::is_deleted.eq(true),
                            calendar_events::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await
            .context("Failed to remove mapped event")?;

        Ok(removed)
    }

    async fn unlink_source(&self, source_id: Uuid) -> WorkflowResult<usize> {
        let mut conn = connect(&self.pool).await?;

        let removed = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let event_ids: Vec<Uuid> = diesel::delete(
                        calendar_event_mappings::table
                            .filter(calendar_event_mappings::source_id.eq(source_id)),
                    )
                    .returning(calendar_event_mappings::event_id)
                    .get_results(conn)
                    .await?;

                    diesel::update(
                        calendar_events::table
                            .filter(calendar_events::id.eq_any(event_ids))
                            .filter(calendar_events::is_deleted.eq(false)),
                    )
                    .set((
                        calendar_events::is_deleted.eq(true),
                        calendar_events::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await
                }
                .scope_boxed()
            })
            .await
            .context("Failed to unlink calendar source")?;

        Ok(removed)
    }
}

#[async_trait]
impl SourceStore for PgStore {
    async fn list_enabled_sources(&self) -> WorkflowResult<Vec<CalendarSource>> {
        let mut conn = connect(&self.pool).await?;

        let records = calendar_sources::table
            .filter(calendar_sources::enabled.eq(true))
            .order(calendar_sources::created_at.asc())
            .select(SourceRecord::as_select())
            .load(&mut conn)
            .await
            .context("Failed to list calendar sources")?;

        Ok(records.into_iter().map(CalendarSource::from).collect())
    }

    async fn list_sources_for_child(&self, child_id: Uuid) -> WorkflowResult<Vec<CalendarSource>> {
        let mut conn = connect(&self.pool).await?;

        let records = calendar_sources::table
            .filter(calendar_sources::child_id.eq(child_id))
            .order(calendar_sources::created_at.asc())
            .select(SourceRecord::as_select())
            .load(&mut conn)
            .await
            .context("Failed to list calendar sources")?;

        Ok(records.into_iter().map(CalendarSource::from).collect())
    }

    async fn get_source(&self, id: Uuid) -> WorkflowResult<Option<CalendarSource>> {
        let mut conn = connect(&self.pool).await?;

        let record = calendar_sources::table
            .find(id)
            .select(SourceRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .context("Failed to load calendar source")?;

        Ok(record.map(CalendarSource::from))
    }

    async fn create_source(&self, source: NewCalendarSource) -> WorkflowResult<CalendarSource> {
        let mut conn = connect(&self.pool).await?;
        let now = Utc::now();
        let (calendar_id, url_hash) = match source.kind {
            SourceKind::Google { calendar_id } => (Some(calendar_id), None),
            SourceKind::Ics { url_hash } => (None, Some(url_hash)),
        };
        let record = SourceRecord {
            id: Uuid::new_v4(),
            child_id: source.child_id,
            owner_id: source.owner_id,
            name: source.name,
            provider: source.provider.as_str().to_string(),
            calendar_id,
            url_hash,
            credentials_encrypted: source.credentials_encrypted,
            enabled: true,
            sync_requested: true,
            sync_status: SyncStatus::Pending.as_str().to_string(),
            last_synced_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        };

        let inserted = diesel::insert_into(calendar_sources::table)
            .values(&record)
            .returning(SourceRecord::as_returning())
            .get_result(&mut conn)
            .await
            .context("Failed to create calendar source")?;

        Ok(inserted.into())
    }

    async fn find_source_by_url_hash(
        &self,
        child_id: Uuid,
        url_hash: &str,
    ) -> WorkflowResult<Option<CalendarSource>> {
        let mut conn = connect(&self.pool).await?;

        let record = calendar_sources::table
            .filter(calendar_sources::child_id.eq(child_id))
            .filter(calendar_sources::url_hash.eq(url_hash))
            .select(SourceRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .context("Failed to look up calendar source")?;

        Ok(record.map(CalendarSource::from))
    }

    async fn record_sync_result(
        &self,
        id: Uuid,
        status: SyncStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let mut conn = connect(&self.pool).await?;
        let target = diesel::update(calendar_sources::table.find(id));
        let status_col = calendar_sources::sync_status.eq(status.as_str().to_string());

        let result = match status {
            SyncStatus::Success => {
                target
                    .set((
                        status_col,
                        calendar_sources::last_synced_at.eq(Some(at)),
                        calendar_sources::last_sync_error.eq(None::<String>),
                        calendar_sources::updated_at.eq(at),
                    ))
                    .execute(&mut conn)
                    .await
            }
            SyncStatus::Failed | SyncStatus::AuthRequired => {
                target
                    .set((
                        status_col,
                        calendar_sources::last_sync_error.eq(error),
                        calendar_sources::updated_at.eq(at),
                    ))
                    .execute(&mut conn)
                    .await
            }
            SyncStatus::Pending | SyncStatus::Syncing => {
                target
                    .set((status_col, calendar_sources::updated_at.eq(at)))
                    .execute(&mut conn)
                    .await
            }
        };
        result.context("Failed to record sync result")?;

        Ok(())
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        credentials_encrypted: &str,
    ) -> WorkflowResult<()> {
        let mut conn = connect(&self.pool).await?;

        diesel::update(calendar_sources::table.find(id))
            .set((
                calendar_sources::credentials_encrypted.eq(credentials_encrypted),
                calendar_sources::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .context("Failed to update source credentials")?;

        Ok(())
    }

    async fn request_sync(
        &self,
        child_id: Uuid,
        source_id: Option<Uuid>,
    ) -> WorkflowResult<Vec<Uuid>> {
        let mut conn = connect(&self.pool).await?;
        let now = Utc::now();

        let flagged = match source_id {
            Some(source_id) => {
                diesel::update(
                    calendar_sources::table
                        .filter(calendar_sources::child_id.eq(child_id))
                        .filter(calendar_sources::enabled.eq(true))
                        .filter(calendar_sources::id.eq(source_id)),
                )
                .set((
                    calendar_sources::sync_requested.eq(true),
                    calendar_sources::updated_at.eq(now),
                ))
                .returning(calendar_sources::id)
                .get_results::<Uuid>(&mut conn)
                .await
            }
            None => {
                diesel::update(
                    calendar_sources::table
                        .filter(calendar_sources::child_id.eq(child_id))
                        .filter(calendar_sources::enabled.eq(true)),
                )
                .set((
                    calendar_sources::sync_requested.eq(true),
                    calendar_sources::updated_at.eq(now),
                ))
                .returning(calendar_sources::id)
                .get_results::<Uuid>(&mut conn)
                .await
            }
        }
        .context("Failed to request sync")?;

        Ok(flagged)
    }

    async fn take_sync_requests(&self) -> WorkflowResult<Vec<CalendarSource>> {
        let mut conn = connect(&self.pool).await?;

        let records = diesel::update(
            calendar_sources::table
                .filter(calendar_sources::enabled.eq(true))
                .filter(calendar_sources::sync_requested.eq(true)),
        )
        .set(calendar_sources::sync_requested.eq(false))
        .returning(SourceRecord::as_returning())
        .get_results(&mut conn)
        .await
        .context("Failed to take sync requests")?;

        Ok(records.into_iter().map(CalendarSource::from).collect())
    }

    async fn delete_source(&self, id: Uuid) -> WorkflowResult<bool> {
        let mut conn = connect(&self.pool).await?;

        let affected = diesel::delete(calendar_sources::table.find(id))
            .execute(&mut conn)
            .await
            .context("Failed to delete calendar source")?;

        Ok(affected > 0)
    }
}

/// Roster read from the family tables
#[derive(Clone)]
pub struct PgRoster {
    pool: DbPool,
}

impl PgRoster {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Roster for PgRoster {
    async fn guardians(&self, child_id: Uuid) -> WorkflowResult<Vec<Uuid>> {
        let mut conn = connect(&self.pool).await?;

        let guardians = child_guardians::table
            .filter(child_guardians::child_id.eq(child_id))
            .filter(child_guardians::role.eq_any(GUARDIAN_ROLES.to_vec()))
            .select(child_guardians::user_id)
            .load::<Uuid>(&mut conn)
            .await
            .context("Failed to load guardians")?;

        Ok(guardians)
    }

    async fn display_name(&self, user_id: Uuid) -> WorkflowResult<Option<String>> {
        let mut conn = connect(&self.pool).await?;

        let name = profiles::table
            .find(user_id)
            .select(profiles::display_name)
            .first::<String>(&mut conn)
            .await
            .optional()
            .context("Failed to load display name")?;

        Ok(name)
    }

    async fn homes(&self, child_id: Uuid) -> WorkflowResult<Vec<Home>> {
        let mut conn = connect(&self.pool).await?;

        let rows = child_homes::table
            .inner_join(homes::table)
            .filter(child_homes::child_id.eq(child_id))
            .order(homes::name.asc())
            .select((homes::id, homes::name))
            .load::<(Uuid, String)>(&mut conn)
            .await
            .context("Failed to load homes")?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Home { id, name })
            .collect())
    }
}
