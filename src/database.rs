use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, NotSet, QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionTrait,
};

use entity::prelude::Track as TrackDocument;
use entity::track;

use crate::library::Track;
use crate::store::{first_duplicate, StoreError, TrackChange, TrackFilter, TrackStore};

pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);
    Database::connect(opt).await
}

/// Track documents kept as JSON text in the `track` table.
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_active_model(track: &Track) -> Result<track::ActiveModel, StoreError> {
    let now = Utc::now();
    Ok(track::ActiveModel {
        id: NotSet,
        track_id: Set(track.id.clone()),
        document: Set(serde_json::to_string(track)?),
        created: Set(now),
        modified: Set(now),
    })
}

fn from_model(model: &track::Model) -> Result<Track, StoreError> {
    Ok(serde_json::from_str(&model.document)?)
}

fn classify(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::DuplicateKey(detail),
        _ => StoreError::Database(err),
    }
}

async fn find_model<C: ConnectionTrait>(conn: &C, id: &str, lock: bool) -> Result<Option<track::Model>, DbErr> {
    let mut query = TrackDocument::find().filter(track::Column::TrackId.eq(id));
    if lock {
        query = query.lock_exclusive();
    }
    query.one(conn).await
}

#[async_trait]
impl TrackStore for DatabaseStore {
    async fn insert_many(&self, tracks: &[Track]) -> Result<(), StoreError> {
        if tracks.is_empty() {
            return Ok(());
        }
        let models = tracks.iter().map(to_active_model).collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<&str> = tracks.iter().map(|track| track.id.as_str()).collect();

        let txn = self.db.begin().await?;
        let existing: Vec<String> = TrackDocument::find()
            .select_only()
            .column(track::Column::TrackId)
            .filter(track::Column::TrackId.is_in(ids))
            .into_tuple()
            .all(&txn)
            .await?;
        let existing: HashSet<&str> = existing.iter().map(String::as_str).collect();
        if let Some(id) = first_duplicate(tracks, &existing) {
            return Err(StoreError::DuplicateKey(id.to_string()));
        }

        TrackDocument::insert_many(models).exec(&txn).await.map_err(classify)?;
        txn.commit().await?;
        debug!("Inserted {} track documents", tracks.len());
        Ok(())
    }

    async fn find_one(&self, id: &str) -> Result<Option<Track>, StoreError> {
        find_model(&self.db, id, false).await?.as_ref().map(from_model).transpose()
    }

    async fn find(&self, filter: Option<&TrackFilter>) -> Result<Vec<Track>, StoreError> {
        let models = TrackDocument::find()
            .order_by_asc(track::Column::Id)
            .all(&self.db)
            .await?;

        let mut tracks = Vec::with_capacity(models.len());
        for model in &models {
            let track = from_model(model)?;
            if filter.map_or(true, |f| f.matches(&track)) {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    async fn modify_one(&self, id: &str, change: TrackChange<'_>) -> Result<Option<Track>, StoreError> {
        let txn = self.db.begin().await?;
        let Some(model) = find_model(&txn, id, true).await? else {
            return Ok(None);
        };

        let mut document = from_model(&model)?;
        change(&mut document)?;

        let mut active: track::ActiveModel = model.into();
        active.document = Set(serde_json::to_string(&document)?);
        active.modified = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;
        Ok(Some(document))
    }

    async fn delete_one(&self, id: &str) -> Result<Option<Track>, StoreError> {
        let txn = self.db.begin().await?;
        let Some(model) = find_model(&txn, id, true).await? else {
            return Ok(None);
        };

        let document = from_model(&model)?;
        TrackDocument::delete_by_id(model.id).exec(&txn).await?;
        txn.commit().await?;
        Ok(Some(document))
    }
}
