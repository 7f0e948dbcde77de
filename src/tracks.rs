use log::{debug, info};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::library::{Comment, NewComment, Track, ValidationError};
use crate::store::{TrackFilter, TrackStore};

const TRACK_NOT_FOUND: &str = "no track found with the specified id";

/// A single track or a list of them, as accepted by `POST /tracks`.
#[derive(Debug)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // decided on the JSON shape so the item's own error is reported
        match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    serde_json::from_value(item).map_err(|e| D::Error::custom(format!("item {}: {}", index, e)))
                })
                .collect::<Result<Vec<T>, D::Error>>()
                .map(OneOrMany::Many),
            item => serde_json::from_value(item).map(OneOrMany::One).map_err(D::Error::custom),
        }
    }
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FieldQuery {
    pub artist: Option<String>,
    pub name: Option<String>,
    pub date: Option<String>,
}

impl FieldQuery {
    /// The filters to evaluate, in evaluation order. Empty values are skipped.
    pub fn filters(&self) -> Result<Vec<TrackFilter>, AppError> {
        let fields: [(&Option<String>, fn(&str) -> Result<TrackFilter, regex::Error>); 3] = [
            (&self.artist, TrackFilter::artist),
            (&self.name, TrackFilter::name),
            (&self.date, TrackFilter::release_date),
        ];

        fields
            .into_iter()
            .filter_map(|(value, build)| value.as_deref().filter(|v| !v.is_empty()).map(build))
            .map(|filter| filter.map_err(|e| AppError::Validation(format!("invalid search pattern: {}", e))))
            .collect()
    }
}

fn not_found() -> AppError {
    AppError::NotFound(TRACK_NOT_FOUND.to_string())
}

pub async fn insert_tracks(store: &dyn TrackStore, tracks: Vec<Track>) -> Result<Vec<Track>, AppError> {
    let mut tracks = tracks;
    for track in tracks.iter_mut() {
        track.assign_comment_ids();
        track.validate().map_err(|e| AppError::Validation(e.0))?;
    }

    store.insert_many(&tracks).await?;
    info!("Inserted {} tracks", tracks.len());
    Ok(tracks)
}

pub async fn find_by_id(store: &dyn TrackStore, id: &str) -> Result<Track, AppError> {
    store.find_one(id).await?.ok_or_else(not_found)
}

pub async fn find_all(store: &dyn TrackStore) -> Result<Vec<Track>, AppError> {
    Ok(store.find(None).await?)
}

/// Runs every supplied filter in turn. Filters are not combined: each one
/// replaces the previous result, so the last supplied field decides.
pub async fn find_by_field(store: &dyn TrackStore, query: &FieldQuery) -> Result<Vec<Track>, AppError> {
    let mut tracks = Vec::new();
    for filter in query.filters()? {
        tracks = store.find(Some(&filter)).await?;
    }
    Ok(tracks)
}

pub async fn update(store: &dyn TrackStore, id: &str, patch: &Map<String, Value>) -> Result<Track, AppError> {
    let change = |track: &mut Track| -> Result<(), ValidationError> {
        *track = track.apply_patch(patch)?;
        Ok(())
    };
    store.modify_one(id, &change).await?.ok_or_else(not_found)
}

pub async fn delete(store: &dyn TrackStore, id: &str) -> Result<Track, AppError> {
    let track = store.delete_one(id).await?.ok_or_else(not_found)?;
    info!("Deleted track {} with {} comments", track.id, track.comments.len());
    Ok(track)
}

pub async fn append_comment(store: &dyn TrackStore, track_id: &str, comment: NewComment) -> Result<Comment, AppError> {
    let comment = comment.into_comment();
    let change = |track: &mut Track| track.push_comment(comment.clone());
    store.modify_one(track_id, &change).await?.ok_or_else(not_found)?;
    Ok(comment)
}

/// Removing a comment id the track does not hold leaves the sequence as it is.
pub async fn remove_comment(store: &dyn TrackStore, track_id: &str, comment_id: &str) -> Result<Vec<Comment>, AppError> {
    let change = |track: &mut Track| -> Result<(), ValidationError> {
        if track.remove_comment(comment_id).is_none() {
            debug!("Track {} has no comment {}", track.id, comment_id);
        }
        Ok(())
    };
    let track = store.modify_one(track_id, &change).await?.ok_or_else(not_found)?;
    Ok(track.comments)
}

pub async fn list_comments(store: &dyn TrackStore, track_id: &str) -> Result<Vec<Comment>, AppError> {
    Ok(find_by_id(store, track_id).await?.comments)
}
