use std::collections::HashSet;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::library::{Track, ValidationError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a track with id {0} already exists")]
    DuplicateKey(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("malformed track document: {0}")]
    Document(#[from] serde_json::Error),
}

/// A case-insensitive containment match on one track field.
#[derive(Debug, Clone)]
pub enum TrackFilter {
    Artist(Regex),
    Name(Regex),
    ReleaseDate(Regex),
}

impl TrackFilter {
    pub fn artist(pattern: &str) -> Result<Self, regex::Error> {
        Ok(TrackFilter::Artist(case_insensitive(pattern)?))
    }

    pub fn name(pattern: &str) -> Result<Self, regex::Error> {
        Ok(TrackFilter::Name(case_insensitive(pattern)?))
    }

    pub fn release_date(pattern: &str) -> Result<Self, regex::Error> {
        Ok(TrackFilter::ReleaseDate(case_insensitive(pattern)?))
    }

    pub fn matches(&self, track: &Track) -> bool {
        match self {
            TrackFilter::Artist(re) => track.artist_names().any(|name| re.is_match(name)),
            TrackFilter::Name(re) => track.name.as_deref().is_some_and(|name| re.is_match(name)),
            TrackFilter::ReleaseDate(re) => track.release_date().is_some_and(|date| re.is_match(date)),
        }
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Change applied to a single stored track inside one atomic operation.
pub type TrackChange<'a> = &'a (dyn Fn(&mut Track) -> Result<(), ValidationError> + Send + Sync);

/// Persistence of track documents. Every method is atomic for the documents
/// it touches; nothing spans more than one call.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Inserts all tracks or none of them. Fails with `DuplicateKey` when an
    /// id is already stored or repeats within `tracks`.
    async fn insert_many(&self, tracks: &[Track]) -> Result<(), StoreError>;

    async fn find_one(&self, id: &str) -> Result<Option<Track>, StoreError>;

    /// All tracks in insertion order, restricted to `filter` when given.
    async fn find(&self, filter: Option<&TrackFilter>) -> Result<Vec<Track>, StoreError>;

    /// Applies `change` to the stored track and persists the whole document.
    /// Nothing is written when `change` fails. Returns the new document.
    async fn modify_one(&self, id: &str, change: TrackChange<'_>) -> Result<Option<Track>, StoreError>;

    async fn delete_one(&self, id: &str) -> Result<Option<Track>, StoreError>;
}

pub(crate) fn first_duplicate<'a>(tracks: &'a [Track], stored: &HashSet<&str>) -> Option<&'a str> {
    let mut seen = HashSet::new();
    tracks
        .iter()
        .map(|track| track.id.as_str())
        .find(|id| stored.contains(id) || !seen.insert(*id))
}

#[derive(Default)]
pub struct MemoryStore {
    tracks: RwLock<Vec<Track>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn insert_many(&self, tracks: &[Track]) -> Result<(), StoreError> {
        let mut stored = self.tracks.write().await;
        let ids: HashSet<&str> = stored.iter().map(|track| track.id.as_str()).collect();
        if let Some(id) = first_duplicate(tracks, &ids) {
            return Err(StoreError::DuplicateKey(id.to_string()));
        }
        stored.extend_from_slice(tracks);
        Ok(())
    }

    async fn find_one(&self, id: &str) -> Result<Option<Track>, StoreError> {
        let stored = self.tracks.read().await;
        Ok(stored.iter().find(|track| track.id == id).cloned())
    }

    async fn find(&self, filter: Option<&TrackFilter>) -> Result<Vec<Track>, StoreError> {
        let stored = self.tracks.read().await;
        Ok(stored
            .iter()
            .filter(|track| filter.map_or(true, |f| f.matches(track)))
            .cloned()
            .collect())
    }

    async fn modify_one(&self, id: &str, change: TrackChange<'_>) -> Result<Option<Track>, StoreError> {
        let mut stored = self.tracks.write().await;
        let Some(slot) = stored.iter_mut().find(|track| track.id == id) else {
            return Ok(None);
        };
        let mut document = slot.clone();
        change(&mut document)?;
        *slot = document.clone();
        Ok(Some(document))
    }

    async fn delete_one(&self, id: &str) -> Result<Option<Track>, StoreError> {
        let mut stored = self.tracks.write().await;
        let position = stored.iter().position(|track| track.id == id);
        Ok(position.map(|position| stored.remove(position)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::tests::track;

    #[tokio::test]
    async fn duplicate_batch_inserts_nothing() {
        let store = MemoryStore::new();
        store.insert_many(&[track("t1", "Foo", "Queen", "1975")]).await.unwrap();

        let batch = [track("t2", "Bar", "Queen", "1975"), track("t1", "Changed", "Queen", "1975")];
        let err = store.insert_many(&batch).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(id) if id == "t1"));

        assert!(store.find_one("t2").await.unwrap().is_none());
        assert_eq!(store.find_one("t1").await.unwrap().unwrap().name.as_deref(), Some("Foo"));
    }

    #[tokio::test]
    async fn repeated_id_within_a_batch_is_a_duplicate() {
        let store = MemoryStore::new();
        let batch = [track("t1", "Foo", "Queen", "1975"), track("t1", "Foo", "Queen", "1975")];
        assert!(matches!(store.insert_many(&batch).await, Err(StoreError::DuplicateKey(_))));
        assert!(store.find(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_change_writes_nothing() {
        let store = MemoryStore::new();
        store.insert_many(&[track("t1", "Foo", "Queen", "1975")]).await.unwrap();

        let change = |stored: &mut Track| -> Result<(), ValidationError> {
            stored.name = Some("Partial".to_string());
            Err(ValidationError("rejected".to_string()))
        };
        assert!(store.modify_one("t1", &change).await.is_err());
        assert_eq!(store.find_one("t1").await.unwrap().unwrap().name.as_deref(), Some("Foo"));
        assert!(store.modify_one("missing", &change).await.unwrap().is_none());
    }

    #[test]
    fn filters_match_case_insensitively_by_containment() {
        let abbey_road = track("t1", "Come Together", "The Beatles", "1969-09-26");

        assert!(TrackFilter::artist("beatles").unwrap().matches(&abbey_road));
        assert!(!TrackFilter::artist("queen").unwrap().matches(&abbey_road));
        assert!(TrackFilter::name("TOGETHER").unwrap().matches(&abbey_road));
        assert!(TrackFilter::release_date("1969").unwrap().matches(&abbey_road));
        assert!(!TrackFilter::release_date("^09").unwrap().matches(&abbey_road));
    }
}
