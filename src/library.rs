use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted comment text, in characters.
pub const MAX_COMMENT_LENGTH: usize = 1000;

/// Keys of a partial track document that never overwrite the stored identity.
const IDENTITY_KEYS: [&str; 2] = ["id", "_id"];

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TrackDocument")]
pub struct Track {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<Album>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub comments: Vec<Comment>,
}

/// Track as submitted by clients. `_id` is an alternate identity field that
/// only fills `id` when `id` itself is absent or blank.
#[derive(Deserialize)]
struct TrackDocument {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "_id")]
    legacy_id: Option<Value>,
    album: Option<Album>,
    name: Option<String>,
    duration_ms: Option<u64>,
    preview_url: Option<String>,
    location: Option<Location>,
    #[serde(default)]
    comments: Vec<Comment>,
}

impl From<TrackDocument> for Track {
    fn from(document: TrackDocument) -> Self {
        Track {
            id: canonical_id(document.id, document.legacy_id),
            album: document.album,
            name: document.name,
            duration_ms: document.duration_ms,
            preview_url: document.preview_url,
            location: document.location,
            comments: document.comments,
        }
    }
}

fn canonical_id(id: String, legacy_id: Option<Value>) -> String {
    if !id.is_empty() {
        return id;
    }
    match legacy_id {
        Some(Value::String(legacy)) => legacy,
        Some(Value::Number(legacy)) => legacy.to_string(),
        _ => id,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Album {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date_precision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tracks: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(rename = "imageBase64String", skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CommentDocument")]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Deserialize)]
struct CommentDocument {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "_id")]
    legacy_id: Option<Value>,
    #[serde(default)]
    author: String,
    #[serde(default)]
    text: String,
    score: Option<f64>,
    location: Option<Location>,
}

impl From<CommentDocument> for Comment {
    fn from(document: CommentDocument) -> Self {
        Comment {
            id: canonical_id(document.id, document.legacy_id),
            author: document.author,
            text: document.text,
            score: document.score,
            location: document.location,
        }
    }
}

/// Body of a comment submission. Comment ids are always assigned here, so
/// any `id` the caller sends is dropped during deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComment {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    pub score: Option<f64>,
    pub location: Option<Location>,
}

impl NewComment {
    pub fn into_comment(self) -> Comment {
        Comment {
            id: Uuid::new_v4().to_string(),
            author: self.author,
            text: self.text,
            score: self.score,
            location: self.location,
        }
    }
}

impl Comment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError("comment id is required".to_string()));
        }
        if self.author.is_empty() {
            return Err(ValidationError("comment author is required".to_string()));
        }
        if self.text.is_empty() {
            return Err(ValidationError("comment text is required".to_string()));
        }
        if self.text.chars().count() > MAX_COMMENT_LENGTH {
            return Err(ValidationError(format!(
                "comment text is longer than the maximum allowed length ({})",
                MAX_COMMENT_LENGTH
            )));
        }
        Ok(())
    }
}

impl Track {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError("track id is required".to_string()));
        }
        self.comments.iter().try_for_each(Comment::validate)
    }

    /// Gives every embedded comment without an id a freshly generated one.
    pub fn assign_comment_ids(&mut self) {
        for comment in self.comments.iter_mut().filter(|c| c.id.is_empty()) {
            comment.id = Uuid::new_v4().to_string();
        }
    }

    pub fn artist_names(&self) -> impl Iterator<Item = &str> {
        self.album
            .iter()
            .flat_map(|album| album.artists.iter())
            .filter_map(|artist| artist.name.as_deref())
    }

    pub fn release_date(&self) -> Option<&str> {
        self.album.as_ref().and_then(|album| album.release_date.as_deref())
    }

    /// Appends a comment at the end of the sequence after validating it.
    pub fn push_comment(&mut self, comment: Comment) -> Result<(), ValidationError> {
        comment.validate()?;
        self.comments.push(comment);
        Ok(())
    }

    /// Removes the comment with the given id, keeping the order of the rest.
    /// Returns `None` when no comment carries that id.
    pub fn remove_comment(&mut self, comment_id: &str) -> Option<Comment> {
        let position = self.comments.iter().position(|c| c.id == comment_id)?;
        Some(self.comments.remove(position))
    }

    /// Builds the document that results from replacing the top-level fields
    /// named in `patch`. Identity keys are ignored and `null` clears a field.
    pub fn apply_patch(&self, patch: &Map<String, Value>) -> Result<Track, ValidationError> {
        let mut document = match serde_json::to_value(self) {
            Ok(Value::Object(document)) => document,
            Ok(_) => return Err(ValidationError("track is not a document".to_string())),
            Err(e) => return Err(ValidationError(e.to_string())),
        };

        for (key, value) in patch {
            if IDENTITY_KEYS.contains(&key.as_str()) {
                continue;
            }
            if value.is_null() {
                document.remove(key);
            } else {
                document.insert(key.clone(), value.clone());
            }
        }

        let mut updated: Track = serde_json::from_value(Value::Object(document))
            .map_err(|e| ValidationError(format!("invalid track: {}", e)))?;
        updated.id = self.id.clone();
        updated.assign_comment_ids();
        updated.validate()?;
        Ok(updated)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn track(id: &str, name: &str, artist: &str, release_date: &str) -> Track {
        serde_json::from_value(json!({
            "id": id,
            "name": name,
            "album": {
                "id": format!("album-{}", id),
                "name": "Album",
                "artists": [{ "id": "a1", "name": artist }],
                "images": [{ "height": 640, "url": "https://i.scdn.co/image/x", "width": 640 }],
                "release_date": release_date,
                "release_date_precision": "day",
                "total_tracks": 12
            },
            "duration_ms": 180000,
            "preview_url": "https://p.scdn.co/mp3-preview/x"
        }))
        .unwrap()
    }

    fn comment(author: &str, text: &str) -> Comment {
        NewComment { author: author.to_string(), text: text.to_string(), ..Default::default() }.into_comment()
    }

    #[test]
    fn accepts_underscore_id_and_drops_unknown_fields() {
        let track: Track = serde_json::from_value(json!({ "_id": "t1", "popularity": 80, "name": "Foo" })).unwrap();
        assert_eq!(track.id, "t1");
        assert_eq!(track.name.as_deref(), Some("Foo"));

        let value = serde_json::to_value(&track).unwrap();
        assert_eq!(value, json!({ "id": "t1", "name": "Foo", "comments": [] }));
    }

    #[test]
    fn canonical_id_wins_over_the_alternate_identity_field() {
        let numeric: Track = serde_json::from_value(json!({ "_id": 42, "id": "t1", "name": "Foo" })).unwrap();
        assert_eq!(numeric.id, "t1");

        let both: Track = serde_json::from_value(json!({ "_id": "x", "id": "t1" })).unwrap();
        assert_eq!(both.id, "t1");
        assert!(serde_json::to_value(&both).unwrap().get("_id").is_none());

        let legacy_only: Track = serde_json::from_value(json!({ "_id": 42 })).unwrap();
        assert_eq!(legacy_only.id, "42");

        let comment: Comment = serde_json::from_value(json!({ "_id": 7, "id": "c1", "author": "a", "text": "t" })).unwrap();
        assert_eq!(comment.id, "c1");
    }

    #[test]
    fn image_base64_uses_the_wire_name() {
        let image: Image = serde_json::from_value(json!({ "imageBase64String": "abc" })).unwrap();
        assert_eq!(image.image_base64.as_deref(), Some("abc"));
    }

    #[test]
    fn track_requires_an_id() {
        let mut track = track("t1", "Foo", "The Beatles", "1969");
        track.id.clear();
        assert_eq!(track.validate(), Err(ValidationError("track id is required".to_string())));
    }

    #[test]
    fn comment_rules() {
        assert!(comment("a", "nice").validate().is_ok());
        assert!(comment("", "nice").validate().is_err());
        assert!(comment("a", "").validate().is_err());
        assert!(comment("a", &"x".repeat(MAX_COMMENT_LENGTH)).validate().is_ok());
        assert!(comment("a", &"x".repeat(MAX_COMMENT_LENGTH + 1)).validate().is_err());
        // length counts characters, not bytes
        assert!(comment("a", &"é".repeat(MAX_COMMENT_LENGTH)).validate().is_ok());
    }

    #[test]
    fn new_comment_ignores_client_id() {
        let new: NewComment = serde_json::from_value(json!({ "id": "mine", "author": "a", "text": "t" })).unwrap();
        let comment = new.into_comment();
        assert_ne!(comment.id, "mine");
        assert!(Uuid::parse_str(&comment.id).is_ok());
    }

    #[test]
    fn remove_comment_keeps_order_of_the_rest() {
        let mut track = track("t1", "Foo", "The Beatles", "1969");
        let comments: Vec<Comment> = (0..4).map(|i| comment("a", &format!("c{}", i))).collect();
        for c in &comments {
            track.push_comment(c.clone()).unwrap();
        }

        let removed = track.remove_comment(&comments[1].id).unwrap();
        assert_eq!(removed, comments[1]);
        assert_eq!(track.comments, vec![comments[0].clone(), comments[2].clone(), comments[3].clone()]);
        assert!(track.remove_comment("missing").is_none());
        assert_eq!(track.comments.len(), 3);
    }

    #[test]
    fn patch_replaces_top_level_fields_and_keeps_identity() {
        let original = track("t1", "Foo", "The Beatles", "1969");
        let patch = json!({ "id": "other", "name": "Bar", "preview_url": null });
        let updated = original.apply_patch(patch.as_object().unwrap()).unwrap();

        assert_eq!(updated.id, "t1");
        assert_eq!(updated.name.as_deref(), Some("Bar"));
        assert_eq!(updated.preview_url, None);
        assert_eq!(updated.album, original.album);
    }

    #[test]
    fn patch_is_revalidated() {
        let original = track("t1", "Foo", "The Beatles", "1969");
        let bad_type = json!({ "duration_ms": "long" });
        assert!(original.apply_patch(bad_type.as_object().unwrap()).is_err());

        let bad_comment = json!({ "comments": [{ "author": "a" }] });
        assert!(original.apply_patch(bad_comment.as_object().unwrap()).is_err());

        let good_comment = json!({ "comments": [{ "author": "a", "text": "t" }] });
        let updated = original.apply_patch(good_comment.as_object().unwrap()).unwrap();
        assert!(!updated.comments[0].id.is_empty());
    }
}
