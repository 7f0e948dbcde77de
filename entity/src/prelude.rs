pub use super::track::Entity as Track;
