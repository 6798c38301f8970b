mod cleanse;
mod matcher;
mod normalize;

pub use cleanse::{cleanse, strip_features, Field};
pub use matcher::{compare, is_collection, is_single, is_song_edit, MatchKind};
pub use normalize::normalize;
