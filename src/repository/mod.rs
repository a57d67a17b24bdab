//! Cache coordination between the local store and the remote API.
//!
//! Reads are local-first. Remote results are written back with upserts, the
//! character listing is paged in through a durable cursor, and the
//! character/episode association is materialized on first access.

mod character;
mod cursor;
mod episode;
mod error;
#[cfg(test)]
mod testing;

pub use character::CharacterRepository;
pub use cursor::PageCursor;
pub use episode::EpisodeRepository;
pub use error::RepoError;
