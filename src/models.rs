/// A character as served to callers.
///
/// `episodes` is only filled in by detail lookups; list views and the
/// character table itself never carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
  pub id: i64,
  pub name: String,
  pub status: String,
  pub species: String,
  pub origin: String,
  pub image_url: String,
  /// Episode URLs in the order the API lists them
  pub episode_refs: Vec<String>,
  pub episodes: Vec<Episode>,
}

/// A single episode. Never changes once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
  pub id: i64,
  pub name: String,
  pub air_date: String,
  /// Season/episode code, e.g. "S01E01"
  pub episode_code: String,
  pub url: String,
}

/// Join row between a character and one of its episodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterEpisodeLink {
  pub character_id: i64,
  pub episode_id: i64,
}
