//! Character list and detail lookups backed by the local cache.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::RemoteSource;
use crate::cache::CacheStorage;
use crate::models::{Character, Episode};

use super::episode::EpisodeRepository;
use super::{PageCursor, RepoError};

/// Serves characters from the local cache and pages them in from the API.
///
/// Fetches started in the background by `observe_characters` report their
/// outcome, success or failure, on the `loads` channel; everything else is
/// returned directly.
pub struct CharacterRepository<S, R> {
  storage: Arc<S>,
  remote: Arc<R>,
  episodes: EpisodeRepository<S, R>,
  loads: mpsc::UnboundedSender<Result<(), RepoError>>,
}

impl<S, R> CharacterRepository<S, R>
where
  S: CacheStorage + 'static,
  R: RemoteSource + 'static,
{
  pub fn new(
    storage: Arc<S>,
    remote: Arc<R>,
    episodes: EpisodeRepository<S, R>,
    loads: mpsc::UnboundedSender<Result<(), RepoError>>,
  ) -> Self {
    Self {
      storage,
      remote,
      episodes,
      loads,
    }
  }

  /// Live view of every cached character.
  ///
  /// Returns immediately with whatever is cached. When the cache is empty at
  /// the time of the call, the first page is fetched in a detached task and
  /// the receiver sees the new list once it is stored. The fetch outcome is
  /// sent on the `loads` channel even when nothing new was stored. Later
  /// empty emissions do not trigger another fetch.
  pub fn observe_characters(&self) -> watch::Receiver<Vec<Character>> {
    let rx = self.storage.watch_characters();
    let empty = rx.borrow().is_empty();

    if empty {
      debug!("Character cache empty, loading first page in background");
      let repo = self.clone();
      tokio::spawn(async move {
        let outcome = repo.load_next_page().await;
        if let Err(e) = &outcome {
          warn!(
            error = %e,
            transient = e.is_transient(),
            "Background page load failed"
          );
        }
        let _ = repo.loads.send(outcome);
      });
    }

    rx
  }

  /// Fetch the page the cursor points at and append it to the cache.
  ///
  /// No-op once the listing is exhausted. The cursor is only written after the
  /// fetch succeeds.
  pub async fn load_next_page(&self) -> Result<(), RepoError> {
    // Read-then-write without compare-and-swap: concurrent callers may fetch
    // the same page, which the upserts absorb.
    let page = match self.storage.get_next_page()? {
      PageCursor::Exhausted => {
        debug!("Character listing exhausted, nothing to load");
        return Ok(());
      }
      PageCursor::Start => None,
      PageCursor::Next(page) => Some(page),
    };

    let response = self.remote.get_characters(page).await?;

    let next = PageCursor::from_next_url(response.info.next.as_deref());
    self.storage.set_next_page(next)?;

    let characters: Vec<Character> = response
      .results
      .into_iter()
      .map(Character::from)
      .collect();
    self.storage.upsert_characters(&characters)?;

    info!(
      page = ?page,
      loaded = characters.len(),
      total = response.info.count,
      pages = response.info.pages,
      next = %next,
      "Loaded character page"
    );
    Ok(())
  }

  /// A single character with its episodes, local-first.
  pub async fn get_character(&self, id: i64) -> Result<Character, RepoError> {
    let character = match self.storage.get_character(id)? {
      Some(character) => {
        debug!(id, "Character served from cache");
        character
      }
      None => {
        let character: Character = self
          .remote
          .get_character(id)
          .await?
          .ok_or(RepoError::NotFound(id))?
          .into();
        self.storage.upsert_characters(std::slice::from_ref(&character))?;
        debug!(id, "Character fetched and cached");
        character
      }
    };

    let episodes = self.episodes.get_episodes(character.id).await?;
    Ok(Character {
      episodes,
      ..character
    })
  }

  /// Episodes for a character; see [`EpisodeRepository::get_episodes`].
  pub async fn get_episodes(&self, character_id: i64) -> Result<Vec<Episode>, RepoError> {
    self.episodes.get_episodes(character_id).await
  }
}

impl<S, R> Clone for CharacterRepository<S, R> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      remote: Arc::clone(&self.remote),
      episodes: self.episodes.clone(),
      loads: self.loads.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::repository::testing::{api_character, api_episode, api_page, next_url, FakeRemote};
  use std::time::Duration;

  type Repo = CharacterRepository<SqliteStorage, FakeRemote>;

  fn setup(
    remote: FakeRemote,
  ) -> (
    Arc<SqliteStorage>,
    Arc<FakeRemote>,
    Repo,
    mpsc::UnboundedReceiver<Result<(), RepoError>>,
  ) {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let remote = Arc::new(remote);
    let episodes = EpisodeRepository::new(Arc::clone(&storage), Arc::clone(&remote));
    let (tx, rx) = mpsc::unbounded_channel();
    let repo =
      CharacterRepository::new(Arc::clone(&storage), Arc::clone(&remote), episodes, tx);
    (storage, remote, repo, rx)
  }

  fn ids(characters: &[Character]) -> Vec<i64> {
    characters.iter().map(|c| c.id).collect()
  }

  #[tokio::test]
  async fn test_load_pages_follows_cursor() {
    let next_2 = next_url(2);
    let next_3 = next_url(3);
    let remote = FakeRemote::default()
      .with_page(None, api_page(&[1, 2], Some(&next_2)))
      .with_page(Some(2), api_page(&[3, 4], Some(&next_3)))
      .with_page(Some(3), api_page(&[5], None));
    let (storage, remote, repo, _loads) = setup(remote);

    repo.load_next_page().await.unwrap();
    assert_eq!(storage.get_next_page().unwrap(), PageCursor::Next(2));

    repo.load_next_page().await.unwrap();
    assert_eq!(storage.get_next_page().unwrap(), PageCursor::Next(3));

    repo.load_next_page().await.unwrap();
    assert_eq!(storage.get_next_page().unwrap(), PageCursor::Exhausted);

    assert_eq!(remote.page_requests(), vec![None, Some(2), Some(3)]);
    assert_eq!(ids(&storage.get_characters().unwrap()), vec![1, 2, 3, 4, 5]);
  }

  #[tokio::test]
  async fn test_exhausted_cursor_is_noop() {
    let (storage, remote, repo, _loads) = setup(FakeRemote::default());
    storage.set_next_page(PageCursor::Exhausted).unwrap();

    repo.load_next_page().await.unwrap();

    assert_eq!(remote.total_calls(), 0);
    assert_eq!(storage.stats().unwrap().characters, 0);
    assert_eq!(storage.get_next_page().unwrap(), PageCursor::Exhausted);
  }

  #[tokio::test]
  async fn test_failed_fetch_leaves_cursor_untouched() {
    let (storage, _remote, repo, _loads) = setup(FakeRemote::default().failing_pages());
    storage.set_next_page(PageCursor::Next(4)).unwrap();

    let err = repo.load_next_page().await.unwrap_err();
    assert!(matches!(err, RepoError::Remote(_)));
    assert!(err.is_transient());
    assert_eq!(storage.get_next_page().unwrap(), PageCursor::Next(4));
  }

  #[tokio::test]
  async fn test_malformed_next_marks_exhausted() {
    let remote = FakeRemote::default().with_page(
      None,
      api_page(&[1], Some("https://rickandmortyapi.com/api/character?page=abc")),
    );
    let (storage, _remote, repo, _loads) = setup(remote);

    repo.load_next_page().await.unwrap();
    assert_eq!(storage.get_next_page().unwrap(), PageCursor::Exhausted);
    assert_eq!(storage.stats().unwrap().characters, 1);
  }

  #[tokio::test]
  async fn test_repeated_page_is_absorbed() {
    let next_2 = next_url(2);
    let remote = FakeRemote::default().with_page(None, api_page(&[1, 2], Some(&next_2)));
    let (storage, _remote, repo, _loads) = setup(remote);

    repo.load_next_page().await.unwrap();
    storage.set_next_page(PageCursor::Start).unwrap();
    repo.load_next_page().await.unwrap();

    assert_eq!(ids(&storage.get_characters().unwrap()), vec![1, 2]);
  }

  #[tokio::test]
  async fn test_observe_empty_cache_loads_first_page() {
    let remote = FakeRemote::default().with_page(None, api_page(&[1, 2, 3], None));
    let (_storage, remote, repo, _loads) = setup(remote);

    let mut rx = repo.observe_characters();
    assert!(rx.borrow().is_empty());

    let loaded = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| !c.is_empty()))
      .await
      .expect("timed out waiting for first page")
      .unwrap()
      .clone();
    assert_eq!(ids(&loaded), vec![1, 2, 3]);
    assert_eq!(remote.page_requests(), vec![None]);
  }

  #[tokio::test]
  async fn test_observe_populated_cache_does_not_fetch() {
    let (storage, remote, repo, _loads) = setup(FakeRemote::default());
    storage
      .upsert_characters(&[Character::from(api_character(1, &[]))])
      .unwrap();

    let rx = repo.observe_characters();
    assert_eq!(rx.borrow().len(), 1);

    tokio::task::yield_now().await;
    assert_eq!(remote.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_background_failure_goes_to_loads_channel() {
    let (_storage, _remote, repo, mut loads) = setup(FakeRemote::default().failing_pages());

    let rx = repo.observe_characters();

    let outcome = tokio::time::timeout(Duration::from_secs(5), loads.recv())
      .await
      .expect("timed out waiting for load outcome")
      .unwrap();
    assert!(matches!(outcome, Err(RepoError::Remote(_))));
    assert!(rx.borrow().is_empty());
  }

  #[tokio::test]
  async fn test_background_load_reports_success() {
    let remote = FakeRemote::default().with_page(None, api_page(&[1], None));
    let (_storage, _remote, repo, mut loads) = setup(remote);

    let rx = repo.observe_characters();

    let outcome = tokio::time::timeout(Duration::from_secs(5), loads.recv())
      .await
      .expect("timed out waiting for load outcome")
      .unwrap();
    assert!(outcome.is_ok());
    assert_eq!(rx.borrow().len(), 1);
  }

  #[tokio::test]
  async fn test_observe_with_exhausted_cursor_reports_completion() {
    let (storage, remote, repo, mut loads) = setup(FakeRemote::default());
    storage.set_next_page(PageCursor::Exhausted).unwrap();

    let rx = repo.observe_characters();

    let outcome = tokio::time::timeout(Duration::from_secs(5), loads.recv())
      .await
      .expect("timed out waiting for load outcome")
      .unwrap();
    assert!(outcome.is_ok());
    assert!(rx.borrow().is_empty());
    assert_eq!(remote.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_observe_with_empty_first_page_reports_completion() {
    let remote = FakeRemote::default().with_page(None, api_page(&[], None));
    let (storage, remote, repo, mut loads) = setup(remote);

    let rx = repo.observe_characters();

    let outcome = tokio::time::timeout(Duration::from_secs(5), loads.recv())
      .await
      .expect("timed out waiting for load outcome")
      .unwrap();
    assert!(outcome.is_ok());
    assert!(rx.borrow().is_empty());
    assert_eq!(remote.page_requests(), vec![None]);
    assert_eq!(storage.get_next_page().unwrap(), PageCursor::Exhausted);
  }

  #[tokio::test]
  async fn test_get_character_from_cache_attaches_episodes() {
    let remote = FakeRemote::default()
      .with_character(api_character(2, &[1, 2]))
      .with_episode(api_episode(1))
      .with_episode(api_episode(2));
    let (storage, remote, repo, _loads) = setup(remote);
    storage
      .upsert_characters(&[Character::from(api_character(2, &[1, 2]))])
      .unwrap();

    let character = repo.get_character(2).await.unwrap();
    assert_eq!(character.id, 2);
    assert_eq!(ids_of_episodes(&character), vec![1, 2]);

    // Second lookup is fully local
    let calls = remote.total_calls();
    let again = repo.get_character(2).await.unwrap();
    assert_eq!(again, character);
    assert_eq!(remote.total_calls(), calls);
  }

  #[tokio::test]
  async fn test_get_character_miss_fetches_and_caches() {
    let remote = FakeRemote::default()
      .with_character(api_character(7, &[3]))
      .with_episode(api_episode(3));
    let (storage, _remote, repo, _loads) = setup(remote);

    let character = repo.get_character(7).await.unwrap();
    assert_eq!(ids_of_episodes(&character), vec![3]);

    let cached = storage.get_character(7).unwrap().unwrap();
    assert!(cached.episodes.is_empty());
    assert_eq!(cached.name, character.name);
  }

  #[tokio::test]
  async fn test_get_character_not_found_writes_nothing() {
    let (storage, _remote, repo, _loads) = setup(FakeRemote::default());

    let err = repo.get_character(999).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound(999)));

    let stats = storage.stats().unwrap();
    assert_eq!(stats.characters, 0);
    assert_eq!(stats.episodes, 0);
    assert_eq!(stats.links, 0);
  }

  fn ids_of_episodes(character: &Character) -> Vec<i64> {
    character.episodes.iter().map(|e| e.id).collect()
  }
}
