//! Durable pagination cursor for the character listing.

use tracing::{debug, warn};
use url::Url;

/// Stored value meaning "no further pages".
pub const EXHAUSTED: i64 = -1;

/// Where the next `load_next_page` call should resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
  /// Nothing fetched yet; the first request omits the page parameter.
  Start,
  /// Fetch this page next
  Next(u32),
  /// The listing has been fully fetched
  Exhausted,
}

impl PageCursor {
  /// Decode the value persisted in the settings table.
  pub fn from_stored(value: Option<i64>) -> Self {
    match value {
      None => PageCursor::Start,
      Some(EXHAUSTED) => PageCursor::Exhausted,
      Some(n) => match u32::try_from(n) {
        Ok(page) if page > 0 => PageCursor::Next(page),
        _ => {
          warn!(value = n, "Ignoring invalid stored page cursor");
          PageCursor::Start
        }
      },
    }
  }

  /// Encode for the settings table. `Start` is never written.
  pub fn to_stored(self) -> Option<i64> {
    match self {
      PageCursor::Start => None,
      PageCursor::Next(page) => Some(i64::from(page)),
      PageCursor::Exhausted => Some(EXHAUSTED),
    }
  }

  /// Derive the cursor from a listing response's `info.next` URL.
  ///
  /// A missing URL, a URL without a `page` parameter, or a page that is not
  /// a positive integer all mean the listing is exhausted.
  pub fn from_next_url(next: Option<&str>) -> Self {
    let Some(next) = next else {
      return PageCursor::Exhausted;
    };

    let page = Url::parse(next).ok().and_then(|url| {
      url
        .query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse::<u32>().ok())
    });

    match page {
      Some(page) if page > 0 => PageCursor::Next(page),
      _ => {
        debug!(next, "Unparseable next page reference, treating listing as exhausted");
        PageCursor::Exhausted
      }
    }
  }
}

impl std::fmt::Display for PageCursor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PageCursor::Start => write!(f, "not started"),
      PageCursor::Next(page) => write!(f, "page {}", page),
      PageCursor::Exhausted => write!(f, "exhausted"),
    }
  }
}
