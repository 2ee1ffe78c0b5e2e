//! User-agent navigation capability
//!
//! The auth client never touches a concrete page or browser. It reads the
//! current location to find callback parameters and to derive the redirect
//! URI, and it asks the navigator to either leave for another URL (the
//! authorize endpoint) or rewrite the current one in place (stripping
//! `code`/`state` after a callback).

use std::sync::Mutex;

use reqwest::Url;

/// Where the user agent is and how to move it.
pub trait Navigator: Send + Sync {
    /// The current page URL, including any query string.
    fn location(&self) -> Url;

    /// Navigate away to `url`.
    fn assign(&self, url: Url);

    /// Replace the current URL without reloading the page.
    fn replace(&self, url: Url);
}

/// A navigation requested through a [`PageNavigator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Assign(Url),
    Replace(Url),
}

/// Navigator bound to a single page view.
///
/// Records the last requested navigation so the caller can turn it into an
/// HTTP redirect (or a test can assert on it). `replace` also updates
/// `location`, like a history replace would.
#[derive(Debug)]
pub struct PageNavigator {
    location: Mutex<Url>,
    pending: Mutex<Option<Navigation>>,
}

impl PageNavigator {
    pub fn new(location: Url) -> Self {
        Self {
            location: Mutex::new(location),
            pending: Mutex::new(None),
        }
    }

    /// Take the most recent navigation request, if any.
    pub fn take_navigation(&self) -> Option<Navigation> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Navigator for PageNavigator {
    fn location(&self) -> Url {
        self.location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn assign(&self, url: Url) {
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Navigation::Assign(url));
    }

    fn replace(&self, url: Url) {
        *self
            .location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = url.clone();
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Navigation::Replace(url));
    }
}

/// Derive the OAuth redirect URI from a page location: origin + path, with
/// a trailing `index.html` removed and the query dropped.
pub fn redirect_uri_for(location: &Url) -> String {
    let origin = location.origin().ascii_serialization();
    let path = location.path();
    let path = path.strip_suffix("index.html").unwrap_or(path);
    format!("{origin}{path}")
}

/// Remove the OAuth callback parameters from `location`, keeping any others.
pub fn strip_callback_params(location: &Url) -> Url {
    let kept: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(k, _)| !matches!(k.as_ref(), "code" | "state" | "error"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = location.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    cleaned
}
