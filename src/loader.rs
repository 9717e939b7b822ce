//! Loading templates by locator, with a bounded, expiring cache in front.

use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::error::FetchError;

/// Resolves a locator to template text.
pub trait TemplateSource {
    /// # Errors
    /// - If the locator does not name a template this source can produce.
    fn fetch(&self, locator: &str) -> Result<String, FetchError>;
}

impl<F> TemplateSource for F
where
    F: Fn(&str) -> Result<String, FetchError>,
{
    fn fetch(&self, locator: &str) -> Result<String, FetchError> {
        self(locator)
    }
}

/// Reads templates from files below a root directory. Locators are relative
/// paths and may not climb out of the root.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateSource for FsSource {
    fn fetch(&self, locator: &str) -> Result<String, FetchError> {
        let relative = Path::new(locator);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(FetchError::InvalidLocator {
                locator: locator.to_string(),
            });
        }

        let path = self.root.join(relative);
        tracing::debug!(path = %path.display(), "reading template file");
        std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound {
                locator: locator.to_string(),
            },
            _ => FetchError::Io {
                locator: locator.to_string(),
                source,
            },
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    template: Rc<str>,
    stored_at: Instant,
}

/// Fetched templates keyed by locator.
///
/// Entries expire `ttl` after they were stored. When full, the entry stored
/// longest ago is evicted, whether or not it is still being read.
#[derive(Debug, Clone)]
pub struct TemplateCache {
    entries: IndexMap<String, CacheEntry>,
    limit: usize,
    ttl: Duration,
}

impl TemplateCache {
    pub fn new(limit: usize, ttl: Duration) -> Self {
        Self {
            entries: IndexMap::new(),
            limit,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&mut self, locator: &str) -> Option<Rc<str>> {
        self.get_at(locator, Instant::now())
    }

    /// Looks `locator` up as of `now`, dropping the entry if it has expired.
    pub fn get_at(&mut self, locator: &str, now: Instant) -> Option<Rc<str>> {
        let entry = self.entries.get(locator)?;
        if now.saturating_duration_since(entry.stored_at) < self.ttl {
            return Some(Rc::clone(&entry.template));
        }
        tracing::trace!(locator, "cached template expired");
        self.entries.shift_remove(locator);
        None
    }

    pub fn insert(&mut self, locator: &str, template: Rc<str>) {
        self.insert_at(locator, template, Instant::now());
    }

    pub fn insert_at(&mut self, locator: &str, template: Rc<str>, now: Instant) {
        if self.limit == 0 {
            return;
        }
        // Re-inserting refreshes the entry's position as well as its age.
        self.entries.shift_remove(locator);
        while self.entries.len() >= self.limit {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                tracing::trace!(locator = %evicted, "evicting cached template");
            }
        }
        self.entries.insert(
            locator.to_string(),
            CacheEntry {
                template,
                stored_at: now,
            },
        );
    }

    /// Returns the cached template, fetching and caching it on a miss.
    /// Failed fetches are not cached.
    ///
    /// # Errors
    /// - Whatever `source` reports for an uncached locator.
    pub fn get_or_fetch(
        &mut self,
        locator: &str,
        source: &dyn TemplateSource,
    ) -> Result<Rc<str>, FetchError> {
        self.get_or_fetch_at(locator, source, Instant::now())
    }

    pub fn get_or_fetch_at(
        &mut self,
        locator: &str,
        source: &dyn TemplateSource,
        now: Instant,
    ) -> Result<Rc<str>, FetchError> {
        if let Some(template) = self.get_at(locator, now) {
            return Ok(template);
        }
        let template: Rc<str> = source.fetch(locator)?.into();
        self.insert_at(locator, Rc::clone(&template), now);
        Ok(template)
    }
}
