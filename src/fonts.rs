//! # Font Registry
//!
//! Resolves the configured logical font names to font data. Entries that
//! already carry their data (built-in PDF fonts, inline bytes) are used as-is;
//! the others are fetched from a file path or URL. Fetches run concurrently
//! and the load only succeeds once every entry has resolved.
//!
//! Exactly one entry is expected to be flagged as the fallback. That is a
//! property of the configuration and is not re-checked here.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use printpdf::BuiltinFont;
use rayon::prelude::*;

use crate::assets::fetch_bytes;
use crate::error::DiplomaError;

/// Label of the built-in font shipped with every registry
pub const DEFAULT_FONT_NAME: &str = "Helvetica";

/// Where a font's data comes from
#[derive(Debug, Clone)]
pub enum FontSource {
    /// One of the 14 standard PDF fonts; needs no data
    Builtin(BuiltinFont),
    /// TrueType/OpenType bytes already in memory
    Inline(Arc<Vec<u8>>),
    /// File path or `http(s)://` URL
    Location(String),
}

/// One configured font entry
#[derive(Debug, Clone)]
pub struct FontConfig {
    pub label: String,
    pub source: FontSource,
    pub fallback: bool,
}

impl FontConfig {
    pub fn new(label: impl Into<String>, source: FontSource, fallback: bool) -> Self {
        Self {
            label: label.into(),
            source,
            fallback,
        }
    }
}

/// Resolved font data
#[derive(Debug, Clone)]
pub enum FontData {
    Builtin(BuiltinFont),
    Embedded(Arc<Vec<u8>>),
}

#[derive(Debug, Clone)]
pub struct LoadedFont {
    pub data: FontData,
    pub fallback: bool,
}

/// Fonts available to the renderer for a whole batch, keyed by label
#[derive(Debug, Clone, Default)]
pub struct FontSet {
    fonts: BTreeMap<String, LoadedFont>,
    fallback: Option<String>,
}

impl FontSet {
    fn from_entries(entries: Vec<(String, LoadedFont)>) -> Self {
        let fallback = entries
            .iter()
            .find(|(_, font)| font.fallback)
            .or_else(|| entries.first())
            .map(|(label, _)| label.clone());

        Self {
            fonts: entries.into_iter().collect(),
            fallback,
        }
    }

    pub fn get(&self, label: &str) -> Option<&LoadedFont> {
        self.fonts.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fonts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn fallback_label(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Font for a field: the named font when it exists, otherwise the fallback.
    pub fn resolve(&self, name: Option<&str>) -> Option<(&str, &LoadedFont)> {
        if let Some(name) = name {
            if let Some((label, font)) = self.fonts.get_key_value(name) {
                return Some((label.as_str(), font));
            }
            debug!("Font '{}' is not registered, using fallback", name);
        }

        let label = self.fallback.as_deref()?;
        self.fonts.get_key_value(label).map(|(l, f)| (l.as_str(), f))
    }
}

/// Configured font entries plus the fetch timeout
#[derive(Debug, Clone)]
pub struct FontRegistry {
    entries: Vec<FontConfig>,
    timeout: Option<Duration>,
}

impl FontRegistry {
    pub fn new(entries: Vec<FontConfig>) -> Self {
        Self {
            entries,
            timeout: None,
        }
    }

    /// Only the built-in Helvetica, which is then the fallback.
    pub fn builtin() -> Self {
        Self::new(vec![FontConfig::new(
            DEFAULT_FONT_NAME,
            FontSource::Builtin(BuiltinFont::Helvetica),
            true,
        )])
    }

    /// The diploma font set: `andalus` (fallback) and `algerian-regular`
    /// from `font_dir`, plus the built-in Helvetica.
    pub fn diploma(font_dir: &Path) -> Self {
        let location = |file: &str| FontSource::Location(font_dir.join(file).display().to_string());

        Self::new(vec![
            FontConfig::new("andalus", location("andalus.ttf"), true),
            FontConfig::new("algerian-regular", location("algerian-regular.ttf"), false),
            FontConfig::new(
                DEFAULT_FONT_NAME,
                FontSource::Builtin(BuiltinFont::Helvetica),
                false,
            ),
        ])
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn entries(&self) -> &[FontConfig] {
        &self.entries
    }

    /// Loads every entry. Any failed fetch fails the whole load.
    pub fn load(&self) -> Result<FontSet, DiplomaError> {
        let loaded = self
            .entries
            .par_iter()
            .map(|entry| self.load_entry(entry).map(|font| (entry.label.clone(), font)))
            .collect::<Result<Vec<_>, DiplomaError>>()?;

        info!("Loaded {} fonts", loaded.len());
        Ok(FontSet::from_entries(loaded))
    }

    fn load_entry(&self, entry: &FontConfig) -> Result<LoadedFont, DiplomaError> {
        let data = match &entry.source {
            FontSource::Builtin(font) => FontData::Builtin(font.clone()),
            FontSource::Inline(bytes) => FontData::Embedded(Arc::clone(bytes)),
            FontSource::Location(location) => {
                debug!("Fetching font '{}' from {}", entry.label, location);
                let bytes = fetch_bytes(location, self.timeout).map_err(|message| {
                    DiplomaError::FontLoad {
                        label: entry.label.clone(),
                        message,
                    }
                })?;
                FontData::Embedded(Arc::new(bytes))
            }
        };

        Ok(LoadedFont {
            data,
            fallback: entry.fallback,
        })
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn inline(bytes: &[u8]) -> FontSource {
        FontSource::Inline(Arc::new(bytes.to_vec()))
    }

    #[test]
    fn test_inline_and_builtin_fonts_need_no_io() {
        let registry = FontRegistry::new(vec![
            FontConfig::new("body", inline(b"abc"), true),
            FontConfig::new("plain", FontSource::Builtin(BuiltinFont::Courier), false),
        ]);

        let set = registry.load().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.fallback_label(), Some("body"));
        assert!(matches!(set.get("plain").unwrap().data, FontData::Builtin(_)));
    }

    #[test]
    fn test_fetches_font_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ttf-data").unwrap();

        let registry = FontRegistry::new(vec![FontConfig::new(
            "custom",
            FontSource::Location(file.path().display().to_string()),
            true,
        )]);

        let set = registry.load().unwrap();
        match &set.get("custom").unwrap().data {
            FontData::Embedded(bytes) => assert_eq!(bytes.as_slice(), b"ttf-data"),
            other => panic!("unexpected font data: {:?}", other),
        }
    }

    #[test]
    fn test_any_failed_fetch_fails_the_load() {
        let registry = FontRegistry::new(vec![
            FontConfig::new("ok", inline(b"abc"), true),
            FontConfig::new(
                "missing",
                FontSource::Location("no/such/font.ttf".to_string()),
                false,
            ),
        ]);

        match registry.load() {
            Err(DiplomaError::FontLoad { label, .. }) => assert_eq!(label, "missing"),
            other => panic!("expected FontLoad error, got {:?}", other),
        }
    }

    #[test]
    fn test_diploma_set_fails_without_font_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FontRegistry::diploma(dir.path()).load().is_err());
    }

    #[test]
    fn test_resolve_named_and_fallback() {
        let set = FontRegistry::new(vec![
            FontConfig::new("andalus", inline(b"a"), true),
            FontConfig::new("algerian-regular", inline(b"b"), false),
        ])
        .load()
        .unwrap();

        assert_eq!(set.resolve(Some("algerian-regular")).unwrap().0, "algerian-regular");
        assert_eq!(set.resolve(Some("comic-sans")).unwrap().0, "andalus");
        assert_eq!(set.resolve(None).unwrap().0, "andalus");
    }

    #[test]
    fn test_builtin_registry() {
        let set = FontRegistry::default().load().unwrap();
        assert_eq!(set.labels().collect::<Vec<_>>(), vec![DEFAULT_FONT_NAME]);
        assert_eq!(set.fallback_label(), Some(DEFAULT_FONT_NAME));
    }
}
