//! The entry store
//!
//! [`EntryStore`] owns the name → entry mapping of one archive and is the only
//! way entries change. Every mutation is atomic per entry: the new entry is
//! fully built (validated, metadata extracted, LODs generated) before the
//! store is touched, so a failed call leaves the store exactly as it was.
//!
//! Entries keep insertion order. Overwriting a name keeps its position.

use crate::catalog::{AnimationTrack, Category, Entry, EntryInfo, Metadata, ModelInfo, TextInfo};
use crate::codec::font::font_key;
use crate::codec::numeric::{self, NumericArray};
use crate::codec::picture::{self, CoverImage, RendererTag};
use crate::codec::{self, model};
use crate::config::ArchiveConfig;
use crate::container;
use crate::error::{ArchiveError, Result};
use crate::json_patch;
use crate::registry;
use crate::text;
use ahash::AHashMap;
use encoding_rs::{Encoding, UTF_8};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Per-call options for [`EntryStore::add`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Admit a restricted extension (executables, libraries, scripts)
    pub allow_restricted: bool,
}

impl AddOptions {
    pub fn allow_restricted() -> Self {
        AddOptions {
            allow_restricted: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    config: ArchiveConfig,
    entries: Vec<Entry>,
    /// Name → position in `entries`
    index: AHashMap<String, usize>,
    /// Canonical font key → names of the fonts holding it, most recently added last
    fonts: AHashMap<String, Vec<String>>,
}

impl EntryStore {
    /// Empty store with the default configuration
    pub fn create() -> Self {
        Self::new(ArchiveConfig::default())
    }

    pub fn new(config: ArchiveConfig) -> Self {
        EntryStore {
            config,
            ..Default::default()
        }
    }

    /// Deserialize a container
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Self::load_with_config(bytes, ArchiveConfig::default())
    }

    pub fn load_with_config(bytes: &[u8], config: ArchiveConfig) -> Result<Self> {
        let entries = container::decode(bytes)?;
        let mut store = Self::new(config);
        store.entries = entries;
        store.rebuild_name_index();
        // Container order stands in for add order
        let fonts: Vec<String> = store
            .entries
            .iter()
            .filter(|entry| entry.category == Category::Font)
            .map(|entry| entry.name.clone())
            .collect();
        for name in &fonts {
            store.index_font(name);
        }
        info!(
            "Loaded archive: {} entries, {} font keys",
            store.entries.len(),
            store.fonts.len()
        );
        Ok(store)
    }

    /// Serialize to container bytes; the store is left as is
    pub fn save(&self) -> Result<Vec<u8>> {
        let bytes = container::encode(&self.entries)?;
        info!("Saved archive: {} entries, {} bytes", self.entries.len(), bytes.len());
        Ok(bytes)
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ArchiveConfig {
        &mut self.config
    }

    /// Entry names in insertion order
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    // Adding entries

    /// Validate, extract metadata and store `payload` as `category`
    ///
    /// An existing entry of the same name is replaced in place.
    pub fn add(&mut self, name: &str, payload: Vec<u8>, category: Category, options: &AddOptions) -> Result<()> {
        let entry = self.admit(name, payload, category, options)?;
        self.insert(entry);
        Ok(())
    }

    /// Add with the category implied by the name's extension
    pub fn add_file(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        match registry::category_for_name(name) {
            Category::Model => self.add_model(name, payload, self.config.default_lod_levels, false),
            category => self.add(name, payload, category, &AddOptions::default()),
        }
    }

    /// Encode `text` with the encoding labelled `encoding` and record it
    pub fn add_text(&mut self, name: &str, text: &str, encoding: &str) -> Result<()> {
        let encoding = text::encoding_for_label(encoding)?;
        let payload = text::encode(text, encoding)?;
        let mut entry = self.admit(name, payload, Category::Text, &AddOptions::default())?;
        entry.metadata = Some(Metadata::Text(TextInfo {
            encoding: encoding.name().to_string(),
        }));
        self.insert(entry);
        Ok(())
    }

    pub fn add_binary(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        self.add(name, payload, Category::Binary, &AddOptions::default())
    }

    /// Store `value` as pretty JSON using the configured indent
    pub fn add_json(&mut self, name: &str, value: &Value) -> Result<()> {
        let text = json_patch::to_pretty(value, self.config.json_indent)?;
        self.add(name, text.into_bytes(), Category::Json, &AddOptions::default())
    }

    pub fn add_image(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        self.add(name, payload, Category::Image, &AddOptions::default())
    }

    pub fn add_audio(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        self.add(name, payload, Category::Audio, &AddOptions::default())
    }

    pub fn add_video(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        self.add(name, payload, Category::Video, &AddOptions::default())
    }

    /// Store a model, generating up to `lod_levels - 1` simplified levels when
    /// `optimize` is set
    pub fn add_model(&mut self, name: &str, payload: Vec<u8>, lod_levels: usize, optimize: bool) -> Result<()> {
        let mut entry = self.admit(name, payload, Category::Model, &AddOptions::default())?;
        if let Some(info) = entry.metadata.as_mut().and_then(Metadata::as_model_mut) {
            let original = std::mem::take(&mut entry.payload);
            let (payload, lods) = model::build_lods(info.format, original, lod_levels, optimize);
            debug!("Model '{}': {} LODs, {} bytes stored", name, lods.len(), payload.len());
            entry.payload = payload;
            info.lods = lods;
        }
        self.insert(entry);
        Ok(())
    }

    /// Encode `array` natively, compressing per the configuration
    pub fn add_numeric(&mut self, name: &str, array: &NumericArray) -> Result<()> {
        let payload = numeric::encode(array, &self.config.numeric_compression)?;
        self.add(name, payload, Category::Numeric, &AddOptions::default())
    }

    pub fn add_font(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        self.add(name, payload, Category::Font, &AddOptions::default())
    }

    /// Build the entry for an add without touching the store
    fn admit(&self, name: &str, payload: Vec<u8>, category: Category, options: &AddOptions) -> Result<Entry> {
        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(ArchiveError::validation(format!(
                "entry name must be 1 to {} bytes, got {}",
                u16::MAX,
                name.len()
            )));
        }

        if let Some(ext) = registry::extension_of(name).filter(|ext| registry::is_restricted(ext)) {
            if !(options.allow_restricted || self.config.allow_restricted) {
                return Err(ArchiveError::RestrictedType(ext));
            }
            warn!("Admitting restricted .{} entry '{}' through override", ext, name);
        }

        let metadata = codec::inspect(category, name, &payload)?;
        Ok(Entry::new(name, category, payload).with_metadata(metadata))
    }

    fn insert(&mut self, entry: Entry) {
        let name = entry.name.clone();
        let category = entry.category;
        match self.index.get(&name).copied() {
            Some(pos) => {
                debug!("Overwriting '{}' as {} ({} bytes)", name, category, entry.size());
                let previous = std::mem::replace(&mut self.entries[pos], entry);
                if previous.category == Category::Font && category != Category::Font {
                    self.unindex_font(&name);
                }
            }
            None => {
                debug!("Adding '{}' as {} ({} bytes)", name, category, entry.size());
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
        if category == Category::Font {
            self.index_font(&name);
        }
    }

    fn rebuild_name_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.name.clone(), pos))
            .collect();
    }

    /// Make `name` the most recent holder of its font key
    fn index_font(&mut self, name: &str) {
        let holders = self.fonts.entry(font_key(name)).or_default();
        holders.retain(|held| held != name);
        holders.push(name.to_string());
    }

    fn unindex_font(&mut self, name: &str) {
        let key = font_key(name);
        if let Some(holders) = self.fonts.get_mut(&key) {
            holders.retain(|held| held != name);
            if holders.is_empty() {
                self.fonts.remove(&key);
            }
        }
    }

    // Lookup and removal

    pub fn remove(&mut self, name: &str) -> Result<()> {
        let pos = self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;
        let removed = self.entries.remove(pos);
        self.rebuild_name_index();
        if removed.category == Category::Font {
            self.unindex_font(name);
        }
        debug!("Removed '{}' ({})", name, removed.category);
        Ok(())
    }

    pub fn get_entry(&self, name: &str) -> Result<&Entry> {
        self.index
            .get(name)
            .map(|&pos| &self.entries[pos])
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))
    }

    fn get_entry_mut(&mut self, name: &str) -> Result<&mut Entry> {
        match self.index.get(name) {
            Some(&pos) => Ok(&mut self.entries[pos]),
            None => Err(ArchiveError::NotFound(name.to_string())),
        }
    }

    /// Payload bytes
    pub fn get(&self, name: &str) -> Result<&[u8]> {
        self.get_entry(name).map(|entry| entry.payload.as_slice())
    }

    pub fn get_info(&self, name: &str) -> Result<EntryInfo> {
        self.get_entry(name).map(Entry::info)
    }

    /// Decode the payload with the encoding labelled `encoding`
    pub fn get_as_text(&self, name: &str, encoding: &str) -> Result<String> {
        let encoding = text::encoding_for_label(encoding)?;
        text::decode(self.get(name)?, encoding)
    }

    /// Decode the payload with its recorded encoding, UTF-8 if none was recorded
    pub fn get_text(&self, name: &str) -> Result<String> {
        let entry = self.get_entry(name)?;
        text::decode(&entry.payload, recorded_encoding(entry)?)
    }

    // Media

    /// Stored image, audio or video metadata
    pub fn get_media_info(&self, name: &str) -> Result<&Metadata> {
        let entry = self.get_entry(name)?;
        match (&entry.metadata, entry.category) {
            (Some(meta), Category::Image | Category::Audio | Category::Video) => Ok(meta),
            _ => Err(ArchiveError::unsupported(format!(
                "'{}' is a {} entry, not media",
                name, entry.category
            ))),
        }
    }

    /// Decode embedded cover art into the shape `renderer` asks for
    pub fn get_audio_cover(&self, name: &str, renderer: &str) -> Result<CoverImage> {
        let tag: RendererTag = renderer.parse()?;
        let entry = self.get_entry(name)?;
        let info = entry
            .metadata
            .as_ref()
            .and_then(Metadata::as_media)
            .ok_or_else(|| ArchiveError::unsupported(format!("'{}' is not audio or video", name)))?;
        let cover = info
            .cover
            .as_ref()
            .ok_or_else(|| ArchiveError::NotFound(format!("cover art in '{}'", name)))?;
        let bytes = cover
            .range
            .slice(&entry.payload)
            .ok_or_else(|| ArchiveError::format(format!("cover range of '{}' is out of bounds", name)))?;
        picture::render(bytes, tag)
    }

    // Models

    fn model_entry(&self, name: &str) -> Result<(&Entry, &ModelInfo)> {
        let entry = self.get_entry(name)?;
        let info = entry
            .metadata
            .as_ref()
            .and_then(Metadata::as_model)
            .ok_or_else(|| ArchiveError::unsupported(format!("'{}' is not a model", name)))?;
        Ok((entry, info))
    }

    /// Bytes of LOD `level`, 0 being the original model
    pub fn get_model_lod(&self, name: &str, level: usize) -> Result<&[u8]> {
        let (entry, info) = self.model_entry(name)?;
        let range = info.lods.get(level).ok_or_else(|| {
            ArchiveError::index(format!(
                "LOD {} of '{}' ({} available)",
                level,
                name,
                info.lods.len()
            ))
        })?;
        range
            .slice(&entry.payload)
            .ok_or_else(|| ArchiveError::format(format!("LOD {} of '{}' is out of bounds", level, name)))
    }

    /// Append `track`, or replace the track with the same name
    pub fn update_animation(&mut self, name: &str, track: AnimationTrack) -> Result<()> {
        let entry = self.get_entry_mut(name)?;
        let info = entry
            .metadata
            .as_mut()
            .and_then(Metadata::as_model_mut)
            .ok_or_else(|| ArchiveError::unsupported(format!("'{}' is not a model", name)))?;
        debug!("Updating animation '{}' of '{}' ({} frames)", track.name, name, track.frame_count);
        model::upsert_track(info, track);
        Ok(())
    }

    /// LOD 0 vertex positions as an `[n, 3]` `f32` array
    pub fn get_model_vertices(&self, name: &str) -> Result<NumericArray> {
        let (_, info) = self.model_entry(name)?;
        model::extract_vertices(self.get_model_lod(name, 0)?, info.format)
    }

    // Numeric

    pub fn get_numeric(&self, name: &str) -> Result<NumericArray> {
        let entry = self.get_entry(name)?;
        if entry.category != Category::Numeric {
            return Err(ArchiveError::unsupported(format!(
                "'{}' is a {} entry, not numeric",
                name, entry.category
            )));
        }
        numeric::decode(&entry.payload)
    }

    // Fonts

    /// Font entry by bare name, file name or path, case-insensitively
    pub fn get_font(&self, query: &str) -> Result<&Entry> {
        let key = font_key(query);
        let name = self
            .fonts
            .get(&key)
            .and_then(|holders| holders.last())
            .ok_or_else(|| ArchiveError::NotFound(format!("font '{}'", query)))?;
        self.get_entry(name)
    }

    // Text edits

    /// Decode a textual entry, apply `edit` and store the re-encoded result
    fn edit_text<F>(&mut self, name: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let entry = self.get_entry_mut(name)?;
        if !entry.category.is_textual() {
            return Err(ArchiveError::unsupported(format!(
                "'{}' is a {} entry; only text and JSON can be edited",
                name, entry.category
            )));
        }
        let encoding = recorded_encoding(entry)?;
        let edited = edit(&text::decode(&entry.payload, encoding)?)?;
        entry.payload = text::encode(&edited, encoding)?;
        debug!("Edited '{}' ({} bytes)", name, entry.payload.len());
        Ok(())
    }

    pub fn insert_text_at_index(&mut self, name: &str, new_text: &str, index: usize) -> Result<()> {
        self.edit_text(name, |t| text::insert_at_index(t, new_text, index))
    }

    pub fn insert_text_at_position(&mut self, name: &str, new_text: &str, row: usize, col: usize) -> Result<()> {
        self.edit_text(name, |t| text::insert_at_position(t, new_text, row, col))
    }

    pub fn truncate_text(&mut self, name: &str, start: usize, end: usize) -> Result<()> {
        self.edit_text(name, |t| text::truncate_row(t, start, end))
    }

    pub fn remove_row_range(&mut self, name: &str, row: usize, col_start: usize, col_end: usize) -> Result<()> {
        self.edit_text(name, |t| text::remove_row_at_index(t, row, col_start, col_end))
    }

    pub fn remove_text_column(&mut self, name: &str, col_start: usize, col_end: usize) -> Result<()> {
        self.edit_text(name, |t| text::remove_column(t, col_start, col_end))
    }

    pub fn remove_text_columns(&mut self, name: &str, ranges: &[(usize, usize)]) -> Result<()> {
        self.edit_text(name, |t| text::remove_columns(t, ranges))
    }

    pub fn append_text(&mut self, name: &str, new_text: &str) -> Result<()> {
        self.edit_text(name, |t| Ok(text::append(t, new_text)))
    }

    pub fn prepend_text(&mut self, name: &str, new_text: &str) -> Result<()> {
        self.edit_text(name, |t| Ok(text::prepend(t, new_text)))
    }

    pub fn replace_text(&mut self, name: &str, old: &str, new: &str) -> Result<()> {
        self.edit_text(name, |t| Ok(text::replace(t, old, new)))
    }

    // JSON

    pub fn get_json(&self, name: &str) -> Result<Value> {
        Ok(serde_json::from_str(&self.get_text(name)?)?)
    }

    /// Set a top-level key of a JSON object entry
    ///
    /// Unparseable text is [`ArchiveError::Json`]; a non-object document is
    /// [`ArchiveError::TypeMismatch`]. The entry is unchanged on error.
    pub fn update_json_value(&mut self, name: &str, key: &str, value: Value) -> Result<()> {
        let indent = self.config.json_indent;
        self.edit_text(name, |t| json_patch::update_value(t, key, value, indent))
    }
}

/// Encoding recorded in a text entry's metadata, UTF-8 otherwise
fn recorded_encoding(entry: &Entry) -> Result<&'static Encoding> {
    match &entry.metadata {
        Some(Metadata::Text(info)) => text::encoding_for_label(&info.encoding),
        _ => Ok(UTF_8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_and_overwrite_position() -> Result<()> {
        let mut store = EntryStore::create();
        store.add_binary("b.bin", vec![1])?;
        store.add_binary("a.bin", vec![2])?;
        store.add_binary("c.bin", vec![3])?;
        store.add_binary("a.bin", vec![9, 9])?;

        assert_eq!(store.list(), vec!["b.bin", "a.bin", "c.bin"]);
        assert_eq!(store.get("a.bin")?, &[9, 9]);
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[test]
    fn test_remove_reindexes() -> Result<()> {
        let mut store = EntryStore::create();
        for name in ["one", "two", "three"] {
            store.add_binary(name, name.as_bytes().to_vec())?;
        }
        store.remove("one")?;
        assert_eq!(store.get("three")?, b"three");
        assert!(matches!(store.get("one"), Err(ArchiveError::NotFound(_))));
        assert!(matches!(store.remove("one"), Err(ArchiveError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_failed_add_leaves_store_unchanged() -> Result<()> {
        let mut store = EntryStore::create();
        store.add_binary("pic.png", vec![1, 2, 3])?;
        let before = store.get_info("pic.png")?;

        assert!(store.add_image("pic.png", b"not a png".to_vec()).is_err());
        assert_eq!(store.get_info("pic.png")?, before);
        assert_eq!(store.get("pic.png")?, &[1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_restricted_override() -> Result<()> {
        let mut store = EntryStore::create();
        assert!(matches!(
            store.add_binary("setup.EXE", vec![0x4D, 0x5A]),
            Err(ArchiveError::RestrictedType(ext)) if ext == "exe"
        ));
        store.add("setup.exe", vec![0x4D, 0x5A], Category::Binary, &AddOptions::allow_restricted())?;
        assert!(store.contains("setup.exe"));
        Ok(())
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut store = EntryStore::create();
        assert!(matches!(store.add_binary("", vec![]), Err(ArchiveError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_text_edits_keep_encoding() -> Result<()> {
        let mut store = EntryStore::create();
        store.add_text("legacy.txt", "caf\u{e9}", "latin1")?;
        assert_eq!(store.get("legacy.txt")?, &[b'c', b'a', b'f', 0xE9]);

        store.append_text("legacy.txt", " cr\u{e8}me")?;
        assert_eq!(store.get_text("legacy.txt")?, "caf\u{e9} cr\u{e8}me");
        assert_eq!(store.get("legacy.txt")?.len(), 10);
        assert!(matches!(
            store.get_as_text("legacy.txt", "utf-8"),
            Err(ArchiveError::Encoding(_))
        ));
        Ok(())
    }

    #[test]
    fn test_edit_non_text_is_unsupported() -> Result<()> {
        let mut store = EntryStore::create();
        store.add_binary("blob.bin", b"abc".to_vec())?;
        assert!(matches!(
            store.append_text("blob.bin", "d"),
            Err(ArchiveError::UnsupportedFormat(_))
        ));
        assert_eq!(store.get("blob.bin")?, b"abc");
        Ok(())
    }

    #[test]
    fn test_failed_edit_leaves_payload() -> Result<()> {
        let mut store = EntryStore::create();
        store.add("notes.txt", b"abc".to_vec(), Category::Text, &AddOptions::default())?;
        assert!(matches!(
            store.insert_text_at_index("notes.txt", "x", 10),
            Err(ArchiveError::Index(_))
        ));
        assert_eq!(store.get("notes.txt")?, b"abc");
        Ok(())
    }

    #[test]
    fn test_json_roundtrip_and_patch() -> Result<()> {
        let mut store = EntryStore::create();
        store.add_json("config.json", &serde_json::json!({"a": 1, "b": 2}))?;
        store.update_json_value("config.json", "b", serde_json::json!(3))?;
        assert_eq!(store.get_json("config.json")?, serde_json::json!({"a": 1, "b": 3}));
        assert!(store.get_text("config.json")?.contains("\n  \"a\": 1"));

        store.add_json("list.json", &serde_json::json!([1, 2]))?;
        assert!(matches!(
            store.update_json_value("list.json", "k", serde_json::json!(0)),
            Err(ArchiveError::TypeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_add_file_infers_category() -> Result<()> {
        let mut store = EntryStore::create();
        store.add_file("readme.md", b"# hi".to_vec())?;
        store.add_file("data.json", b"{}".to_vec())?;
        store.add_file("noext", vec![0xFF])?;
        assert_eq!(store.get_info("readme.md")?.category, Category::Text);
        assert_eq!(store.get_info("data.json")?.category, Category::Json);
        assert_eq!(store.get_info("noext")?.category, Category::Binary);
        assert!(matches!(
            store.add_file("photo.jpg", b"plain text".to_vec()),
            Err(ArchiveError::Validation(_))
        ));
        Ok(())
    }
}
