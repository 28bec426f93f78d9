/// Storage key the browser front-end has always used.
pub const DEFAULT_STORAGE_KEY: &str = "userMarkers";
pub const DEFAULT_LABEL: &str = "Untitled marker";
pub const NOTE_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Key the snapshot lives under on the persistence surface.
    pub storage_key: String,
    /// Label used when the caller supplies none (or only whitespace).
    pub default_label: String,
    /// Notes longer than this many chars are truncated.
    pub note_max_chars: usize,
    /// Immediate attempts per flush before a write is reported failed.
    pub write_attempts: u32,
    /// Change events retained for consumers that never drain.
    pub change_log_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            default_label: DEFAULT_LABEL.to_string(),
            note_max_chars: NOTE_MAX_CHARS,
            write_attempts: 2,
            change_log_len: 256,
        }
    }
}

impl StoreConfig {
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Where an unparseable snapshot is copied before it gets overwritten.
    pub fn corrupt_backup_key(&self) -> String {
        format!("{}.corrupt", self.storage_key)
    }

    pub(crate) fn normalize_label(&self, label: Option<&str>) -> String {
        match label {
            Some(l) if !foundation::is_blank(l) => l.to_string(),
            _ => self.default_label.clone(),
        }
    }

    pub(crate) fn clamp_note(&self, note: &str) -> String {
        foundation::truncate_chars(note, self.note_max_chars)
            .0
            .to_string()
    }
}
