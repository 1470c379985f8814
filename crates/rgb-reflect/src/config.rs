//! Runtime configuration.

/// Version string folded into the API hash when none is configured.
pub const VERSION: &str = concat!("rgb-reflect ", env!("CARGO_PKG_VERSION"));

/// Settings fixed for the lifetime of a [`crate::Context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Seed of the API hash.
    pub api_version: String,
    /// Running as the editor: editor-only classes may be instanced and
    /// persistent connections keep their one-shot behaviour off.
    pub editor_hint: bool,
    /// Accept connections to undeclared signals when the attached script
    /// failed to load.
    pub relaxed_signals: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_version: VERSION.to_owned(),
            editor_hint: false,
            relaxed_signals: false,
        }
    }
}

impl Config {
    /// Defaults overridden by `RGB_REFLECT_VERSION`, `RGB_REFLECT_EDITOR`
    /// and `RGB_REFLECT_RELAXED_SIGNALS`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_version: std::env::var("RGB_REFLECT_VERSION").unwrap_or(defaults.api_version),
            editor_hint: env_flag("RGB_REFLECT_EDITOR").unwrap_or(defaults.editor_hint),
            relaxed_signals: env_flag("RGB_REFLECT_RELAXED_SIGNALS")
                .unwrap_or(defaults.relaxed_signals),
        }
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    #[must_use]
    pub fn with_editor_hint(mut self, editor_hint: bool) -> Self {
        self.editor_hint = editor_hint;
        self
    }

    #[must_use]
    pub fn with_relaxed_signals(mut self, relaxed_signals: bool) -> Self {
        self.relaxed_signals = relaxed_signals;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
