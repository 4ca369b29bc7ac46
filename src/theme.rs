//! Theme preference: a tri-state setting persisted locally and reflected
//! onto the presentation surface the moment it changes.
//!
//! There is no ambient global here. [`ThemePreference`] is constructed with
//! its persistence backend and handed to whoever needs it; a presentation
//! layer that wants repainting registers a [`ThemeSink`].

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ThemeError {
    Io(std::io::Error),
    Toml(String),
    Unknown(String),
}

impl std::fmt::Display for ThemeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThemeError::Io(e) => write!(f, "io error: {e}"),
            ThemeError::Toml(e) => write!(f, "settings error: {e}"),
            ThemeError::Unknown(name) => {
                write!(f, "unknown theme: {name} (expected light, dark, or lite)")
            }
        }
    }
}

impl std::error::Error for ThemeError {}

impl From<std::io::Error> for ThemeError {
    fn from(e: std::io::Error) -> Self {
        ThemeError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    Lite,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Lite => "lite",
        }
    }

    /// The dashboard toggle order: light, dark, lite, and around again.
    pub fn next(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Lite,
            Theme::Lite => Theme::Light,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = ThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "lite" => Ok(Theme::Lite),
            other => Err(ThemeError::Unknown(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Where the preference is kept between runs.
pub trait ThemeStore {
    fn load(&self) -> Result<Option<Theme>, ThemeError>;
    fn save(&self, theme: Theme) -> Result<(), ThemeError>;
}

/// Settings stored in `{data_dir}/settings.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Settings {
    #[serde(default)]
    theme: Option<Theme>,
}

/// File-backed [`ThemeStore`].
pub struct FileThemeStore {
    data_dir: PathBuf,
}

impl FileThemeStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.toml")
    }

    fn load_settings(&self) -> Result<Settings, ThemeError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(&path)?;
        toml::from_str(&contents).map_err(|e| ThemeError::Toml(e.to_string()))
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), ThemeError> {
        ensure_dir(&self.data_dir)?;
        let contents =
            toml::to_string_pretty(settings).map_err(|e| ThemeError::Toml(e.to_string()))?;
        fs::write(self.settings_path(), contents)?;
        Ok(())
    }
}

fn ensure_dir(path: &Path) -> Result<(), std::io::Error> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

impl ThemeStore for FileThemeStore {
    fn load(&self) -> Result<Option<Theme>, ThemeError> {
        Ok(self.load_settings()?.theme)
    }

    fn save(&self, theme: Theme) -> Result<(), ThemeError> {
        let mut settings = self.load_settings().unwrap_or_default();
        settings.theme = Some(theme);
        self.save_settings(&settings)
    }
}

/// In-memory [`ThemeStore`] for tests.
#[derive(Default)]
pub struct MemoryThemeStore {
    theme: Mutex<Option<Theme>>,
}

impl MemoryThemeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preset(theme: Theme) -> Self {
        Self {
            theme: Mutex::new(Some(theme)),
        }
    }
}

impl ThemeStore for MemoryThemeStore {
    fn load(&self) -> Result<Option<Theme>, ThemeError> {
        Ok(*self.theme.lock().unwrap())
    }

    fn save(&self, theme: Theme) -> Result<(), ThemeError> {
        *self.theme.lock().unwrap() = Some(theme);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Preference service
// ---------------------------------------------------------------------------

/// Receives every effective theme so the presentation layer can repaint.
pub trait ThemeSink {
    fn apply(&mut self, theme: Theme);
}

/// The preference service. Initialization resolves, in order: the persisted
/// value, the embedder's OS-level dark/light hint, then `light`. Every
/// change persists first and repaints second, so a failed save leaves the
/// visible theme untouched and retryable.
pub struct ThemePreference {
    current: Theme,
    store: Box<dyn ThemeStore + Send>,
    sink: Option<Box<dyn ThemeSink + Send>>,
}

impl ThemePreference {
    pub fn init(
        store: Box<dyn ThemeStore + Send>,
        os_hint: Option<Theme>,
    ) -> Result<Self, ThemeError> {
        let current = store.load()?.or(os_hint).unwrap_or(Theme::Light);
        Ok(Self {
            current,
            store,
            sink: None,
        })
    }

    /// Register the presentation surface. It is painted immediately with
    /// the current theme and on every change after.
    pub fn attach_sink(&mut self, mut sink: Box<dyn ThemeSink + Send>) {
        sink.apply(self.current);
        self.sink = Some(sink);
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    pub fn set(&mut self, theme: Theme) -> Result<(), ThemeError> {
        self.store.save(theme)?;
        self.current = theme;
        if let Some(sink) = &mut self.sink {
            sink.apply(theme);
        }
        Ok(())
    }

    /// Advance to the next theme in the toggle order and return it.
    pub fn cycle(&mut self) -> Result<Theme, ThemeError> {
        let next = self.current.next();
        self.set(next)?;
        Ok(next)
    }
}
