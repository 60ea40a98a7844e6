// ============================================================================
// EDITOR SETTINGS — persisted key=value configuration
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PROXY_ENDPOINT: &str = "http://localhost:3000/api/gemini";

/// Environment variables checked (in order) for the API key.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no writable config directory on this platform")]
    NoConfigDir,
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which transport the remote edit service talks through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Straight to the public REST API with the local API key.
    #[default]
    Direct,
    /// Through a backend proxy that holds the credentials.
    Proxy,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Direct => "direct",
            TransportKind::Proxy => "proxy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(TransportKind::Direct),
            "proxy" | "backend" => Some(TransportKind::Proxy),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub transport: TransportKind,
    pub api_base_url: String,
    pub proxy_endpoint: String,
    /// Never persisted. Filled from the environment on load.
    pub api_key: Option<String>,
    pub image_model: String,
    pub text_model: String,
    pub fast_text_model: String,
    pub imagen_model: String,
    pub video_model: String,
    /// `None` means the in-memory cache only.
    pub cache_dir: Option<PathBuf>,
    pub cache_max_entries: usize,
    /// 0 disables expiry.
    pub cache_ttl_hours: u64,
    pub max_history: usize,
    pub language: String,
    pub font_dirs: Vec<PathBuf>,
    pub request_timeout_secs: u64,
    pub video_poll_interval_secs: u64,
    pub video_max_polls: u32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Direct,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            proxy_endpoint: DEFAULT_PROXY_ENDPOINT.to_string(),
            api_key: None,
            image_model: "gemini-2.5-flash-image".to_string(),
            text_model: "gemini-2.5-pro".to_string(),
            fast_text_model: "gemini-2.5-flash".to_string(),
            imagen_model: "imagen-4.0-generate-001".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            cache_dir: Some(crate::logger::data_dir().join("LumenFE").join("cache")),
            cache_max_entries: 256,
            cache_ttl_hours: 0,
            max_history: crate::components::history::MAX_HISTORY_SIZE,
            language: "en".to_string(),
            font_dirs: default_font_dirs(),
            request_timeout_secs: 180,
            video_poll_interval_secs: 10,
            video_max_polls: 60,
        }
    }
}

impl EditorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_hours > 0).then(|| Duration::from_secs(self.cache_ttl_hours * 3600))
    }

    /// Read the API key from the environment, keeping any key already set.
    pub fn with_env_api_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = API_KEY_VARS
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty());
        }
        self
    }

    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("lumenfe");
            return Some(config_dir.join("lumenfe.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("LumenFE").join("lumenfe.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("LumenFE")
                    .join("lumenfe.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("lumenfe.cfg")))
        }
    }

    /// Load from the platform config file, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default().with_env_api_key();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default().with_env_api_key();
        };
        Self::parse(&content).with_env_api_key()
    }

    /// Parse `key=value` lines. Unknown keys and malformed values are ignored.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "transport" => {
                    if let Some(kind) = TransportKind::parse(val) {
                        s.transport = kind;
                    }
                }
                "api_base_url" if !val.is_empty() => {
                    s.api_base_url = val.trim_end_matches('/').to_string()
                }
                "proxy_endpoint" if !val.is_empty() => s.proxy_endpoint = val.to_string(),
                "image_model" if !val.is_empty() => s.image_model = val.to_string(),
                "text_model" if !val.is_empty() => s.text_model = val.to_string(),
                "fast_text_model" if !val.is_empty() => s.fast_text_model = val.to_string(),
                "imagen_model" if !val.is_empty() => s.imagen_model = val.to_string(),
                "video_model" if !val.is_empty() => s.video_model = val.to_string(),
                "cache_dir" => {
                    s.cache_dir = match val {
                        "" | "none" | "memory" => None,
                        dir => Some(PathBuf::from(dir)),
                    };
                }
                "cache_max_entries" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.cache_max_entries = v.max(1);
                    }
                }
                "cache_ttl_hours" => {
                    if let Ok(v) = val.parse() {
                        s.cache_ttl_hours = v;
                    }
                }
                "max_history" | "max_undo_steps" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.max_history = v.clamp(2, 1000);
                    }
                }
                "language" if !val.is_empty() => s.language = val.to_string(),
                "font_dirs" => {
                    s.font_dirs = val
                        .split(';')
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(PathBuf::from)
                        .collect();
                }
                "request_timeout_secs" => {
                    if let Ok(v) = val.parse() {
                        s.request_timeout_secs = v;
                    }
                }
                "video_poll_interval_secs" => {
                    if let Ok(v) = val.parse::<u64>() {
                        s.video_poll_interval_secs = v.max(1);
                    }
                }
                "video_max_polls" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.video_max_polls = v.max(1);
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        let cache_dir = self
            .cache_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "memory".to_string());
        let font_dirs = self
            .font_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "# LumenFE settings. The API key is read from GEMINI_API_KEY / API_KEY.\n\
             transport={}\n\
             api_base_url={}\n\
             proxy_endpoint={}\n\
             image_model={}\n\
             text_model={}\n\
             fast_text_model={}\n\
             imagen_model={}\n\
             video_model={}\n\
             cache_dir={cache_dir}\n\
             cache_max_entries={}\n\
             cache_ttl_hours={}\n\
             max_history={}\n\
             language={}\n\
             font_dirs={font_dirs}\n\
             request_timeout_secs={}\n\
             video_poll_interval_secs={}\n\
             video_max_polls={}\n",
            self.transport.as_str(),
            self.api_base_url,
            self.proxy_endpoint,
            self.image_model,
            self.text_model,
            self.fast_text_model,
            self.imagen_model,
            self.video_model,
            self.cache_max_entries,
            self.cache_ttl_hours,
            self.max_history,
            self.language,
            self.request_timeout_secs,
            self.video_poll_interval_secs,
            self.video_max_polls,
        )
    }

    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, self.to_config_string())
        };
        write().map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn default_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    #[cfg(target_os = "windows")]
    {
        let windir = std::env::var("WINDIR").unwrap_or_else(|_| "C:\\Windows".to_string());
        dirs.push(PathBuf::from(windir).join("Fonts"));
    }
    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
    }
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(PathBuf::from(home).join(".fonts"));
    }
    dirs
}
