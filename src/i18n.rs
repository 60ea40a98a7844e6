//! Internationalization (i18n) module for LumenFE.
//!
//! Uses a simple key→string HashMap loaded from embedded translation data.
//! The `t!("key")` macro looks up the current language, falling back to English.
//! Language can be switched at runtime via `set_language()`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Global translation state.
static I18N: Mutex<Option<I18nState>> = Mutex::new(None);

struct I18nState {
    current_lang: String,
    /// lang_code → (key → translated_string)
    translations: HashMap<String, HashMap<String, String>>,
}

/// Supported languages: (code, native_name)
pub const LANGUAGES: &[(&str, &str)] = &[("en", "English"), ("pt", "Português")];

fn lock() -> MutexGuard<'static, Option<I18nState>> {
    // A panic while holding the lock leaves the tables intact
    I18N.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialize the i18n system with embedded translations.
/// Safe to call more than once; later calls keep the selected language.
pub fn init() {
    let mut translations: HashMap<String, HashMap<String, String>> = HashMap::new();
    translations.insert(
        "en".to_string(),
        parse_translations(include_str!("../locales/en.txt")),
    );
    translations.insert(
        "pt".to_string(),
        parse_translations(include_str!("../locales/pt.txt")),
    );

    let mut guard = lock();
    let current_lang = guard
        .as_ref()
        .map(|s| s.current_lang.clone())
        .unwrap_or_else(|| "en".to_string());
    *guard = Some(I18nState {
        current_lang,
        translations,
    });
}

/// Set the active language. If `code` is not a known language, falls back to "en".
pub fn set_language(code: &str) {
    if lock().is_none() {
        init();
    }
    if let Some(state) = lock().as_mut() {
        if state.translations.contains_key(code) {
            state.current_lang = code.to_string();
        } else {
            state.current_lang = "en".to_string();
        }
    }
}

/// Get the current language code.
pub fn current_language() -> String {
    lock()
        .as_ref()
        .map(|s| s.current_lang.clone())
        .unwrap_or_else(|| "en".to_string())
}

/// Look up a translation key. Returns the translated string if found,
/// or falls back to English, or returns the key itself as last resort.
pub fn translate(key: &str) -> String {
    if lock().is_none() {
        init();
    }
    if let Some(state) = lock().as_ref() {
        if let Some(val) = state
            .translations
            .get(&state.current_lang)
            .and_then(|map| map.get(key))
        {
            return val.clone();
        }
        if let Some(val) = state.translations.get("en").and_then(|map| map.get(key)) {
            return val.clone();
        }
    }
    key.to_string()
}

/// Detect the system language from the usual locale variables.
/// Returns "en" if no match is found.
pub fn detect_system_language() -> String {
    for var in &["LC_ALL", "LC_MESSAGES", "LANG", "LANGUAGE"] {
        if let Ok(val) = std::env::var(var)
            && let Some(lang) = match_system_locale(&val)
        {
            return lang;
        }
    }
    "en".to_string()
}

/// Match a system locale string (e.g. "en_US.UTF-8", "pt-BR") to a supported language.
pub fn match_system_locale(locale: &str) -> Option<String> {
    let normalized = locale.to_lowercase().replace('_', "-");

    // Strip encoding / modifier
    let lang_part = normalized.split('.').next().unwrap_or(&normalized);
    let lang_part = lang_part.split('@').next().unwrap_or(lang_part);

    for &(code, _) in LANGUAGES {
        if code.to_lowercase() == lang_part {
            return Some(code.to_string());
        }
    }

    // Prefix match ("pt-br" → "pt")
    let primary = lang_part.split('-').next().unwrap_or(lang_part);
    for &(code, _) in LANGUAGES {
        let code_primary = code.split('-').next().unwrap_or(code);
        if code_primary.to_lowercase() == primary {
            return Some(code.to_string());
        }
    }

    None
}

/// Parse a simple key=value translation file.
/// Format: one `key=value` per line. Lines starting with `#` are comments. Empty lines ignored.
fn parse_translations(data: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            map.insert(key.trim().to_string(), val.trim().to_string());
        }
    }
    map
}

/// Fill `{name}` placeholders in one pass over `template`. Substituted values
/// are never scanned again; unknown placeholders stay as written.
pub fn substitute(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| values.iter().find(|(name, _)| *name == &after[..close]).map(|(_, v)| (close, v)));
        match value {
            Some((close, v)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Translation macro. Usage: `t!("tool.removeBg")` or `t!("error.text_response", text = "...")`
#[macro_export]
macro_rules! t {
    ($key:expr) => {
        $crate::i18n::translate($key)
    };
    ($key:expr, $($name:ident = $val:expr),+ $(,)?) => {
        $crate::i18n::substitute(
            &$crate::i18n::translate($key),
            &[$((stringify!($name), format!("{}", $val))),+],
        )
    };
}
