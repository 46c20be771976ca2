use tracing::warn;

use crate::store::KeyValueStore;

/// Storage key for the user's chosen wiki language.
pub const LANGUAGE_STORAGE_KEY: &str = "language";
pub const FALLBACK_LANGUAGE: &str = "en";

/// Languages the wiki generator can write in, as `(code, display name)`.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ja", "Japanese (日本語)"),
    ("zh", "Mandarin Chinese (中文)"),
    ("zh-tw", "Traditional Chinese (繁體中文)"),
    ("es", "Spanish (Español)"),
    ("kr", "Korean (한국어)"),
    ("vi", "Vietnamese (Tiếng Việt)"),
    ("pt-br", "Brazilian Portuguese (Português Brasileiro)"),
    ("fr", "Français (French)"),
    ("ru", "Русский (Russian)"),
];

pub fn is_supported(code: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(candidate, _)| *candidate == code)
}

pub fn display_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, name)| *name)
}

/// `code` when supported, otherwise English.
pub fn valid_language(code: &str) -> String {
    if is_supported(code) {
        code.to_string()
    } else {
        warn!(language = code, fallback = FALLBACK_LANGUAGE, "unsupported language");
        FALLBACK_LANGUAGE.to_string()
    }
}

/// Reduce a locale tag to a wiki language code: `zh-TW` keeps its region,
/// everything else keeps only the primary subtag. Accepts POSIX forms such
/// as `pt_BR.UTF-8`.
pub fn normalize_locale(tag: &str) -> Option<String> {
    let tag = tag.split(['.', '@']).next().unwrap_or_default().trim();
    if tag.is_empty() || tag == "C" || tag == "POSIX" {
        return None;
    }
    let tag = tag.replace('_', "-");
    if tag == "zh-TW" {
        return Some("zh-tw".into());
    }
    tag.split('-')
        .next()
        .filter(|primary| !primary.is_empty())
        .map(|primary| primary.to_ascii_lowercase())
}

/// Pick the starting language: stored preference, then the environment
/// locale, then `fallback`, always reduced to a supported code.
pub fn initial_language<S: KeyValueStore>(
    store: &S,
    env_locale: Option<&str>,
    fallback: &str,
) -> String {
    let stored = match store.get(LANGUAGE_STORAGE_KEY) {
        Ok(value) => value.filter(|value| !value.is_empty()),
        Err(err) => {
            warn!(error = %err, "failed to read stored language preference");
            None
        }
    };
    let candidate = stored
        .or_else(|| env_locale.and_then(normalize_locale))
        .unwrap_or_else(|| fallback.to_string());
    valid_language(&candidate)
}

/// Validate and persist a language choice, returning the code actually kept.
pub fn remember_language<S: KeyValueStore>(store: &S, code: &str) -> String {
    let code = valid_language(code);
    if let Err(err) = store.set(LANGUAGE_STORAGE_KEY, &code) {
        warn!(error = %err, "failed to persist language preference");
    }
    code
}
