//! Language-code normalization and per-language intro text selection.

use std::collections::BTreeMap;
use std::path::Path;

use crate::job::IntroSpec;

/// Languages the intro text can be keyed by: ISO 639-1 code and label.
const LANGUAGES: &[(&str, &str)] = &[
    ("pt", "Portuguese"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("ro", "Romanian"),
    ("bg", "Bulgarian"),
    ("el", "Greek"),
];

/// Alternate spellings mapped onto canonical codes. Keys are accent-folded
/// and uppercased before lookup.
const ALIASES: &[(&str, &str)] = &[
    ("ENG", "en"),
    ("ING", "en"),
    ("INGLES", "en"),
    ("ESP", "es"),
    ("ESPANOL", "es"),
    ("SPA", "es"),
    ("FRA", "fr"),
    ("FRAN", "fr"),
    ("FRANCAIS", "fr"),
    ("FRANCES", "fr"),
    ("GER", "de"),
    ("ALE", "de"),
    ("ALEMAO", "de"),
    ("DEU", "de"),
    ("ITA", "it"),
    ("ITALIANO", "it"),
    ("POR", "pt"),
    ("PORTUGUES", "pt"),
    ("HOL", "nl"),
    ("HOLAND", "nl"),
    ("HOLANDES", "nl"),
    ("POL", "pl"),
    ("POLONES", "pl"),
    ("ROM", "ro"),
    ("ROMENO", "ro"),
    ("BUL", "bg"),
    ("BULGARO", "bg"),
    ("GR", "el"),
    ("GREGO", "el"),
];

/// Fold common Latin accents so `Francês` and `Frances` normalize alike.
fn fold_accents(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
            'ç' | 'Ç' => 'c',
            other => other,
        })
        .collect()
}

/// Normalize a raw language token to its canonical code.
///
/// Accepts canonical codes, known aliases, and full language names in
/// English (case- and accent-insensitive).
pub fn normalize_language_code(raw: &str) -> Option<&'static str> {
    let candidate = fold_accents(raw.trim()).to_uppercase();
    if candidate.is_empty() {
        return None;
    }

    for (code, _) in LANGUAGES {
        if candidate == code.to_uppercase() {
            return Some(code);
        }
    }
    for (alias, code) in ALIASES {
        if candidate == *alias {
            return Some(code);
        }
    }
    for (code, label) in LANGUAGES {
        if candidate == label.to_uppercase() {
            return Some(code);
        }
    }
    None
}

/// Human-readable label for a canonical code.
pub fn language_label(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
}

/// Infer a language code from a file name's trailing tokens.
///
/// Narration files are commonly suffixed with a language marker
/// (`episode-07 ING.wav`); the last recognizable token wins.
pub fn infer_language_from_filename(path: &Path) -> Option<&'static str> {
    let stem = path.file_stem()?.to_string_lossy().into_owned();
    let tokens: Vec<&str> = stem
        .split(|c: char| c == '-' || c == '.' || c == '_' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .iter()
        .rev()
        .find_map(|token| normalize_language_code(token))
}

/// Intro text after language selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIntroText {
    /// The text to type out.
    pub text: String,
    /// Canonical code of the chosen language, when one matched.
    pub language: Option<&'static str>,
    /// Label for status reporting.
    pub label: String,
}

/// Pick the intro text for a job: the entry matching the language hint, the
/// default text, or the first per-language entry, in that order.
pub fn resolve_intro_text(spec: &IntroSpec, hint: Option<&str>) -> Option<ResolvedIntroText> {
    let texts: BTreeMap<&'static str, String> = spec
        .texts
        .iter()
        .filter_map(|(key, value)| {
            let code = normalize_language_code(key)?;
            let cleaned = value.trim();
            (!cleaned.is_empty()).then(|| (code, cleaned.to_owned()))
        })
        .collect();

    let default_text = spec.default_text.trim();
    if texts.is_empty() && default_text.is_empty() {
        return None;
    }

    let selected = hint
        .and_then(normalize_language_code)
        .or_else(|| spec.language.as_deref().and_then(normalize_language_code));

    if let Some(code) = selected
        && let Some(text) = texts.get(code)
    {
        return Some(ResolvedIntroText {
            text: text.clone(),
            language: Some(code),
            label: language_label(code).unwrap_or(code).to_owned(),
        });
    }

    if !default_text.is_empty() {
        return Some(ResolvedIntroText {
            text: default_text.to_owned(),
            language: None,
            label: "default".to_owned(),
        });
    }

    texts.into_iter().next().map(|(code, text)| ResolvedIntroText {
        text,
        language: Some(code),
        label: language_label(code).unwrap_or(code).to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_and_names_normalize() {
        assert_eq!(normalize_language_code("en"), Some("en"));
        assert_eq!(normalize_language_code("ING"), Some("en"));
        assert_eq!(normalize_language_code("Francês"), Some("fr"));
        assert_eq!(normalize_language_code("german"), Some("de"));
        assert_eq!(normalize_language_code("klingon"), None);
        assert_eq!(normalize_language_code(""), None);
    }

    #[test]
    fn filename_inference_uses_the_last_recognizable_token() {
        assert_eq!(
            infer_language_from_filename(Path::new("voice/episode-07 ING.wav")),
            Some("en")
        );
        assert_eq!(
            infer_language_from_filename(Path::new("es_intro_FRAN.mp3")),
            Some("fr")
        );
        assert_eq!(infer_language_from_filename(Path::new("plain.wav")), None);
    }

    #[test]
    fn resolution_prefers_hint_then_default() {
        let mut spec = IntroSpec {
            default_text: "Welcome".to_owned(),
            ..Default::default()
        };
        spec.texts.insert("ESP".to_owned(), "Bienvenidos".to_owned());

        let hit = resolve_intro_text(&spec, Some("es")).unwrap();
        assert_eq!(hit.text, "Bienvenidos");
        assert_eq!(hit.language, Some("es"));
        assert_eq!(hit.label, "Spanish");

        let miss = resolve_intro_text(&spec, Some("fr")).unwrap();
        assert_eq!(miss.text, "Welcome");
        assert_eq!(miss.language, None);
    }

    #[test]
    fn empty_spec_resolves_to_nothing() {
        assert_eq!(resolve_intro_text(&IntroSpec::default(), None), None);
    }
}
