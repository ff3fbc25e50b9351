//! Per-media-kind string tables with Android-style format templates.

use std::collections::HashMap;

use tracing::debug;

use super::{FormatArg, MediaKind, MessageKey, StringLookup};

/// Localized templates for one media kind.
///
/// Resources are keyed by [`MessageKey::resource_name`]. Overrides loaded with
/// [`StringTable::with_overrides_json`] replace the built-in English template
/// for the same resource; anything missing falls back to English.
///
/// Templates support `%d`, `%s`, `%1$d`, `%1$s` and `%%`.
#[derive(Debug, Clone)]
pub struct StringTable {
    kind: MediaKind,
    overrides: HashMap<String, String>,
}

impl StringTable {
    /// Creates a table that serves the built-in English templates.
    #[must_use]
    pub fn english(kind: MediaKind) -> Self {
        Self {
            kind,
            overrides: HashMap::new(),
        }
    }

    /// Loads translations from a JSON object of `{resource_name: template}`.
    ///
    /// Resources for other media kinds are kept but never consulted.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the input is not a JSON object of strings.
    pub fn with_overrides_json(kind: MediaKind, json: &str) -> Result<Self, serde_json::Error> {
        let overrides: HashMap<String, String> = serde_json::from_str(json)?;
        debug!(kind = %kind, entries = overrides.len(), "loaded string overrides");
        Ok(Self { kind, overrides })
    }

    /// The media kind this table serves.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Returns the raw template for `key`, before argument substitution.
    #[must_use]
    pub fn template(&self, key: MessageKey) -> String {
        self.overrides
            .get(&key.resource_name(self.kind))
            .cloned()
            .unwrap_or_else(|| english_template(self.kind, key))
    }
}

impl StringLookup for StringTable {
    fn get(&self, key: MessageKey, args: &[FormatArg<'_>]) -> String {
        format_template(&self.template(key), args)
    }
}

fn english_template(kind: MediaKind, key: MessageKey) -> String {
    let noun = kind.item_noun();
    match key {
        MessageKey::WaitingForSlot => "Waiting for a free download slot".to_string(),
        MessageKey::WaitingForNetwork => "Waiting for network connection".to_string(),
        MessageKey::WaitingForWifi => "Waiting for Wi-Fi".to_string(),
        MessageKey::Preparing => format!("Preparing {}", noun.to_lowercase()),
        MessageKey::Connecting => "Connecting to source".to_string(),
        MessageKey::Stalled => "Stalled, no data received".to_string(),
        MessageKey::Retrying => "Retrying (attempt %1$d)".to_string(),
        MessageKey::PausedByUser => "Paused".to_string(),
        MessageKey::PausedLowStorage => "Paused, not enough storage".to_string(),
        MessageKey::Verifying => format!("Verifying {}", noun.to_lowercase()),
        MessageKey::Completed => format!("{noun} downloaded"),
        MessageKey::UnknownError => "Download failed: unknown error".to_string(),
    }
}

/// Substitutes positional arguments into an Android-style template.
///
/// Sequential specifiers (`%d`, `%s`) consume arguments in order; indexed
/// specifiers (`%2$s`) pick a specific one. Missing arguments render as empty
/// text and unknown specifiers are copied through unchanged.
fn format_template(template: &str, args: &[FormatArg<'_>]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_sequential = 0_usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('d' | 's') => {
                chars.next();
                push_arg(&mut out, args.get(next_sequential));
                next_sequential += 1;
            }
            Some(digit) if digit.is_ascii_digit() => {
                let mut lookahead = chars.clone();
                let mut index = Some(0_usize);
                while let Some(d) = lookahead.peek().and_then(|c| c.to_digit(10)) {
                    index = index
                        .and_then(|i| i.checked_mul(10))
                        .and_then(|i| i.checked_add(d as usize));
                    lookahead.next();
                }
                let indexed = lookahead.next() == Some('$')
                    && matches!(lookahead.next(), Some('d' | 's'));
                match index.filter(|i| *i > 0) {
                    Some(index) if indexed => {
                        chars = lookahead;
                        push_arg(&mut out, args.get(index - 1));
                    }
                    _ => out.push('%'),
                }
            }
            _ => out.push('%'),
        }
    }

    out
}

fn push_arg(out: &mut String, arg: Option<&FormatArg<'_>>) {
    if let Some(arg) = arg {
        out.push_str(&arg.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_indexed_integer() {
        assert_eq!(
            format_template("Retrying (attempt %1$d)", &[FormatArg::Int(3)]),
            "Retrying (attempt 3)"
        );
    }

    #[test]
    fn test_format_sequential_and_indexed_mix() {
        let args = [FormatArg::Str("ch. 12"), FormatArg::Int(2)];
        assert_eq!(format_template("%s failed %2$d times", &args), "ch. 12 failed 2 times");
    }

    #[test]
    fn test_format_literal_percent() {
        assert_eq!(format_template("100%% done", &[]), "100% done");
    }

    #[test]
    fn test_format_missing_argument_renders_empty() {
        assert_eq!(format_template("attempt %1$d", &[]), "attempt ");
    }

    #[test]
    fn test_format_unknown_specifier_is_copied() {
        assert_eq!(format_template("50%x and %", &[]), "50%x and %");
        assert_eq!(format_template("%0$d", &[FormatArg::Int(1)]), "%0$d");
    }

    #[test]
    fn test_format_oversized_index_is_copied() {
        let template = "Retry %99999999999999999999999$d";
        assert_eq!(format_template(template, &[FormatArg::Int(3)]), template);
    }

    #[test]
    fn test_override_with_oversized_index_does_not_panic() {
        let json = r#"{"manga_download_status_retrying": "Retry %99999999999999999999999$d"}"#;
        let table = StringTable::with_overrides_json(MediaKind::Manga, json).unwrap();
        assert_eq!(
            table.get(MessageKey::Retrying, &[FormatArg::Int(3)]),
            "Retry %99999999999999999999999$d"
        );
    }

    #[test]
    fn test_english_table_every_key_non_empty() {
        for kind in [MediaKind::Anime, MediaKind::Manga, MediaKind::Novel] {
            let table = StringTable::english(kind);
            for key in MessageKey::ALL {
                assert!(!table.get(key, &[FormatArg::Int(1)]).is_empty());
            }
        }
    }

    #[test]
    fn test_english_completed_uses_kind_noun() {
        let anime = StringTable::english(MediaKind::Anime);
        let manga = StringTable::english(MediaKind::Manga);
        assert_eq!(anime.get(MessageKey::Completed, &[]), "Episode downloaded");
        assert_eq!(manga.get(MessageKey::Completed, &[]), "Chapter downloaded");
    }

    #[test]
    fn test_overrides_replace_only_matching_kind() {
        let json = r#"{
            "anime_download_status_retrying": "Nuevo intento (%1$d)",
            "manga_download_status_retrying": "Reintento manga %1$d"
        }"#;
        let table = StringTable::with_overrides_json(MediaKind::Anime, json).unwrap();
        assert_eq!(
            table.get(MessageKey::Retrying, &[FormatArg::Int(4)]),
            "Nuevo intento (4)"
        );
        assert_eq!(table.get(MessageKey::PausedByUser, &[]), "Paused");
    }

    #[test]
    fn test_overrides_reject_non_object() {
        assert!(StringTable::with_overrides_json(MediaKind::Manga, "[1, 2]").is_err());
    }
}
