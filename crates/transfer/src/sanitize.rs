//! Filename hardening.
//!
//! Produces a storage-safe name from whatever the user picked: control
//! characters are stripped, unsafe characters replaced, Windows device
//! names neutralised and the length bounded with the extension preserved.

/// Windows device names that cannot be used as a file stem.
pub(crate) const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Knobs for [`sanitize_filename`].
#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    /// Lowercase the result.
    pub lowercase: bool,
    /// Maximum length in characters, extension included.
    pub max_length: usize,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            max_length: 255,
        }
    }
}

/// Result of [`sanitize_filename`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedName {
    pub sanitized: String,
    pub was_modified: bool,
    /// Lowercased extension without the dot, if any.
    pub extension: Option<String>,
    pub warnings: Vec<String>,
}

/// Returns the lowercased extension of `name`.
///
/// A leading dot (`.gitignore`) does not start an extension.
pub fn extract_extension(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx + 1..].to_ascii_lowercase())
}

pub(crate) fn is_reserved_stem(stem: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

fn is_control(c: char) -> bool {
    // C0, DEL and C1.
    c.is_control() || ('\u{80}'..='\u{9f}').contains(&c)
}

/// Sanitizes a user-supplied filename for storage.
pub fn sanitize_filename(name: &str, opts: &SanitizeOptions) -> SanitizedName {
    let mut warnings = Vec::new();

    let stripped: String = name.chars().filter(|c| !is_control(*c)).collect();
    if stripped.len() != name.len() {
        warnings.push("Control characters removed".to_string());
    }

    let cased = if opts.lowercase {
        stripped.to_lowercase()
    } else {
        stripped
    };

    let (stem, ext) = match cased.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < cased.len() => {
            (cased[..idx].to_string(), Some(cased[idx + 1..].to_string()))
        }
        _ => (cased.clone(), None),
    };

    let mut safe_stem = replace_unsafe(&stem);
    let safe_ext = ext.as_deref().map(replace_unsafe).filter(|e| !e.is_empty());

    if safe_stem.is_empty() || safe_stem == "." {
        safe_stem = "file".to_string();
        warnings.push("Empty name replaced".to_string());
    }

    if is_reserved_stem(&safe_stem) {
        safe_stem.insert(0, '_');
        warnings.push(format!("Reserved name prefixed: {stem}"));
    }

    let ext_len = safe_ext.as_ref().map_or(0, |e| e.chars().count() + 1);
    let max_stem = opts.max_length.saturating_sub(ext_len).max(1);
    if safe_stem.chars().count() > max_stem {
        safe_stem = safe_stem.chars().take(max_stem).collect();
        warnings.push(format!("Name truncated to {} characters", opts.max_length));
    }

    let sanitized = match &safe_ext {
        Some(e) => format!("{safe_stem}.{e}"),
        None => safe_stem,
    };

    SanitizedName {
        was_modified: sanitized != name,
        extension: safe_ext.map(|e| e.to_ascii_lowercase()),
        sanitized,
        warnings,
    }
}

/// Spaces become `_`, other unsafe characters are dropped, runs of `_`
/// collapse to one.
fn replace_unsafe(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let mapped = match c {
            ' ' | '_' => Some('_'),
            '-' | '.' => Some(c),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        };
        if let Some(m) = mapped {
            if m == '_' && out.ends_with('_') {
                continue;
            }
            out.push(m);
        }
    }
    out
}
