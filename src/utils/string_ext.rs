//! String helpers shared by the store and the report builder.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s_]+").unwrap());

/// Convert a company name to a URL-safe slug.
///
/// Nordic letters fold to their ASCII base (`Öhman å` → `ohman-a`), everything
/// non-alphanumeric collapses to a single `-`.
pub fn slugify(name: &str) -> String {
    let folded: String = name
        .chars()
        .map(|c| match c {
            'å' | 'ä' => 'a',
            'ö' => 'o',
            'Å' | 'Ä' => 'A',
            'Ö' => 'O',
            'é' | 'è' => 'e',
            'É' | 'È' => 'E',
            'ø' => 'o',
            'Ø' => 'O',
            'æ' => 'a',
            'Æ' => 'A',
            _ => c,
        })
        .filter(|c| c.is_ascii())
        .collect();

    let lower = folded.to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(lower.trim(), "");
    SLUG_SEPARATORS
        .replace_all(&stripped, "-")
        .trim_matches('-')
        .to_string()
}

/// String cleanup extension trait
pub trait StringExt {
    /// Trim and return `None` for empty strings
    fn clean(&self) -> Option<String>;
}

impl StringExt for str {
    #[inline]
    fn clean(&self) -> Option<String> {
        let trimmed = self.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl StringExt for String {
    #[inline]
    fn clean(&self) -> Option<String> {
        self.as_str().clean()
    }
}
