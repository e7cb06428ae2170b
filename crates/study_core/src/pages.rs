//! crates/study_core/src/pages.rs
//!
//! Helpers for working with extracted page text.

use crate::domain::Page;

/// Attaches 1-based page numbers to extracted page texts, preserving blank pages.
pub fn number_pages(texts: Vec<String>) -> Vec<Page> {
    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page {
            number: index as u32 + 1,
            text,
        })
        .collect()
}

impl Page {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Cuts `text` down to at most `max_chars` characters without splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_keeps_blank_pages_in_place() {
        let pages = number_pages(vec!["one".into(), "".into(), "three".into()]);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].number, 2);
        assert!(pages[1].is_blank());
        assert_eq!(pages[2].number, 3);
        assert_eq!(pages[2].text, "three");
    }

    #[test]
    fn whitespace_only_page_is_blank() {
        let page = Page {
            number: 1,
            text: " \n\t ".into(),
        };
        assert!(page.is_blank());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 4000), "short");
        assert_eq!(truncate_chars("", 10), "");
    }
}
