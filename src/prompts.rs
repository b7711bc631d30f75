//! Prompt templates for page and cover generation.
//!
//! Every book type maps to one default prompt. Callers can override it via
//! [`crate::config::BookConfig::prompt`]; the constants here are used only
//! when no override is provided.

use crate::config::BookType;

/// Default prompt for coloring pages (sent to the image backends).
pub const COLORING_PROMPT: &str = "A cute unicorn with rainbow mane, magical lighting, soft pastel clouds, dreamy fantasy storybook style";

/// Default prompt for planner pages.
pub const PLANNER_PROMPT: &str = "Generate a daily planner layout idea with motivational elements.";

/// Default prompt for storybook pages.
pub const STORYBOOK_PROMPT: &str = "Write a short bedtime story for children under 100 words.";

/// Default prompt for journal pages.
pub const JOURNAL_PROMPT: &str = "Generate a journal prompt with space to write reflections.";

/// Default prompt for quote book pages.
pub const QUOTE_PROMPT: &str = "Provide an inspirational quote with author's name.";

/// The built-in prompt for a book type.
pub fn default_prompt(book_type: BookType) -> &'static str {
    match book_type {
        BookType::Coloring => COLORING_PROMPT,
        BookType::Planner => PLANNER_PROMPT,
        BookType::Storybook => STORYBOOK_PROMPT,
        BookType::Journal => JOURNAL_PROMPT,
        BookType::Quote => QUOTE_PROMPT,
    }
}

/// Prompt recorded for page `index` (1-based): the base prompt plus a page suffix.
///
/// Text backends receive exactly this string. Image backends receive the
/// bare base prompt so every coloring page shares one visual style.
pub fn page_prompt(base: &str, index: usize) -> String {
    format!("{base} (Page {index})")
}

/// Prompt for the cover illustration.
pub fn cover_prompt(title: &str) -> String {
    format!(
        "a magical unicorn standing in a sunny fantasy meadow, children's book cover, \
         soft dreamy pastel colors, title: {title}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_has_a_template() {
        for t in BookType::ALL {
            assert!(!default_prompt(t).is_empty(), "{t:?} has no template");
        }
    }

    #[test]
    fn page_prompt_suffix() {
        assert_eq!(page_prompt("Write a story.", 3), "Write a story. (Page 3)");
    }

    #[test]
    fn cover_prompt_mentions_title() {
        assert!(cover_prompt("Moon Tales").ends_with("title: Moon Tales"));
    }
}
