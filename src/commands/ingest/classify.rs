use anyhow::{Context, Result};
use regex::Regex;

use crate::model::{BlockType, TABLE_PLACEHOLDERS};

use super::normalize::NormalizedParagraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub block_type: BlockType,
    pub level: i64,
}

impl Classification {
    fn new(block_type: BlockType, level: i64) -> Self {
        Self { block_type, level }
    }
}

type Heuristic = fn(&HierarchyClassifier, &NormalizedParagraph) -> Option<Classification>;

// Text heuristics run in priority order after the style table; the first
// match wins. Each is a pure paragraph -> Option<Classification> function
// so new heuristics can be added and tested without touching the tree
// builder.
const TEXT_HEURISTICS: &[Heuristic] = &[
    HierarchyClassifier::match_article_marker,
    HierarchyClassifier::match_exhibit_marker,
    HierarchyClassifier::match_dotted_clause_marker,
    HierarchyClassifier::match_all_caps_heading,
    HierarchyClassifier::match_title_case_heading,
];

pub struct HierarchyClassifier {
    roman_list_prefix: Regex,
    article_marker: Regex,
    exhibit_marker: Regex,
    dotted_marker: Regex,
    placeholder_token: Regex,
}

impl HierarchyClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            roman_list_prefix: Regex::new(r"^(?:i|ii|iii|iv|v|vi|vii|viii|ix|x)[.)]\s+")
                .context("failed to compile roman list prefix regex")?,
            article_marker: Regex::new(r"^(?i:ARTICLE|SECTION)\s+(?:[IVXLC]+|\d+)\b")
                .context("failed to compile article marker regex")?,
            exhibit_marker: Regex::new(r"^(?i:EXHIBIT)\s+[A-Za-z]\b")
                .context("failed to compile exhibit marker regex")?,
            dotted_marker: Regex::new(r"^(?P<marker>\d+(?:\.\d+)+)\s+\S")
                .context("failed to compile dotted clause marker regex")?,
            placeholder_token: Regex::new(r"\{\{([A-Z][A-Z0-9_]*)\}\}")
                .context("failed to compile placeholder token regex")?,
        })
    }

    pub fn classify(&self, paragraph: &NormalizedParagraph) -> Classification {
        // A table placeholder always wins, even over an explicit heading
        // style: the paragraph is a slot for a rendered table, whatever
        // style the author gave it.
        if self.contains_table_placeholder(&paragraph.text) {
            return Classification::new(BlockType::Table, 5);
        }

        if self.roman_list_prefix.is_match(&paragraph.text) {
            return Classification::new(BlockType::ListItem, 7);
        }

        if let Some(classified) = style_table_lookup(&paragraph.style) {
            return classified;
        }

        for heuristic in TEXT_HEURISTICS {
            if let Some(classified) = heuristic(self, paragraph) {
                return classified;
            }
        }

        Classification::new(BlockType::Paragraph, 5)
    }

    pub fn contains_table_placeholder(&self, text: &str) -> bool {
        self.placeholder_token
            .captures_iter(text)
            .any(|captures| TABLE_PLACEHOLDERS.contains(&&captures[1]))
    }

    fn match_article_marker(&self, paragraph: &NormalizedParagraph) -> Option<Classification> {
        if self.article_marker.is_match(&paragraph.text) {
            return Some(Classification::new(BlockType::Section, 1));
        }
        None
    }

    fn match_exhibit_marker(&self, paragraph: &NormalizedParagraph) -> Option<Classification> {
        if self.exhibit_marker.is_match(&paragraph.text) {
            return Some(Classification::new(BlockType::Section, 2));
        }
        None
    }

    // Dotted numeric markers: "1.1" reads as a clause, "1.1.1" and deeper
    // as a sub-clause. The normalizer may have lifted the marker into the
    // numbering field, so both sources are consulted.
    fn match_dotted_clause_marker(&self, paragraph: &NormalizedParagraph) -> Option<Classification> {
        let segments = paragraph
            .numbering
            .as_deref()
            .map(count_numeric_segments)
            .filter(|count| *count >= 2)
            .or_else(|| {
                self.dotted_marker
                    .captures(&paragraph.text)
                    .map(|captures| count_numeric_segments(&captures["marker"]))
            })?;

        match segments {
            0 | 1 => None,
            2 => Some(Classification::new(BlockType::Clause, 3)),
            _ => Some(Classification::new(BlockType::Clause, 4)),
        }
    }

    fn match_all_caps_heading(&self, paragraph: &NormalizedParagraph) -> Option<Classification> {
        let text = paragraph.text.trim();
        if text.len() > 60 || !text.chars().any(|value| value.is_alphabetic()) {
            return None;
        }
        if text.chars().any(|value| value.is_lowercase()) {
            return None;
        }
        Some(Classification::new(BlockType::Section, 1))
    }

    fn match_title_case_heading(&self, paragraph: &NormalizedParagraph) -> Option<Classification> {
        let text = paragraph.text.trim();
        if text.len() > 80 || text.is_empty() {
            return None;
        }

        let ends_like_heading = text.ends_with(':') || !text.ends_with('.');
        if !ends_like_heading {
            return None;
        }

        let words: Vec<&str> = text
            .trim_end_matches(':')
            .split_whitespace()
            .collect();
        if words.is_empty() || words.len() > 8 {
            return None;
        }

        let capitalized = words
            .iter()
            .filter(|word| {
                word.chars()
                    .next()
                    .map(|value| value.is_uppercase())
                    .unwrap_or(false)
            })
            .count();

        // Short connectives ("of", "and") are allowed in a title-case
        // heading; require a clear majority of capitalized words.
        if capitalized * 3 >= words.len() * 2 {
            Some(Classification::new(BlockType::Clause, 3))
        } else {
            None
        }
    }
}

fn style_table_lookup(style: &str) -> Option<Classification> {
    let normalized = style.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "title" | "heading 1" => Some(Classification::new(BlockType::Section, 1)),
        "heading 2" => Some(Classification::new(BlockType::Section, 2)),
        "heading 3" => Some(Classification::new(BlockType::Clause, 3)),
        "heading 4" => Some(Classification::new(BlockType::Clause, 4)),
        "heading 5" => Some(Classification::new(BlockType::ListItem, 7)),
        "heading 6" => Some(Classification::new(BlockType::Conspicuous, 6)),
        _ => None,
    }
}

pub fn count_numeric_segments(marker: &str) -> usize {
    marker
        .split('.')
        .filter(|segment| !segment.is_empty() && segment.chars().all(|value| value.is_ascii_digit()))
        .count()
}
