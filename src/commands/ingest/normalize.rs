use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

// Input contract with the external document-text-extraction component:
// a flat sequence of style-labeled paragraphs.
#[derive(Debug, Clone, Deserialize)]
pub struct StyledParagraph {
    pub style: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NormalizedParagraph {
    pub style: String,
    pub text: String,
    // Manual numbering prefix lifted out of the text, e.g. "3.2" or "IV".
    pub numbering: Option<String>,
}

#[derive(Debug, Default)]
pub struct NormalizedStream {
    pub paragraphs: Vec<NormalizedParagraph>,
    pub ignored_count: usize,
    pub numbering_stripped_count: usize,
}

// Author-note styles that never carry contract text.
const IGNORED_STYLES: &[&str] = &[
    "comment",
    "comment text",
    "annotation text",
    "balloon text",
    "revision",
];

const DRAFTING_NOTE_PREFIXES: &[&str] = &["NOTE TO DRAFTER", "[DRAFTING NOTE"];

pub struct ParagraphNormalizer {
    dotted_numbering: Regex,
    roman_numbering: Regex,
    whitespace_run: Regex,
}

impl ParagraphNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // A bare number only counts as manual numbering when it is
            // terminated ("3." / "3)"); multi-segment markers may omit the
            // terminator ("3.2 Purchase Price").
            dotted_numbering: Regex::new(
                r"^\s*(?P<num>\d+(?:\.\d+)+\.?|\d+[.)])\s+(?P<rest>\S.*)$",
            )
            .context("failed to compile dotted numbering regex")?,
            roman_numbering: Regex::new(r"^\s*(?P<num>[IVXLCDM]+)\.\s+(?P<rest>\S.*)$")
                .context("failed to compile roman numbering regex")?,
            whitespace_run: Regex::new(r"[ \t]{2,}")
                .context("failed to compile whitespace regex")?,
        })
    }

    pub fn normalize(&self, raw: &[StyledParagraph]) -> NormalizedStream {
        let mut stream = NormalizedStream::default();

        for paragraph in raw {
            let text = paragraph.text.trim();
            if text.is_empty() {
                continue;
            }

            if self.is_ignorable(&paragraph.style, text) {
                stream.ignored_count += 1;
                continue;
            }

            let collapsed = self.whitespace_run.replace_all(text, " ").into_owned();
            let (cleaned, numbering) = self.lift_numbering(&collapsed);
            if numbering.is_some() {
                stream.numbering_stripped_count += 1;
            }

            stream.paragraphs.push(NormalizedParagraph {
                style: paragraph.style.trim().to_string(),
                text: cleaned,
                numbering,
            });
        }

        stream
    }

    fn is_ignorable(&self, style: &str, text: &str) -> bool {
        let style_lower = style.trim().to_ascii_lowercase();
        if IGNORED_STYLES.contains(&style_lower.as_str()) {
            return true;
        }

        let upper = text.to_ascii_uppercase();
        DRAFTING_NOTE_PREFIXES
            .iter()
            .any(|prefix| upper.starts_with(prefix))
    }

    // Lowercase roman and alpha list markers stay in the text: the
    // classifier consumes them as list-item signals. Only dotted-numeric
    // and uppercase-roman manual numbering is lifted.
    fn lift_numbering(&self, text: &str) -> (String, Option<String>) {
        if let Some(captures) = self.dotted_numbering.captures(text) {
            let numbering = captures["num"]
                .trim_end_matches(['.', ')'])
                .to_string();
            let rest = captures["rest"].to_string();
            return (rest, Some(numbering));
        }

        if let Some(captures) = self.roman_numbering.captures(text) {
            let numbering = captures["num"].to_string();
            let rest = captures["rest"].to_string();
            return (rest, Some(numbering));
        }

        (text.to_string(), None)
    }
}
