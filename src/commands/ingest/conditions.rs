use anyhow::{Context, Result};
use regex::Regex;

use crate::model::ServiceModel;

// Jurisdictions the authoring conventions reference. Matching is by full
// state name; the stored condition value is the postal code.
pub const JURISDICTIONS: &[(&str, &str)] = &[
    ("Arizona", "AZ"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Idaho", "ID"),
    ("Montana", "MT"),
    ("Nevada", "NV"),
    ("New Mexico", "NM"),
    ("North Carolina", "NC"),
    ("Oregon", "OR"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Washington", "WA"),
];

// Known-malformed marker spellings seen in authored documents, repaired
// before scanning. Anything tag-like that still fails to parse is left in
// the text as a literal.
const MARKER_REPAIRS: &[(&str, &str)] = &[
    ("[STATE DISCLOSURE:", "[STATE_DISCLOSURE:"),
    ("[STATE_DISCLOSURE :", "[STATE_DISCLOSURE:"),
    ("[STATE_DISCLOSURE: ", "[STATE_DISCLOSURE:"),
    ("[ STATE_DISCLOSURE:", "[STATE_DISCLOSURE:"),
];

#[derive(Debug, Clone)]
pub struct ExhibitHeader {
    pub letter: char,
    pub title: String,
    pub strict_match: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Markers {
    pub exhibit: Option<ExhibitHeader>,
    pub jurisdiction: Option<String>,
    pub disclosure_code: Option<String>,
    pub service_model: Option<ServiceModel>,
}

pub struct ConditionScanner {
    exhibit_loose: Regex,
    exhibit_strict: Regex,
    disclosure_marker: Regex,
    crc_keyword: Regex,
    cmos_keyword: Regex,
}

impl ConditionScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            exhibit_loose: Regex::new(r"(?i)^\s*EXHIBIT\s+(?P<letter>[A-Za-z])\b[\s:.\-–—]*(?P<title>.*)$")
                .context("failed to compile loose exhibit header regex")?,
            // Strict form: uppercase EXHIBIT, single capital letter, then
            // nothing or a title starting with a capital or digit.
            exhibit_strict: Regex::new(
                r"^EXHIBIT\s+[A-Z](?:$|\s*[:\-–—]\s*[A-Z0-9(].*|\s+[A-Z0-9(].*)$",
            )
            .context("failed to compile strict exhibit header regex")?,
            disclosure_marker: Regex::new(r"\[STATE_DISCLOSURE:(?P<code>[A-Z0-9_]+)\]")
                .context("failed to compile disclosure marker regex")?,
            crc_keyword: Regex::new(r"\bCRC\b").context("failed to compile CRC keyword regex")?,
            cmos_keyword: Regex::new(r"\bCMOS\b")
                .context("failed to compile CMOS keyword regex")?,
        })
    }

    // Repairs the fixed set of known-malformed marker spellings. Returns
    // the repaired text and the number of substitutions applied.
    pub fn repair_markers(&self, text: &str) -> (String, usize) {
        let mut repaired = text.to_string();
        let mut count = 0usize;

        for (malformed, corrected) in MARKER_REPAIRS {
            let occurrences = repaired.matches(malformed).count();
            if occurrences > 0 {
                repaired = repaired.replace(malformed, corrected);
                count += occurrences;
            }
        }

        (repaired, count)
    }

    pub fn scan(&self, text: &str) -> Markers {
        Markers {
            exhibit: self.scan_exhibit_header(text),
            jurisdiction: scan_jurisdiction(text),
            disclosure_code: self
                .disclosure_marker
                .captures(text)
                .map(|captures| captures["code"].to_string()),
            service_model: self.scan_service_model(text),
        }
    }

    pub fn strip_disclosure_markers(&self, text: &str) -> String {
        self.disclosure_marker.replace_all(text, "").trim().to_string()
    }

    fn scan_exhibit_header(&self, text: &str) -> Option<ExhibitHeader> {
        let captures = self.exhibit_loose.captures(text)?;
        let letter = captures["letter"]
            .chars()
            .next()?
            .to_ascii_uppercase();
        let title = captures["title"].trim().to_string();

        Some(ExhibitHeader {
            letter,
            title,
            strict_match: self.exhibit_strict.is_match(text.trim()),
        })
    }

    // CRC xor CMOS: a paragraph naming both models is describing the
    // choice, not scoping content to one of them.
    fn scan_service_model(&self, text: &str) -> Option<ServiceModel> {
        let has_crc = self.crc_keyword.is_match(text);
        let has_cmos = self.cmos_keyword.is_match(text);
        match (has_crc, has_cmos) {
            (true, false) => Some(ServiceModel::Crc),
            (false, true) => Some(ServiceModel::Cmos),
            _ => None,
        }
    }
}

fn scan_jurisdiction(text: &str) -> Option<String> {
    let trimmed = text.trim();

    for (state, code) in JURISDICTIONS {
        if trimmed.eq_ignore_ascii_case(state) && trimmed.len() <= 40 {
            return Some((*code).to_string());
        }

        if let Some(rest) = strip_prefix_ignore_case(trimmed, state) {
            let rest = rest.trim_start();
            let lowered = rest.to_ascii_lowercase();
            if lowered.starts_with("provisions") || lowered.starts_with("specific") {
                return Some((*code).to_string());
            }
        }
    }

    None
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

// Ambient parsing state, threaded through the tree builder one paragraph
// at a time. Each transition returns a new context instead of mutating
// shared state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParserContext {
    pub jurisdiction: Option<String>,
    pub service_model: Option<ServiceModel>,
    pub exhibit_letter: Option<char>,
}

impl ParserContext {
    // A new marker overrides the ambient value; absence leaves it alone.
    pub fn observing(&self, markers: &Markers) -> ParserContext {
        ParserContext {
            jurisdiction: markers
                .jurisdiction
                .clone()
                .or_else(|| self.jurisdiction.clone()),
            service_model: markers.service_model.or(self.service_model),
            exhibit_letter: self.exhibit_letter,
        }
    }

    // Service model resets at every level-1 boundary.
    pub fn at_section_boundary(&self) -> ParserContext {
        ParserContext {
            jurisdiction: self.jurisdiction.clone(),
            service_model: None,
            exhibit_letter: self.exhibit_letter,
        }
    }

    // Jurisdiction resets only when crossing into a differently-lettered
    // exhibit; re-stating the current letter continues the same exhibit.
    pub fn entering_exhibit(&self, letter: char) -> ParserContext {
        let changed = self.exhibit_letter != Some(letter);
        ParserContext {
            jurisdiction: if changed {
                None
            } else {
                self.jurisdiction.clone()
            },
            service_model: self.service_model,
            exhibit_letter: Some(letter),
        }
    }
}
