use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::model::{BlockType, ClauseDraft, ExhibitDraft, CONDITION_JURISDICTION};

use super::classify::{Classification, HierarchyClassifier};
use super::conditions::{ConditionScanner, Markers, ParserContext};
use super::normalize::NormalizedParagraph;

const MAX_HEADING_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    NoSection,
    InSection,
    InClause,
    InSubclause,
}

#[derive(Debug)]
struct PendingNode {
    temp_id: u32,
    parent_temp_id: Option<u32>,
    code: String,
    block_type: BlockType,
    level: i64,
    heading: Option<String>,
    pieces: Vec<String>,
    disclosure_code: Option<String>,
}

#[derive(Debug)]
struct PendingExhibit {
    letter: char,
    title: String,
    pieces: Vec<String>,
    sort_order: i64,
    is_dynamic: bool,
    disclosure_code: Option<String>,
}

#[derive(Debug, Default)]
pub struct DecomposeCounters {
    pub markers_repaired: usize,
    pub section_nodes: usize,
    pub clause_nodes: usize,
    pub subclause_nodes: usize,
    pub paragraph_nodes: usize,
    pub table_nodes: usize,
    pub list_item_nodes: usize,
    pub conspicuous_nodes: usize,
    pub dynamic_disclosure_nodes: usize,
}

#[derive(Debug, Default)]
pub struct DecomposedDocument {
    pub clauses: Vec<ClauseDraft>,
    pub exhibits: Vec<ExhibitDraft>,
    pub warnings: Vec<String>,
    pub counters: DecomposeCounters,
}

// Single-pass, stack-discipline builder: one pending node at a time, an
// explicit ancestry stack of (temp_id, level), and an immutable-per-step
// ParserContext for the ambient condition values. "Finalize" is the only
// transition that emits a node.
pub struct TreeBuilder {
    classifier: HierarchyClassifier,
    scanner: ConditionScanner,
    variable_token: Regex,
    dangling_list_marker: Regex,
    heading_marker_prefix: Regex,

    state: BuilderState,
    ctx: ParserContext,
    stack: Vec<(u32, i64)>,
    codes: HashMap<u32, String>,
    child_counters: HashMap<(Option<u32>, &'static str), u32>,

    current_section: Option<u32>,
    current_clause: Option<u32>,
    current_subclause: Option<u32>,

    pending: Option<PendingNode>,
    pending_exhibit: Option<PendingExhibit>,

    section_counter: u32,
    sort_counter: i64,
    next_temp_id: u32,

    out: DecomposedDocument,
}

impl TreeBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: HierarchyClassifier::new()?,
            scanner: ConditionScanner::new()?,
            variable_token: Regex::new(r"\{\{([A-Z][A-Z0-9_]*)\}\}")
                .context("failed to compile variable token regex")?,
            dangling_list_marker: Regex::new(r"^(?:[-*•]|[ivx]+[.)]|[a-z][.)]|\d+[.)])$")
                .context("failed to compile dangling list marker regex")?,
            heading_marker_prefix: Regex::new(
                r"^(?i)(?:ARTICLE|SECTION|EXHIBIT)\s+(?:[IVXLC]+|\d+|[A-Z])\b[\s:.\-–—]*",
            )
            .context("failed to compile heading marker prefix regex")?,
            state: BuilderState::NoSection,
            ctx: ParserContext::default(),
            stack: Vec::new(),
            codes: HashMap::new(),
            child_counters: HashMap::new(),
            current_section: None,
            current_clause: None,
            current_subclause: None,
            pending: None,
            pending_exhibit: None,
            section_counter: 0,
            sort_counter: 0,
            next_temp_id: 0,
            out: DecomposedDocument::default(),
        })
    }

    pub fn push_paragraph(&mut self, paragraph: &NormalizedParagraph) {
        let (repaired, repairs) = self.scanner.repair_markers(&paragraph.text);
        self.out.counters.markers_repaired += repairs;

        let markers = self.scanner.scan(&repaired);

        if let Some(header) = markers.exhibit.clone() {
            // A re-stated header for the current letter continues the same
            // exhibit; only a different letter is a hard split.
            if self.ctx.exhibit_letter == Some(header.letter) {
                self.ctx = self.ctx.observing(&markers);
                self.append_to_exhibit(&repaired, &markers);
                return;
            }

            self.start_exhibit(header, &markers);
            return;
        }

        let classified = self.classify_repaired(paragraph, &repaired);

        match classified.block_type {
            BlockType::Section => self.on_section(&repaired, &markers, classified),
            BlockType::Clause => self.on_clause(paragraph, &repaired, &markers, classified),
            BlockType::Table | BlockType::ListItem | BlockType::Conspicuous => {
                self.on_leaf(&repaired, &markers, classified)
            }
            BlockType::Paragraph | BlockType::DynamicDisclosure => {
                self.on_body_paragraph(&repaired, &markers)
            }
        }
    }

    pub fn finish(mut self) -> DecomposedDocument {
        self.finalize_pending();
        self.finalize_exhibit();
        self.out
    }

    fn classify_repaired(
        &self,
        paragraph: &NormalizedParagraph,
        repaired: &str,
    ) -> Classification {
        let effective = NormalizedParagraph {
            style: paragraph.style.clone(),
            text: repaired.to_string(),
            numbering: paragraph.numbering.clone(),
        };
        self.classifier.classify(&effective)
    }

    fn on_section(&mut self, text: &str, markers: &Markers, classified: Classification) {
        self.finalize_pending();

        if classified.level == 1 {
            self.ctx = self.ctx.at_section_boundary();
        }
        self.ctx = self.ctx.observing(markers);

        let temp_id = self.next_temp();
        let (parent, code) = self.open_header_slot(temp_id, classified.level, "s");

        let heading = self.derive_short_name(text);
        self.pending = Some(PendingNode {
            temp_id,
            parent_temp_id: parent,
            code,
            block_type: BlockType::Section,
            level: classified.level,
            heading: Some(heading),
            pieces: vec![self.scanner.strip_disclosure_markers(text)],
            disclosure_code: markers.disclosure_code.clone(),
        });

        self.current_section = Some(temp_id);
        self.current_clause = None;
        self.current_subclause = None;
        self.state = BuilderState::InSection;
    }

    fn on_clause(
        &mut self,
        paragraph: &NormalizedParagraph,
        text: &str,
        markers: &Markers,
        classified: Classification,
    ) {
        self.finalize_pending();
        self.ctx = self.ctx.observing(markers);

        // The numeric prefix decides sub-clause vs clause: three or more
        // segments nest under the current clause.
        let segment_count = paragraph
            .numbering
            .as_deref()
            .map(super::classify::count_numeric_segments)
            .unwrap_or(0);
        let is_subclause =
            (classified.level >= 4 || segment_count >= 3) && self.current_clause.is_some();

        let temp_id = self.next_temp();
        let (parent, code, level) = if is_subclause {
            let parent = self.current_clause;
            let code = self.child_code(parent, "s");
            (parent, code, 4)
        } else {
            let parent = self.current_section;
            let code = self.child_code(parent, "c");
            (parent, code, 3)
        };

        self.push_stack_slot(temp_id, level);
        let heading = self.derive_short_name(text);
        self.pending = Some(PendingNode {
            temp_id,
            parent_temp_id: parent,
            code,
            block_type: BlockType::Clause,
            level,
            heading: Some(heading),
            pieces: vec![self.scanner.strip_disclosure_markers(text)],
            disclosure_code: markers.disclosure_code.clone(),
        });

        if is_subclause {
            self.current_subclause = Some(temp_id);
            self.state = BuilderState::InSubclause;
        } else {
            self.current_clause = Some(temp_id);
            self.current_subclause = None;
            self.state = BuilderState::InClause;
        }
    }

    fn on_leaf(&mut self, text: &str, markers: &Markers, classified: Classification) {
        self.finalize_pending();
        self.ctx = self.ctx.observing(markers);

        let parent = self.nearest_enclosing();
        let kind = match classified.block_type {
            BlockType::Table => "t",
            BlockType::ListItem => "li",
            BlockType::Conspicuous => "x",
            _ => "p",
        };
        let temp_id = self.next_temp();
        let code = self.child_code(parent, kind);

        let block_type = if markers.disclosure_code.is_some() {
            BlockType::DynamicDisclosure
        } else {
            classified.block_type
        };

        self.emit_node(PendingNode {
            temp_id,
            parent_temp_id: parent,
            code,
            block_type,
            level: classified.level,
            heading: None,
            pieces: vec![self.scanner.strip_disclosure_markers(text)],
            disclosure_code: markers.disclosure_code.clone(),
        });
    }

    fn on_body_paragraph(&mut self, text: &str, markers: &Markers) {
        self.ctx = self.ctx.observing(markers);

        if let Some(pending) = self.pending.as_mut() {
            if let Some(code) = &markers.disclosure_code {
                pending.disclosure_code = Some(code.clone());
                pending.block_type = BlockType::DynamicDisclosure;
            }
            let stripped = self.scanner.strip_disclosure_markers(text);
            if !stripped.is_empty() {
                pending.pieces.push(stripped);
            }
            return;
        }

        if self.state == BuilderState::NoSection && self.pending_exhibit.is_some() {
            self.append_to_exhibit(text, markers);
            return;
        }

        // Orphan paragraph: no buffer is open, so it becomes its own node
        // under the nearest enclosing clause or section.
        let parent = self.nearest_enclosing();
        let temp_id = self.next_temp();
        let code = self.child_code(parent, "p");
        let block_type = if markers.disclosure_code.is_some() {
            BlockType::DynamicDisclosure
        } else {
            BlockType::Paragraph
        };

        self.emit_node(PendingNode {
            temp_id,
            parent_temp_id: parent,
            code,
            block_type,
            level: 5,
            heading: None,
            pieces: vec![self.scanner.strip_disclosure_markers(text)],
            disclosure_code: markers.disclosure_code.clone(),
        });
    }

    fn start_exhibit(&mut self, header: super::conditions::ExhibitHeader, markers: &Markers) {
        self.finalize_pending();
        self.finalize_exhibit();

        if !header.strict_match {
            let warning = format!(
                "exhibit header for letter {} failed strict validation, splitting anyway",
                header.letter
            );
            warn!(letter = %header.letter, "loose exhibit header accepted");
            self.out.warnings.push(warning);
        }

        self.ctx = self.ctx.entering_exhibit(header.letter);
        self.ctx = self.ctx.observing(markers);

        self.sort_counter += 1;
        self.pending_exhibit = Some(PendingExhibit {
            letter: header.letter,
            title: header.title,
            pieces: Vec::new(),
            sort_order: self.sort_counter,
            is_dynamic: markers.disclosure_code.is_some(),
            disclosure_code: markers.disclosure_code.clone(),
        });

        // Nodes after the split are roots again.
        self.stack.clear();
        self.current_section = None;
        self.current_clause = None;
        self.current_subclause = None;
        self.state = BuilderState::NoSection;
    }

    fn append_to_exhibit(&mut self, text: &str, markers: &Markers) {
        let stripped = self.scanner.strip_disclosure_markers(text);
        let Some(exhibit) = self.pending_exhibit.as_mut() else {
            return;
        };

        if let Some(code) = &markers.disclosure_code {
            exhibit.disclosure_code = Some(code.clone());
            exhibit.is_dynamic = true;
        }
        if !stripped.is_empty() {
            exhibit.pieces.push(stripped);
        }
    }

    fn finalize_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.emit_node(pending);
        }
    }

    // The single emitting transition: stamps content, derived variables,
    // and the ambient condition snapshot onto the node.
    fn emit_node(&mut self, node: PendingNode) {
        self.sort_counter += 1;

        let content = node.pieces.join("\n\n").trim().to_string();
        let variables_used = self.extract_variables(&content);

        let mut conditions = BTreeMap::new();
        if let Some(jurisdiction) = &self.ctx.jurisdiction {
            conditions.insert(CONDITION_JURISDICTION.to_string(), jurisdiction.clone());
        }

        match node.block_type {
            BlockType::Section => self.out.counters.section_nodes += 1,
            BlockType::Clause if node.level >= 4 => self.out.counters.subclause_nodes += 1,
            BlockType::Clause => self.out.counters.clause_nodes += 1,
            BlockType::Paragraph => self.out.counters.paragraph_nodes += 1,
            BlockType::Table => self.out.counters.table_nodes += 1,
            BlockType::ListItem => self.out.counters.list_item_nodes += 1,
            BlockType::Conspicuous => self.out.counters.conspicuous_nodes += 1,
            BlockType::DynamicDisclosure => self.out.counters.dynamic_disclosure_nodes += 1,
        }

        self.codes.insert(node.temp_id, node.code.clone());
        self.out.clauses.push(ClauseDraft {
            temp_id: node.temp_id,
            parent_temp_id: node.parent_temp_id,
            code: node.code,
            hierarchy_level: node.level,
            sort_order: self.sort_counter,
            block_type: node.block_type,
            heading: node.heading,
            content,
            variables_used,
            conditions,
            disclosure_code: node.disclosure_code,
            service_model_condition: self.ctx.service_model,
        });
    }

    fn finalize_exhibit(&mut self) {
        let Some(exhibit) = self.pending_exhibit.take() else {
            return;
        };

        let mut pieces = exhibit.pieces;
        // Trim trailing empty markup and close any unterminated list: a
        // dangling marker with no body is authoring debris, not content.
        while let Some(last) = pieces.last() {
            let trimmed = last.trim();
            if trimmed.is_empty() || self.dangling_list_marker.is_match(trimmed) {
                pieces.pop();
            } else {
                break;
            }
        }

        let content = pieces.join("\n\n").trim().to_string();
        let variables_used = self.extract_variables(&content);

        let mut conditions = BTreeMap::new();
        if let Some(jurisdiction) = &self.ctx.jurisdiction {
            conditions.insert(CONDITION_JURISDICTION.to_string(), jurisdiction.clone());
        }

        self.out.exhibits.push(ExhibitDraft {
            letter: exhibit.letter,
            title: exhibit.title,
            content,
            sort_order: exhibit.sort_order,
            is_dynamic: exhibit.is_dynamic,
            disclosure_code: exhibit.disclosure_code,
            conditions,
            service_model_condition: self.ctx.service_model,
            variables_used,
        });
    }

    fn next_temp(&mut self) -> u32 {
        self.next_temp_id += 1;
        self.next_temp_id
    }

    fn nearest_enclosing(&self) -> Option<u32> {
        self.current_subclause
            .or(self.current_clause)
            .or(self.current_section)
    }

    // Pops the ancestry stack to the enclosing slot for a header at this
    // level, assigns a code, and pushes the new slot.
    fn open_header_slot(
        &mut self,
        temp_id: u32,
        level: i64,
        kind: &'static str,
    ) -> (Option<u32>, String) {
        while self
            .stack
            .last()
            .map(|(_, open_level)| *open_level >= level)
            .unwrap_or(false)
        {
            self.stack.pop();
        }

        let parent = self.stack.last().map(|(parent_temp, _)| *parent_temp);
        let code = if parent.is_none() && kind == "s" {
            self.section_counter += 1;
            format!("s{:02}", self.section_counter)
        } else {
            self.child_code(parent, kind)
        };
        self.stack.push((temp_id, level));
        (parent, code)
    }

    fn push_stack_slot(&mut self, temp_id: u32, level: i64) {
        while self
            .stack
            .last()
            .map(|(_, open_level)| *open_level >= level)
            .unwrap_or(false)
        {
            self.stack.pop();
        }
        self.stack.push((temp_id, level));
    }

    fn child_code(&mut self, parent: Option<u32>, kind: &'static str) -> String {
        let counter = self
            .child_counters
            .entry((parent, kind))
            .and_modify(|value| *value += 1)
            .or_insert(1);

        match parent.and_then(|temp| self.codes.get(&temp)) {
            Some(parent_code) => format!("{parent_code}.{kind}{counter:02}"),
            None => format!("{kind}{counter:02}"),
        }
    }

    fn extract_variables(&self, content: &str) -> Vec<String> {
        let mut seen = Vec::<String>::new();
        for captures in self.variable_token.captures_iter(content) {
            let name = captures[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    // Section and clause headings keep a short derived name: truncated at
    // the first colon or sentence period, manual numbering stripped, at
    // most 100 characters.
    fn derive_short_name(&self, text: &str) -> String {
        let stripped = self.heading_marker_prefix.replace(text.trim(), "");
        let base = stripped.trim();

        let mut cut = base.len();
        let bytes = base.as_bytes();
        for (index, value) in bytes.iter().enumerate() {
            if *value == b':' {
                cut = index;
                break;
            }
            if *value == b'.' {
                let next_is_break = bytes
                    .get(index + 1)
                    .map(|next| next.is_ascii_whitespace())
                    .unwrap_or(true);
                let previous_is_digit = index
                    .checked_sub(1)
                    .and_then(|prev| bytes.get(prev))
                    .map(|prev| prev.is_ascii_digit())
                    .unwrap_or(false);
                if next_is_break && !previous_is_digit {
                    cut = index;
                    break;
                }
            }
        }

        let mut name = base[..cut].trim().to_string();
        if name.len() > MAX_HEADING_CHARS {
            let mut boundary = MAX_HEADING_CHARS;
            while !name.is_char_boundary(boundary) {
                boundary -= 1;
            }
            name.truncate(boundary);
            name = name.trim_end().to_string();
        }

        if name.is_empty() {
            base.chars().take(MAX_HEADING_CHARS).collect()
        } else {
            name
        }
    }
}
