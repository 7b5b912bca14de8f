use std::collections::BTreeMap;

use regex::Regex;
use tracing::warn;

use crate::error::EngineResult;
use crate::model::{
    BlockType, ClauseRecord, ExhibitRecord, PricingSummary, ProjectRecord, UnitWithModel,
    CONDITION_JURISDICTION, CONDITION_SERVICE_MODEL, CONDITION_UNIT_COUNT,
};
use crate::store::ClauseStore;

use super::tables;

#[derive(Debug)]
pub struct AssembledDocument {
    pub contract_type: String,
    pub body: String,
    pub clause_count: usize,
    pub exhibit_count: usize,
    pub unresolved_placeholders: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct DocumentRenderer {
    placeholder: Regex,
}

impl DocumentRenderer {
    pub fn new() -> anyhow::Result<Self> {
        use anyhow::Context;
        Ok(Self {
            placeholder: Regex::new(r"\{\{([A-Z][A-Z0-9_]*)\}\}")
                .context("failed to compile placeholder regex")?,
        })
    }

    // Assembles one contract type for one project. Read-only against the
    // store, so fan-outs may call this concurrently on separate
    // connections.
    pub fn assemble_document(
        &self,
        store: &ClauseStore,
        contract_type: &str,
        project: &ProjectRecord,
        pricing: &PricingSummary,
        units: &[UnitWithModel],
        config: &BTreeMap<String, String>,
    ) -> EngineResult<AssembledDocument> {
        let template = store.active_template(contract_type)?;

        let mut codes = template.base_clause_codes.clone();
        for (condition_key, rule_set) in &template.conditional_rules {
            let Some(value) = config.get(condition_key) else {
                continue;
            };
            if let Some(extra) = rule_set.get(value) {
                codes.extend(extra.iter().cloned());
            }
        }
        let codes = dedupe_preserving_order(codes);

        let clauses = store.clauses_by_codes(contract_type, &codes)?;

        let exhibits: Vec<ExhibitRecord> = store
            .exhibits_by_type(contract_type)?
            .into_iter()
            .filter(|exhibit| exhibit_matches(exhibit, config))
            .collect();

        let mut variables = variable_map(project, pricing);
        variables.insert(
            "PRICING_BREAKDOWN_TABLE".to_string(),
            tables::render_pricing_breakdown(pricing),
        );
        variables.insert(
            "PAYMENT_SCHEDULE_TABLE".to_string(),
            tables::render_payment_schedule(pricing),
        );
        variables.insert(
            "UNIT_DETAILS_TABLE".to_string(),
            tables::render_unit_details(units),
        );
        variables.insert(
            "SIGNATURE_BLOCK".to_string(),
            tables::render_signature_block(project),
        );
        variables.insert(
            "EXHIBIT_LIST".to_string(),
            tables::render_exhibit_list(&exhibits),
        );

        let mut body = String::new();
        let mut unresolved = Vec::<String>::new();
        let mut warnings = Vec::<String>::new();

        for clause in &clauses {
            let rendered = self.render_clause(
                store,
                clause,
                &variables,
                config,
                &mut unresolved,
                &mut warnings,
            )?;
            if !rendered.is_empty() {
                body.push_str(&rendered);
                body.push_str("\n\n");
            }
        }

        for exhibit in &exhibits {
            let rendered = self.render_exhibit(
                store,
                exhibit,
                &variables,
                config,
                &mut unresolved,
                &mut warnings,
            )?;
            body.push_str(&rendered);
            body.push_str("\n\n");
        }

        Ok(AssembledDocument {
            contract_type: contract_type.to_string(),
            body: body.trim_end().to_string() + "\n",
            clause_count: clauses.len(),
            exhibit_count: exhibits.len(),
            unresolved_placeholders: unresolved,
            warnings,
        })
    }

    fn render_clause(
        &self,
        store: &ClauseStore,
        clause: &ClauseRecord,
        variables: &BTreeMap<String, String>,
        config: &BTreeMap<String, String>,
        unresolved: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<String> {
        let content = if clause.block_type == BlockType::DynamicDisclosure {
            self.resolve_disclosure(store, clause, config, warnings)?
        } else {
            clause.content.clone()
        };

        let substituted = self.substitute(&content, variables, unresolved);

        let rendered = match clause.block_type {
            BlockType::Section | BlockType::Clause => {
                render_heading_block(clause, &substituted)
            }
            BlockType::Conspicuous => {
                if substituted.is_empty() {
                    String::new()
                } else {
                    format!("**{substituted}**")
                }
            }
            _ => substituted,
        };

        Ok(rendered)
    }

    fn render_exhibit(
        &self,
        store: &ClauseStore,
        exhibit: &ExhibitRecord,
        variables: &BTreeMap<String, String>,
        config: &BTreeMap<String, String>,
        unresolved: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<String> {
        let content = if exhibit.is_dynamic {
            match &exhibit.disclosure_code {
                Some(code) => self.lookup_disclosure(
                    store,
                    code,
                    exhibit.conditions.get(CONDITION_JURISDICTION),
                    config,
                    warnings,
                )?,
                None => exhibit.content.clone(),
            }
        } else {
            exhibit.content.clone()
        };

        let substituted = self.substitute(&content, variables, unresolved);

        let mut out = String::new();
        if exhibit.title.is_empty() {
            out.push_str(&format!("## EXHIBIT {}\n", exhibit.letter));
        } else {
            out.push_str(&format!("## EXHIBIT {} — {}\n", exhibit.letter, exhibit.title));
        }
        if !substituted.is_empty() {
            out.push('\n');
            out.push_str(&substituted);
        }
        Ok(out)
    }

    fn resolve_disclosure(
        &self,
        store: &ClauseStore,
        clause: &ClauseRecord,
        config: &BTreeMap<String, String>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<String> {
        match &clause.disclosure_code {
            Some(code) => self.lookup_disclosure(
                store,
                code,
                clause.conditions.get(CONDITION_JURISDICTION),
                config,
                warnings,
            ),
            None => Ok(clause.content.clone()),
        }
    }

    fn lookup_disclosure(
        &self,
        store: &ClauseStore,
        code: &str,
        clause_jurisdiction: Option<&String>,
        config: &BTreeMap<String, String>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<String> {
        let jurisdiction = clause_jurisdiction
            .or_else(|| config.get(CONDITION_JURISDICTION))
            .cloned()
            .unwrap_or_default();

        match store.disclosure_body(code, &jurisdiction)? {
            Some(body) => Ok(body),
            None => {
                let warning = format!(
                    "no disclosure text for code {code} in jurisdiction {jurisdiction}"
                );
                warn!(code = %code, jurisdiction = %jurisdiction, "disclosure text missing");
                warnings.push(warning);
                Ok(format!("[{code}]"))
            }
        }
    }

    // Unresolved placeholders render as a visible bracketed literal and
    // never abort assembly.
    fn substitute(
        &self,
        text: &str,
        variables: &BTreeMap<String, String>,
        unresolved: &mut Vec<String>,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0usize;

        for captures in self.placeholder.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let name = &captures[1];

            out.push_str(&text[last..whole.start()]);
            match variables.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    if !unresolved.iter().any(|seen| seen == name) {
                        warn!(placeholder = %name, "unresolved placeholder");
                        unresolved.push(name.to_string());
                    }
                    out.push('[');
                    out.push_str(name);
                    out.push(']');
                }
            }
            last = whole.end();
        }

        out.push_str(&text[last..]);
        out.trim().to_string()
    }
}

// Headings render at their hierarchy depth; the portion of the header
// paragraph that restates the heading is dropped, anything after a colon
// stays as body text.
fn render_heading_block(clause: &ClauseRecord, substituted: &str) -> String {
    let Some(heading) = clause.heading.as_deref().filter(|value| !value.is_empty()) else {
        return substituted.to_string();
    };

    let depth = clause.hierarchy_level.clamp(1, 6) as usize;
    let mut out = format!("{} {}", "#".repeat(depth), heading);

    let (first_segment, rest) = match substituted.split_once("\n\n") {
        Some((first, rest)) => (first, Some(rest)),
        None => (substituted, None),
    };

    let lead = heading_lead_remainder(first_segment, heading);
    if !lead.is_empty() {
        out.push_str("\n\n");
        out.push_str(&lead);
    }
    if let Some(rest) = rest {
        out.push_str("\n\n");
        out.push_str(rest);
    }

    out
}

// "Purchase Price: The Buyer shall pay ..." with heading "Purchase
// Price" keeps "The Buyer shall pay ..."; a bare heading paragraph
// contributes nothing.
fn heading_lead_remainder(first_segment: &str, heading: &str) -> String {
    let needle = heading.trim();
    let Some(position) = first_segment.find(needle) else {
        return first_segment.trim().to_string();
    };

    first_segment[position + needle.len()..]
        .trim_start_matches([':', '.', '—', '–', '-', ' '])
        .trim()
        .to_string()
}

pub fn exhibit_matches(exhibit: &ExhibitRecord, config: &BTreeMap<String, String>) -> bool {
    for (key, value) in &exhibit.conditions {
        if config.get(key) != Some(value) {
            return false;
        }
    }

    match exhibit.service_model_condition {
        Some(model) => {
            config.get(CONDITION_SERVICE_MODEL).map(String::as_str) == Some(model.as_str())
        }
        None => true,
    }
}

// The flat key/value map the conditional rules are matched against.
pub fn condition_map(
    project: &ProjectRecord,
    unit_count: usize,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut config = BTreeMap::new();
    config.insert(
        CONDITION_SERVICE_MODEL.to_string(),
        project.service_model.as_str().to_string(),
    );
    if let Some(jurisdiction) = &project.jurisdiction {
        config.insert(CONDITION_JURISDICTION.to_string(), jurisdiction.clone());
    }
    config.insert(CONDITION_UNIT_COUNT.to_string(), unit_count.to_string());

    for (key, value) in overrides {
        config.insert(key.clone(), value.clone());
    }
    config
}

pub fn variable_map(
    project: &ProjectRecord,
    pricing: &PricingSummary,
) -> BTreeMap<String, String> {
    let mut variables = project.variables.clone();
    variables.insert("PROJECT_NAME".to_string(), project.name.clone());
    variables.insert(
        "SERVICE_MODEL".to_string(),
        project.service_model.as_str().to_string(),
    );
    if let Some(jurisdiction) = &project.jurisdiction {
        variables.insert("JURISDICTION".to_string(), jurisdiction.clone());
    }
    variables.insert("UNIT_COUNT".to_string(), pricing.unit_count.to_string());
    variables.insert(
        "PROJECT_BUDGET".to_string(),
        tables::format_currency(pricing.project_budget),
    );
    variables.insert(
        "CONTRACT_VALUE".to_string(),
        tables::format_currency(pricing.contract_value),
    );
    variables
}

fn dedupe_preserving_order(codes: Vec<String>) -> Vec<String> {
    let mut seen = Vec::<String>::with_capacity(codes.len());
    for code in codes {
        if !seen.contains(&code) {
            seen.push(code);
        }
    }
    seen
}
