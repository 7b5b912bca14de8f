use std::collections::BTreeMap;

use crate::model::{ClauseDraft, Template, CONDITION_JURISDICTION, CONDITION_SERVICE_MODEL};

// Re-derives the contract type's template from a decomposed tree:
// unconditional clauses form the ordered base list; conditional clauses
// are grouped into splice rules keyed by condition. A clause carrying
// both a jurisdiction and a service-model condition is listed under both
// keys; assembly dedupes the selection.
pub fn derive_template(contract_type: &str, clauses: &[ClauseDraft]) -> Template {
    let mut base_clause_codes = Vec::<String>::new();
    let mut conditional_rules = BTreeMap::<String, BTreeMap<String, Vec<String>>>::new();

    let mut ordered: Vec<&ClauseDraft> = clauses.iter().collect();
    ordered.sort_by_key(|clause| clause.sort_order);

    for clause in ordered {
        let jurisdiction = clause.conditions.get(CONDITION_JURISDICTION);
        let service_model = clause.service_model_condition;

        if jurisdiction.is_none() && service_model.is_none() {
            base_clause_codes.push(clause.code.clone());
            continue;
        }

        if let Some(value) = jurisdiction {
            conditional_rules
                .entry(CONDITION_JURISDICTION.to_string())
                .or_default()
                .entry(value.clone())
                .or_default()
                .push(clause.code.clone());
        }

        if let Some(model) = service_model {
            conditional_rules
                .entry(CONDITION_SERVICE_MODEL.to_string())
                .or_default()
                .entry(model.as_str().to_string())
                .or_default()
                .push(clause.code.clone());
        }
    }

    Template {
        contract_type: contract_type.to_string(),
        base_clause_codes,
        conditional_rules,
    }
}

pub fn rule_count(template: &Template) -> usize {
    template
        .conditional_rules
        .values()
        .map(|by_value| by_value.len())
        .sum()
}
