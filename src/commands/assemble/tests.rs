use std::collections::BTreeMap;

use crate::commands::ingest::template::derive_template;
use crate::commands::pricing::compute_pricing;
use crate::error::EngineError;
use crate::model::{
    BlockType, ClauseDraft, DisclosureImport, ExhibitDraft, HomeModelImport, PricingSummary,
    ProjectImport, ProjectImportFile, ProjectRecord, ServiceModel, UnitImport, UnitWithModel,
    CONDITION_JURISDICTION,
};
use crate::store::ClauseStore;

use super::render::{condition_map, DocumentRenderer};

const CONTRACT_TYPE: &str = "purchase_agreement";

struct Fixture {
    store: ClauseStore,
    project: ProjectRecord,
    pricing: PricingSummary,
    units: Vec<UnitWithModel>,
}

fn draft(
    temp_id: u32,
    parent: Option<u32>,
    code: &str,
    level: i64,
    sort_order: i64,
    block_type: BlockType,
    heading: Option<&str>,
    content: &str,
) -> ClauseDraft {
    ClauseDraft {
        temp_id,
        parent_temp_id: parent,
        code: code.to_string(),
        hierarchy_level: level,
        sort_order,
        block_type,
        heading: heading.map(str::to_string),
        content: content.to_string(),
        variables_used: Vec::new(),
        conditions: BTreeMap::new(),
        disclosure_code: None,
        service_model_condition: None,
    }
}

fn fixture() -> Fixture {
    let mut store = ClauseStore::open_in_memory().expect("store opens");

    let mut drafts = vec![
        draft(
            1,
            None,
            "s01",
            1,
            1,
            BlockType::Section,
            Some("PURCHASE AGREEMENT"),
            "PURCHASE AGREEMENT",
        ),
        draft(
            2,
            Some(1),
            "s01.c01",
            3,
            2,
            BlockType::Clause,
            Some("Purchase Price"),
            "Purchase Price: The Buyer shall pay {{CONTRACT_VALUE}} for the {{PROJECT_NAME}} project.",
        ),
        draft(
            3,
            Some(1),
            "s01.t01",
            5,
            3,
            BlockType::Table,
            None,
            "{{PAYMENT_SCHEDULE_TABLE}}",
        ),
        draft(
            4,
            None,
            "s02",
            1,
            4,
            BlockType::Section,
            Some("CRC ADDENDUM"),
            "CRC ADDENDUM",
        ),
        draft(
            5,
            None,
            "s03",
            1,
            5,
            BlockType::Section,
            Some("CALIFORNIA ADDENDUM"),
            "CALIFORNIA ADDENDUM\n\nCalifornia lien waiver text.",
        ),
        draft(
            6,
            None,
            "p01",
            5,
            6,
            BlockType::Paragraph,
            None,
            "Delivery window is {{UNDEFINED_THING}} days.",
        ),
        draft(
            7,
            None,
            "d01",
            5,
            7,
            BlockType::DynamicDisclosure,
            None,
            "",
        ),
        draft(
            8,
            None,
            "d02",
            5,
            8,
            BlockType::DynamicDisclosure,
            None,
            "",
        ),
    ];
    drafts[3].service_model_condition = Some(ServiceModel::Crc);
    drafts[4]
        .conditions
        .insert(CONDITION_JURISDICTION.to_string(), "CA".to_string());
    drafts[6]
        .conditions
        .insert(CONDITION_JURISDICTION.to_string(), "TX".to_string());
    drafts[6].disclosure_code = Some("TX_NOTICE".to_string());
    drafts[7].disclosure_code = Some("NO_TEXT".to_string());

    let exhibits = vec![
        ExhibitDraft {
            letter: 'B',
            title: "Warranty".to_string(),
            content: "Ten year coverage for {{PROJECT_NAME}}.".to_string(),
            sort_order: 9,
            is_dynamic: false,
            disclosure_code: None,
            conditions: BTreeMap::new(),
            service_model_condition: None,
            variables_used: Vec::new(),
        },
        ExhibitDraft {
            letter: 'C',
            title: "California Notices".to_string(),
            content: "CA-only exhibit body.".to_string(),
            sort_order: 10,
            is_dynamic: false,
            disclosure_code: None,
            conditions: BTreeMap::from([(CONDITION_JURISDICTION.to_string(), "CA".to_string())]),
            service_model_condition: None,
            variables_used: Vec::new(),
        },
    ];

    store
        .replace_contract_type(CONTRACT_TYPE, &drafts, &exhibits, "hash")
        .expect("seed clauses");

    let template = derive_template(CONTRACT_TYPE, &drafts);
    store
        .activate_template(&template, "2026-01-01T00:00:00Z")
        .expect("activate template");

    store
        .upsert_disclosures(&[DisclosureImport {
            code: "TX_NOTICE".to_string(),
            jurisdiction: "TX".to_string(),
            body: "Texas statutory notice text.".to_string(),
        }])
        .expect("seed disclosures");

    store
        .import_project(&ProjectImportFile {
            project: ProjectImport {
                id: 7,
                name: "Alder Creek".to_string(),
                service_model: ServiceModel::Crc,
                jurisdiction: Some("TX".to_string()),
                site_costs: 0,
                variables: BTreeMap::new(),
            },
            models: vec![HomeModelImport {
                id: 1,
                name: "Cedar".to_string(),
                design_fee: 4_500_000,
                offsite_base: 42_500_000,
                onsite_estimate: 38_000_000,
            }],
            units: vec![UnitImport {
                label: "Unit 1".to_string(),
                model_id: 1,
                customization_total: 0,
            }],
            milestones: Vec::new(),
        })
        .expect("seed project");

    let project = store.project(7).expect("project loads");
    let pricing = compute_pricing(&store, 7).expect("pricing computes");
    let units = store.units_with_models(7).expect("units load");

    Fixture {
        store,
        project,
        pricing,
        units,
    }
}

fn assemble(fixture: &Fixture, overrides: &BTreeMap<String, String>) -> super::render::AssembledDocument {
    let renderer = DocumentRenderer::new().expect("renderer builds");
    let config = condition_map(&fixture.project, fixture.units.len(), overrides);
    renderer
        .assemble_document(
            &fixture.store,
            CONTRACT_TYPE,
            &fixture.project,
            &fixture.pricing,
            &fixture.units,
            &config,
        )
        .expect("assembly succeeds")
}

#[test]
fn conditional_rules_follow_the_project_configuration() {
    let fixture = fixture();
    let document = assemble(&fixture, &BTreeMap::new());

    // CRC project in Texas: the CRC addendum is spliced in, the
    // California addendum stays out.
    assert!(document.body.contains("CRC ADDENDUM"));
    assert!(!document.body.contains("California lien waiver text."));
}

#[test]
fn condition_overrides_can_switch_jurisdiction() {
    let fixture = fixture();
    let overrides =
        BTreeMap::from([(CONDITION_JURISDICTION.to_string(), "CA".to_string())]);
    let document = assemble(&fixture, &overrides);

    assert!(document.body.contains("California lien waiver text."));
    // The override also unlocks the CA-conditioned exhibit.
    assert!(document.body.contains("EXHIBIT C — California Notices"));
}

#[test]
fn variables_substitute_and_unresolved_render_bracketed() {
    let fixture = fixture();
    let document = assemble(&fixture, &BTreeMap::new());

    assert!(document
        .body
        .contains("The Buyer shall pay $47,000,000 for the Alder Creek project."));
    assert!(document.body.contains("[UNDEFINED_THING]"));
    assert_eq!(
        document.unresolved_placeholders,
        vec!["UNDEFINED_THING".to_string()]
    );
}

#[test]
fn table_placeholders_are_replaced_with_rendered_tables() {
    let fixture = fixture();
    let document = assemble(&fixture, &BTreeMap::new());

    assert!(document.body.contains("| Milestone | Percentage | Amount |"));
    assert!(document.body.contains("| Retainage | 5% | $2,350,000 |"));
    assert!(!document.body.contains("{{PAYMENT_SCHEDULE_TABLE}}"));
}

#[test]
fn clauses_render_in_sort_order_with_level_headings() {
    let fixture = fixture();
    let document = assemble(&fixture, &BTreeMap::new());

    let agreement = document
        .body
        .find("# PURCHASE AGREEMENT")
        .expect("section heading present");
    let price = document
        .body
        .find("### Purchase Price")
        .expect("clause heading present");
    let addendum = document
        .body
        .find("# CRC ADDENDUM")
        .expect("addendum heading present");

    assert!(agreement < price);
    assert!(price < addendum);
}

#[test]
fn exhibits_filter_on_conditions_and_render_after_the_body() {
    let fixture = fixture();
    let document = assemble(&fixture, &BTreeMap::new());

    assert_eq!(document.exhibit_count, 1);
    assert!(document.body.contains("## EXHIBIT B — Warranty"));
    assert!(document.body.contains("Ten year coverage for Alder Creek."));
    assert!(!document.body.contains("CA-only exhibit body."));

    let body_clause = document.body.find("### Purchase Price").expect("clause");
    let exhibit = document.body.find("## EXHIBIT B").expect("exhibit");
    assert!(body_clause < exhibit);
}

#[test]
fn dynamic_disclosures_resolve_by_code_and_jurisdiction() {
    let fixture = fixture();
    let document = assemble(&fixture, &BTreeMap::new());

    assert!(document.body.contains("Texas statutory notice text."));
    // A code with no stored text renders as a visible literal and is
    // reported, never dropped.
    assert!(document.body.contains("[NO_TEXT]"));
    assert!(document
        .warnings
        .iter()
        .any(|warning| warning.contains("NO_TEXT")));
}

#[test]
fn missing_template_is_template_not_found() {
    let fixture = fixture();
    let renderer = DocumentRenderer::new().expect("renderer builds");
    let config = condition_map(&fixture.project, fixture.units.len(), &BTreeMap::new());

    let err = renderer
        .assemble_document(
            &fixture.store,
            "never_ingested",
            &fixture.project,
            &fixture.pricing,
            &fixture.units,
            &config,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::TemplateNotFound { .. }));
}

#[test]
fn pricing_follows_the_crc_example_scenario() {
    let fixture = fixture();

    assert_eq!(fixture.pricing.project_budget, 85_000_000);
    assert_eq!(fixture.pricing.contract_value, 47_000_000);

    let total: i64 = fixture
        .pricing
        .payment_schedule
        .iter()
        .map(|milestone| milestone.amount)
        .sum();
    assert_eq!(total, 47_000_000);
}
