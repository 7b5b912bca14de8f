use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CONDITION_JURISDICTION: &str = "jurisdiction";
pub const CONDITION_SERVICE_MODEL: &str = "serviceModel";
pub const CONDITION_UNIT_COUNT: &str = "unitCount";

// The closed set of table placeholders the renderers know how to fill.
pub const TABLE_PLACEHOLDERS: &[&str] = &[
    "PRICING_BREAKDOWN_TABLE",
    "PAYMENT_SCHEDULE_TABLE",
    "UNIT_DETAILS_TABLE",
    "SIGNATURE_BLOCK",
    "EXHIBIT_LIST",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Section,
    Clause,
    Paragraph,
    Table,
    ListItem,
    Conspicuous,
    DynamicDisclosure,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Section => "section",
            BlockType::Clause => "clause",
            BlockType::Paragraph => "paragraph",
            BlockType::Table => "table",
            BlockType::ListItem => "list_item",
            BlockType::Conspicuous => "conspicuous",
            BlockType::DynamicDisclosure => "dynamic_disclosure",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "section" => Some(BlockType::Section),
            "clause" => Some(BlockType::Clause),
            "paragraph" => Some(BlockType::Paragraph),
            "table" => Some(BlockType::Table),
            "list_item" => Some(BlockType::ListItem),
            "conspicuous" => Some(BlockType::Conspicuous),
            "dynamic_disclosure" => Some(BlockType::DynamicDisclosure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceModel {
    Crc,
    Cmos,
}

impl ServiceModel {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceModel::Crc => "CRC",
            ServiceModel::Cmos => "CMOS",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CRC" => Some(ServiceModel::Crc),
            "CMOS" => Some(ServiceModel::Cmos),
            _ => None,
        }
    }
}

// Draft nodes produced by the tree builder, before the store assigns row
// ids. parent_temp_id always references a draft finalized earlier in the
// run, so insertion in temp-id order can resolve parents in one pass.
#[derive(Debug, Clone)]
pub struct ClauseDraft {
    pub temp_id: u32,
    pub parent_temp_id: Option<u32>,
    pub code: String,
    pub hierarchy_level: i64,
    pub sort_order: i64,
    pub block_type: BlockType,
    pub heading: Option<String>,
    pub content: String,
    pub variables_used: Vec<String>,
    pub conditions: BTreeMap<String, String>,
    pub disclosure_code: Option<String>,
    pub service_model_condition: Option<ServiceModel>,
}

#[derive(Debug, Clone)]
pub struct ExhibitDraft {
    pub letter: char,
    pub title: String,
    pub content: String,
    pub sort_order: i64,
    pub is_dynamic: bool,
    pub disclosure_code: Option<String>,
    pub conditions: BTreeMap<String, String>,
    pub service_model_condition: Option<ServiceModel>,
    pub variables_used: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClauseRecord {
    pub id: i64,
    pub code: String,
    pub contract_type: String,
    pub parent_id: Option<i64>,
    pub hierarchy_level: i64,
    pub sort_order: i64,
    pub block_type: BlockType,
    pub heading: Option<String>,
    pub content: String,
    pub variables_used: Vec<String>,
    pub conditions: BTreeMap<String, String>,
    pub disclosure_code: Option<String>,
    pub service_model_condition: Option<ServiceModel>,
}

#[derive(Debug, Clone)]
pub struct ExhibitRecord {
    pub id: i64,
    pub contract_type: String,
    pub letter: String,
    pub title: String,
    pub content: String,
    pub sort_order: i64,
    pub is_dynamic: bool,
    pub disclosure_code: Option<String>,
    pub conditions: BTreeMap<String, String>,
    pub service_model_condition: Option<ServiceModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub contract_type: String,
    pub base_clause_codes: Vec<String>,
    pub conditional_rules: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub service_model: ServiceModel,
    pub jurisdiction: Option<String>,
    pub site_costs: i64,
    pub variables: BTreeMap<String, String>,
}

// One unit joined to its home model, the shape the pricing engine reads.
#[derive(Debug, Clone)]
pub struct UnitWithModel {
    pub unit_label: String,
    pub model_name: String,
    pub design_fee: i64,
    pub offsite_base: i64,
    pub onsite_estimate: i64,
    pub customization_total: i64,
}

#[derive(Debug, Clone)]
pub struct MilestoneRecord {
    pub name: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMilestone {
    pub name: String,
    pub percentage: f64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelUnitSummary {
    pub model_name: String,
    pub unit_count: i64,
    pub design_fee_subtotal: i64,
    pub offsite_subtotal: i64,
    pub onsite_subtotal: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingSummary {
    pub project_id: i64,
    pub project_name: String,
    pub service_model: ServiceModel,
    pub unit_count: i64,
    pub design_fee_total: i64,
    pub offsite_total: i64,
    pub onsite_total: i64,
    pub customization_total: i64,
    pub site_costs: i64,
    pub project_budget: i64,
    pub contract_value: i64,
    pub payment_schedule: Vec<PaymentMilestone>,
    pub model_summaries: Vec<ModelUnitSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestCounts {
    pub paragraphs_total: usize,
    pub paragraphs_ignored: usize,
    pub numbering_prefixes_stripped: usize,
    pub markers_repaired: usize,
    pub section_nodes: usize,
    pub clause_nodes: usize,
    pub subclause_nodes: usize,
    pub paragraph_nodes: usize,
    pub table_nodes: usize,
    pub list_item_nodes: usize,
    pub conspicuous_nodes: usize,
    pub dynamic_disclosure_nodes: usize,
    pub exhibits: usize,
    pub clauses_inserted: usize,
    pub exhibits_inserted: usize,
    pub insert_errors: usize,
    pub disclosure_texts_loaded: usize,
    pub template_base_count: usize,
    pub template_rule_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub contract_type: String,
    pub source_path: String,
    pub source_hash: String,
    pub db_path: String,
    pub counts: IngestCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembledDocumentSummary {
    pub contract_type: String,
    pub status: String,
    pub output_path: Option<String>,
    pub clause_count: usize,
    pub exhibit_count: usize,
    pub unresolved_placeholders: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub project_id: i64,
    pub project_name: String,
    pub documents: Vec<AssembledDocumentSummary>,
    pub warnings: Vec<String>,
}

// Shape of the `project` command's JSON input file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectImportFile {
    pub project: ProjectImport,
    #[serde(default)]
    pub models: Vec<HomeModelImport>,
    #[serde(default)]
    pub units: Vec<UnitImport>,
    #[serde(default)]
    pub milestones: Vec<MilestoneImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectImport {
    pub id: i64,
    pub name: String,
    pub service_model: ServiceModel,
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub site_costs: i64,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeModelImport {
    pub id: i64,
    pub name: String,
    pub design_fee: i64,
    pub offsite_base: i64,
    pub onsite_estimate: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitImport {
    pub label: String,
    pub model_id: i64,
    #[serde(default)]
    pub customization_total: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MilestoneImport {
    pub name: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisclosureImport {
    pub code: String,
    pub jurisdiction: String,
    pub body: String,
}
