use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::IngestArgs;
use crate::model::{DisclosureImport, IngestCounts, IngestRunManifest};
use crate::store::{ClauseStore, DB_SCHEMA_VERSION};
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};

pub mod classify;
pub mod conditions;
pub mod normalize;
pub mod template;
pub mod tree;

#[cfg(test)]
mod tests;

use normalize::{ParagraphNormalizer, StyledParagraph};
use tree::TreeBuilder;

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| cache_root.join("clauseforge.sqlite"));
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("ingest_run_{}.json", utc_compact_string(started_ts)))
    });

    info!(
        contract_type = %args.contract_type,
        input = %args.input.display(),
        run_id = %run_id,
        "starting ingest"
    );

    let source_hash = sha256_file(&args.input)?;
    let raw = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let paragraphs: Vec<StyledParagraph> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse paragraph stream {}", args.input.display()))?;

    let normalizer = ParagraphNormalizer::new()?;
    let stream = normalizer.normalize(&paragraphs);

    let mut builder = TreeBuilder::new()?;
    for paragraph in &stream.paragraphs {
        builder.push_paragraph(paragraph);
    }
    let document = builder.finish();

    let mut counts = IngestCounts {
        paragraphs_total: paragraphs.len(),
        paragraphs_ignored: stream.ignored_count,
        numbering_prefixes_stripped: stream.numbering_stripped_count,
        markers_repaired: document.counters.markers_repaired,
        section_nodes: document.counters.section_nodes,
        clause_nodes: document.counters.clause_nodes,
        subclause_nodes: document.counters.subclause_nodes,
        paragraph_nodes: document.counters.paragraph_nodes,
        table_nodes: document.counters.table_nodes,
        list_item_nodes: document.counters.list_item_nodes,
        conspicuous_nodes: document.counters.conspicuous_nodes,
        dynamic_disclosure_nodes: document.counters.dynamic_disclosure_nodes,
        exhibits: document.exhibits.len(),
        ..IngestCounts::default()
    };
    let mut warnings = document.warnings.clone();

    let mut store = ClauseStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let outcome = store
        .replace_contract_type(
            &args.contract_type,
            &document.clauses,
            &document.exhibits,
            &source_hash,
        )
        .context("failed to replace clause set")?;

    counts.clauses_inserted = outcome.clauses_inserted;
    counts.exhibits_inserted = outcome.exhibits_inserted;
    counts.insert_errors = outcome.errors.len();
    warnings.extend(outcome.errors.clone());

    let template = template::derive_template(&args.contract_type, &document.clauses);
    counts.template_base_count = template.base_clause_codes.len();
    counts.template_rule_count = template::rule_count(&template);
    store
        .activate_template(&template, &now_utc_string())
        .context("failed to activate template")?;

    if let Some(disclosures_path) = &args.disclosures_path {
        counts.disclosure_texts_loaded = load_disclosures(&mut store, disclosures_path)?;
    }

    // Best-effort semantics: a partial insert is reported, never rolled
    // back. Recovery is re-running ingestion for this contract type.
    let status = if outcome.errors.is_empty() {
        "completed"
    } else {
        warn!(
            insert_errors = outcome.errors.len(),
            "ingest completed with insert errors"
        );
        "completed_with_errors"
    };

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        contract_type: args.contract_type.clone(),
        source_path: args.input.display().to_string(),
        source_hash,
        db_path: db_path.display().to_string(),
        counts,
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        contract_type = %args.contract_type,
        clauses_inserted = manifest.counts.clauses_inserted,
        exhibits_inserted = manifest.counts.exhibits_inserted,
        insert_errors = manifest.counts.insert_errors,
        template_base = manifest.counts.template_base_count,
        template_rules = manifest.counts.template_rule_count,
        manifest = %manifest_path.display(),
        "ingest finished"
    );

    Ok(())
}

fn load_disclosures(store: &mut ClauseStore, path: &Path) -> Result<usize> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let disclosures: Vec<DisclosureImport> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse disclosure file {}", path.display()))?;

    let loaded = store
        .upsert_disclosures(&disclosures)
        .context("failed to load disclosure texts")?;
    info!(count = loaded, "loaded disclosure texts");
    Ok(loaded)
}
