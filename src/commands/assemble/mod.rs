use std::collections::BTreeMap;
use std::fs;
use std::thread;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::AssembleArgs;
use crate::commands::pricing;
use crate::error::EngineError;
use crate::model::{AssembledDocumentSummary, AssemblyRunManifest};
use crate::store::ClauseStore;
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub mod render;
pub mod tables;

#[cfg(test)]
mod tests;

use render::{AssembledDocument, DocumentRenderer, condition_map};

pub fn run(args: AssembleArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| cache_root.join("clauseforge.sqlite"));
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| cache_root.join("output"));
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        cache_root
            .join("manifests")
            .join(format!("assembly_run_{}.json", utc_compact_string(started_ts)))
    });
    ensure_directory(&out_dir)?;

    let store = ClauseStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let project = store.project(args.project_id)?;
    let units = store.units_with_models(args.project_id)?;
    let pricing_summary = pricing::compute_pricing(&store, args.project_id)?;

    let overrides = parse_overrides(&args.set)?;
    let config = condition_map(&project, units.len(), &overrides);

    let contract_types = if args.contract_types.is_empty() {
        store.contract_types_with_templates()?
    } else {
        args.contract_types.clone()
    };
    if contract_types.is_empty() {
        bail!("no contract types to assemble: ingest a document first or pass --contract-type");
    }
    drop(store);

    info!(
        run_id = %run_id,
        project_id = project.id,
        contract_types = contract_types.len(),
        "starting assembly"
    );

    let renderer = DocumentRenderer::new()?;

    // Independent fan-out: each contract type renders on its own thread
    // with its own read-only store connection, joined on completion. A
    // missing template fails only its own type.
    let mut results: Vec<(String, Result<AssembledDocument, EngineError>)> = Vec::new();
    thread::scope(|scope| {
        let mut handles = Vec::new();
        for contract_type in &contract_types {
            let renderer = &renderer;
            let project = &project;
            let pricing_summary = &pricing_summary;
            let units = &units;
            let config = &config;
            let db_path = &db_path;

            let handle = scope.spawn(move || {
                let store = ClauseStore::open(db_path)?;
                renderer.assemble_document(
                    &store,
                    contract_type,
                    project,
                    pricing_summary,
                    units,
                    config,
                )
            });
            handles.push((contract_type.clone(), handle));
        }

        for (contract_type, handle) in handles {
            let result = handle.join().unwrap_or_else(|_| {
                Err(EngineError::InvalidRecord(
                    "assembly worker panicked".to_string(),
                ))
            });
            results.push((contract_type, result));
        }
    });

    let mut documents = Vec::<AssembledDocumentSummary>::new();
    let mut warnings = Vec::<String>::new();
    let mut generated = 0usize;

    for (contract_type, result) in results {
        match result {
            Ok(document) => {
                let output_path =
                    out_dir.join(format!("project{}_{}.md", project.id, contract_type));
                fs::write(&output_path, &document.body)
                    .with_context(|| format!("failed to write {}", output_path.display()))?;

                info!(
                    contract_type = %contract_type,
                    clauses = document.clause_count,
                    exhibits = document.exhibit_count,
                    output = %output_path.display(),
                    "document assembled"
                );
                warnings.extend(document.warnings.clone());
                documents.push(AssembledDocumentSummary {
                    contract_type,
                    status: "generated".to_string(),
                    output_path: Some(output_path.display().to_string()),
                    clause_count: document.clause_count,
                    exhibit_count: document.exhibit_count,
                    unresolved_placeholders: document.unresolved_placeholders,
                    error: None,
                });
                generated += 1;
            }
            Err(err) => {
                warn!(contract_type = %contract_type, error = %err, "document assembly failed");
                warnings.push(format!("{contract_type}: {err}"));
                documents.push(AssembledDocumentSummary {
                    contract_type,
                    status: "failed".to_string(),
                    output_path: None,
                    clause_count: 0,
                    exhibit_count: 0,
                    unresolved_placeholders: Vec::new(),
                    error: Some(err.to_string()),
                });
            }
        }
    }

    let manifest = AssemblyRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at: now_utc_string(),
        project_id: project.id,
        project_name: project.name.clone(),
        documents,
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        generated,
        failed = contract_types.len() - generated,
        manifest = %manifest_path.display(),
        "assembly finished"
    );

    if generated == 0 {
        bail!("assembly produced no documents for project {}", project.id);
    }

    Ok(())
}

fn parse_overrides(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid condition override {pair:?}, expected key=value");
        };
        overrides.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(overrides)
}
