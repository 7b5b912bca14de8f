use std::collections::HashSet;
use std::fs;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ProjectArgs;
use crate::model::ProjectImportFile;
use crate::store::ClauseStore;

pub fn run(args: ProjectArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("clauseforge.sqlite"));

    let raw = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let import: ProjectImportFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse project file {}", args.input.display()))?;

    validate_import(&import)?;

    let mut store = ClauseStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    store
        .import_project(&import)
        .with_context(|| format!("failed to import project {}", import.project.id))?;

    info!(
        project_id = import.project.id,
        name = %import.project.name,
        service_model = %import.project.service_model.as_str(),
        models = import.models.len(),
        units = import.units.len(),
        milestones = import.milestones.len(),
        "project imported"
    );

    Ok(())
}

fn validate_import(import: &ProjectImportFile) -> Result<()> {
    let model_ids: HashSet<i64> = import.models.iter().map(|model| model.id).collect();
    for unit in &import.units {
        if !model_ids.contains(&unit.model_id) {
            bail!(
                "unit {} references unknown home model {}",
                unit.label,
                unit.model_id
            );
        }
    }

    if !import.milestones.is_empty() {
        let total: f64 = import
            .milestones
            .iter()
            .map(|milestone| milestone.percentage)
            .sum();
        if (total - 100.0).abs() > 0.01 {
            bail!("milestone percentages sum to {total}, expected 100");
        }
    }

    Ok(())
}
