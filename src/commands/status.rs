use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::ClauseStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("clauseforge.sqlite"));

    if !db_path.exists() {
        warn!(path = %db_path.display(), "store file missing, nothing ingested yet");
        return Ok(());
    }

    let store = ClauseStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let statuses = store.contract_type_statuses()?;
    if statuses.is_empty() {
        info!(path = %db_path.display(), "store is empty");
    }
    for status in &statuses {
        info!(
            contract_type = %status.contract_type,
            clauses = status.clause_count,
            exhibits = status.exhibit_count,
            active_template = status.has_active_template,
            "contract type"
        );
    }

    let projects = store.count("SELECT COUNT(*) FROM projects").unwrap_or(0);
    let units = store.count("SELECT COUNT(*) FROM units").unwrap_or(0);
    let disclosures = store.count("SELECT COUNT(*) FROM disclosures").unwrap_or(0);

    info!(
        path = %db_path.display(),
        projects,
        units,
        disclosures,
        "store status"
    );

    Ok(())
}
