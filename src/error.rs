// Typed errors for the engine core. Command orchestration wraps these with
// anyhow; the assembly fan-out matches on them to keep a per-type template
// miss from aborting sibling contract types.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no active template for contract type {contract_type}")]
    TemplateNotFound { contract_type: String },

    #[error("project {project_id} not found")]
    ProjectNotFound { project_id: i64 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_not_found_names_the_contract_type() {
        let err = EngineError::TemplateNotFound {
            contract_type: "purchase_agreement".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no active template for contract type purchase_agreement"
        );
    }

    #[test]
    fn project_not_found_names_the_id() {
        let err = EngineError::ProjectNotFound { project_id: 42 };
        assert!(err.to_string().contains("42"));
    }
}
