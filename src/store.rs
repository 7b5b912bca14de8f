use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    BlockType, ClauseDraft, ClauseRecord, DisclosureImport, ExhibitDraft, ExhibitRecord,
    MilestoneRecord, ProjectImportFile, ProjectRecord, ServiceModel, Template, UnitWithModel,
};

pub const DB_SCHEMA_VERSION: &str = "0.2.0";

pub struct ClauseStore {
    connection: Connection,
}

#[derive(Debug, Default)]
pub struct ReplaceOutcome {
    pub clauses_inserted: usize,
    pub exhibits_inserted: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContractTypeStatus {
    pub contract_type: String,
    pub clause_count: i64,
    pub exhibit_count: i64,
    pub has_active_template: bool,
}

impl ClauseStore {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let connection = Connection::open(path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let connection = Connection::open_in_memory()?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> EngineResult<()> {
        self.connection.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clauses (
              id INTEGER PRIMARY KEY,
              code TEXT NOT NULL,
              contract_type TEXT NOT NULL,
              parent_id INTEGER,
              hierarchy_level INTEGER NOT NULL,
              sort_order INTEGER NOT NULL,
              block_type TEXT NOT NULL,
              heading TEXT,
              content TEXT NOT NULL,
              variables_used TEXT NOT NULL,
              conditions TEXT,
              disclosure_code TEXT,
              service_model_condition TEXT,
              source_hash TEXT,
              UNIQUE(contract_type, code),
              FOREIGN KEY(parent_id) REFERENCES clauses(id)
            );

            CREATE TABLE IF NOT EXISTS exhibits (
              id INTEGER PRIMARY KEY,
              contract_type TEXT NOT NULL,
              letter TEXT NOT NULL,
              title TEXT NOT NULL,
              content TEXT NOT NULL,
              sort_order INTEGER NOT NULL,
              is_dynamic INTEGER NOT NULL DEFAULT 0,
              disclosure_code TEXT,
              conditions TEXT,
              service_model_condition TEXT,
              UNIQUE(contract_type, letter)
            );

            CREATE TABLE IF NOT EXISTS templates (
              id INTEGER PRIMARY KEY,
              contract_type TEXT NOT NULL,
              base_clause_codes TEXT NOT NULL,
              conditional_rules TEXT NOT NULL,
              active INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS disclosures (
              code TEXT NOT NULL,
              jurisdiction TEXT NOT NULL,
              body TEXT NOT NULL,
              PRIMARY KEY(code, jurisdiction)
            );

            CREATE TABLE IF NOT EXISTS projects (
              id INTEGER PRIMARY KEY,
              name TEXT NOT NULL,
              service_model TEXT NOT NULL,
              jurisdiction TEXT,
              site_costs INTEGER NOT NULL DEFAULT 0,
              variables TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS home_models (
              id INTEGER PRIMARY KEY,
              name TEXT NOT NULL,
              design_fee INTEGER NOT NULL,
              offsite_base INTEGER NOT NULL,
              onsite_estimate INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS units (
              id INTEGER PRIMARY KEY,
              project_id INTEGER NOT NULL,
              model_id INTEGER NOT NULL,
              label TEXT NOT NULL,
              customization_total INTEGER NOT NULL DEFAULT 0,
              FOREIGN KEY(project_id) REFERENCES projects(id),
              FOREIGN KEY(model_id) REFERENCES home_models(id)
            );

            CREATE TABLE IF NOT EXISTS milestones (
              id INTEGER PRIMARY KEY,
              project_id INTEGER NOT NULL,
              position INTEGER NOT NULL,
              name TEXT NOT NULL,
              percentage REAL NOT NULL,
              FOREIGN KEY(project_id) REFERENCES projects(id)
            );

            CREATE INDEX IF NOT EXISTS idx_clauses_type_order ON clauses(contract_type, sort_order);
            CREATE INDEX IF NOT EXISTS idx_clauses_parent ON clauses(parent_id);
            CREATE INDEX IF NOT EXISTS idx_exhibits_type ON exhibits(contract_type, letter);
            CREATE INDEX IF NOT EXISTS idx_templates_type_active ON templates(contract_type, active);
            CREATE INDEX IF NOT EXISTS idx_units_project ON units(project_id);
            CREATE INDEX IF NOT EXISTS idx_milestones_project ON milestones(project_id, position);
            ",
        )?;

        self.connection.execute(
            "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [DB_SCHEMA_VERSION],
        )?;

        Ok(())
    }

    // Replace-entire-type semantics: delete every clause and exhibit of the
    // contract type, then re-insert in temp-id order so every parent row
    // exists before its children. Inserts are best-effort: a failed clause
    // is logged and counted, prior inserts stay, and descendants of the
    // failed row are skipped. Recovery is re-running ingestion for the type.
    pub fn replace_contract_type(
        &mut self,
        contract_type: &str,
        clauses: &[ClauseDraft],
        exhibits: &[ExhibitDraft],
        source_hash: &str,
    ) -> EngineResult<ReplaceOutcome> {
        let mut outcome = ReplaceOutcome::default();

        self.connection.execute(
            "UPDATE clauses SET parent_id = NULL WHERE contract_type = ?1",
            [contract_type],
        )?;
        self.connection
            .execute("DELETE FROM clauses WHERE contract_type = ?1", [contract_type])?;
        self.connection
            .execute("DELETE FROM exhibits WHERE contract_type = ?1", [contract_type])?;

        let mut temp_to_row = HashMap::<u32, i64>::new();

        for draft in clauses {
            let parent_row = match draft.parent_temp_id {
                Some(parent_temp) => match temp_to_row.get(&parent_temp) {
                    Some(row_id) => Some(*row_id),
                    None => {
                        let message = format!(
                            "skipped clause {}: parent was not inserted (content: {})",
                            draft.code,
                            content_snippet(&draft.content)
                        );
                        warn!(code = %draft.code, "clause insert skipped, missing parent");
                        outcome.errors.push(message);
                        continue;
                    }
                },
                None => None,
            };

            let inserted = self.connection.execute(
                "
                INSERT INTO clauses(
                  code, contract_type, parent_id, hierarchy_level, sort_order,
                  block_type, heading, content, variables_used, conditions,
                  disclosure_code, service_model_condition, source_hash
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ",
                params![
                    draft.code,
                    contract_type,
                    parent_row,
                    draft.hierarchy_level,
                    draft.sort_order,
                    draft.block_type.as_str(),
                    draft.heading,
                    draft.content,
                    serde_json::to_string(&draft.variables_used).unwrap_or_default(),
                    encode_conditions(&draft.conditions),
                    draft.disclosure_code,
                    draft.service_model_condition.map(ServiceModel::as_str),
                    source_hash,
                ],
            );

            match inserted {
                Ok(_) => {
                    temp_to_row.insert(draft.temp_id, self.connection.last_insert_rowid());
                    outcome.clauses_inserted += 1;
                }
                Err(err) => {
                    let message = format!(
                        "failed to insert clause {}: {err} (content: {})",
                        draft.code,
                        content_snippet(&draft.content)
                    );
                    warn!(code = %draft.code, error = %err, "clause insert failed");
                    outcome.errors.push(message);
                }
            }
        }

        for exhibit in exhibits {
            let inserted = self.connection.execute(
                "
                INSERT INTO exhibits(
                  contract_type, letter, title, content, sort_order,
                  is_dynamic, disclosure_code, conditions, service_model_condition
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
                params![
                    contract_type,
                    exhibit.letter.to_string(),
                    exhibit.title,
                    exhibit.content,
                    exhibit.sort_order,
                    exhibit.is_dynamic as i64,
                    exhibit.disclosure_code,
                    encode_conditions(&exhibit.conditions),
                    exhibit.service_model_condition.map(ServiceModel::as_str),
                ],
            );

            match inserted {
                Ok(_) => outcome.exhibits_inserted += 1,
                Err(err) => {
                    let message =
                        format!("failed to insert exhibit {}: {err}", exhibit.letter);
                    warn!(letter = %exhibit.letter, error = %err, "exhibit insert failed");
                    outcome.errors.push(message);
                }
            }
        }

        Ok(outcome)
    }

    pub fn clauses_by_type(&self, contract_type: &str) -> EngineResult<Vec<ClauseRecord>> {
        let mut statement = self.connection.prepare(
            "
            SELECT id, code, contract_type, parent_id, hierarchy_level, sort_order,
                   block_type, heading, content, variables_used, conditions,
                   disclosure_code, service_model_condition
            FROM clauses
            WHERE contract_type = ?1
            ORDER BY sort_order ASC
            ",
        )?;

        let rows = statement.query_map([contract_type], map_clause_row)?;
        let mut clauses = Vec::new();
        for row in rows {
            clauses.push(row?);
        }
        Ok(clauses)
    }

    pub fn clauses_by_codes(
        &self,
        contract_type: &str,
        codes: &[String],
    ) -> EngineResult<Vec<ClauseRecord>> {
        let mut statement = self.connection.prepare(
            "
            SELECT id, code, contract_type, parent_id, hierarchy_level, sort_order,
                   block_type, heading, content, variables_used, conditions,
                   disclosure_code, service_model_condition
            FROM clauses
            WHERE contract_type = ?1 AND code = ?2
            ",
        )?;

        let mut clauses = Vec::new();
        for code in codes {
            let found = statement
                .query_row(params![contract_type, code], map_clause_row)
                .optional()?;
            match found {
                Some(clause) => clauses.push(clause),
                None => warn!(code = %code, contract_type = %contract_type, "template references unknown clause code"),
            }
        }

        clauses.sort_by_key(|clause| clause.sort_order);
        Ok(clauses)
    }

    pub fn exhibits_by_type(&self, contract_type: &str) -> EngineResult<Vec<ExhibitRecord>> {
        let mut statement = self.connection.prepare(
            "
            SELECT id, contract_type, letter, title, content, sort_order,
                   is_dynamic, disclosure_code, conditions, service_model_condition
            FROM exhibits
            WHERE contract_type = ?1
            ORDER BY letter ASC
            ",
        )?;

        let rows = statement.query_map([contract_type], |row| {
            Ok(ExhibitRecord {
                id: row.get(0)?,
                contract_type: row.get(1)?,
                letter: row.get(2)?,
                title: row.get(3)?,
                content: row.get(4)?,
                sort_order: row.get(5)?,
                is_dynamic: row.get::<_, i64>(6)? != 0,
                disclosure_code: row.get(7)?,
                conditions: decode_conditions(row.get::<_, Option<String>>(8)?),
                service_model_condition: row
                    .get::<_, Option<String>>(9)?
                    .as_deref()
                    .and_then(ServiceModel::from_str),
            })
        })?;

        let mut exhibits = Vec::new();
        for row in rows {
            exhibits.push(row?);
        }
        Ok(exhibits)
    }

    pub fn activate_template(&mut self, template: &Template, created_at: &str) -> EngineResult<()> {
        self.connection.execute(
            "UPDATE templates SET active = 0 WHERE contract_type = ?1",
            [&template.contract_type],
        )?;
        self.connection.execute(
            "
            INSERT INTO templates(contract_type, base_clause_codes, conditional_rules, active, created_at)
            VALUES(?1, ?2, ?3, 1, ?4)
            ",
            params![
                template.contract_type,
                serde_json::to_string(&template.base_clause_codes).unwrap_or_default(),
                serde_json::to_string(&template.conditional_rules).unwrap_or_default(),
                created_at,
            ],
        )?;
        Ok(())
    }

    pub fn active_template(&self, contract_type: &str) -> EngineResult<Template> {
        let found = self
            .connection
            .query_row(
                "
                SELECT base_clause_codes, conditional_rules
                FROM templates
                WHERE contract_type = ?1 AND active = 1
                ORDER BY id DESC
                LIMIT 1
                ",
                [contract_type],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                },
            )
            .optional()?;

        let Some((base_raw, rules_raw)) = found else {
            return Err(EngineError::TemplateNotFound {
                contract_type: contract_type.to_string(),
            });
        };

        Ok(Template {
            contract_type: contract_type.to_string(),
            base_clause_codes: serde_json::from_str(&base_raw)
                .map_err(|err| EngineError::InvalidRecord(format!("template base codes: {err}")))?,
            conditional_rules: serde_json::from_str(&rules_raw)
                .map_err(|err| EngineError::InvalidRecord(format!("template rules: {err}")))?,
        })
    }

    pub fn contract_types_with_templates(&self) -> EngineResult<Vec<String>> {
        let mut statement = self.connection.prepare(
            "SELECT DISTINCT contract_type FROM templates WHERE active = 1 ORDER BY contract_type",
        )?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut types = Vec::new();
        for row in rows {
            types.push(row?);
        }
        Ok(types)
    }

    pub fn upsert_disclosures(&mut self, disclosures: &[DisclosureImport]) -> EngineResult<usize> {
        let tx = self.connection.transaction()?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO disclosures(code, jurisdiction, body)
                VALUES(?1, ?2, ?3)
                ON CONFLICT(code, jurisdiction) DO UPDATE SET body=excluded.body
                ",
            )?;
            for disclosure in disclosures {
                statement.execute(params![
                    disclosure.code,
                    disclosure.jurisdiction,
                    disclosure.body
                ])?;
            }
        }
        tx.commit()?;
        Ok(disclosures.len())
    }

    pub fn disclosure_body(&self, code: &str, jurisdiction: &str) -> EngineResult<Option<String>> {
        let body = self
            .connection
            .query_row(
                "SELECT body FROM disclosures WHERE code = ?1 AND jurisdiction = ?2",
                params![code, jurisdiction],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    pub fn import_project(&mut self, import: &ProjectImportFile) -> EngineResult<()> {
        let tx = self.connection.transaction()?;

        tx.execute(
            "
            INSERT INTO projects(id, name, service_model, jurisdiction, site_costs, variables)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
              name=excluded.name,
              service_model=excluded.service_model,
              jurisdiction=excluded.jurisdiction,
              site_costs=excluded.site_costs,
              variables=excluded.variables
            ",
            params![
                import.project.id,
                import.project.name,
                import.project.service_model.as_str(),
                import.project.jurisdiction,
                import.project.site_costs,
                serde_json::to_string(&import.project.variables).unwrap_or_default(),
            ],
        )?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO home_models(id, name, design_fee, offsite_base, onsite_estimate)
                VALUES(?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                  name=excluded.name,
                  design_fee=excluded.design_fee,
                  offsite_base=excluded.offsite_base,
                  onsite_estimate=excluded.onsite_estimate
                ",
            )?;
            for model in &import.models {
                statement.execute(params![
                    model.id,
                    model.name,
                    model.design_fee,
                    model.offsite_base,
                    model.onsite_estimate
                ])?;
            }
        }

        tx.execute("DELETE FROM units WHERE project_id = ?1", [import.project.id])?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO units(project_id, model_id, label, customization_total)
                VALUES(?1, ?2, ?3, ?4)
                ",
            )?;
            for unit in &import.units {
                statement.execute(params![
                    import.project.id,
                    unit.model_id,
                    unit.label,
                    unit.customization_total
                ])?;
            }
        }

        tx.execute(
            "DELETE FROM milestones WHERE project_id = ?1",
            [import.project.id],
        )?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO milestones(project_id, position, name, percentage)
                VALUES(?1, ?2, ?3, ?4)
                ",
            )?;
            for (position, milestone) in import.milestones.iter().enumerate() {
                statement.execute(params![
                    import.project.id,
                    position as i64,
                    milestone.name,
                    milestone.percentage
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn project(&self, project_id: i64) -> EngineResult<ProjectRecord> {
        let found = self
            .connection
            .query_row(
                "
                SELECT id, name, service_model, jurisdiction, site_costs, variables
                FROM projects
                WHERE id = ?1
                ",
                [project_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, service_model_raw, jurisdiction, site_costs, variables_raw)) = found
        else {
            return Err(EngineError::ProjectNotFound { project_id });
        };

        let service_model = ServiceModel::from_str(&service_model_raw).ok_or_else(|| {
            EngineError::InvalidRecord(format!(
                "project {id} has unknown service model {service_model_raw}"
            ))
        })?;

        Ok(ProjectRecord {
            id,
            name,
            service_model,
            jurisdiction,
            site_costs,
            variables: serde_json::from_str(&variables_raw).unwrap_or_default(),
        })
    }

    pub fn units_with_models(&self, project_id: i64) -> EngineResult<Vec<UnitWithModel>> {
        let mut statement = self.connection.prepare(
            "
            SELECT u.label, m.name, m.design_fee, m.offsite_base, m.onsite_estimate,
                   u.customization_total
            FROM units u
            JOIN home_models m ON m.id = u.model_id
            WHERE u.project_id = ?1
            ORDER BY u.id ASC
            ",
        )?;

        let rows = statement.query_map([project_id], |row| {
            Ok(UnitWithModel {
                unit_label: row.get(0)?,
                model_name: row.get(1)?,
                design_fee: row.get(2)?,
                offsite_base: row.get(3)?,
                onsite_estimate: row.get(4)?,
                customization_total: row.get(5)?,
            })
        })?;

        let mut units = Vec::new();
        for row in rows {
            units.push(row?);
        }
        Ok(units)
    }

    pub fn milestones(&self, project_id: i64) -> EngineResult<Vec<MilestoneRecord>> {
        let mut statement = self.connection.prepare(
            "
            SELECT name, percentage
            FROM milestones
            WHERE project_id = ?1
            ORDER BY position ASC
            ",
        )?;

        let rows = statement.query_map([project_id], |row| {
            Ok(MilestoneRecord {
                name: row.get(0)?,
                percentage: row.get(1)?,
            })
        })?;

        let mut milestones = Vec::new();
        for row in rows {
            milestones.push(row?);
        }
        Ok(milestones)
    }

    pub fn contract_type_statuses(&self) -> EngineResult<Vec<ContractTypeStatus>> {
        let mut statement = self.connection.prepare(
            "
            SELECT contract_type,
                   (SELECT COUNT(*) FROM clauses c WHERE c.contract_type = t.contract_type),
                   (SELECT COUNT(*) FROM exhibits e WHERE e.contract_type = t.contract_type),
                   (SELECT COUNT(*) FROM templates tp WHERE tp.contract_type = t.contract_type AND tp.active = 1)
            FROM (
              SELECT contract_type FROM clauses
              UNION
              SELECT contract_type FROM exhibits
              UNION
              SELECT contract_type FROM templates
            ) t
            GROUP BY contract_type
            ORDER BY contract_type
            ",
        )?;

        let rows = statement.query_map([], |row| {
            Ok(ContractTypeStatus {
                contract_type: row.get(0)?,
                clause_count: row.get(1)?,
                exhibit_count: row.get(2)?,
                has_active_template: row.get::<_, i64>(3)? > 0,
            })
        })?;

        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    pub fn count(&self, sql: &str) -> EngineResult<i64> {
        let count = self.connection.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

fn map_clause_row(row: &Row<'_>) -> rusqlite::Result<ClauseRecord> {
    let block_type_raw: String = row.get(6)?;
    let variables_raw: String = row.get(9)?;
    let conditions_raw: Option<String> = row.get(10)?;
    let service_model_raw: Option<String> = row.get(12)?;

    Ok(ClauseRecord {
        id: row.get(0)?,
        code: row.get(1)?,
        contract_type: row.get(2)?,
        parent_id: row.get(3)?,
        hierarchy_level: row.get(4)?,
        sort_order: row.get(5)?,
        block_type: BlockType::from_str(&block_type_raw).unwrap_or(BlockType::Paragraph),
        heading: row.get(7)?,
        content: row.get(8)?,
        variables_used: serde_json::from_str(&variables_raw).unwrap_or_default(),
        conditions: decode_conditions(conditions_raw),
        disclosure_code: row.get(11)?,
        service_model_condition: service_model_raw
            .as_deref()
            .and_then(ServiceModel::from_str),
    })
}

fn encode_conditions(conditions: &BTreeMap<String, String>) -> Option<String> {
    if conditions.is_empty() {
        None
    } else {
        serde_json::to_string(conditions).ok()
    }
}

fn decode_conditions(raw: Option<String>) -> BTreeMap<String, String> {
    raw.as_deref()
        .and_then(|value| serde_json::from_str(value).ok())
        .unwrap_or_default()
}

fn content_snippet(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.len() > 120 {
        let mut cut = 120;
        while !flat.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &flat[..cut])
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(temp_id: u32, parent: Option<u32>, code: &str, level: i64, order: i64) -> ClauseDraft {
        ClauseDraft {
            temp_id,
            parent_temp_id: parent,
            code: code.to_string(),
            hierarchy_level: level,
            sort_order: order,
            block_type: BlockType::Clause,
            heading: None,
            content: format!("content of {code}"),
            variables_used: Vec::new(),
            conditions: BTreeMap::new(),
            disclosure_code: None,
            service_model_condition: None,
        }
    }

    #[test]
    fn replace_contract_type_resolves_parents_in_insertion_order() {
        let mut store = ClauseStore::open_in_memory().expect("store opens");
        let drafts = vec![
            draft(1, None, "s01", 1, 1),
            draft(2, Some(1), "s01.c01", 3, 2),
            draft(3, Some(2), "s01.c01.s01", 4, 3),
        ];

        let outcome = store
            .replace_contract_type("purchase_agreement", &drafts, &[], "hash")
            .expect("replace succeeds");
        assert_eq!(outcome.clauses_inserted, 3);
        assert!(outcome.errors.is_empty());

        let clauses = store.clauses_by_type("purchase_agreement").expect("query");
        assert_eq!(clauses.len(), 3);
        assert_eq!(clauses[0].parent_id, None);
        assert_eq!(clauses[1].parent_id, Some(clauses[0].id));
        assert_eq!(clauses[2].parent_id, Some(clauses[1].id));
    }

    #[test]
    fn clause_rows_round_trip_their_metadata() {
        let mut store = ClauseStore::open_in_memory().expect("store opens");
        let mut first = draft(1, None, "s01", 1, 1);
        first.heading = Some("GENERAL TERMS".to_string());
        first.content = "GENERAL TERMS\n\nPayment is due on {{CLOSING_DATE}}.".to_string();
        first.variables_used = vec!["CLOSING_DATE".to_string()];
        first
            .conditions
            .insert("jurisdiction".to_string(), "CA".to_string());
        first.service_model_condition = Some(ServiceModel::Cmos);

        store
            .replace_contract_type("purchase_agreement", &[first], &[], "hash")
            .expect("insert");

        let clauses = store.clauses_by_type("purchase_agreement").expect("query");
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].contract_type, "purchase_agreement");
        assert_eq!(clauses[0].heading.as_deref(), Some("GENERAL TERMS"));
        assert_eq!(clauses[0].variables_used, vec!["CLOSING_DATE".to_string()]);
        assert_eq!(
            clauses[0].conditions.get("jurisdiction").map(String::as_str),
            Some("CA")
        );
        assert_eq!(
            clauses[0].service_model_condition,
            Some(ServiceModel::Cmos)
        );
    }

    #[test]
    fn exhibit_rows_round_trip_their_metadata() {
        let mut store = ClauseStore::open_in_memory().expect("store opens");
        let exhibit = ExhibitDraft {
            letter: 'B',
            title: "Warranty".to_string(),
            content: "Ten year structural coverage.".to_string(),
            sort_order: 5,
            is_dynamic: true,
            disclosure_code: Some("TX_NOTICE".to_string()),
            conditions: BTreeMap::from([("jurisdiction".to_string(), "TX".to_string())]),
            service_model_condition: Some(ServiceModel::Crc),
            variables_used: Vec::new(),
        };

        store
            .replace_contract_type("purchase_agreement", &[], &[exhibit], "hash")
            .expect("insert");

        let exhibits = store.exhibits_by_type("purchase_agreement").expect("query");
        assert_eq!(exhibits.len(), 1);
        assert!(exhibits[0].id > 0);
        assert_eq!(exhibits[0].contract_type, "purchase_agreement");
        assert_eq!(exhibits[0].letter, "B");
        assert_eq!(exhibits[0].title, "Warranty");
        assert_eq!(exhibits[0].sort_order, 5);
        assert!(exhibits[0].is_dynamic);
        assert_eq!(exhibits[0].disclosure_code.as_deref(), Some("TX_NOTICE"));
        assert_eq!(
            exhibits[0].service_model_condition,
            Some(ServiceModel::Crc)
        );
    }

    #[test]
    fn replace_contract_type_is_a_full_replace_not_a_merge() {
        let mut store = ClauseStore::open_in_memory().expect("store opens");
        let first = vec![draft(1, None, "s01", 1, 1), draft(2, None, "s02", 1, 2)];
        store
            .replace_contract_type("purchase_agreement", &first, &[], "hash-a")
            .expect("first ingest");

        let second = vec![draft(1, None, "s01", 1, 1)];
        store
            .replace_contract_type("purchase_agreement", &second, &[], "hash-b")
            .expect("second ingest");

        let clauses = store.clauses_by_type("purchase_agreement").expect("query");
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].code, "s01");
    }

    #[test]
    fn replace_contract_type_leaves_other_types_untouched() {
        let mut store = ClauseStore::open_in_memory().expect("store opens");
        store
            .replace_contract_type("purchase_agreement", &[draft(1, None, "s01", 1, 1)], &[], "h")
            .expect("ingest type a");
        store
            .replace_contract_type("service_agreement", &[draft(1, None, "s01", 1, 1)], &[], "h")
            .expect("ingest type b");

        store
            .replace_contract_type("purchase_agreement", &[], &[], "h2")
            .expect("wipe type a");

        assert_eq!(
            store
                .clauses_by_type("service_agreement")
                .expect("query")
                .len(),
            1
        );
        assert!(store
            .clauses_by_type("purchase_agreement")
            .expect("query")
            .is_empty());
    }

    #[test]
    fn clause_with_missing_parent_is_skipped_and_reported() {
        let mut store = ClauseStore::open_in_memory().expect("store opens");
        let drafts = vec![
            draft(1, None, "s01", 1, 1),
            draft(2, Some(99), "s01.c01", 3, 2),
        ];

        let outcome = store
            .replace_contract_type("purchase_agreement", &drafts, &[], "hash")
            .expect("replace succeeds");
        assert_eq!(outcome.clauses_inserted, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("s01.c01"));
    }

    #[test]
    fn active_template_missing_is_template_not_found() {
        let store = ClauseStore::open_in_memory().expect("store opens");
        let err = store.active_template("never_ingested").unwrap_err();
        assert!(matches!(err, EngineError::TemplateNotFound { .. }));
    }

    #[test]
    fn activate_template_replaces_prior_active_row() {
        let mut store = ClauseStore::open_in_memory().expect("store opens");
        let first = Template {
            contract_type: "purchase_agreement".to_string(),
            base_clause_codes: vec!["s01".to_string()],
            conditional_rules: BTreeMap::new(),
        };
        store.activate_template(&first, "2026-01-01T00:00:00Z").expect("activate");

        let second = Template {
            contract_type: "purchase_agreement".to_string(),
            base_clause_codes: vec!["s01".to_string(), "s02".to_string()],
            conditional_rules: BTreeMap::new(),
        };
        store.activate_template(&second, "2026-01-02T00:00:00Z").expect("activate");

        let active = store.active_template("purchase_agreement").expect("lookup");
        assert_eq!(active.base_clause_codes.len(), 2);
    }

    #[test]
    fn missing_project_is_project_not_found() {
        let store = ClauseStore::open_in_memory().expect("store opens");
        let err = store.project(7).unwrap_err();
        assert!(matches!(err, EngineError::ProjectNotFound { project_id: 7 }));
    }
}
