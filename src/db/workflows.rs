use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::warn;

use super::{Database, now_unix, timestamp};
use crate::error::{Error, Result};
use crate::models::{Action, ConditionLogic, Trigger, Workflow, WorkflowDraft, WorkflowId};
use crate::store::WorkflowStore;

const WORKFLOW_COLUMNS: &str =
    "id, name, description, enabled, priority, condition_logic, created_at, updated_at";

fn workflow_from_row(row: &Row<'_>) -> rusqlite::Result<(Workflow, String)> {
    let workflow = Workflow {
        id: WorkflowId::new(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        enabled: row.get(3)?,
        priority: row.get(4)?,
        condition_logic: ConditionLogic::Or,
        triggers: Vec::new(),
        actions: Vec::new(),
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    };
    Ok((workflow, row.get(5)?))
}

/// Loads triggers in position order.
///
/// Rows whose config no longer parses are skipped so one bad row cannot
/// disable every workflow.
fn triggers_in(conn: &Connection, id: WorkflowId) -> Result<Vec<Trigger>> {
    let mut stmt = conn.prepare(
        "SELECT trigger_type, config FROM workflow_triggers
         WHERE workflow_id = ?1 ORDER BY position, id",
    )?;
    let rows = stmt
        .query_map([id.get()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut triggers = Vec::with_capacity(rows.len());
    for (trigger_type, config) in rows {
        let parsed = serde_json::from_str(&config)
            .map_err(Error::from)
            .and_then(|config| Trigger::from_parts(&trigger_type, config));
        match parsed {
            Ok(trigger) => triggers.push(trigger),
            Err(e) => warn!(workflow_id = %id, %trigger_type, error = %e, "Skipping invalid trigger"),
        }
    }
    Ok(triggers)
}

fn actions_in(conn: &Connection, id: WorkflowId) -> Result<Vec<Action>> {
    let mut stmt = conn.prepare(
        "SELECT action_type, config FROM workflow_actions
         WHERE workflow_id = ?1 ORDER BY position, id",
    )?;
    let rows = stmt
        .query_map([id.get()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut actions = Vec::with_capacity(rows.len());
    for (action_type, config) in rows {
        let parsed = serde_json::from_str(&config)
            .map_err(Error::from)
            .and_then(|config| Action::from_parts(&action_type, config));
        match parsed {
            Ok(action) => actions.push(action),
            Err(e) => warn!(workflow_id = %id, %action_type, error = %e, "Skipping invalid action"),
        }
    }
    Ok(actions)
}

fn hydrate(conn: &Connection, (mut workflow, logic): (Workflow, String)) -> Result<Workflow> {
    workflow.condition_logic = logic.parse().unwrap_or_else(|e| {
        warn!(workflow_id = %workflow.id, error = %e, "Unknown condition logic, using OR");
        ConditionLogic::Or
    });
    workflow.triggers = triggers_in(conn, workflow.id)?;
    workflow.actions = actions_in(conn, workflow.id)?;
    Ok(workflow)
}

fn load_in(conn: &Connection, id: WorkflowId) -> Result<Option<Workflow>> {
    let row = conn
        .query_row(
            &format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?1"),
            [id.get()],
            workflow_from_row,
        )
        .optional()?;
    row.map(|row| hydrate(conn, row)).transpose()
}

fn require_in(conn: &Connection, id: WorkflowId) -> Result<Workflow> {
    load_in(conn, id)?.ok_or_else(|| not_found(id))
}

fn not_found(id: WorkflowId) -> Error {
    Error::NotFound {
        entity: "workflow",
        id: id.get(),
    }
}

fn insert_steps_in(conn: &Connection, id: WorkflowId, draft: &WorkflowDraft) -> Result<()> {
    for (position, trigger) in draft.triggers.iter().enumerate() {
        conn.execute(
            "INSERT INTO workflow_triggers (workflow_id, position, trigger_type, config)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.get(),
                position as i64,
                trigger.trigger_type(),
                serde_json::to_string(&trigger.config())?
            ],
        )?;
    }
    for (position, action) in draft.actions.iter().enumerate() {
        conn.execute(
            "INSERT INTO workflow_actions (workflow_id, position, action_type, config)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.get(),
                position as i64,
                action.action_type(),
                serde_json::to_string(&action.config())?
            ],
        )?;
    }
    Ok(())
}

impl WorkflowStore for Database {
    fn create_workflow(&self, draft: &WorkflowDraft) -> Result<Workflow> {
        let now = now_unix();
        self.with_transaction(|tx| {
            let priority: i64 = tx.query_row(
                "SELECT COALESCE(MAX(priority), 0) + 1 FROM workflows",
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO workflows
                 (name, description, enabled, priority, condition_logic, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    draft.name,
                    draft.description,
                    draft.enabled,
                    priority,
                    draft.condition_logic.as_str(),
                    now
                ],
            )?;
            let id = WorkflowId::new(tx.last_insert_rowid());
            insert_steps_in(tx, id, draft)?;
            require_in(tx, id)
        })
    }

    fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
        load_in(&self.connection(), id)
    }

    fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows ORDER BY priority ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map([], workflow_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|row| hydrate(&conn, row)).collect()
    }

    fn update_workflow(&self, id: WorkflowId, draft: &WorkflowDraft) -> Result<Workflow> {
        let now = now_unix();
        self.with_transaction(|tx| {
            let updated = tx.execute(
                "UPDATE workflows
                 SET name = ?2, description = ?3, enabled = ?4, condition_logic = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    id.get(),
                    draft.name,
                    draft.description,
                    draft.enabled,
                    draft.condition_logic.as_str(),
                    now
                ],
            )?;
            if updated == 0 {
                return Err(not_found(id));
            }
            tx.execute(
                "DELETE FROM workflow_triggers WHERE workflow_id = ?1",
                [id.get()],
            )?;
            tx.execute(
                "DELETE FROM workflow_actions WHERE workflow_id = ?1",
                [id.get()],
            )?;
            insert_steps_in(tx, id, draft)?;
            require_in(tx, id)
        })
    }

    fn delete_workflow(&self, id: WorkflowId) -> Result<()> {
        let deleted = self
            .connection()
            .execute("DELETE FROM workflows WHERE id = ?1", [id.get()])?;
        if deleted == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn toggle_workflow(&self, id: WorkflowId) -> Result<Workflow> {
        let conn = self.connection();
        let updated = conn.execute(
            "UPDATE workflows
             SET enabled = CASE WHEN enabled = 1 THEN 0 ELSE 1 END, updated_at = ?2
             WHERE id = ?1",
            params![id.get(), now_unix()],
        )?;
        if updated == 0 {
            return Err(not_found(id));
        }
        require_in(&conn, id)
    }
}
