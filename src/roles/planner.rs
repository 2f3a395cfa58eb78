//! Planner role: produces the Plan — architecture summary, tech stack,
//! file index, tasks, and (for non-trivial requests) the four formal
//! spec slots.

use super::prompts::{PromptStore, PLANNER_SYSTEM};
use super::{extract_json_object, ModelBackend};
use crate::config::{Role, Size};
use crate::dag::task::{Plan, SpecSlotsPlan, TaskId, TaskNode};
use crate::error::EngineError;
use crate::memory::PlannerContext;
use crate::model_client::Message;
use std::collections::HashSet;
use std::path::PathBuf;

pub struct Planner<'a> {
    pub backend: &'a dyn ModelBackend,
    pub prompts: &'a PromptStore,
}

impl<'a> Planner<'a> {
    pub async fn plan(&self, context: &PlannerContext, size: Size) -> Result<Plan, EngineError> {
        let mut user = format!("Request: {}\n", context.request);
        if !context.failure_log.is_empty() {
            user.push_str("\nPrior failures to account for while refining the plan:\n");
            for record in &context.failure_log {
                user.push_str(&format!(
                    "- task {:?} attempt {}: {} (strategy {:?}, outcome {:?})\n",
                    record.task_id, record.attempt, record.analyzer_diagnosis, record.strategy, record.outcome
                ));
            }
        }

        let messages = vec![Message::system(self.prompts.get(PLANNER_SYSTEM)), Message::user(user)];
        let raw = self.backend.call(Role::Planner, messages, size).await?;
        let value = extract_json_object(&raw)?;
        parse_plan(&value)
    }
}

fn parse_plan(value: &serde_json::Value) -> Result<Plan, EngineError> {
    let architecture_summary = value
        .get("architecture_summary")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let tech_stack: HashSet<String> = value
        .get("tech_stack")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let file_index: Vec<(PathBuf, String)> = value
        .get("file_index")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| {
                    let path = entry.get("path")?.as_str()?;
                    let purpose = entry.get("purpose").and_then(|v| v.as_str()).unwrap_or("");
                    Some((PathBuf::from(path), purpose.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let spec_slots = value
        .get("spec_slots")
        .map(|slots| SpecSlotsPlan {
            database_schema: slots.get("database_schema").and_then(|v| v.as_str()).map(String::from),
            api_surface: slots.get("api_surface").and_then(|v| v.as_str()).map(String::from),
            auth_flow: slots.get("auth_flow").and_then(|v| v.as_str()).map(String::from),
            deployment: slots.get("deployment").and_then(|v| v.as_str()).map(String::from),
        })
        .unwrap_or_default();

    let tasks_raw = value
        .get("tasks")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::ParseError("plan missing 'tasks' array".into()))?;

    let mut tasks = Vec::new();
    for entry in tasks_raw {
        let id = entry.get("id").and_then(|v| v.as_u64()).ok_or_else(|| {
            EngineError::ParseError("task missing integer 'id'".into())
        })? as u32;
        let file = entry
            .get("file")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::ParseError("task missing 'file'".into()))?;
        let description = entry.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let depends_on: Vec<TaskId> = entry
            .get("depends_on")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_u64()).map(|n| TaskId(n as u32)).collect())
            .unwrap_or_default();
        tasks.push(TaskNode::new(TaskId(id), PathBuf::from(file), description, depends_on));
    }

    let plan = Plan { architecture_summary, tech_stack, file_index, spec_slots, tasks };
    plan.validate().map_err(EngineError::PlanInvariantViolated)?;
    Ok(plan)
}
