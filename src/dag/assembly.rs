// src/dag/assembly.rs

//! Successor request assembly.
//!
//! A successor's pending template is completed by splicing in the outputs of
//! its finished dependencies, one role at a time. Outputs are read from what
//! the executor published (`<type>_resp.`, or `stats.` for projections); the
//! dependency's consumed request in `_proc.` is never looked at.
//!
//! The merge works on an in-memory copy; nothing is written unless every
//! dependency merged.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{OmwsError, Result};
use crate::store::{Dependency, JobMetadata, Stage, TicketStore};
use crate::ticket::Ticket;
use crate::types::{JobType, Role};

/// Where one dependency output lands in a successor's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Splice {
    /// `presence` or `absence` of a sampling output into `sampler.<field>`.
    Points(&'static str),
    /// `serialized_model.algorithm` into `algorithm`.
    Algorithm,
    /// Algorithm plus the model's training points and environment, for
    /// evaluation requests.
    TrainingData,
    /// Lowest presence threshold of an evaluation output, written as a string
    /// at the given object path.
    Threshold(&'static [&'static str]),
}

const TEST_THRESHOLD: &[&str] = &["statistics", "confusion_matrix", "threshold"];
const PROJECTION_THRESHOLD: &[&str] = &["statistics", "area_statistics", "prediction_threshold"];

/// What `role` contributes to a successor of type `successor`. `None` means
/// the edge only gates.
pub fn splice_for(successor: JobType, role: &Role) -> Option<Splice> {
    match (successor, role) {
        (JobType::Model | JobType::Test, Role::Presence) => Some(Splice::Points("presence")),
        (JobType::Model | JobType::Test, Role::Absence) => Some(Splice::Points("absence")),
        (JobType::Test | JobType::Projection, Role::Model) => Some(Splice::Algorithm),
        (JobType::Evaluation, Role::Model) => Some(Splice::TrainingData),
        (JobType::Test, Role::Lpt) => Some(Splice::Threshold(TEST_THRESHOLD)),
        (JobType::Projection, Role::Lpt) => Some(Splice::Threshold(PROJECTION_THRESHOLD)),
        _ => None,
    }
}

/// Splice one dependency's output into `template`.
pub fn merge_dependency(template: &mut Value, splice: Splice, output: &Value) -> std::result::Result<(), String> {
    match splice {
        Splice::Points(field) => {
            let points = output
                .get(field)
                .ok_or_else(|| format!("dependency output has no '{field}' field"))?;
            object_path(template, &["sampler"])?.insert(field.to_string(), points.clone());
        }
        Splice::Algorithm => {
            let algorithm = serialized_model(output, "algorithm")?;
            root_object(template)?.insert("algorithm".to_string(), algorithm.clone());
        }
        Splice::TrainingData => {
            let algorithm = serialized_model(output, "algorithm")?.clone();
            let sampler = serialized_model(output, "sampler")?;
            let presence = sampler
                .get("presence")
                .ok_or_else(|| "serialized model has no 'sampler.presence'".to_string())?
                .clone();
            let environment = sampler
                .get("environment")
                .ok_or_else(|| "serialized model has no 'sampler.environment'".to_string())?
                .clone();

            root_object(template)?.insert("algorithm".to_string(), algorithm);
            let target = object_path(template, &["sampler"])?;
            target.insert("presence".to_string(), presence);
            target.insert("environment".to_string(), environment);
        }
        Splice::Threshold(path) => {
            let values = output
                .get("values")
                .ok_or_else(|| "evaluation output has no 'values' field".to_string())?;
            let lpt = lowest_presence_threshold(values)?;
            let (field, parents) = path
                .split_last()
                .ok_or_else(|| "empty threshold path".to_string())?;
            object_path(template, parents)?.insert(field.to_string(), Value::String(lpt));
        }
    }
    Ok(())
}

fn serialized_model<'a>(output: &'a Value, field: &str) -> std::result::Result<&'a Value, String> {
    output
        .get("serialized_model")
        .and_then(|m| m.get(field))
        .ok_or_else(|| format!("dependency output has no 'serialized_model.{field}'"))
}

/// Lowest positive value of an evaluation, as text.
///
/// `values` is either a whitespace separated string or an array of numbers
/// (or numeric strings). Unparsable and non-positive entries are skipped; with
/// nothing left the threshold is `"1"`. A value with more than three decimals
/// is lowered by one unit in its last decimal, so that the point it came from
/// still falls above the threshold.
pub fn lowest_presence_threshold(values: &Value) -> std::result::Result<String, String> {
    let tokens: Vec<String> = match values {
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        other => return Err(format!("evaluation values must be a string or an array, got {other}")),
    };

    let mut lowest = 1.0_f64;
    let mut text = "1".to_string();
    for token in tokens {
        let Ok(value) = token.parse::<f64>() else {
            continue;
        };
        if value < lowest && value > 1e-13 {
            lowest = value;
            text = token;
        }
    }

    let decimals = text.find('.').map(|dot| text.len() - dot - 1).unwrap_or(0);
    if decimals > 3 {
        let adjusted = lowest - 10f64.powi(-(decimals as i32));
        let mut lowered = format!("{adjusted:.decimals$}");
        while lowered.ends_with('0') {
            lowered.pop();
        }
        if lowered.ends_with('.') {
            lowered.pop();
        }
        debug!(lpt = %text, adjusted = %lowered, "lowered presence threshold");
        text = lowered;
    }
    Ok(text)
}

fn root_object(value: &mut Value) -> std::result::Result<&mut Map<String, Value>, String> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| "request template is not a JSON object".to_string())
}

/// The object at `path`, creating empty objects in place of missing or null
/// fields.
fn object_path<'a>(value: &'a mut Value, path: &[&str]) -> std::result::Result<&'a mut Map<String, Value>, String> {
    let mut current = root_object(value)?;
    for key in path {
        let map = current;
        let slot = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = slot
            .as_object_mut()
            .ok_or_else(|| format!("template field '{key}' is not a JSON object"))?;
    }
    Ok(current)
}

/// Build the concrete request for `ticket` from its pending template and the
/// published outputs of its dependencies.
pub fn assemble_request(store: &TicketStore, ticket: &Ticket, meta: &JobMetadata) -> Result<String> {
    let text = store.read_payload(meta.job_type, Stage::Pending, ticket)?;
    let mut request: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)?
    };

    for dep in &meta.prev {
        merge_one(store, ticket, meta.job_type, &mut request, dep)?;
    }

    Ok(serde_json::to_string_pretty(&request)?)
}

fn merge_one(
    store: &TicketStore,
    ticket: &Ticket,
    job_type: JobType,
    request: &mut Value,
    dep: &Dependency,
) -> Result<()> {
    let Some(splice) = splice_for(job_type, &dep.role) else {
        if matches!(dep.role, Role::Other(_)) {
            warn!(ticket = %ticket, role = %dep.role, "ignoring dependency with unknown role");
        } else {
            debug!(ticket = %ticket, role = %dep.role, job_type = %job_type, "dependency only gates this job type");
        }
        return Ok(());
    };

    let dep_type = store.read_metadata(&dep.ticket)?.job_type;
    let text = store.read_result(dep_type, &dep.ticket)?.ok_or_else(|| {
        OmwsError::InvalidRequest(format!(
            "dependency {} of {} published no output",
            dep.ticket, ticket
        ))
    })?;
    let output: Value = serde_json::from_str(&text)?;
    merge_dependency(request, splice, &output).map_err(|reason| {
        OmwsError::InvalidRequest(format!(
            "merging {} output of {} into {}: {reason}",
            dep.role, dep.ticket, ticket
        ))
    })?;
    debug!(ticket = %ticket, dependency = %dep.ticket, role = %dep.role, "merged dependency output");
    Ok(())
}
