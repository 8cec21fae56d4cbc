#![allow(dead_code)]

use std::path::Path;

use omws::config::{ConfigFile, RawConfigFile, ServerSection, StoreSection};
use omws::dag::{ExperimentPlan, PlannedJob};
use omws::types::{JobType, Role, ServiceStatus};
use serde_json::{Value, json};

/// Builder for `ExperimentPlan` to simplify test setup.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: ExperimentPlan,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            plan: ExperimentPlan::default(),
        }
    }

    /// Add a job with the default template for its type.
    pub fn job(self, id: &str, job_type: JobType) -> Self {
        self.job_with(id, job_type, template_for(job_type))
    }

    pub fn job_with(mut self, id: &str, job_type: JobType, parameters: Value) -> Self {
        self.plan.jobs.push(PlannedJob {
            id: id.to_string(),
            job_type,
            parameters,
            depends_on: Default::default(),
        });
        self
    }

    /// Make `id` consume the output of `on` in slot `role`.
    pub fn depends(mut self, id: &str, on: &str, role: &str) -> Self {
        let job = self
            .plan
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .unwrap_or_else(|| panic!("no job '{id}' in plan"));
        job.depends_on.insert(on.to_string(), Role::from(role));
        self
    }

    pub fn len(&self) -> usize {
        self.plan.jobs.len()
    }

    pub fn build(self) -> ExperimentPlan {
        self.plan
    }

    /// The plan as a submit payload.
    pub fn payload(self) -> Value {
        serde_json::to_value(self.plan).expect("serialize plan")
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A (sampling) → B (model, presence) → C (projection, model).
pub fn chain_plan() -> PlanBuilder {
    PlanBuilder::new()
        .job("A", JobType::Sampling)
        .job("B", JobType::Model)
        .job("C", JobType::Projection)
        .depends("B", "A", "presence")
        .depends("C", "B", "model")
}

/// Request template with the placeholders the role merge fills.
pub fn template_for(job_type: JobType) -> Value {
    match job_type {
        JobType::Model => json!({
            "sampler": { "environment": ["bio1", "bio12"], "presence": null, "absence": null },
            "algorithm": null,
        }),
        JobType::Test => json!({
            "sampler": { "environment": ["bio1", "bio12"], "presence": null, "absence": null },
            "algorithm": null,
            "statistics": { "confusion_matrix": { "threshold": null } },
        }),
        JobType::Projection => json!({
            "algorithm": null,
            "environment": ["bio1", "bio12"],
            "output": { "format": "GreyTiff" },
            "statistics": { "area_statistics": { "prediction_threshold": null } },
        }),
        JobType::Sampling => json!({ "points": 100 }),
        JobType::Evaluation => json!({
            "algorithm": null,
            "sampler": { "presence": null, "environment": null },
        }),
        JobType::Experiment => json!({}),
    }
}

/// Output a successful executor run of `job_type` produces.
pub fn output_for(job_type: JobType) -> Value {
    match job_type {
        JobType::Sampling => json!({
            "presence": [{ "id": "p1", "x": -47.1, "y": -22.9 }],
            "absence": [{ "id": "a1", "x": -45.0, "y": -20.0 }],
        }),
        JobType::Model => json!({
            "serialized_model": {
                "algorithm": { "id": "BIOCLIM", "parameters": { "StandardDeviationCutoff": 0.674 } },
                "sampler": {
                    "environment": ["bio1", "bio12"],
                    "presence": [{ "id": "p1", "x": -47.1, "y": -22.9 }],
                },
            },
        }),
        JobType::Test => json!({ "accuracy": 0.93 }),
        JobType::Projection => json!({ "stats": { "valid_cells": 1024, "cells_present": 96 } }),
        JobType::Evaluation => json!({ "values": "0.8 0.35 0.21 0.0" }),
        JobType::Experiment => json!({}),
    }
}

/// Validated config pointing at `dir`.
pub fn config_for(dir: &Path, workers: usize, status: ServiceStatus) -> ConfigFile {
    let raw = RawConfigFile {
        store: StoreSection {
            ticket_directory: dir.to_path_buf(),
            ticket_attempts: 100,
        },
        server: ServerSection {
            address: "127.0.0.1:0".to_string(),
            workers,
            status,
            max_request_bytes: 4 * 1024 * 1024,
        },
    };
    ConfigFile::try_from(raw).expect("Failed to build valid config from builder")
}
