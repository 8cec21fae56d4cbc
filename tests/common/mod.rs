#![allow(dead_code)]

pub use omws_test_utils::builders::*;
pub use omws_test_utils::client::{Client, RunningServer};
pub use omws_test_utils::fake_executor::{FakeExecutor, Outcome};
pub use omws_test_utils::{init_tracing, scratch_store, with_timeout};

use omws::server::JobService;
use omws::server::protocol::Submission;
use omws::store::TicketStore;
use omws::ticket::Ticket;
use omws::types::{JobType, ServiceStatus};

pub fn service_for(store: &TicketStore) -> JobService {
    JobService::new(store.clone(), ServiceStatus::Available, 100)
}

/// Submit an experiment plan straight through the service layer.
pub fn submit_plan(store: &TicketStore, plan: PlanBuilder) -> Submission {
    service_for(store)
        .submit(JobType::Experiment, &plan.payload())
        .expect("experiment submission")
}

/// Member ticket for client job id `id`.
pub fn member(sub: &Submission, id: &str) -> Ticket {
    sub.jobs
        .get(id)
        .cloned()
        .unwrap_or_else(|| panic!("no job '{id}' in submission"))
}

/// Sorted names of all files in the ticket directory.
pub fn dir_listing(store: &TicketStore) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(store.dir())
        .expect("read ticket dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
