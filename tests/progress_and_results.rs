mod common;

use common::*;
use omws::errors::OmwsError;
use omws::store::progress::{self, aggregate};
use omws::types::JobType;

#[test]
fn test_unknown_ticket_reports_minus_four_without_side_effects() {
    let (_dir, store) = scratch_store();
    let service = service_for(&store);

    let report = service
        .progress(&["unknown".to_string(), "Zz9Zz9".to_string()])
        .unwrap();
    assert_eq!(report.len(), 2);
    assert!(report.iter().all(|p| p.progress == progress::UNKNOWN_TICKET));
    assert_eq!(report[0].ticket, "unknown");
    assert!(dir_listing(&store).is_empty());
}

#[test]
fn test_job_progress_lifecycle() {
    let (_dir, store) = scratch_store();
    let sub = service_for(&store)
        .submit(JobType::Test, &template_for(JobType::Test))
        .unwrap();
    let t = &sub.ticket;

    assert_eq!(store.job_progress(t).unwrap(), progress::QUEUED);

    store.write_progress(t, 40).unwrap();
    assert_eq!(store.job_progress(t).unwrap(), 40);

    // Outputs may still be flushing until the sentinel appears.
    store.write_progress(t, progress::COMPLETE).unwrap();
    assert_eq!(store.job_progress(t).unwrap(), 99);

    store.mark_done(t).unwrap();
    assert_eq!(store.job_progress(t).unwrap(), progress::COMPLETE);
}

#[test]
fn test_empty_progress_file_reads_as_zero() {
    let (_dir, store) = scratch_store();
    let sub = service_for(&store)
        .submit(JobType::Model, &template_for(JobType::Model))
        .unwrap();
    std::fs::write(store.dir().join(format!("prog.{}", sub.ticket)), "").unwrap();
    assert_eq!(store.read_progress(&sub.ticket).unwrap(), 0);

    std::fs::write(store.dir().join(format!("prog.{}", sub.ticket)), "garbage").unwrap();
    assert!(matches!(
        store.read_progress(&sub.ticket),
        Err(OmwsError::CorruptState { .. })
    ));
}

#[test]
fn test_experiment_progress_is_aggregated_from_members() {
    init_tracing();
    let (_dir, store) = scratch_store();
    let sub = submit_plan(&store, chain_plan());
    let (a, b) = (member(&sub, "A"), member(&sub, "B"));
    let exec = FakeExecutor::new(store.clone());

    assert_eq!(store.job_progress(&sub.ticket).unwrap(), progress::QUEUED);

    exec.run(&a, JobType::Sampling).unwrap();
    assert!(exec.take(&b, JobType::Model).unwrap());
    store.write_progress(&b, 50).unwrap();
    // (100 + 50 + 0) / 3
    assert_eq!(store.job_progress(&sub.ticket).unwrap(), 50);

    exec.finish(&b, JobType::Model).unwrap();
    exec.scheduler().on_job_completed(&b).unwrap();
    exec.run_until_idle().unwrap();
    assert_eq!(store.job_progress(&sub.ticket).unwrap(), progress::COMPLETE);
}

#[test]
fn test_aggregate_rules() {
    assert_eq!(aggregate(&[]), progress::QUEUED);
    assert_eq!(aggregate(&[-1, -1]), progress::QUEUED);
    assert_eq!(aggregate(&[100, -1, 20]), 40);
    assert_eq!(aggregate(&[100, -3, 20]), -3);
    assert_eq!(aggregate(&[100, 100]), 100);
}

#[test]
fn test_results_of_finished_experiment() {
    init_tracing();
    let (_dir, store) = scratch_store();
    let sub = submit_plan(&store, chain_plan());
    let service = service_for(&store);

    assert!(matches!(
        service.result(sub.ticket.as_str()),
        Err(OmwsError::NoResults)
    ));

    FakeExecutor::new(store.clone()).run_until_idle().unwrap();

    let results = service.result(sub.ticket.as_str()).unwrap();
    assert_eq!(results.len(), 3);
    let projection = results
        .iter()
        .find(|r| r.job_type == JobType::Projection)
        .unwrap();
    assert_eq!(projection.ticket, member(&sub, "C"));
    assert_eq!(projection.output, output_for(JobType::Projection));

    let single = service.result(member(&sub, "B").as_str()).unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].output, output_for(JobType::Model));
}

#[test]
fn test_results_skip_cancelled_members() {
    init_tracing();
    let (_dir, store) = scratch_store();
    let sub = submit_plan(&store, chain_plan());
    let a = member(&sub, "A");
    FakeExecutor::new(store.clone()).run(&a, JobType::Sampling).unwrap();
    service_for(&store).cancel(&[sub.ticket.to_string()]).unwrap();

    let results = service_for(&store).result(sub.ticket.as_str()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ticket, a);
}

#[test]
fn test_log_records_experiment_history() {
    init_tracing();
    let (_dir, store) = scratch_store();
    let sub = submit_plan(&store, chain_plan());
    FakeExecutor::new(store.clone()).run_until_idle().unwrap();

    let (_, log) = service_for(&store).log(sub.ticket.as_str()).unwrap();
    assert!(log.contains(&format!("Job {} finished with progress 100", member(&sub, "A"))));
    assert!(log.contains(&format!("Job {} is ready to run", member(&sub, "C"))));
    assert!(log.trim_end().ends_with("Experiment finished"));

    assert!(matches!(
        service_for(&store).log("nope00"),
        Err(OmwsError::UnknownTicket(_))
    ));
    assert!(matches!(
        service_for(&store).log("../x"),
        Err(OmwsError::UnknownTicket(_))
    ));
}
