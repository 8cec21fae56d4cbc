mod common;

use std::time::Duration;

use common::*;
use omws::server::protocol::{FaultCode, Request, Response};
use omws::server::JobService;
use omws::types::{JobType, ServiceStatus};

fn assert_fault(response: Response, expected: FaultCode) {
    match response {
        Response::Fault { code, .. } => assert_eq!(code, expected),
        other => panic!("expected {expected:?} fault, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submit_poll_cancel_over_one_connection() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let server = RunningServer::start(service_for(&store), 4).await.unwrap();
        let mut client = Client::connect(server.addr).await.unwrap();

        let pong = client.call(&Request::Ping).await.unwrap();
        assert_eq!(pong, Response::Pong { status: ServiceStatus::Available });

        let submitted = client
            .call(&Request::Submit {
                job_type: JobType::Model,
                payload: template_for(JobType::Model),
            })
            .await
            .unwrap();
        let ticket = match submitted {
            Response::Submitted(sub) => sub.ticket,
            other => panic!("unexpected response: {other:?}"),
        };

        match client
            .call(&Request::Progress { tickets: vec![ticket.to_string(), "bogus".into()] })
            .await
            .unwrap()
        {
            Response::Progress { progress } => {
                assert_eq!(progress[0].progress, -1);
                assert_eq!(progress[1].progress, -4);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        assert_fault(
            client.call(&Request::Result { ticket: ticket.to_string() }).await.unwrap(),
            FaultCode::NoResults,
        );

        let cancelled = client
            .call(&Request::Cancel { tickets: vec![ticket.to_string()] })
            .await
            .unwrap();
        assert_eq!(cancelled, Response::Cancelled { tickets: vec![ticket.clone()] });

        match client.call(&Request::Log { ticket: ticket.to_string() }).await.unwrap() {
            Response::Log { ticket: t, .. } => assert_eq!(t, ticket),
            other => panic!("unexpected response: {other:?}"),
        }

        assert_fault(
            client.call(&Request::Log { ticket: "Nope00".into() }).await.unwrap(),
            FaultCode::UnknownTicket,
        );
        assert_fault(client.send_raw("{not json").await.unwrap(), FaultCode::Transport);
        assert_fault(
            client.send_raw(r#"{"op":"submit","type":"experiment","payload":{"jobs":[]}}"#).await.unwrap(),
            FaultCode::InvalidRequest,
        );

        drop(client);
        server.stop().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_experiment_submission_over_the_wire() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let server = RunningServer::start(service_for(&store), 2).await.unwrap();
        let mut client = Client::connect(server.addr).await.unwrap();

        let response = client
            .call(&Request::Submit {
                job_type: JobType::Experiment,
                payload: chain_plan().payload(),
            })
            .await
            .unwrap();
        let sub = match response {
            Response::Submitted(sub) => sub,
            other => panic!("unexpected response: {other:?}"),
        };
        assert_eq!(sub.jobs.len(), 3);

        let exec = FakeExecutor::new(store.clone());
        tokio::task::spawn_blocking(move || exec.run_until_idle().unwrap())
            .await
            .unwrap();

        match client
            .call(&Request::Result { ticket: sub.ticket.to_string() })
            .await
            .unwrap()
        {
            Response::Results { results } => assert_eq!(results.len(), 3),
            other => panic!("unexpected response: {other:?}"),
        }

        drop(client);
        server.stop().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_sequential_mode_serves_clients_in_turn() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let server = RunningServer::start(service_for(&store), 1).await.unwrap();

        for _ in 0..3 {
            let mut client = Client::connect(server.addr).await.unwrap();
            let response = client
                .call(&Request::Submit {
                    job_type: JobType::Sampling,
                    payload: template_for(JobType::Sampling),
                })
                .await
                .unwrap();
            assert!(matches!(response, Response::Submitted(_)));
        }

        assert_eq!(FakeExecutor::new(store.clone()).runnable().len(), 3);
        server.stop().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_many_concurrent_clients_all_answered() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let server = RunningServer::start(service_for(&store), 3).await.unwrap();
        let addr = server.addr;

        let clients: Vec<_> = (0..12)
            .map(|_| {
                tokio::spawn(async move {
                    let mut client = Client::connect(addr).await.unwrap();
                    client
                        .call(&Request::Submit {
                            job_type: JobType::Test,
                            payload: template_for(JobType::Test),
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();
        for c in clients {
            assert!(matches!(c.await.unwrap(), Response::Submitted(_)));
        }

        assert_eq!(FakeExecutor::new(store.clone()).runnable().len(), 12);
        server.stop().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_unavailable_service_only_answers_ping() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let service = JobService::new(store.clone(), ServiceStatus::Unavailable, 100);
        let server = RunningServer::start(service, 2).await.unwrap();
        let mut client = Client::connect(server.addr).await.unwrap();

        assert_eq!(
            client.call(&Request::Ping).await.unwrap(),
            Response::Pong { status: ServiceStatus::Unavailable }
        );
        assert_fault(
            client
                .call(&Request::Submit {
                    job_type: JobType::Model,
                    payload: template_for(JobType::Model),
                })
                .await
                .unwrap(),
            FaultCode::ServiceUnavailable,
        );
        assert_fault(
            client.call(&Request::Progress { tickets: vec![] }).await.unwrap(),
            FaultCode::ServiceUnavailable,
        );
        assert!(dir_listing(&store).is_empty());

        drop(client);
        server.stop().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_single_worker_holds_second_client_until_first_leaves() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let server = RunningServer::start(service_for(&store), 1).await.unwrap();

        let mut first = Client::connect(server.addr).await.unwrap();
        assert!(matches!(first.call(&Request::Ping).await.unwrap(), Response::Pong { .. }));

        let mut second = Client::connect(server.addr).await.unwrap();
        second.send(&Request::Ping).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(300), second.recv()).await;
        assert!(waited.is_err(), "second client answered while the first was connected");

        drop(first);
        assert!(matches!(second.recv().await.unwrap(), Response::Pong { .. }));

        drop(second);
        server.stop().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_worker_slots_bound_concurrent_connections() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let server = RunningServer::start(service_for(&store), 2).await.unwrap();

        let mut first = Client::connect(server.addr).await.unwrap();
        let mut second = Client::connect(server.addr).await.unwrap();
        assert!(matches!(first.call(&Request::Ping).await.unwrap(), Response::Pong { .. }));
        assert!(matches!(second.call(&Request::Ping).await.unwrap(), Response::Pong { .. }));

        let mut third = Client::connect(server.addr).await.unwrap();
        third.send(&Request::Ping).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(300), third.recv()).await;
        assert!(waited.is_err(), "third client served with both slots taken");

        drop(first);
        assert!(matches!(third.recv().await.unwrap(), Response::Pong { .. }));
        // The remaining connection is still served.
        assert!(matches!(second.call(&Request::Ping).await.unwrap(), Response::Pong { .. }));

        drop(second);
        drop(third);
        server.stop().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_oversized_request_is_rejected_and_connection_survives() {
    init_tracing();
    with_timeout(async {
        let (_dir, store) = scratch_store();
        let server = RunningServer::start_with_limit(service_for(&store), 2, 256).await.unwrap();
        let mut client = Client::connect(server.addr).await.unwrap();

        let payload = "x".repeat(4096);
        let oversized = format!(r#"{{"op":"log","ticket":"{payload}"}}"#);
        match client.send_raw(&oversized).await.unwrap() {
            Response::Fault { code, message } => {
                assert_eq!(code, FaultCode::Transport);
                assert!(message.contains("256"), "{message}");
            }
            other => panic!("expected transport fault, got {other:?}"),
        }

        // Exactly at the limit is still accepted.
        let at_limit = format!("{:<256}", r#"{"op":"ping"}"#);
        assert_eq!(at_limit.len(), 256);
        assert!(matches!(client.send_raw(&at_limit).await.unwrap(), Response::Pong { .. }));

        assert_eq!(
            client.call(&Request::Ping).await.unwrap(),
            Response::Pong { status: ServiceStatus::Available }
        );

        drop(client);
        server.stop().await.unwrap();
    })
    .await;
}
