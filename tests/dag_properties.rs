mod common;

use std::collections::BTreeSet;

use common::*;
use omws::dag::{ExperimentGraph, ExperimentPlan};
use omws::store::progress;
use omws::types::JobType;
use proptest::prelude::*;

// Acyclic by construction: job i may only depend on jobs 0..i.
fn plan_strategy(max_jobs: usize) -> impl Strategy<Value = PlanBuilder> {
    (1..=max_jobs).prop_flat_map(|num_jobs| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_jobs),
            num_jobs,
        )
        .prop_map(move |raw_deps| {
            let mut builder = PlanBuilder::new();
            for i in 0..num_jobs {
                builder = builder.job(&format!("j{i}"), JobType::Sampling);
            }
            for (i, potential) in raw_deps.into_iter().enumerate() {
                if i == 0 {
                    continue;
                }
                let deps: BTreeSet<usize> = potential.into_iter().map(|d| d % i).collect();
                for d in deps {
                    builder = builder.depends(&format!("j{i}"), &format!("j{d}"), "presence");
                }
            }
            builder
        })
    })
}

fn position(order: &[String], id: &str) -> usize {
    order.iter().position(|o| o == id).expect("job in order")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_topological_order_respects_dependencies(plan in plan_strategy(8)) {
        let plan: ExperimentPlan = plan.build();
        let graph = ExperimentGraph::build(&plan).unwrap();
        let order = graph.topological_order();

        prop_assert_eq!(order.len(), plan.jobs.len());
        for job in &plan.jobs {
            for dep in job.depends_on.keys() {
                prop_assert!(position(order, dep) < position(order, &job.id));
                prop_assert!(graph.dependents_of(dep).contains(&job.id));
            }
        }
    }

    #[test]
    fn prop_every_member_reaches_a_terminal_state(
        plan in plan_strategy(7),
        failing in proptest::option::of(0..7usize),
    ) {
        let (_dir, store) = scratch_store();
        let num_jobs = plan.len();
        let sub = submit_plan(&store, plan);

        let failing = failing.filter(|f| *f < num_jobs).map(|f| member(&sub, &format!("j{f}")));
        let mut exec = FakeExecutor::new(store.clone());
        if let Some(t) = &failing {
            exec = exec.with_outcome(t, Outcome::Failed(progress::ABORTED));
        }
        exec.run_until_idle().unwrap();

        prop_assert!(exec.runnable().is_empty());
        prop_assert!(store.is_done(&sub.ticket));
        for t in sub.jobs.values() {
            prop_assert!(store.is_done(t), "member {} never finished", t);
            let code = store.read_progress(t).unwrap();
            match &failing {
                None => prop_assert_eq!(code, progress::COMPLETE),
                Some(f) if f == t => prop_assert_eq!(code, progress::ABORTED),
                Some(_) => prop_assert!(code == progress::COMPLETE || code == progress::CANCELLED),
            }
        }

        let expected = if failing.is_some() { progress::CANCELLED } else { progress::COMPLETE };
        prop_assert_eq!(store.read_progress(&sub.ticket).unwrap(), expected);
    }
}
