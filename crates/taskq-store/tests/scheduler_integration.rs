//! End-to-end tests wiring [`taskq_core::scheduler::Scheduler`] to the real [`SqliteStore`].
//!
//! Unit tests in `taskq-core` exercise the matching algebra and priority math in isolation;
//! these exercise the seams between them — the concrete scenarios from the design's testable
//! properties section, and the concurrency guarantees that only show up once a real backing
//! store enforces atomicity.

use std::collections::HashSet;
use std::sync::Arc;

use taskq_core::ids::JobId;
use taskq_core::matcher::ResourceDescription;
use taskq_core::platform::PlatformOrderConfig;
use taskq_core::requirements::Requirements;
use taskq_core::scheduler::{MatchOutcome, Scheduler};
use taskq_core::{Error, SchedulerConfig};
use taskq_store::SqliteStore;

/// `max_connections = 1` here is load-bearing, not a default: a bare `sqlite::memory:` pool with
/// more than one connection gives every pooled connection its own private, schema-less database,
/// so a second or third connection opened under concurrent load sees "no such table". Pinning the
/// pool to a single connection is what makes every call — including the concurrent matchers in
/// `concurrent_matchers_split_jobs_with_no_duplicates` — actually share one database.
async fn scheduler() -> Scheduler<SqliteStore> {
    let store = SqliteStore::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory store");
    Scheduler::new(Arc::new(store), SchedulerConfig::default()).expect("scheduler")
}

fn reqs(owner_group: &str) -> Requirements {
    Requirements {
        owner_dn: Some("/my/DN".to_string()),
        owner_group: owner_group.to_string(),
        setup: "aSetup".to_string(),
        cpu_time: 50_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn identical_requirements_share_one_task_queue_with_bucketed_cpu_time() {
    let scheduler = scheduler().await;
    let r = reqs("myGroup");

    scheduler
        .insert_job(JobId::new(1), &r, 1.0, None)
        .await
        .expect("insert 1");
    scheduler
        .insert_job(JobId::new(2), &r, 1.0, None)
        .await
        .expect("insert 2");

    assert_eq!(scheduler.get_num_task_queues(None).await.expect("count"), 1);

    let tqs = scheduler
        .retrieve_task_queues(None)
        .await
        .expect("retrieve");
    assert_eq!(tqs.len(), 1);
    let descriptor = tqs.values().next().expect("one tq");
    assert_eq!(descriptor.jobs, 2);
    assert_eq!(descriptor.cpu_time, 86_400);
}

#[tokio::test]
async fn platform_family_scenario_matches_only_the_compatible_queue() {
    let mut config = SchedulerConfig::default();
    config.platform_order = PlatformOrderConfig {
        edges: vec![
            ("centos7".to_string(), "slc6".to_string()),
            ("slc6".to_string(), "slc5".to_string()),
            ("ubuntu".to_string(), "debian".to_string()),
        ],
    };
    let store = SqliteStore::connect("sqlite::memory:", 1)
        .await
        .expect("store");
    let scheduler = Scheduler::new(Arc::new(store), config).expect("scheduler");

    let platform_sets: [&[&str]; 5] = [
        &["centos7"],
        &["centos7"],
        &["ubuntu"],
        &["centos7", "slc6"],
        &["debian", "ubuntu"],
    ];
    for (i, platforms) in platform_sets.iter().enumerate() {
        let mut r = reqs("myGroup");
        r.platforms = platforms.iter().map(|s| s.to_string()).collect();
        scheduler
            .insert_job(JobId::new(i as i64 + 1), &r, 1.0, None)
            .await
            .expect("insert");
    }

    let slc6_request = ResourceDescription {
        platform: vec!["slc6".to_string()],
        num_queues_to_get: Some(10),
        ..Default::default()
    };
    let candidates = scheduler
        .match_and_get_task_queue(&slc6_request, None)
        .await
        .expect("match");
    assert_eq!(candidates.len(), 1, "only job 4's TQ carries slc6");

    let any_platform_request = ResourceDescription {
        platform: vec![String::new()],
        num_queues_to_get: Some(10),
        ..Default::default()
    };
    let all_candidates = scheduler
        .match_and_get_task_queue(&any_platform_request, None)
        .await
        .expect("match");
    assert_eq!(all_candidates.len(), 4, "distinct TQs: centos7, ubuntu, centos7+slc6, debian+ubuntu");

    let slc5_request = ResourceDescription {
        platform: vec!["slc5".to_string()],
        num_queues_to_get: Some(10),
        ..Default::default()
    };
    let no_candidates = scheduler
        .match_and_get_task_queue(&slc5_request, None)
        .await
        .expect("match");
    assert!(no_candidates.is_empty(), "no TQ declares slc5 or an slc5 descendant");
}

#[tokio::test]
async fn absent_and_empty_platform_land_in_the_same_task_queue() {
    let mut config = SchedulerConfig::default();
    config.platform_order = PlatformOrderConfig {
        edges: vec![
            ("centos7".to_string(), "slc6".to_string()),
            ("slc6".to_string(), "slc5".to_string()),
        ],
    };
    let store = SqliteStore::connect("sqlite::memory:", 1)
        .await
        .expect("store");
    let scheduler = Scheduler::new(Arc::new(store), config).expect("scheduler");

    let no_platform = reqs("myGroup");
    let mut empty_string_platform = reqs("myGroup");
    empty_string_platform.platforms = vec![String::new()];

    scheduler
        .insert_job(JobId::new(1), &no_platform, 1.0, None)
        .await
        .expect("insert 1");
    scheduler
        .insert_job(JobId::new(2), &empty_string_platform, 1.0, None)
        .await
        .expect("insert 2");

    assert_eq!(scheduler.get_num_task_queues(None).await.expect("count"), 1);

    let slc5_request = ResourceDescription {
        platform: vec!["slc5".to_string()],
        ..Default::default()
    };
    let candidates = scheduler
        .match_and_get_task_queue(&slc5_request, None)
        .await
        .expect("match");
    assert_eq!(candidates.len(), 1);
}

#[tokio::test]
async fn delete_conflict_then_cleanup_follows_the_spec_scenario() {
    let scheduler = scheduler().await;
    let r = reqs("myGroup");
    scheduler
        .insert_job(JobId::new(123), &r, 1.0, None)
        .await
        .expect("insert");

    let tq_id = scheduler
        .get_task_queue_for_jobs(&[JobId::new(123)], None)
        .await
        .expect("lookup")[&JobId::new(123)];

    let delete_err = scheduler
        .delete_task_queue(tq_id, None)
        .await
        .expect_err("non-empty TQ delete must conflict");
    assert!(matches!(delete_err, Error::Conflict(_)));

    scheduler
        .delete_job(JobId::new(123), None)
        .await
        .expect("delete job");

    assert!(
        scheduler
            .delete_task_queue_if_empty(tq_id, None)
            .await
            .expect("delete if empty")
    );
    assert_eq!(scheduler.get_num_task_queues(None).await.expect("count"), 0);
}

#[tokio::test]
async fn match_and_get_job_never_returns_the_same_job_twice() {
    let scheduler = scheduler().await;
    let r = reqs("myGroup");
    scheduler
        .insert_job(JobId::new(1), &r, 1.0, None)
        .await
        .expect("insert");

    let first = scheduler
        .match_and_get_job(&ResourceDescription::default(), None)
        .await
        .expect("match");
    let MatchOutcome::Matched { job_id, .. } = first else {
        panic!("expected a match");
    };
    assert_eq!(job_id, JobId::new(1));

    let second = scheduler
        .match_and_get_job(&ResourceDescription::default(), None)
        .await
        .expect("match");
    assert_eq!(second, MatchOutcome::NoMatch);
}

#[tokio::test]
async fn concurrent_matchers_split_jobs_with_no_duplicates() {
    const JOBS: i64 = 25;
    const MATCHERS: usize = 40;

    let scheduler = Arc::new(scheduler().await);
    let r = reqs("myGroup");
    for i in 1..=JOBS {
        scheduler
            .insert_job(JobId::new(i), &r, 1.0, None)
            .await
            .expect("insert");
    }

    let attempts = futures::future::join_all((0..MATCHERS).map(|_| {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler
                .match_and_get_job(&ResourceDescription::default(), None)
                .await
                .expect("match")
        })
    }))
    .await;

    let mut dispatched = Vec::new();
    for attempt in attempts {
        if let MatchOutcome::Matched { job_id, .. } = attempt.expect("task panicked") {
            dispatched.push(job_id);
        }
    }

    assert_eq!(dispatched.len() as i64, JOBS.min(MATCHERS as i64));
    let unique: HashSet<JobId> = dispatched.iter().copied().collect();
    assert_eq!(unique.len(), dispatched.len(), "no job dispatched twice");
}

#[tokio::test]
async fn first_insert_into_a_fresh_group_gets_a_nonzero_share_without_explicit_recalc() {
    let scheduler = scheduler().await;
    scheduler
        .insert_job(JobId::new(1), &reqs("freshGroup"), 1.0, None)
        .await
        .expect("insert");

    let tqs = scheduler
        .retrieve_task_queues(None)
        .await
        .expect("retrieve");
    let descriptor = tqs.values().next().expect("one tq");
    assert!((descriptor.share - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn owner_group_restriction_excludes_and_includes_per_spec_scenario_five() {
    let mut config = SchedulerConfig::default();
    config.platform_order = PlatformOrderConfig {
        edges: vec![("centos7".to_string(), "slc6".to_string())],
    };
    let store = SqliteStore::connect("sqlite::memory:", 1)
        .await
        .expect("store");
    let scheduler = Scheduler::new(Arc::new(store), config).expect("scheduler");

    let mut r = reqs("admin");
    r.sites = vec!["Site_1".to_string(), "Site_2".to_string()];
    r.platforms = vec!["centos7".to_string()];
    scheduler
        .insert_job(JobId::new(1), &r, 1.0, None)
        .await
        .expect("insert");

    let without_admin = ResourceDescription {
        platform: vec!["slc6".to_string(), "centos7".to_string()],
        owner_group: vec!["prod".to_string(), "user".to_string()],
        site: vec!["Site_1".to_string()],
        ..Default::default()
    };
    let candidates = scheduler
        .match_and_get_task_queue(&without_admin, None)
        .await
        .expect("match");
    assert!(candidates.is_empty());

    let with_admin = ResourceDescription {
        owner_group: vec!["prod".to_string(), "admin".to_string()],
        ..without_admin
    };
    let candidates = scheduler
        .match_and_get_task_queue(&with_admin, None)
        .await
        .expect("match");
    assert_eq!(candidates.len(), 1);
}
