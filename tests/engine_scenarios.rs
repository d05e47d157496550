//! End-to-end lifecycle scenarios against the in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use lms::engine::error::{EngineError, ValidationError};
use lms::engine::events::{LeaveEvent, LeaveEventType, NotificationSink};
use lms::engine::{LeaveEngine, LeavePolicy, LeaveSpan, SubmitLeave};
use lms::model::holiday::Holiday;
use lms::model::leave_balance::{BalanceKey, LeaveBalance};
use lms::model::leave_request::{HalfDayPeriod, LeaveStatus};
use lms::model::leave_type::LeaveType;
use lms::model::role::Role;
use lms::model::user::User;
use lms::store::memory::MemoryStore;
use lms::store::{AuditRepository, LedgerRepository, LeaveRequestRepository, RequestFilter};

const EMPLOYEE: u64 = 1;
const MANAGER: u64 = 2;
const HR: u64 = 3;
const ANNUAL: u64 = 1;
const YEAR: i32 = 2026;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn key() -> BalanceKey {
    BalanceKey {
        user_id: EMPLOYEE,
        leave_type_id: ANNUAL,
        year: YEAR,
    }
}

/// Records every event the engine emits.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<LeaveEventType>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: LeaveEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.event_type);
        Ok(())
    }
}

/// Always fails, to prove delivery trouble never undoes a transition.
struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _event: LeaveEvent) -> anyhow::Result<()> {
        anyhow::bail!("smtp is down")
    }
}

async fn seed(store: &MemoryStore, allocated: f64) {
    let users = [
        (EMPLOYEE, Role::Employee),
        (MANAGER, Role::Manager),
        (HR, Role::Hr),
    ];
    for (id, role) in users {
        store
            .seed_user(User {
                id,
                username: format!("user{id}"),
                password: String::new(),
                role,
                is_active: true,
            })
            .await;
    }
    store
        .seed_leave_type(LeaveType {
            id: ANNUAL,
            name: "Annual".into(),
            active: true,
        })
        .await;
    store.seed_balance(LeaveBalance::new(key(), allocated)).await;
}

async fn engine_with(allocated: f64) -> (Arc<MemoryStore>, Arc<RecordingSink>, LeaveEngine) {
    let store = Arc::new(MemoryStore::new());
    seed(&store, allocated).await;
    let sink = Arc::new(RecordingSink::default());
    let engine = LeaveEngine::new(
        store.clone(),
        sink.clone(),
        LeavePolicy::default(),
    );
    (store, sink, engine)
}

fn week_span() -> SubmitLeave {
    // Mon 2026-03-02 .. Fri 2026-03-06, five business days
    SubmitLeave {
        user_id: EMPLOYEE,
        leave_type_id: ANNUAL,
        spans: vec![LeaveSpan {
            start_date: d("2026-03-02"),
            end_date: d("2026-03-06"),
            half_day: false,
            half_day_period: None,
        }],
        reason: Some("family trip".into()),
    }
}

async fn balance_of(store: &MemoryStore) -> LeaveBalance {
    store.find_balance(&key()).await.unwrap().unwrap()
}

#[tokio::test]
async fn submit_reserves_five_business_days() {
    // Scenario A
    let (store, _, engine) = engine_with(20.0).await;

    let created = engine.submit(week_span()).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].status, LeaveStatus::Pending);

    let balance = balance_of(&store).await;
    assert_eq!(balance.allocated, 20.0);
    assert_eq!(balance.used, 0.0);
    assert_eq!(balance.pending, 5.0);

    let trail = store.audit_trail(created[0].id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action.to_string(), "LEAVE_REQUEST_CREATED");
    assert_eq!(trail[0].previous_status, None);
    assert_eq!(trail[0].new_status, LeaveStatus::Pending);
}

#[tokio::test]
async fn manager_rejection_releases_the_reservation() {
    // Scenario B
    let (store, _, engine) = engine_with(20.0).await;
    let created = engine.submit(week_span()).await.unwrap();
    let id = created[0].id;

    let updated = engine
        .manager_decide(id, MANAGER, false, Some("short staffed".into()))
        .await
        .unwrap();
    assert_eq!(updated.status, LeaveStatus::ManagerRejected);
    assert_eq!(updated.manager_id, Some(MANAGER));
    assert_eq!(updated.manager_comment.as_deref(), Some("short staffed"));
    assert!(updated.manager_action_at.is_some());

    let balance = balance_of(&store).await;
    assert_eq!((balance.used, balance.pending), (0.0, 0.0));

    let trail = store.audit_trail(id).await.unwrap();
    let actions: Vec<String> = trail.iter().map(|a| a.action.to_string()).collect();
    assert_eq!(actions, ["LEAVE_REQUEST_CREATED", "MANAGER_REJECTION"]);
    assert_eq!(trail.last().unwrap().new_status, updated.status);
}

#[tokio::test]
async fn half_day_reserves_half_a_unit() {
    // Scenario C
    let (store, _, engine) = engine_with(20.0).await;

    let submit = SubmitLeave {
        user_id: EMPLOYEE,
        leave_type_id: ANNUAL,
        spans: vec![LeaveSpan {
            start_date: d("2026-03-04"),
            end_date: d("2026-03-04"),
            half_day: true,
            half_day_period: Some(HalfDayPeriod::FirstHalf),
        }],
        reason: None,
    };
    engine.submit(submit).await.unwrap();

    assert_eq!(balance_of(&store).await.pending, 0.5);
}

#[tokio::test]
async fn oversized_request_is_rejected_without_side_effects() {
    // Scenario D
    let (store, _, engine) = engine_with(5.0).await;

    let submit = SubmitLeave {
        user_id: EMPLOYEE,
        leave_type_id: ANNUAL,
        spans: vec![LeaveSpan {
            // Mon 2026-03-02 .. Fri 2026-03-13, ten business days
            start_date: d("2026-03-02"),
            end_date: d("2026-03-13"),
            half_day: false,
            half_day_period: None,
        }],
        reason: None,
    };

    match engine.submit(submit).await {
        Err(EngineError::InsufficientBalance {
            requested,
            available,
        }) => {
            assert_eq!(requested, 10.0);
            assert_eq!(available, 5.0);
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }

    let balance = balance_of(&store).await;
    assert_eq!((balance.used, balance.pending), (0.0, 0.0));
    assert_eq!(
        store.count_requests(&RequestFilter::default()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn full_approval_path_consumes_exactly_once() {
    // Scenario E + round-trip property
    let (store, _, engine) = engine_with(20.0).await;
    let id = engine.submit(week_span()).await.unwrap()[0].id;

    engine
        .manager_decide(id, MANAGER, true, Some("ok".into()))
        .await
        .unwrap();
    let balance = balance_of(&store).await;
    // Manager approval keeps the reservation in place.
    assert_eq!((balance.used, balance.pending), (0.0, 5.0));

    let updated = engine.hr_decide(id, HR, true, None).await.unwrap();
    assert_eq!(updated.status, LeaveStatus::HrApproved);
    assert_eq!(updated.hr_id, Some(HR));

    let balance = balance_of(&store).await;
    assert_eq!(balance.allocated, 20.0);
    assert_eq!((balance.used, balance.pending), (5.0, 0.0));

    // A second HR approval must not double-consume.
    match engine.hr_decide(id, HR, true, None).await {
        Err(EngineError::InvalidTransition { status, .. }) => {
            assert_eq!(status, LeaveStatus::HrApproved);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    let balance = balance_of(&store).await;
    assert_eq!((balance.used, balance.pending), (5.0, 0.0));
}

#[tokio::test]
async fn terminal_states_reject_all_decisions_without_ledger_motion() {
    let (store, _, engine) = engine_with(20.0).await;
    let id = engine.submit(week_span()).await.unwrap()[0].id;
    engine.cancel(id, EMPLOYEE).await.unwrap();

    let before = balance_of(&store).await;
    for approve in [true, false] {
        assert!(matches!(
            engine.manager_decide(id, MANAGER, approve, None).await,
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.hr_decide(id, HR, approve, None).await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }
    let after = balance_of(&store).await;
    assert_eq!((before.used, before.pending), (after.used, after.pending));
    assert_eq!(before.version, after.version);
}

#[tokio::test]
async fn cancel_after_manager_approval_releases_reservation() {
    let (store, _, engine) = engine_with(20.0).await;
    let id = engine.submit(week_span()).await.unwrap()[0].id;
    engine.manager_decide(id, MANAGER, true, None).await.unwrap();

    let updated = engine.cancel(id, EMPLOYEE).await.unwrap();
    assert_eq!(updated.status, LeaveStatus::Cancelled);

    let balance = balance_of(&store).await;
    assert_eq!((balance.used, balance.pending), (0.0, 0.0));
}

#[tokio::test]
async fn only_the_requester_may_cancel() {
    let (_, _, engine) = engine_with(20.0).await;
    let id = engine.submit(week_span()).await.unwrap()[0].id;

    assert!(matches!(
        engine.cancel(id, MANAGER).await,
        Err(EngineError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn role_gates_are_enforced() {
    let (_, _, engine) = engine_with(20.0).await;
    let id = engine.submit(week_span()).await.unwrap()[0].id;

    // An employee cannot take the manager stage.
    assert!(matches!(
        engine.manager_decide(id, EMPLOYEE, true, None).await,
        Err(EngineError::Unauthorized { .. })
    ));

    engine.manager_decide(id, MANAGER, true, None).await.unwrap();

    // A manager cannot take the HR stage.
    assert!(matches!(
        engine.hr_decide(id, MANAGER, true, None).await,
        Err(EngineError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let (store, _, engine) = engine_with(2.0).await;

    // Three single-day requests against an allocation of 2.
    let submit = SubmitLeave::from_dates(
        EMPLOYEE,
        ANNUAL,
        vec![d("2026-03-02"), d("2026-03-03"), d("2026-03-04")],
        vec![false, false, false],
        None,
    )
    .unwrap();

    match engine.submit(submit).await {
        Err(EngineError::InsufficientBalance {
            requested,
            available,
        }) => {
            assert_eq!(requested, 3.0);
            assert_eq!(available, 2.0);
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert_eq!(
        store.count_requests(&RequestFilter::default()).await.unwrap(),
        0
    );
    assert_eq!(balance_of(&store).await.pending, 0.0);

    // A batch that fits creates every request under one reservation.
    let submit = SubmitLeave::from_dates(
        EMPLOYEE,
        ANNUAL,
        vec![d("2026-03-02"), d("2026-03-03")],
        vec![false, true],
        None,
    )
    .unwrap();
    let created = engine.submit(submit).await.unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(balance_of(&store).await.pending, 1.5);
}

#[tokio::test]
async fn batch_shape_mismatch_is_rejected_up_front() {
    let err = SubmitLeave::from_dates(
        EMPLOYEE,
        ANNUAL,
        vec![d("2026-03-02"), d("2026-03-03")],
        vec![false],
        None,
    )
    .unwrap_err();
    assert_eq!(err, ValidationError::BatchShapeMismatch { dates: 2, flags: 1 });
}

#[tokio::test]
async fn validation_rejections() {
    let (_, _, engine) = engine_with(20.0).await;

    let mut bad_dates = week_span();
    bad_dates.spans[0].end_date = d("2026-03-01");
    assert!(matches!(
        engine.submit(bad_dates).await,
        Err(EngineError::Validation(ValidationError::StartAfterEnd { .. }))
    ));

    let mut weekend = week_span();
    weekend.spans[0].start_date = d("2026-03-07");
    weekend.spans[0].end_date = d("2026-03-08");
    assert!(matches!(
        engine.submit(weekend).await,
        Err(EngineError::Validation(ValidationError::NoWorkingDays { .. }))
    ));

    let mut half_span = week_span();
    half_span.spans[0].half_day = true;
    assert!(matches!(
        engine.submit(half_span).await,
        Err(EngineError::Validation(ValidationError::HalfDaySpan))
    ));

    let mut mixed = week_span();
    mixed.spans.push(LeaveSpan {
        start_date: d("2027-01-04"),
        end_date: d("2027-01-04"),
        half_day: false,
        half_day_period: None,
    });
    assert!(matches!(
        engine.submit(mixed).await,
        Err(EngineError::Validation(ValidationError::MixedYears))
    ));

    let mut empty = week_span();
    empty.spans.clear();
    assert!(matches!(
        engine.submit(empty).await,
        Err(EngineError::Validation(ValidationError::EmptyBatch))
    ));
}

#[tokio::test]
async fn inactive_leave_type_rejects_new_requests() {
    let (store, _, engine) = engine_with(20.0).await;
    store
        .seed_leave_type(LeaveType {
            id: ANNUAL,
            name: "Annual".into(),
            active: false,
        })
        .await;

    assert!(matches!(
        engine.submit(week_span()).await,
        Err(EngineError::Validation(ValidationError::InactiveLeaveType(
            ANNUAL
        )))
    ));
}

#[tokio::test]
async fn audit_replays_to_the_current_status() {
    let (store, _, engine) = engine_with(20.0).await;
    let id = engine.submit(week_span()).await.unwrap()[0].id;
    engine.manager_decide(id, MANAGER, true, None).await.unwrap();
    let updated = engine.hr_decide(id, HR, false, Some("no cover".into())).await.unwrap();

    let trail = engine.audit_trail(id).await.unwrap();
    let actions: Vec<String> = trail.iter().map(|a| a.action.to_string()).collect();
    assert_eq!(
        actions,
        ["LEAVE_REQUEST_CREATED", "MANAGER_APPROVAL", "HR_REJECTION"]
    );
    // Each row's previous status chains to the one before it.
    assert_eq!(trail[1].previous_status, Some(trail[0].new_status));
    assert_eq!(trail[2].previous_status, Some(trail[1].new_status));
    assert_eq!(trail.last().unwrap().new_status, updated.status);
}

#[tokio::test]
async fn lifecycle_events_fire_per_transition() {
    let (_, sink, engine) = engine_with(20.0).await;
    let id = engine.submit(week_span()).await.unwrap()[0].id;
    engine.manager_decide(id, MANAGER, true, None).await.unwrap();
    engine.hr_decide(id, HR, true, None).await.unwrap();

    let events = sink.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            LeaveEventType::RequestSubmitted,
            LeaveEventType::ManagerApproved,
            LeaveEventType::HrApproved,
        ]
    );
}

#[tokio::test]
async fn notification_failure_never_undoes_a_transition() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, 20.0).await;
    let engine = LeaveEngine::new(store.clone(), Arc::new(FailingSink), LeavePolicy::default());

    let created = engine.submit(week_span()).await.unwrap();
    assert_eq!(created[0].status, LeaveStatus::Pending);
    assert_eq!(balance_of(&store).await.pending, 5.0);
}

#[tokio::test]
async fn untouched_ledger_reports_the_policy_default() {
    let (_, _, engine) = engine_with(20.0).await;

    // Different year: no row exists, nothing is created by reading.
    let view = engine.get_balance(EMPLOYEE, ANNUAL, 2027).await.unwrap();
    assert_eq!(view.allocated, 20.0);
    assert_eq!((view.used, view.pending), (0.0, 0.0));
    assert_eq!(view.available, 20.0);
}

#[tokio::test]
async fn holidays_reduce_units_only_when_policy_says_so() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, 20.0).await;
    store
        .seed_holiday(Holiday {
            id: 1,
            name: "Founders Day".into(),
            date: d("2026-03-04"),
            description: None,
        })
        .await;

    let policy = LeavePolicy {
        exclude_holidays: true,
        ..LeavePolicy::default()
    };
    let engine = LeaveEngine::new(
        store.clone(),
        Arc::new(RecordingSink::default()),
        policy,
    );

    engine.submit(week_span()).await.unwrap();
    assert_eq!(balance_of(&store).await.pending, 4.0);
}

#[tokio::test]
async fn invariant_used_plus_pending_never_exceeds_allocated() {
    let (store, _, engine) = engine_with(3.0).await;

    // Fill the ledger, then keep hammering it with more submissions.
    engine
        .submit(SubmitLeave::from_dates(
            EMPLOYEE,
            ANNUAL,
            vec![d("2026-03-02"), d("2026-03-03"), d("2026-03-04")],
            vec![false, false, false],
            None,
        )
        .unwrap())
        .await
        .unwrap();

    for date in ["2026-03-05", "2026-03-06", "2026-03-09"] {
        let _ = engine
            .submit(SubmitLeave::from_dates(EMPLOYEE, ANNUAL, vec![d(date)], vec![false], None).unwrap())
            .await;
        let balance = balance_of(&store).await;
        assert!(balance.used + balance.pending <= balance.allocated);
    }
}
