use speculate2::speculate;

speculate! {
    use flowtrack_core::models::*;
    use flowtrack_core::workflow::{TransitionRequest, DEFAULT_REASON};
    use flowtrack_core::{Config, Database, EntityKind, StatusEngine, WorkflowError};

    fn setup() -> (Database, StatusEngine) {
        let db = Database::open_memory().expect("Failed to create test database");
        let engine = StatusEngine::new(db.clone(), &Config::default());
        (db, engine)
    }

    fn create_application(db: &Database, name: &str) -> Application {
        db.create_application(CreateApplicationInput {
            name: name.to_string(),
            ..Default::default()
        })
        .expect("Failed to create application")
    }

    fn create_feature(db: &Database, application_id: i64, name: &str) -> Feature {
        db.create_feature(application_id, CreateFeatureInput {
            name: name.to_string(),
            ..Default::default()
        })
        .expect("Failed to create feature")
    }

    fn create_task(db: &Database, feature_id: i64, name: &str) -> Task {
        db.create_task(feature_id, CreateTaskInput {
            name: name.to_string(),
            ..Default::default()
        })
        .expect("Failed to create task")
    }

    describe "task transitions" {
        it "records each change most recent first" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let task = create_task(&db, feature.id, "Add coupon field");

            engine.transition_task(task.id, TransitionRequest::to(TaskStatus::Ready)).unwrap();
            let outcome = engine
                .transition_task(task.id, TransitionRequest::to(TaskStatus::InProgress))
                .unwrap();

            assert_eq!(outcome.previous_status, TaskStatus::Ready);
            assert_eq!(outcome.new_status, TaskStatus::InProgress);
            assert!(!outcome.already_current);

            let stored = db.get_task(task.id).unwrap().unwrap();
            let history = stored.workflow.status_history.entries();
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].status, TaskStatus::InProgress);
            assert_eq!(history[1].status, TaskStatus::Ready);
            assert_eq!(history[0].reason, DEFAULT_REASON);
            assert_eq!(history[0].changed_by, "assistant");
            assert_eq!(stored.workflow.status, history[0].status);
            assert_eq!(stored.workflow.status_updated_at, history[0].changed_at);
        }

        it "keeps history length equal to the number of distinct transitions" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let task = create_task(&db, feature.id, "Validate cart");

            let sequence = [
                TaskStatus::Ready,
                TaskStatus::InProgress,
                TaskStatus::InReview,
                TaskStatus::NeedsRevision,
                TaskStatus::InProgress,
                TaskStatus::Completed,
            ];
            for status in sequence {
                engine.transition_task(task.id, TransitionRequest::to(status)).unwrap();
            }

            let history = engine.task_history(task.id).unwrap();
            assert_eq!(history.len(), sequence.len());
            assert_eq!(history.latest().unwrap().status, TaskStatus::Completed);
            let replayed: Vec<TaskStatus> =
                history.entries().iter().rev().map(|entry| entry.status).collect();
            assert_eq!(replayed, sequence.to_vec());
        }

        it "is idempotent for an identical request" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let task = create_task(&db, feature.id, "Add coupon field");

            let first = engine
                .transition_task(task.id, TransitionRequest::to(TaskStatus::Backlog))
                .unwrap();
            let second = engine
                .transition_task(task.id, TransitionRequest::to(TaskStatus::Backlog))
                .unwrap();

            assert!(first.already_current);
            assert!(second.already_current);
            assert_eq!(engine.task_history(task.id).unwrap().len(), 0);
        }

        it "does not grow history when re-blocking with the same fields" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let blocker = create_task(&db, feature.id, "Design schema");
            let task = create_task(&db, feature.id, "Add coupon field");

            let request = TransitionRequest::<TaskStatus>::blocked(blocker.id, "needs schema");
            let first = engine.transition_task(task.id, request.clone()).unwrap();
            let second = engine.transition_task(task.id, request).unwrap();

            assert!(!first.already_current);
            assert!(second.already_current);
            assert_eq!(second.history_len, 1);

            let stored = db.get_task(task.id).unwrap().unwrap();
            assert_eq!(stored.workflow.blocked_by_id, Some(blocker.id));
            assert_eq!(stored.workflow.blocking_reason.as_deref(), Some("needs schema"));
            assert_eq!(stored.workflow.status_history.latest().unwrap().reason, "needs schema");
        }

        it "clears blocking fields when leaving blocked" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let blocker = create_task(&db, feature.id, "Design schema");
            let task = create_task(&db, feature.id, "Add coupon field");

            engine
                .transition_task(task.id, TransitionRequest::blocked(blocker.id, "needs schema"))
                .unwrap();
            engine
                .transition_task(task.id, TransitionRequest::to(TaskStatus::Ready))
                .unwrap();

            let stored = db.get_task(task.id).unwrap().unwrap();
            assert_eq!(stored.workflow.status, TaskStatus::Ready);
            assert_eq!(stored.workflow.blocked_by_id, None);
            assert_eq!(stored.workflow.blocking_reason, None);
        }

        it "fails with MissingBlockingInfo when blocked without details" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let task = create_task(&db, feature.id, "Add coupon field");

            let err = engine
                .transition_task(task.id, TransitionRequest::to(TaskStatus::Blocked))
                .unwrap_err();
            assert!(matches!(err, WorkflowError::MissingBlockingInfo { kind: EntityKind::Task }));
            assert!(err.is_validation());

            let stored = db.get_task(task.id).unwrap().unwrap();
            assert_eq!(stored.workflow.status, TaskStatus::Backlog);
            assert!(stored.workflow.status_history.is_empty());
        }

        it "fails with SelfBlockingNotAllowed when blocking itself" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let task = create_task(&db, feature.id, "Add coupon field");

            let err = engine
                .transition_task(task.id, TransitionRequest::blocked(task.id, "x"))
                .unwrap_err();
            assert!(matches!(err, WorkflowError::SelfBlockingNotAllowed { .. }));
        }

        it "fails with BlockingEntityNotFound for an unknown blocker" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let task = create_task(&db, feature.id, "Add coupon field");

            let err = engine
                .transition_task(task.id, TransitionRequest::blocked(9_999, "ghost"))
                .unwrap_err();
            assert!(matches!(err, WorkflowError::BlockingEntityNotFound { id: 9_999, .. }));
        }

        it "does not accept a feature as the blocker of a task" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let other = create_feature(&db, app.id, "Payments");
            let task = create_task(&db, feature.id, "Add coupon field");
            assert_ne!(other.id, task.id);

            let err = engine
                .transition_task(task.id, TransitionRequest::blocked(other.id, "x"))
                .unwrap_err();
            assert!(matches!(err, WorkflowError::BlockingEntityNotFound { kind: EntityKind::Task, .. }));
        }

        it "accepts mutual blocking between two tasks" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let a = create_task(&db, feature.id, "A");
            let b = create_task(&db, feature.id, "B");

            engine.transition_task(a.id, TransitionRequest::blocked(b.id, "waits on B")).unwrap();
            engine.transition_task(b.id, TransitionRequest::blocked(a.id, "waits on A")).unwrap();

            assert_eq!(db.get_task(a.id).unwrap().unwrap().workflow.blocked_by_id, Some(b.id));
            assert_eq!(db.get_task(b.id).unwrap().unwrap().workflow.blocked_by_id, Some(a.id));
        }

        it "reports when the feature has no unfinished tasks left" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let first = create_task(&db, feature.id, "First");
            let second = create_task(&db, feature.id, "Second");

            let outcome = engine
                .transition_task(first.id, TransitionRequest::to(TaskStatus::Completed))
                .unwrap();
            assert!(!outcome.feature_ready_for_completion);
            assert_eq!(outcome.task_counts.as_ref().unwrap().remaining(), 1);

            let outcome = engine
                .transition_task(second.id, TransitionRequest::to(TaskStatus::Completed))
                .unwrap();
            assert!(outcome.feature_ready_for_completion);
            assert_eq!(outcome.task_counts.unwrap().count(TaskStatus::Completed), 2);

            // The engine never moves the feature itself.
            let stored = db.get_feature(feature.id).unwrap().unwrap();
            assert_eq!(stored.workflow.status, FeatureStatus::Planned);
        }

        it "fails for an unknown task" {
            let (_db, engine) = setup();
            let err = engine
                .transition_task(404, TransitionRequest::to(TaskStatus::Ready))
                .unwrap_err();
            assert!(matches!(err, WorkflowError::EntityNotFound { kind: EntityKind::Task, .. }));
        }
    }

    describe "feature transitions" {
        it "reports child task counts when closed without touching the tasks" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let done = create_task(&db, feature.id, "Done");
            create_task(&db, feature.id, "Open");
            engine.transition_task(done.id, TransitionRequest::to(TaskStatus::Completed)).unwrap();

            let outcome = engine
                .transition_feature(feature.id, TransitionRequest::to(FeatureStatus::WontDo))
                .unwrap();

            let counts = outcome.task_counts.expect("closing a feature reports its tasks");
            assert_eq!(counts.total, 2);
            assert_eq!(counts.count(TaskStatus::Completed), 1);
            assert_eq!(counts.count(TaskStatus::Backlog), 1);

            let tasks = db.list_tasks(feature.id).unwrap();
            assert!(tasks.iter().any(|t| t.workflow.status == TaskStatus::Backlog));
        }

        it "omits task counts for non-closing statuses" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");

            let outcome = engine
                .transition_feature(feature.id, TransitionRequest::to(FeatureStatus::InProgress))
                .unwrap();
            assert!(outcome.task_counts.is_none());
        }

        it "blocks on another feature" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let payments = create_feature(&db, app.id, "Payments");
            let checkout = create_feature(&db, app.id, "Checkout");

            let outcome = engine
                .transition_feature(
                    checkout.id,
                    TransitionRequest::blocked(payments.id, "needs the payment API").by("planner"),
                )
                .unwrap();
            assert_eq!(outcome.new_status, FeatureStatus::Blocked);

            let history = engine.feature_history(checkout.id).unwrap();
            assert_eq!(history.latest().unwrap().changed_by, "planner");
            assert_eq!(history.latest().unwrap().reason, "needs the payment API");
        }

        it "rejects a feature blocking itself" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");

            let err = engine
                .transition_feature(feature.id, TransitionRequest::blocked(feature.id, "loop"))
                .unwrap_err();
            assert!(matches!(err, WorkflowError::SelfBlockingNotAllowed { kind: EntityKind::Feature, .. }));
        }
    }

    describe "transition_status by name" {
        it "parses the status for the entity kind" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");

            let summary = engine
                .transition_status(EntityKind::Feature, feature.id, "backlog", None, None, None)
                .unwrap();
            assert_eq!(summary.previous_status, "planned");
            assert_eq!(summary.new_status, "backlog");
            assert!(!summary.already_current);
        }

        it "rejects statuses from the other kind" {
            let (db, engine) = setup();
            let app = create_application(&db, "Shop");
            let feature = create_feature(&db, app.id, "Checkout");
            let task = create_task(&db, feature.id, "Add coupon field");

            let err = engine
                .transition_status(EntityKind::Task, task.id, "planned", None, None, None)
                .unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidStatus { kind: EntityKind::Task, .. }));
        }
    }
}
