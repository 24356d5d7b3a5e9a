use chrono::{DateTime, Duration, Utc};

use crate::models::Session;

/// True once `interval` has passed since the later of the last checkpoint
/// and the session start. Advisory only; nothing is rejected on it.
pub fn checkpoint_needed(session: &Session, now: DateTime<Utc>, interval: Duration) -> bool {
    now - session.cadence_anchor() >= interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionStatus, SessionTaskType};

    fn session(start: DateTime<Utc>, last_checkpoint: Option<DateTime<Utc>>) -> Session {
        Session {
            id: "s-1".into(),
            task_id: None,
            feature_id: None,
            application_id: None,
            task_type: SessionTaskType::CodeEditing,
            context_description: None,
            status: SessionStatus::Active,
            start_time: start,
            end_time: None,
            summary: None,
            last_checkpoint_at: last_checkpoint,
            last_file_change_at: None,
            last_decision_at: None,
            compliance_score: 100,
        }
    }

    #[test]
    fn measures_from_start_without_checkpoints() {
        let start = Utc::now();
        let s = session(start, None);
        let interval = Duration::minutes(3);

        assert!(!checkpoint_needed(&s, start + Duration::seconds(179), interval));
        assert!(checkpoint_needed(&s, start + Duration::minutes(3), interval));
    }

    #[test]
    fn measures_from_latest_checkpoint() {
        let start = Utc::now();
        let s = session(start, Some(start + Duration::minutes(5)));
        let interval = Duration::minutes(3);

        assert!(!checkpoint_needed(&s, start + Duration::minutes(7), interval));
        assert!(checkpoint_needed(&s, start + Duration::minutes(8), interval));
    }
}
