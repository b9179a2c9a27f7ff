use chrono::Utc;
use shellyfleet_domain::{ProvisioningTask, TaskState};

use crate::error::ProvisioningError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Events that drive a [`ProvisioningTask`] through its state machine.
/// Kept separate from `TaskState` so the orchestrator can distinguish
/// "why" from "what" without overloading the state enum.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Assign { agent_id: uuid::Uuid },
    Start,
    Complete,
    Fail { error: String },
    Retry,
    Cancel,
}

fn invalid(task: &ProvisioningTask, to: &str) -> ProvisioningError {
    ProvisioningError::InvalidTransition {
        from: format!("{:?}", task.state),
        to: to.into(),
    }
}

/// Pure transition function: an explicit state enum driven by events,
/// rather than a handful of status booleans toggled ad hoc.
pub fn apply(mut task: ProvisioningTask, event: TaskEvent) -> Result<ProvisioningTask, ProvisioningError> {
    let now = Utc::now();
    match (task.state, event) {
        (TaskState::Pending, TaskEvent::Assign { agent_id }) => {
            task.assigned_agent = Some(agent_id);
            task.state = TaskState::Assigned;
        }
        (TaskState::Assigned, TaskEvent::Start) => {
            task.state = TaskState::Running;
        }
        (TaskState::Running, TaskEvent::Complete) => {
            task.state = TaskState::Completed;
            task.last_error = None;
        }
        (TaskState::Running, TaskEvent::Fail { error }) => {
            task.state = TaskState::Failed;
            task.attempts += 1;
            task.last_error = Some(error);
        }
        (TaskState::Failed, TaskEvent::Retry) => {
            if task.attempts >= DEFAULT_MAX_ATTEMPTS {
                return Err(invalid(&task, "assigned (retries exhausted)"));
            }
            task.state = TaskState::Assigned;
        }
        (TaskState::Pending, TaskEvent::Cancel) => {
            task.state = TaskState::Cancelled;
        }
        (_, event) => return Err(invalid(&task, &format!("{event:?}"))),
    }
    task.updated_at = now;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn task() -> ProvisioningTask {
        let now = Utc::now();
        ProvisioningTask {
            id: Uuid::new_v4(),
            target_ap_ssid: "shelly-ap".into(),
            desired_ssid: "home".into(),
            desired_name: "kitchen".into(),
            assigned_agent: None,
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            correlation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn happy_path_pending_to_completed() {
        let agent = Uuid::new_v4();
        let t = apply(task(), TaskEvent::Assign { agent_id: agent }).unwrap();
        assert_eq!(t.state, TaskState::Assigned);
        let t = apply(t, TaskEvent::Start).unwrap();
        assert_eq!(t.state, TaskState::Running);
        let t = apply(t, TaskEvent::Complete).unwrap();
        assert_eq!(t.state, TaskState::Completed);
    }

    #[test]
    fn failed_task_retries_until_cap() {
        let agent = Uuid::new_v4();
        let mut t = apply(task(), TaskEvent::Assign { agent_id: agent }).unwrap();
        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            t = apply(t, TaskEvent::Start).unwrap();
            t = apply(t, TaskEvent::Fail { error: "boom".into() }).unwrap();
            assert_eq!(t.state, TaskState::Failed);
            if t.attempts < DEFAULT_MAX_ATTEMPTS {
                t = apply(t, TaskEvent::Retry).unwrap();
                assert_eq!(t.state, TaskState::Assigned);
            }
        }
        let err = apply(t, TaskEvent::Retry).unwrap_err();
        assert!(matches!(err, ProvisioningError::InvalidTransition { .. }));
    }

    #[test]
    fn running_task_cannot_be_cancelled() {
        let agent = Uuid::new_v4();
        let t = apply(task(), TaskEvent::Assign { agent_id: agent }).unwrap();
        let t = apply(t, TaskEvent::Start).unwrap();
        let err = apply(t, TaskEvent::Cancel).unwrap_err();
        assert!(matches!(err, ProvisioningError::InvalidTransition { .. }));
    }

    #[test]
    fn pending_task_cancels_cleanly() {
        let t = apply(task(), TaskEvent::Cancel).unwrap();
        assert_eq!(t.state, TaskState::Cancelled);
    }
}
