//! Hand-out reservation strategies.
//!
//! The scheduler asks the configured strategy to filter each candidate window
//! and tells it about every task it hands out and every answer recorded through
//! the scheduler. [`NoLease`] reserves nothing,
//! so concurrent requesters may receive the same task. [`ExpiringLease`] keeps
//! a short in-process reservation per task.

use crate::types::{Requester, Task};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Decides which candidates may be handed out and records hand-outs.
pub trait TaskLeaseStrategy: Send + Sync {
    /// Filter a candidate window, keeping its order.
    fn admit(&self, requester: &Requester, candidates: Vec<Task>) -> Vec<Task>;

    /// Called once for every task returned to a requester.
    fn on_handout(&self, _requester: &Requester, _task: &Task) {}

    /// Called after `requester` answered `task_id`.
    fn release(&self, _requester: &Requester, _task_id: i64) {}

    fn name(&self) -> &'static str;
}

/// Admits every candidate and records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLease;

impl TaskLeaseStrategy for NoLease {
    fn admit(&self, _requester: &Requester, candidates: Vec<Task>) -> Vec<Task> {
        candidates
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[derive(Debug, Clone)]
struct Lease {
    holder: Requester,
    expires_at: Instant,
}

/// Reserves a handed-out task for its requester until `ttl` elapses.
///
/// Reservations live in this process only; separate server processes sharing
/// one database do not see each other's leases.
#[derive(Debug)]
pub struct ExpiringLease {
    ttl: Duration,
    leases: Mutex<HashMap<i64, Lease>>,
}

impl ExpiringLease {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Number of unexpired reservations.
    pub fn active(&self) -> usize {
        let now = Instant::now();
        let leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases.values().filter(|l| l.expires_at > now).count()
    }
}

impl TaskLeaseStrategy for ExpiringLease {
    fn admit(&self, requester: &Requester, candidates: Vec<Task>) -> Vec<Task> {
        let now = Instant::now();
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases.retain(|_, lease| lease.expires_at > now);

        candidates
            .into_iter()
            .filter(|task| match leases.get(&task.id) {
                Some(lease) => &lease.holder == requester,
                None => true,
            })
            .collect()
    }

    fn on_handout(&self, requester: &Requester, task: &Task) {
        let now = Instant::now();
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases.retain(|_, lease| lease.expires_at > now);
        leases.insert(
            task.id,
            Lease {
                holder: requester.clone(),
                expires_at: now + self.ttl,
            },
        );
    }

    fn release(&self, requester: &Requester, task_id: i64) {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        if leases.get(&task_id).is_some_and(|lease| &lease.holder == requester) {
            leases.remove(&task_id);
        }
    }

    fn name(&self) -> &'static str {
        "expiring"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskState;
    use serde_json::json;

    fn task(id: i64) -> Task {
        Task {
            id,
            project_id: 1,
            state: TaskState::Ongoing,
            n_answers: 3,
            priority_0: 0.0,
            info: json!({}),
            created_at: 0,
        }
    }

    #[test]
    fn no_lease_admits_everything() {
        let admitted = NoLease.admit(&Requester::User(1), vec![task(1), task(2)]);
        assert_eq!(admitted.len(), 2);
    }

    #[test]
    fn leased_task_hidden_from_other_requesters_only() {
        let lease = ExpiringLease::new(Duration::from_secs(60));
        let alice = Requester::User(1);
        let bob = Requester::Anonymous("10.0.0.2".into());
        lease.on_handout(&alice, &task(1));

        let for_bob: Vec<i64> = lease.admit(&bob, vec![task(1), task(2)]).iter().map(|t| t.id).collect();
        assert_eq!(for_bob, vec![2]);

        let for_alice = lease.admit(&alice, vec![task(1), task(2)]);
        assert_eq!(for_alice.len(), 2);
        assert_eq!(lease.active(), 1);
    }

    #[test]
    fn expired_leases_are_dropped() {
        let lease = ExpiringLease::new(Duration::ZERO);
        lease.on_handout(&Requester::User(1), &task(1));
        let admitted = lease.admit(&Requester::User(2), vec![task(1)]);
        assert_eq!(admitted.len(), 1);
        assert_eq!(lease.active(), 0);
    }

    #[test]
    fn release_by_holder_frees_the_task() {
        let lease = ExpiringLease::new(Duration::from_secs(60));
        let alice = Requester::User(1);
        let bob = Requester::User(2);
        lease.on_handout(&alice, &task(1));

        lease.release(&bob, 1);
        assert_eq!(lease.active(), 1);

        lease.release(&alice, 1);
        assert_eq!(lease.active(), 0);
        assert_eq!(lease.admit(&bob, vec![task(1)]).len(), 1);
    }

    #[test]
    fn handout_prunes_expired_leases() {
        let lease = ExpiringLease::new(Duration::ZERO);
        lease.on_handout(&Requester::User(1), &task(1));
        lease.on_handout(&Requester::User(1), &task(2));
        let leases = lease.leases.lock().unwrap();
        assert_eq!(leases.len(), 1);
        assert!(leases.contains_key(&2));
    }
}
