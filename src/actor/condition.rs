//! Externally signalled triggers bound to one actor.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::types::ConditionId;

pub(crate) trait ConditionTarget: Send + Sync {
    fn signal_condition(&self, condition: ConditionId);
}

/// Handle returned by `ActorControl::on_condition`.
///
/// [`signal`](Self::signal) may be called from any thread. Signals that arrive
/// while a run of the trigger is already queued are folded into that run;
/// signals after the actor's close request are dropped.
#[derive(Clone)]
pub struct ActorCondition {
    id: ConditionId,
    name: Arc<str>,
    target: Weak<dyn ConditionTarget>,
}

impl fmt::Debug for ActorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCondition")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl ActorCondition {
    pub(crate) fn new(id: ConditionId, name: Arc<str>, target: Weak<dyn ConditionTarget>) -> Self {
        Self { id, name, target }
    }

    pub fn id(&self) -> ConditionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule the trigger on its actor.
    pub fn signal(&self) {
        if let Some(target) = self.target.upgrade() {
            target.signal_condition(self.id);
        }
    }
}
