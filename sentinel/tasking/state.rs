use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::TaskingError,
    model::{SensorTaskingView, TaskingPlan},
    publisher::TaskingStore,
};

/// Last-known tasking plan, owned explicitly and shared with readers.
///
/// Readers get an immutable snapshot; publishing swaps the whole plan (last write wins).
#[derive(Debug)]
pub struct TaskingState {
    current: RwLock<Arc<TaskingPlan>>,
}

impl TaskingState {
    /// State holding the empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(TaskingPlan::empty())),
        }
    }

    /// Current plan snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<TaskingPlan> {
        Arc::clone(&self.current.read())
    }

    /// Installs `plan`, returning the one it replaced.
    pub fn replace(&self, plan: TaskingPlan) -> Arc<TaskingPlan> {
        let mut current = self.current.write();
        std::mem::replace(&mut *current, Arc::new(plan))
    }

    /// Tasking for one sensor; sensors absent from the plan get the default rate.
    #[must_use]
    pub fn sensor_tasking(&self, sensor_id: &str) -> SensorTaskingView {
        let plan = self.current();
        SensorTaskingView {
            sensor_id: sensor_id.to_string(),
            tasking: plan.sensors.get(sensor_id).copied().unwrap_or_default(),
            generated_at: plan.generated_at,
        }
    }
}

impl Default for TaskingState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskingStore for TaskingState {
    async fn publish(&self, plan: &TaskingPlan) -> Result<(), TaskingError> {
        self.replace(plan.clone());
        Ok(())
    }
}
