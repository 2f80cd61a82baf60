use crate::{compile, CompileError, CompileOptions, Event, EventCategory, EventSink, Plan};
use rowset::Schema;
use shape::{Shape, ShapeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// PlanCache holds one compiled plan per `(shape id, schema fingerprint)`
/// for the life of the process. Lookups take the read lock only; a miss
/// compiles outside any lock and racing compilations keep the first
/// inserted plan. Plans are small and eviction is not needed.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<(ShapeId, u64), Arc<Plan>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        shape: &Shape,
        schema: &Schema,
        options: &CompileOptions,
        events: &dyn EventSink,
        correlation_id: &str,
    ) -> Result<Arc<Plan>, CompileError> {
        let key = (shape.id.clone(), schema.fingerprint());

        if let Some(plan) = self.plans.read().unwrap().get(&key) {
            events.record(Event::new(EventCategory::PlanCacheHit, correlation_id));
            return Ok(plan.clone());
        }
        events.record(Event::new(EventCategory::PlanCacheMiss, correlation_id));

        let plan = Arc::new(compile(shape, schema, options, events, correlation_id)?);

        let mut plans = self.plans.write().unwrap();
        Ok(plans.entry(key).or_insert(plan).clone())
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
