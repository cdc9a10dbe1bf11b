use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json_bytes::Value;

use crate::dataloader::DataLoaderRegistry;
use crate::error::FieldError;
use crate::execution::ExecutionResultNode;
use crate::execution::ExecutionStrategyParameters;
use crate::execution::FieldValueInfo;
use crate::instrumentation::ExecutionStrategyInstrumentationContext;
use crate::instrumentation::InstrumentationContext;

/// Dispatches data loaders once per level of the result tree.
///
/// A level is ready when every field of that level has been dispatched and no
/// strategy call can add fields to it anymore. The first event that makes a level
/// ready dispatches the registry, exactly once per level.
#[derive(Clone)]
pub struct FieldLevelTrackingApproach {
    registry: DataLoaderRegistry,
    call_stack: Arc<Mutex<CallStack>>,
}

impl FieldLevelTrackingApproach {
    pub fn new(registry: DataLoaderRegistry) -> Self {
        Self {
            registry,
            call_stack: Arc::new(Mutex::new(CallStack::new())),
        }
    }

    pub(crate) fn begin_execution_strategy(
        &self,
        parameters: &ExecutionStrategyParameters,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        let level = parameters.path.level() + 1;
        // The last strategy call of a level may have no fields to fetch, such as an
        // object whose fragments all apply to other types. It then completes the level.
        let dispatch = {
            let mut call_stack = self.call_stack.lock();
            increment(
                &mut call_stack.expected_fetch_count_per_level,
                level,
                parameters.fields.len(),
            );
            increment(&mut call_stack.happened_strategy_calls_per_level, level, 1);
            call_stack.dispatch_if_needed(level)
        };
        if dispatch {
            self.dispatch(level);
        }
        Box::new(StrategyTracker {
            approach: self.clone(),
            level,
        })
    }

    pub(crate) fn begin_field_fetch(
        &self,
        parameters: &ExecutionStrategyParameters,
    ) -> Box<dyn InstrumentationContext<Value, FieldError>> {
        Box::new(FetchTracker {
            approach: self.clone(),
            level: parameters.path.level(),
        })
    }

    /// Starts tracking the tree below a subscription event completed at `level`.
    pub(crate) fn begin_subscribed_field_event(
        &self,
        level: usize,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        self.clear_and_mark_current_level_as_ready(level);
        Box::new(StrategyTracker {
            approach: self.clone(),
            level,
        })
    }

    /// Forgets every level, and marks `level` as fetched and ready without a dispatch.
    ///
    /// Used when a new tree starts below `level` within the same execution, such as a
    /// subscription event.
    pub fn clear_and_mark_current_level_as_ready(&self, level: usize) {
        self.call_stack
            .lock()
            .clear_and_mark_current_level_as_ready(level);
    }

    /// The levels dispatched so far.
    pub fn dispatched_levels(&self) -> Vec<usize> {
        let mut levels: Vec<_> = self
            .call_stack
            .lock()
            .dispatched_levels
            .iter()
            .copied()
            .collect();
        levels.sort_unstable();
        levels
    }

    fn handle_on_field_values_info(&self, infos: &[FieldValueInfo], level: usize) {
        let dispatch = {
            let mut call_stack = self.call_stack.lock();
            increment(
                &mut call_stack.happened_on_field_value_calls_per_level,
                level,
                1,
            );
            let objects = infos.iter().map(FieldValueInfo::object_count).sum();
            increment(
                &mut call_stack.expected_strategy_calls_per_level,
                level + 1,
                objects,
            );
            call_stack.dispatch_if_needed(level + 1)
        };
        if dispatch {
            self.dispatch(level + 1);
        }
    }

    fn handle_fetch_dispatched(&self, level: usize) {
        let dispatch = {
            let mut call_stack = self.call_stack.lock();
            increment(&mut call_stack.fetch_count_per_level, level, 1);
            call_stack.dispatch_if_needed(level)
        };
        if dispatch {
            self.dispatch(level);
        }
    }

    // Runs outside the call stack lock: loads may complete synchronously.
    fn dispatch(&self, level: usize) {
        tracing::debug!(level, "dispatching data loaders");
        self.registry.dispatch_all();
    }
}

impl fmt::Debug for FieldLevelTrackingApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.call_stack.try_lock() {
            Some(call_stack) => write!(f, "FieldLevelTrackingApproach({call_stack})"),
            None => f.write_str("FieldLevelTrackingApproach(<locked>)"),
        }
    }
}

struct StrategyTracker {
    approach: FieldLevelTrackingApproach,
    level: usize,
}

impl InstrumentationContext<ExecutionResultNode> for StrategyTracker {}

impl ExecutionStrategyInstrumentationContext for StrategyTracker {
    fn on_field_values_info(&self, infos: &[FieldValueInfo]) {
        self.approach.handle_on_field_values_info(infos, self.level);
    }
}

struct FetchTracker {
    approach: FieldLevelTrackingApproach,
    level: usize,
}

impl InstrumentationContext<Value, FieldError> for FetchTracker {
    fn on_dispatched(&self) {
        self.approach.handle_fetch_dispatched(self.level);
    }
}

/// The event stream used by [`FieldLevelTrackingApproach`], for one execution.
///
/// Counters are absent until first incremented, and an absent counter differs from
/// a counter at zero: a level nothing was announced for is never ready.
#[derive(Debug, Default)]
struct CallStack {
    expected_fetch_count_per_level: HashMap<usize, usize>,
    fetch_count_per_level: HashMap<usize, usize>,
    expected_strategy_calls_per_level: HashMap<usize, usize>,
    happened_strategy_calls_per_level: HashMap<usize, usize>,
    happened_on_field_value_calls_per_level: HashMap<usize, usize>,
    ready_levels: HashSet<usize>,
    dispatched_levels: HashSet<usize>,
}

fn increment(counters: &mut HashMap<usize, usize>, level: usize, by: usize) {
    *counters.entry(level).or_default() += by;
}

impl CallStack {
    fn new() -> Self {
        let mut call_stack = Self::default();
        // the root selection set is the single strategy call of level 1
        call_stack.expected_strategy_calls_per_level.insert(1, 1);
        call_stack
    }

    fn all_strategy_calls_happened(&self, level: usize) -> bool {
        self.happened_strategy_calls_per_level.get(&level)
            == self.expected_strategy_calls_per_level.get(&level)
    }

    fn all_on_field_calls_happened(&self, level: usize) -> bool {
        self.happened_on_field_value_calls_per_level.get(&level)
            == self.expected_strategy_calls_per_level.get(&level)
    }

    fn all_fetches_happened(&self, level: usize) -> bool {
        self.fetch_count_per_level.get(&level) == self.expected_fetch_count_per_level.get(&level)
    }

    /// Readiness is monotonic within a tree, so it is cached.
    fn level_ready(&mut self, level: usize) -> bool {
        if self.ready_levels.contains(&level) {
            return true;
        }
        let ready = if level == 1 {
            self.all_fetches_happened(1)
        } else {
            self.level_ready(level - 1)
                && self.all_on_field_calls_happened(level - 1)
                && self.all_strategy_calls_happened(level)
                && self.all_fetches_happened(level)
        };
        if ready {
            self.ready_levels.insert(level);
        }
        ready
    }

    fn dispatch_if_needed(&mut self, level: usize) -> bool {
        if !self.level_ready(level) {
            return false;
        }
        self.dispatch_if_not_dispatched_before(level)
    }

    fn dispatch_if_not_dispatched_before(&mut self, level: usize) -> bool {
        if !self.dispatched_levels.insert(level) {
            panic!("level {level} dispatched twice: {self}");
        }
        true
    }

    fn clear_and_mark_current_level_as_ready(&mut self, level: usize) {
        *self = Self::default();
        self.expected_fetch_count_per_level.insert(level, 1);
        self.fetch_count_per_level.insert(level, 1);
        self.expected_strategy_calls_per_level.insert(level, 1);
        self.happened_strategy_calls_per_level.insert(level, 1);
        self.dispatched_levels.insert(level);
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut levels: Vec<_> = self
            .expected_fetch_count_per_level
            .keys()
            .chain(self.expected_strategy_calls_per_level.keys())
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        levels.sort_unstable();
        let count = |counters: &HashMap<usize, usize>, level| {
            counters
                .get(&level)
                .map_or_else(|| "-".to_string(), usize::to_string)
        };
        for level in levels {
            write!(
                f,
                "[level {level}: fetches {}/{}, strategy calls {}/{}, field values {}]",
                count(&self.fetch_count_per_level, level),
                count(&self.expected_fetch_count_per_level, level),
                count(&self.happened_strategy_calls_per_level, level),
                count(&self.expected_strategy_calls_per_level, level),
                count(&self.happened_on_field_value_calls_per_level, level),
            )?;
        }
        Ok(())
    }
}
