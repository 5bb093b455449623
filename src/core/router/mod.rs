//! Provider selection policy
//!
//! The router answers "what does the policy say" from configuration alone;
//! health, circuit and budget gating happen later in the orchestrator. This
//! separation keeps routing decisions cheap and stateless.

use crate::config::{GatewayConfig, RoutingMode};
use crate::core::types::{Provider, TaskType};
use crate::utils::error::{GatewayError, PolicyError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Configuration-driven provider router
pub struct Router {
    config: Arc<GatewayConfig>,
    round_robin_counter: AtomicUsize,
}

impl Router {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            config,
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    /// Select a candidate provider for a task
    ///
    /// An explicit override is returned unconditionally; the orchestrator
    /// still applies its hard gates afterwards. Otherwise the task routing
    /// entry is consulted (primary, then its fallback), then the configured
    /// fallback chain in order.
    pub fn select_provider(
        &self,
        task: TaskType,
        explicit_override: Option<Provider>,
    ) -> Result<Provider> {
        if let Some(provider) = explicit_override {
            debug!(provider = %provider, "explicit provider override");
            return Ok(provider);
        }

        if self.config.routing.mode == RoutingMode::RoundRobin {
            return self.select_round_robin();
        }

        if let Some(routing) = self.config.routing.task_routing.get(&task) {
            if self.config.is_enabled(routing.primary) {
                debug!(task = %task, provider = %routing.primary, "routed to task primary");
                return Ok(routing.primary);
            }
            if let Some(fallback) = routing.fallback {
                if self.config.is_enabled(fallback) {
                    debug!(task = %task, provider = %fallback, "routed to task fallback");
                    return Ok(fallback);
                }
            }
        }

        self.first_enabled_in_chain()
    }

    /// Fallback candidates after `selected`, in chain order, deduplicated
    pub fn fallback_candidates(&self, selected: Provider) -> Vec<Provider> {
        self.config
            .routing
            .fallback_chain
            .iter()
            .copied()
            .filter(|p| *p != selected && self.config.is_enabled(*p))
            .collect()
    }

    fn first_enabled_in_chain(&self) -> Result<Provider> {
        self.config
            .routing
            .fallback_chain
            .iter()
            .copied()
            .find(|p| self.config.is_enabled(*p))
            .ok_or(GatewayError::Policy(PolicyError::NoProviderAvailable))
    }

    fn select_round_robin(&self) -> Result<Provider> {
        let pool: Vec<Provider> = self
            .config
            .routing
            .load_balance
            .iter()
            .copied()
            .filter(|p| self.config.is_enabled(*p))
            .collect();
        if pool.is_empty() {
            return Err(GatewayError::Policy(PolicyError::NoProviderAvailable));
        }
        let index = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % pool.len();
        debug!(provider = %pool[index], index, "round-robin selection");
        Ok(pool[index])
    }
}
