//! Per-provider usage accounting and budget enforcement signals
//!
//! Daily and monthly spend counters reset on real calendar boundaries
//! (`chrono` dates), not on fixed-width epoch arithmetic. Warning and pause
//! thresholds are advisory; the orchestrator decides what to do with them.

use crate::config::{BudgetConfig, GatewayConfig, PricingModel};
use crate::core::types::Provider;
use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

/// Accumulated usage for one provider
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProviderUsage {
    pub request_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
}

/// Daily/monthly budget percentages
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BudgetUsage {
    /// Fraction of the daily limit consumed, in `[0.0, 1.0+]`
    pub daily: f64,
    /// Fraction of the monthly limit consumed
    pub monthly: f64,
}

/// Global spend counters with their period markers
#[derive(Debug)]
struct BudgetState {
    daily_spend: f64,
    monthly_spend: f64,
    current_day: chrono::NaiveDate,
    current_month: (i32, u32),
}

impl BudgetState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_spend: 0.0,
            monthly_spend: 0.0,
            current_day: now.date_naive(),
            current_month: (now.year(), now.month()),
        }
    }

    /// Zero whichever counters have rolled past a period boundary
    fn roll_over(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.current_day {
            debug!(day = %today, "daily budget counter reset");
            self.daily_spend = 0.0;
            self.current_day = today;
        }
        let month = (now.year(), now.month());
        if month != self.current_month {
            debug!(year = month.0, month = month.1, "monthly budget counter reset");
            self.monthly_spend = 0.0;
            self.current_month = month;
        }
    }
}

/// Cost tracker shared by all in-flight requests
pub struct CostTracker {
    config: Arc<GatewayConfig>,
    usage: DashMap<Provider, ProviderUsage>,
    budget: Mutex<BudgetState>,
}

impl CostTracker {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            config,
            usage: DashMap::new(),
            budget: Mutex::new(BudgetState::new(Utc::now())),
        }
    }

    /// Record exactly one completed attempt
    ///
    /// Callers must invoke this once per completed request; the tracker
    /// itself never double-counts.
    pub fn record_request(&self, provider: Provider, input_tokens: u64, output_tokens: u64) {
        self.record_request_at(provider, input_tokens, output_tokens, Utc::now());
    }

    fn record_request_at(
        &self,
        provider: Provider,
        input_tokens: u64,
        output_tokens: u64,
        now: DateTime<Utc>,
    ) {
        let cost = self
            .config
            .pricing(provider)
            .request_cost(input_tokens, output_tokens);

        {
            let mut usage = self.usage.entry(provider).or_default();
            usage.request_count += 1;
            usage.input_tokens += input_tokens;
            usage.output_tokens += output_tokens;
            usage.total_cost += cost;
        }

        let mut budget = self.budget.lock();
        budget.roll_over(now);
        budget.daily_spend += cost;
        budget.monthly_spend += cost;

        if budget.daily_spend >= self.budget_config().daily_limit * self.budget_config().warn_threshold
        {
            warn!(
                provider = %provider,
                daily_spend = budget.daily_spend,
                "daily spend past warning threshold"
            );
        }
    }

    /// Whether a hypothetical request of `estimated_tokens` stays within both
    /// budget limits
    ///
    /// The estimate splits tokens evenly into input and output halves.
    /// Free-priced providers are always affordable.
    pub fn can_afford(&self, provider: Provider, estimated_tokens: u64) -> bool {
        let pricing = self.config.pricing(provider);
        if matches!(pricing, PricingModel::Free) {
            return true;
        }
        let half = estimated_tokens / 2;
        let estimated_cost = pricing.request_cost(half, estimated_tokens - half);

        let mut budget = self.budget.lock();
        budget.roll_over(Utc::now());
        let limits = self.budget_config();
        budget.daily_spend + estimated_cost <= limits.daily_limit
            && budget.monthly_spend + estimated_cost <= limits.monthly_limit
    }

    /// Current budget consumption as fractions of each limit
    pub fn budget_usage(&self) -> BudgetUsage {
        let mut budget = self.budget.lock();
        budget.roll_over(Utc::now());
        let limits = self.budget_config();
        BudgetUsage {
            daily: safe_fraction(budget.daily_spend, limits.daily_limit),
            monthly: safe_fraction(budget.monthly_spend, limits.monthly_limit),
        }
    }

    /// Advisory: a budget limit is past its warn threshold
    pub fn should_warn_budget(&self) -> bool {
        let usage = self.budget_usage();
        let threshold = self.budget_config().warn_threshold;
        usage.daily >= threshold || usage.monthly >= threshold
    }

    /// Advisory: a budget limit is past its pause threshold
    pub fn should_pause_budget(&self) -> bool {
        let usage = self.budget_usage();
        let threshold = self.budget_config().pause_threshold;
        usage.daily >= threshold || usage.monthly >= threshold
    }

    /// Usage snapshot for one provider
    pub fn usage_of(&self, provider: Provider) -> ProviderUsage {
        self.usage.get(&provider).map(|u| *u).unwrap_or_default()
    }

    /// Total accumulated cost across all providers
    pub fn total_cost(&self) -> f64 {
        self.usage.iter().map(|entry| entry.total_cost).sum()
    }

    /// Human-readable multi-line report
    pub fn cost_report(&self) -> String {
        let usage = self.budget_usage();
        let limits = self.budget_config();
        let mut report = String::from("Cost summary\n");
        for provider in Provider::ALL {
            let u = self.usage_of(provider);
            if u.request_count == 0 {
                continue;
            }
            let _ = writeln!(
                report,
                "  {:<16} requests={} in={} out={} cost=${:.4}",
                provider, u.request_count, u.input_tokens, u.output_tokens, u.total_cost
            );
        }
        let _ = writeln!(
            report,
            "  daily:   {:.1}% of ${:.2}",
            usage.daily * 100.0,
            limits.daily_limit
        );
        let _ = writeln!(
            report,
            "  monthly: {:.1}% of ${:.2}",
            usage.monthly * 100.0,
            limits.monthly_limit
        );
        report
    }

    fn budget_config(&self) -> &BudgetConfig {
        &self.config.budget
    }
}

fn safe_fraction(spend: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        0.0
    } else {
        spend / limit
    }
}
