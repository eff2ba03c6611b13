//! # Intelligent Routing Module
//!
//! This module provides intelligent request routing and load balancing for the Ultrafast Models SDK.
//! It enables automatic provider selection based on various strategies including load balancing,
//! failover, conditional routing, and performance-based selection.
//!
//! ## Overview
//!
//! The routing system provides:
//! - **Multiple Routing Strategies**: Single, load balancing, failover, conditional, A/B testing
//! - **Performance-Based Routing**: Route based on latency, success rates, and health
//! - **Conditional Routing**: Route based on request characteristics and context
//! - **Load Balancing**: Distribute requests across multiple providers
//! - **Health Monitoring**: Track provider health and performance metrics
//! - **Adaptive Routing**: Dynamic routing based on real-time performance data
//!
//! ## Routing Strategies
//!
//! ### Single Provider
//! Routes all requests to a single provider regardless of conditions.
//!
//! ### Load Balancing
//! Distributes requests across multiple providers using weighted or round-robin selection.
//!
//! ### Failover
//! Uses a primary provider with automatic fallback to backup providers on failure.
//!
//! ### Conditional Routing
//! Routes requests based on specific conditions like model name, user region, or request size.
//!
//! ### A/B Testing
//! Routes requests to different providers for testing and comparison.
//!
//! ### Round Robin
//! Cycles through providers in a fixed order.
//!
//! ### Least Used
//! Routes to the provider with the lowest request count.
//!
//! ### Lowest Latency
//! Routes to the provider with the best average response time.
//!
//! ## Usage Examples
//!
//! ### Basic Routing Setup
//!
//! ```rust
//! use ultrafast_models_sdk::routing::{Router, RoutingStrategy, RoutingContext};
//!
//! // Create router with load balancing strategy
//! let router = Router::new(RoutingStrategy::LoadBalance {
//!     weights: vec![0.6, 0.4], // 60% to first provider, 40% to second
//! });
//!
//! let providers = vec!["openai".to_string(), "anthropic".to_string()];
//! let context = RoutingContext {
//!     model: Some("gpt-4".to_string()),
//!     user_region: Some("us-east-1".to_string()),
//!     request_size: 1000,
//!     estimated_tokens: 500,
//!     user_id: Some("user123".to_string()),
//!     metadata: std::collections::HashMap::new(),
//! };
//!
//! // Select provider for this request
//! if let Some(selection) = router.select_provider(&providers, &context) {
//!     println!("Selected provider: {}", selection.provider_id);
//!     println!("Selection reason: {}", selection.reason);
//! }
//! ```
//!
//! ### Conditional Routing
//!
//! ```rust
//! use ultrafast_models_sdk::routing::{Router, RoutingStrategy, RoutingRule, Condition};
//!
//! // Create conditional routing rules
//! let rules = vec![
//!     RoutingRule {
//!         condition: Condition::ModelName("gpt-4".to_string()),
//!         provider: "openai".to_string(),
//!         weight: 1.0,
//!     },
//!     RoutingRule {
//!         condition: Condition::ModelName("claude-3".to_string()),
//!         provider: "anthropic".to_string(),
//!         weight: 1.0,
//!     },
//!     RoutingRule {
//!         condition: Condition::UserRegion("eu-west-1".to_string()),
//!         provider: "azure".to_string(),
//!         weight: 1.0,
//!     },
//! ];
//!
//! let router = Router::new(RoutingStrategy::Conditional { rules });
//! ```
//!
//! ### A/B Testing
//!
//! ```rust
//! use ultrafast_models_sdk::routing::{Router, RoutingStrategy};
//!
//! // Route 70% to provider A, 30% to provider B
//! let router = Router::new(RoutingStrategy::ABTesting { split: 0.7 });
//!
//! let providers = vec!["provider-a".to_string(), "provider-b".to_string()];
//! let context = RoutingContext::default();
//!
//! // This will randomly select based on the split
//! let selection = router.select_provider(&providers, &context);
//! ```
//!
//! ### Performance-Based Routing
//!
//! ```rust
//! use ultrafast_models_sdk::routing::{Router, RoutingStrategy};
//!
//! // Route to provider with lowest latency
//! let router = Router::new(RoutingStrategy::LowestLatency);
//!
//! // Update provider stats after requests
//! router.update_stats("openai", true, 150); // Success, 150ms latency
//! router.update_stats("anthropic", false, 500); // Failure, 500ms latency
//! ```
//!
//! ## Routing Conditions
//!
//! The system supports various routing conditions:
//!
//! - **Model Name**: Route based on specific model names
//! - **Model Prefix**: Route based on model name prefixes
//! - **User Region**: Route based on user's geographic region
//! - **Request Size**: Route based on request payload size
//! - **Token Count**: Route based on estimated token count
//! - **Time of Day**: Route based on current time
//! - **Custom**: User-defined custom conditions
//!
//! ## Performance Monitoring
//!
//! The routing system tracks comprehensive performance metrics:
//!
//! - **Request Counts**: Total, successful, and failed requests per provider
//! - **Latency Tracking**: Average and percentile response times
//! - **Success Rates**: Request success percentages
//! - **Load Balancing**: Current load distribution across providers
//! - **Health Status**: Provider health and availability
//!
//! ## Best Practices
//!
//! - **Monitor Performance**: Regularly review routing metrics and adjust strategies
//! - **Set Appropriate Weights**: Balance load based on provider capabilities and costs
//! - **Use Health Checks**: Implement health monitoring for automatic failover
//! - **Test Strategies**: A/B test different routing strategies to optimize performance
//! - **Consider Costs**: Factor in provider costs when designing routing strategies
//! - **Handle Failures**: Implement proper fallback mechanisms for routing failures

use chrono::Timelike;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Routing strategies for provider selection.
///
/// This enum defines the different strategies that can be used to select
/// which provider should handle a particular request.
///
/// # Examples
///
/// ```rust
/// use ultrafast_models_sdk::routing::RoutingStrategy;
///
/// // Single provider strategy
/// let single = RoutingStrategy::Single;
///
/// // Load balancing with weights
/// let load_balance = RoutingStrategy::LoadBalance {
///     weights: vec![0.6, 0.4],
/// };
///
/// // Conditional routing with rules
/// let conditional = RoutingStrategy::Conditional {
///     rules: vec![/* routing rules */],
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoutingStrategy {
    /// Route all requests to a single provider
    Single,
    /// Use primary provider with automatic fallback
    Fallback,
    /// Distribute requests across providers with weights
    LoadBalance { weights: Vec<f32> },
    /// Route based on specific conditions and rules
    Conditional { rules: Vec<RoutingRule> },
    /// A/B testing with configurable split
    ABTesting { split: f32 },
    /// Cycle through providers in order
    RoundRobin,
    /// Route to provider with lowest request count
    LeastUsed,
    /// Route to provider with lowest average latency
    LowestLatency,
    /// Route by ascending priority number, ties broken by name
    Priority { priorities: HashMap<String, u32> },
    /// Sort by (-success_rate, priority)
    HealthAware { priorities: HashMap<String, u32> },
    /// Sort by ascending cost per 1k tokens, consulting a `CostTable`
    CostOptimized { cost_table: CostTable },
}

/// A single row of the cost table: one provider/model pairing's pricing and
/// the capability set it was qualified against.
///
/// Immutable at runtime; consulted by `select_cost_optimized_provider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostTableEntry {
    pub provider: String,
    pub model: String,
    pub model_family: Option<String>,
    pub cost_per_1k_tokens: f64,
    pub capabilities: Vec<String>,
}

/// Ordered set of `CostTableEntry` rows consulted by the cost-aware router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostTable {
    entries: Vec<CostTableEntry>,
}

impl CostTable {
    pub fn new(entries: Vec<CostTableEntry>) -> Self {
        Self { entries }
    }

    /// Cheapest entry among `candidates` whose row matches `model` (if
    /// given), `model_family` (if given), and covers every requested
    /// capability. Ties broken by provider name for determinism.
    pub fn cheapest_provider(
        &self,
        candidates: &[String],
        model: Option<&str>,
        model_family: Option<&str>,
        capabilities: &[String],
    ) -> Option<(String, f64)> {
        self.entries
            .iter()
            .filter(|e| candidates.iter().any(|c| c == &e.provider))
            .filter(|e| model.map_or(true, |m| e.model == m))
            .filter(|e| model_family.map_or(true, |f| e.model_family.as_deref() == Some(f)))
            .filter(|e| {
                capabilities
                    .iter()
                    .all(|c| e.capabilities.iter().any(|ec| ec == c))
            })
            .min_by(|a, b| {
                a.cost_per_1k_tokens
                    .partial_cmp(&b.cost_per_1k_tokens)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.provider.cmp(&b.provider))
            })
            .map(|e| (e.provider.clone(), e.cost_per_1k_tokens))
    }

    /// Flatten to a per-provider cost map, taking each provider's cheapest
    /// listed model. Used when no model was specified on the request, so
    /// selection still has a cost signal to rank providers by.
    pub fn to_provider_cost_map(&self) -> HashMap<String, f64> {
        let mut map: HashMap<String, f64> = HashMap::new();
        for entry in &self.entries {
            map.entry(entry.provider.clone())
                .and_modify(|c| {
                    if entry.cost_per_1k_tokens < *c {
                        *c = entry.cost_per_1k_tokens;
                    }
                })
                .or_insert(entry.cost_per_1k_tokens);
        }
        map
    }
}

/// How a `FailoverGroup` orders its members on each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    RoundRobin,
    Priority,
    HealthAware,
    CostOptimized,
    LoadBalanced,
    FastestFirst,
}

/// One entry in a `FailoverGroup`: a provider plus the priority/weight used
/// to order it against its peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverMember {
    pub provider: String,
    /// Lower priority numbers are tried first under `Priority`/`HealthAware`.
    pub priority: u32,
    /// Relative weight used under `LoadBalanced`; higher goes first.
    pub weight: f64,
}

/// Running counters for one `FailoverGroup` member, updated by
/// `FailoverGroup::record_attempt` after every call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailoverMemberStats {
    pub total: u64,
    pub successful: u64,
    pub total_latency_ms: u64,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl FailoverMemberStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.successful == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.successful as f64
        }
    }
}

/// An ordered list of providers tried in sequence for a single logical
/// request until one succeeds or the group is exhausted.
///
/// Unlike `RoutingStrategy`, which picks one provider per request,
/// a `FailoverGroup` governs what happens *after* the chosen provider's
/// retries are exhausted: which member to try next, and how many members
/// to try before giving up.
#[derive(Debug)]
pub struct FailoverGroup {
    members: Vec<FailoverMember>,
    strategy: FailoverStrategy,
    max_attempts: u32,
    /// Minimum `FailoverMemberStats::success_rate` for `HealthAware` to
    /// still consider a member, in `0.0..=1.0`.
    health_threshold: f64,
    stats: std::sync::RwLock<HashMap<String, FailoverMemberStats>>,
    cursor: AtomicUsize,
}

impl FailoverGroup {
    pub fn new(
        members: Vec<FailoverMember>,
        strategy: FailoverStrategy,
        max_attempts: u32,
        health_threshold: f64,
    ) -> Self {
        Self {
            members,
            strategy,
            max_attempts,
            health_threshold,
            stats: std::sync::RwLock::new(HashMap::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Members in the order they should be attempted this call, capped at
    /// `max_attempts`. Providers absent from `healthy` are dropped entirely
    /// rather than reordered to the back, since a known-unhealthy provider
    /// is not worth spending an attempt on.
    pub fn ordered_candidates(&self, healthy: &[String]) -> Vec<String> {
        let stats = self.stats.read().unwrap_or_else(|e| e.into_inner());
        let mut candidates: Vec<&FailoverMember> = self
            .members
            .iter()
            .filter(|m| healthy.iter().any(|h| h == &m.provider))
            .collect();

        match self.strategy {
            // priority encodes cost rank under cost_optimized, so it sorts
            // the same way as priority itself.
            FailoverStrategy::Priority | FailoverStrategy::CostOptimized => {
                candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.provider.cmp(&b.provider)));
            }
            FailoverStrategy::HealthAware => {
                candidates.sort_by(|a, b| {
                    let score_a = stats.get(&a.provider).map(|s| s.success_rate()).unwrap_or(1.0);
                    let score_b = stats.get(&b.provider).map(|s| s.success_rate()).unwrap_or(1.0);
                    score_b
                        .partial_cmp(&score_a)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.priority.cmp(&b.priority))
                });
            }
            FailoverStrategy::FastestFirst => {
                candidates.sort_by(|a, b| {
                    let latency_a = stats
                        .get(&a.provider)
                        .map(|s| s.average_latency_ms())
                        .unwrap_or(0.0);
                    let latency_b = stats
                        .get(&b.provider)
                        .map(|s| s.average_latency_ms())
                        .unwrap_or(0.0);
                    latency_a
                        .partial_cmp(&latency_b)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            FailoverStrategy::LoadBalanced | FailoverStrategy::RoundRobin => {}
        }

        if self.strategy == FailoverStrategy::HealthAware {
            candidates.retain(|m| {
                stats
                    .get(&m.provider)
                    .map(|s| s.success_rate() >= self.health_threshold)
                    .unwrap_or(true)
            });
        }

        let mut ordered: Vec<String> = candidates.into_iter().map(|m| m.provider.clone()).collect();

        match self.strategy {
            FailoverStrategy::RoundRobin if !ordered.is_empty() => {
                let start = self.cursor.fetch_add(1, Ordering::Relaxed) % ordered.len();
                ordered.rotate_left(start);
            }
            // Weighted random draw without replacement: repeatedly pick one
            // survivor with probability proportional to its weight.
            FailoverStrategy::LoadBalanced if !ordered.is_empty() => {
                ordered = self.weighted_shuffle(ordered);
            }
            _ => {}
        }

        ordered.truncate(self.max_attempts as usize);
        ordered
    }

    fn weighted_shuffle(&self, providers: Vec<String>) -> Vec<String> {
        let mut pool: Vec<(String, f64)> = providers
            .into_iter()
            .map(|p| {
                let weight = self
                    .members
                    .iter()
                    .find(|m| m.provider == p)
                    .map(|m| m.weight.max(0.0))
                    .unwrap_or(0.0);
                (p, weight)
            })
            .collect();
        let mut result = Vec::with_capacity(pool.len());
        let mut rng = rand::thread_rng();

        while !pool.is_empty() {
            let total: f64 = pool.iter().map(|(_, w)| w).sum();
            let pick = if total <= 0.0 {
                0
            } else {
                let mut roll = rng.gen_range(0.0..total);
                let mut idx = pool.len() - 1;
                for (i, (_, w)) in pool.iter().enumerate() {
                    if roll < *w {
                        idx = i;
                        break;
                    }
                    roll -= w;
                }
                idx
            };
            result.push(pool.remove(pick).0);
        }
        result
    }

    pub fn record_attempt(&self, provider: &str, success: bool, latency_ms: u64) {
        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        let entry = stats.entry(provider.to_string()).or_default();
        entry.total += 1;
        if success {
            entry.successful += 1;
            entry.total_latency_ms += latency_ms;
        }
        entry.last_used = Some(chrono::Utc::now());
    }

    pub fn stats_snapshot(&self) -> HashMap<String, FailoverMemberStats> {
        self.stats.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Routing rule for conditional routing.
///
/// Defines a condition that must be met and the provider to route to
/// when that condition is satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Condition that must be met for this rule to apply
    pub condition: Condition,
    /// Provider to route to when condition is met
    pub provider: String,
    /// Weight for this rule (used in weighted selection)
    pub weight: f32,
}

/// Conditions for conditional routing.
///
/// Defines various conditions that can be used to determine routing decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    /// Route based on exact model name match
    ModelName(String),
    /// Route based on model name prefix
    ModelPrefix(String),
    /// Route based on user's geographic region
    UserRegion(String),
    /// Route based on request size in bytes
    RequestSize(u32),
    /// Route based on estimated token count
    TokenCount(u32),
    /// Route based on time of day (24-hour format)
    TimeOfDay { start: u8, end: u8 },
    /// Custom condition for user-defined logic
    Custom(String),
}

impl Condition {
    /// Check if this condition matches the given routing context.
    ///
    /// # Arguments
    ///
    /// * `context` - The routing context to check against
    ///
    /// # Returns
    ///
    /// Returns `true` if the condition matches the context, `false` otherwise.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ultrafast_models_sdk::routing::{Condition, RoutingContext};
    /// use std::collections::HashMap;
    ///
    /// let context = RoutingContext {
    ///     model: Some("gpt-4".to_string()),
    ///     user_region: Some("us-east-1".to_string()),
    ///     request_size: 1000,
    ///     estimated_tokens: 500,
    ///     user_id: Some("user123".to_string()),
    ///     metadata: HashMap::new(),
    /// };
    ///
    /// let model_condition = Condition::ModelName("gpt-4".to_string());
    /// assert!(model_condition.matches(&context));
    ///
    /// let region_condition = Condition::UserRegion("us-east-1".to_string());
    /// assert!(region_condition.matches(&context));
    /// ```
    pub fn matches(&self, context: &RoutingContext) -> bool {
        match self {
            Condition::ModelName(name) => context.model.as_ref() == Some(name),
            Condition::ModelPrefix(prefix) => context
                .model
                .as_ref()
                .is_some_and(|m| m.starts_with(prefix)),
            Condition::UserRegion(region) => context.user_region.as_ref() == Some(region),
            Condition::RequestSize(size) => context.request_size >= *size,
            Condition::TokenCount(count) => context.estimated_tokens >= *count,
            Condition::TimeOfDay { start, end } => {
                let now = chrono::Utc::now().hour() as u8;
                if start <= end {
                    now >= *start && now <= *end
                } else {
                    // Handle time ranges that cross midnight
                    now >= *start || now <= *end
                }
            }
            Condition::Custom(_) => {
                // Custom conditions require additional implementation
                // This is a placeholder for user-defined logic
                false
            }
        }
    }
}

/// Context information for routing decisions.
///
/// Contains all the information needed to make intelligent routing decisions,
/// including request characteristics, user information, and metadata.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    /// Model being requested (if specified)
    pub model: Option<String>,
    /// User's geographic region (if known)
    pub user_region: Option<String>,
    /// Request size in bytes
    pub request_size: u32,
    /// Estimated number of tokens in the request
    pub estimated_tokens: u32,
    /// User identifier (if authenticated)
    pub user_id: Option<String>,
    /// Additional metadata for custom routing logic
    pub metadata: HashMap<String, String>,
    /// Caller-requested provider, bypassing the configured strategy entirely
    /// when it names a provider that is actually available.
    pub provider_override: Option<String>,
    /// Tenant the request is billed/scoped to, for conditional routing rules
    /// keyed on tenant.
    pub tenant_id: Option<String>,
    /// Model family to match against `CostTableEntry::model_family` when no
    /// exact model is specified.
    pub model_family: Option<String>,
    /// Capabilities the selected provider/model must support (e.g.
    /// `"vision"`, `"function_calling"`).
    pub capabilities: Vec<String>,
    /// Upper bound on `CostTableEntry::cost_per_1k_tokens`; providers priced
    /// above this are excluded from cost-optimized selection.
    pub max_cost_per_token: Option<f64>,
    /// Caller-supplied request id, propagated for correlation in routing logs.
    pub request_id: Option<String>,
}

/// Provider selection result.
///
/// Contains the selected provider and information about why it was chosen.
#[derive(Debug, Clone)]
pub struct ProviderSelection {
    /// Identifier of the selected provider
    pub provider_id: String,
    /// Weight assigned to this selection
    pub weight: f32,
    /// Human-readable reason for the selection
    pub reason: String,
}

/// Router for intelligent provider selection.
///
/// This struct implements the routing logic based on the configured strategy
/// and maintains provider performance statistics for informed decision making.
pub struct Router {
    /// The routing strategy to use for provider selection
    strategy: RoutingStrategy,
    /// Performance statistics for each provider
    provider_stats: HashMap<String, ProviderStats>,
    /// Per-service cursor for round-robin selection; advances only when a
    /// selection is actually made, not per wall-clock tick.
    round_robin_cursor: AtomicUsize,
}

/// Performance statistics for a provider.
///
/// Tracks various metrics about provider performance including request counts,
/// success rates, latency, and load information.
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    /// Total number of requests made to this provider
    pub total_requests: u64,
    /// Number of successful requests
    pub successful_requests: u64,
    /// Number of failed requests
    pub failed_requests: u64,
    /// Average response latency in milliseconds
    pub average_latency_ms: f64,
    /// Timestamp of the last request to this provider
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
    /// Current load (number of active requests)
    pub current_load: u32,
}

impl ProviderStats {
    /// Calculate the success rate for this provider.
    ///
    /// Returns the percentage of successful requests as a value between 0.0 and 1.0.
    /// If no requests have been made, returns 1.0 (100% success rate).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0 // No requests means 100% success rate
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

impl Router {
    /// Create a new router with the specified strategy.
    ///
    /// # Arguments
    ///
    /// * `strategy` - The routing strategy to use for provider selection
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ultrafast_models_sdk::routing::{Router, RoutingStrategy};
    ///
    /// let router = Router::new(RoutingStrategy::LoadBalance {
    ///     weights: vec![0.6, 0.4],
    /// });
    /// ```
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            provider_stats: HashMap::new(),
            round_robin_cursor: AtomicUsize::new(0),
        }
    }

    /// Select a provider based on the current routing strategy.
    ///
    /// # Arguments
    ///
    /// * `providers` - List of available provider identifiers
    /// * `context` - Routing context with request information
    ///
    /// # Returns
    ///
    /// Returns a provider selection if one is found, or `None` if no provider
    /// can be selected based on the current strategy and context.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ultrafast_models_sdk::routing::{Router, RoutingStrategy, RoutingContext};
    /// use std::collections::HashMap;
    ///
    /// let router = Router::new(RoutingStrategy::Single);
    /// let providers = vec!["openai".to_string(), "anthropic".to_string()];
    /// let context = RoutingContext {
    ///     model: Some("gpt-4".to_string()),
    ///     request_size: 1000,
    ///     estimated_tokens: 500,
    ///     ..Default::default()
    /// };
    ///
    /// if let Some(selection) = router.select_provider(&providers, &context) {
    ///     println!("Selected: {}", selection.provider_id);
    /// }
    /// ```
    pub fn select_provider(
        &self,
        providers: &[String],
        context: &RoutingContext,
    ) -> Option<ProviderSelection> {
        if providers.is_empty() {
            return None;
        }

        // Filter out unhealthy providers
        let healthy_providers = self.filter_healthy_providers(providers, context);
        if healthy_providers.is_empty() {
            return None;
        }

        // An explicit provider override bypasses the configured strategy,
        // provided the requested provider is actually healthy and available.
        if let Some(requested) = &context.provider_override {
            if let Some(provider_id) = healthy_providers.iter().find(|p| *p == requested) {
                return Some(ProviderSelection {
                    provider_id: provider_id.clone(),
                    weight: 1.0,
                    reason: "Explicit provider override".to_string(),
                });
            }
        }

        match &self.strategy {
            RoutingStrategy::Single => {
                // Always select the first provider
                Some(ProviderSelection {
                    provider_id: healthy_providers[0].clone(),
                    weight: 1.0,
                    reason: "Single provider strategy".to_string(),
                })
            }
            RoutingStrategy::Fallback => {
                // Select the first healthy provider
                Some(ProviderSelection {
                    provider_id: healthy_providers[0].clone(),
                    weight: 1.0,
                    reason: "Fallback strategy - first healthy provider".to_string(),
                })
            }
            RoutingStrategy::LoadBalance { weights } => {
                self.select_weighted_provider(&healthy_providers, weights)
            }
            RoutingStrategy::Conditional { rules } => {
                self.select_conditional_provider(&healthy_providers, rules, context)
            }
            RoutingStrategy::ABTesting { split } => {
                self.select_ab_testing_provider(&healthy_providers, *split)
            }
            RoutingStrategy::RoundRobin => self.select_round_robin_provider(&healthy_providers),
            RoutingStrategy::LeastUsed => self.select_least_used_provider(&healthy_providers),
            RoutingStrategy::LowestLatency => {
                self.select_lowest_latency_provider(&healthy_providers)
            }
            RoutingStrategy::Priority { priorities } => {
                self.select_priority_provider(&healthy_providers, priorities)
            }
            RoutingStrategy::HealthAware { priorities } => {
                self.select_health_aware_provider(&healthy_providers, priorities)
            }
            RoutingStrategy::CostOptimized { cost_table } => {
                self.select_cost_optimized_provider(&healthy_providers, cost_table, context)
            }
        }
    }

    /// Filter providers to only include healthy ones.
    ///
    /// This method removes providers that are considered unhealthy based on
    /// their performance statistics.
    fn filter_healthy_providers(
        &self,
        providers: &[String],
        _context: &RoutingContext,
    ) -> Vec<String> {
        providers
            .iter()
            .filter(|provider_id| {
                if let Some(stats) = self.provider_stats.get(*provider_id) {
                    // Consider provider healthy if success rate is above 80%
                    // and average latency is below 10 seconds
                    stats.success_rate() > 0.8 && stats.average_latency_ms < 10000.0
                } else {
                    // No stats available - assume healthy
                    true
                }
            })
            .cloned()
            .collect()
    }

    /// Select provider using weighted load balancing.
    ///
    /// Uses the provided weights to probabilistically select a provider.
    /// Weights should sum to 1.0 for proper distribution.
    fn select_weighted_provider(
        &self,
        providers: &[String],
        weights: &[f32],
    ) -> Option<ProviderSelection> {
        if providers.is_empty() {
            return None;
        }

        // Use provided weights or equal weights if not enough provided
        let effective_weights = if weights.len() >= providers.len() {
            weights[..providers.len()].to_vec()
        } else {
            // Equal weights for all providers
            vec![1.0 / providers.len() as f32; providers.len()]
        };

        // Normalize weights to sum to 1.0
        let total_weight: f32 = effective_weights.iter().sum();
        let normalized_weights: Vec<f32> =
            effective_weights.iter().map(|w| w / total_weight).collect();

        // Generate random number for weighted selection
        let mut rng = rand::thread_rng();
        let random_value: f32 = rng.gen();
        let mut cumulative_weight = 0.0;

        for (i, weight) in normalized_weights.iter().enumerate() {
            cumulative_weight += weight;
            if random_value <= cumulative_weight {
                return Some(ProviderSelection {
                    provider_id: providers[i].clone(),
                    weight: *weight,
                    reason: format!("Weighted selection (weight: {weight:.2})"),
                });
            }
        }

        // Fallback to first provider
        Some(ProviderSelection {
            provider_id: providers[0].clone(),
            weight: normalized_weights[0],
            reason: "Weighted selection fallback".to_string(),
        })
    }

    /// Select provider using conditional routing rules.
    ///
    /// Evaluates routing rules in order and selects the first provider
    /// whose condition matches the routing context.
    fn select_conditional_provider(
        &self,
        providers: &[String],
        rules: &[RoutingRule],
        context: &RoutingContext,
    ) -> Option<ProviderSelection> {
        // Check each rule in order
        for rule in rules {
            if rule.condition.matches(context) {
                // Verify the provider is in our healthy providers list
                if providers.contains(&rule.provider) {
                    return Some(ProviderSelection {
                        provider_id: rule.provider.clone(),
                        weight: rule.weight,
                        reason: format!("Conditional routing: {:?}", rule.condition),
                    });
                }
            }
        }

        // No matching rules - fallback to first healthy provider
        if !providers.is_empty() {
            Some(ProviderSelection {
                provider_id: providers[0].clone(),
                weight: 1.0,
                reason: "Conditional routing fallback".to_string(),
            })
        } else {
            None
        }
    }

    /// Select provider using A/B testing strategy.
    ///
    /// Uses the split parameter to probabilistically select between providers.
    /// The split represents the probability of selecting the first provider.
    fn select_ab_testing_provider(
        &self,
        providers: &[String],
        split: f32,
    ) -> Option<ProviderSelection> {
        if providers.len() < 2 {
            return self.select_round_robin_provider(providers);
        }

        let mut rng = rand::thread_rng();
        let random_value: f32 = rng.gen();

        let selected_provider = if random_value < split {
            &providers[0]
        } else {
            &providers[1]
        };

        Some(ProviderSelection {
            provider_id: selected_provider.clone(),
            weight: if random_value < split {
                split
            } else {
                1.0 - split
            },
            reason: format!("A/B testing (split: {split:.2})"),
        })
    }

    /// Select provider using round-robin strategy.
    ///
    /// Cycles through providers in order using a cursor that only advances
    /// on selection, so calls in the same instant still rotate correctly.
    fn select_round_robin_provider(&self, providers: &[String]) -> Option<ProviderSelection> {
        if providers.is_empty() {
            return None;
        }

        let index = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % providers.len();

        Some(ProviderSelection {
            provider_id: providers[index].clone(),
            weight: 1.0 / providers.len() as f32,
            reason: "Round-robin selection".to_string(),
        })
    }

    /// Select provider using explicit priority numbers, lowest wins.
    ///
    /// Ties are broken by provider name for determinism.
    fn select_priority_provider(
        &self,
        providers: &[String],
        priorities: &HashMap<String, u32>,
    ) -> Option<ProviderSelection> {
        providers
            .iter()
            .min_by_key(|p| (priorities.get(*p).copied().unwrap_or(u32::MAX), (*p).clone()))
            .map(|p| ProviderSelection {
                provider_id: p.clone(),
                weight: 1.0,
                reason: format!(
                    "Priority selection (priority: {})",
                    priorities.get(p).copied().unwrap_or(u32::MAX)
                ),
            })
    }

    /// Select provider by (-success_rate, priority), favoring healthier
    /// providers and breaking ties by explicit priority.
    fn select_health_aware_provider(
        &self,
        providers: &[String],
        priorities: &HashMap<String, u32>,
    ) -> Option<ProviderSelection> {
        providers
            .iter()
            .max_by(|a, b| {
                let score_a = self.provider_stats.get(*a).map(|s| s.success_rate()).unwrap_or(1.0);
                let score_b = self.provider_stats.get(*b).map(|s| s.success_rate()).unwrap_or(1.0);
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let pa = priorities.get(*b).copied().unwrap_or(u32::MAX);
                        let pb = priorities.get(*a).copied().unwrap_or(u32::MAX);
                        pa.cmp(&pb)
                    })
            })
            .map(|p| ProviderSelection {
                provider_id: p.clone(),
                weight: 1.0,
                reason: "Health-aware selection".to_string(),
            })
    }

    /// Select the lowest-cost provider among those satisfying the request.
    ///
    /// Consults the `CostTable` for an entry matching the requested model
    /// first; if none matches (no model specified, or the table has no row
    /// for it), falls back to each candidate's cheapest listed model.
    fn select_cost_optimized_provider(
        &self,
        providers: &[String],
        cost_table: &CostTable,
        context: &RoutingContext,
    ) -> Option<ProviderSelection> {
        if let Some((provider, cost)) = cost_table.cheapest_provider(
            providers,
            context.model.as_deref(),
            context.model_family.as_deref(),
            &context.capabilities,
        ) {
            if context.max_cost_per_token.map_or(true, |ceiling| cost <= ceiling) {
                return Some(ProviderSelection {
                    provider_id: provider,
                    weight: 1.0,
                    reason: format!("Cost-optimized selection (${:.4}/1k tokens)", cost),
                });
            }
        }

        let cost_per_1k_tokens = cost_table.to_provider_cost_map();
        providers
            .iter()
            .filter(|p| {
                let cost = cost_per_1k_tokens.get(*p).copied().unwrap_or(f64::MAX);
                context.max_cost_per_token.map_or(true, |ceiling| cost <= ceiling)
            })
            .min_by(|a, b| {
                let cost_a = cost_per_1k_tokens.get(*a).copied().unwrap_or(f64::MAX);
                let cost_b = cost_per_1k_tokens.get(*b).copied().unwrap_or(f64::MAX);
                cost_a
                    .partial_cmp(&cost_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            })
            .map(|p| ProviderSelection {
                provider_id: p.clone(),
                weight: 1.0,
                reason: format!(
                    "Cost-optimized selection (${:.4}/1k tokens)",
                    cost_per_1k_tokens.get(p).copied().unwrap_or(0.0)
                ),
            })
    }

    /// Select provider with the lowest request count.
    ///
    /// Chooses the provider that has handled the fewest requests.
    fn select_least_used_provider(&self, providers: &[String]) -> Option<ProviderSelection> {
        if providers.is_empty() {
            return None;
        }

        let mut selected_provider = &providers[0];
        let mut min_requests = u64::MAX;

        for provider_id in providers {
            let requests = self
                .provider_stats
                .get(provider_id)
                .map(|stats| stats.total_requests)
                .unwrap_or(0);

            if requests < min_requests {
                min_requests = requests;
                selected_provider = provider_id;
            }
        }

        Some(ProviderSelection {
            provider_id: selected_provider.clone(),
            weight: 1.0,
            reason: format!("Least used ({min_requests} requests)"),
        })
    }

    /// Select provider with the lowest average latency.
    ///
    /// Chooses the provider with the best average response time.
    fn select_lowest_latency_provider(&self, providers: &[String]) -> Option<ProviderSelection> {
        if providers.is_empty() {
            return None;
        }

        let mut selected_provider = &providers[0];
        let mut min_latency = f64::MAX;

        for provider_id in providers {
            if let Some(stats) = self.provider_stats.get(provider_id) {
                if stats.average_latency_ms < min_latency {
                    min_latency = stats.average_latency_ms;
                    selected_provider = provider_id;
                }
            }
        }

        Some(ProviderSelection {
            provider_id: selected_provider.clone(),
            weight: 1.0,
            reason: format!("Lowest latency ({min_latency:.2}ms)"),
        })
    }

    /// Update provider statistics after a request.
    ///
    /// # Arguments
    ///
    /// * `provider_id` - Identifier of the provider
    /// * `success` - Whether the request was successful
    /// * `latency_ms` - Response latency in milliseconds
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ultrafast_models_sdk::routing::Router;
    ///
    /// let mut router = Router::new(RoutingStrategy::Single);
    ///
    /// // Update stats after a successful request
    /// router.update_stats("openai", true, 150);
    ///
    /// // Update stats after a failed request
    /// router.update_stats("anthropic", false, 500);
    /// ```
    pub fn update_stats(&mut self, provider_id: &str, success: bool, latency_ms: u64) {
        let stats = self
            .provider_stats
            .entry(provider_id.to_string())
            .or_default();

        stats.total_requests += 1;
        stats.last_used = Some(chrono::Utc::now());

        if success {
            stats.successful_requests += 1;
        } else {
            stats.failed_requests += 1;
        }

        // Update average latency using exponential moving average
        let alpha = 0.1; // Smoothing factor
        stats.average_latency_ms =
            alpha * latency_ms as f64 + (1.0 - alpha) * stats.average_latency_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cost_table() -> CostTable {
        CostTable::new(vec![
            CostTableEntry {
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                model_family: Some("gpt-4o".to_string()),
                cost_per_1k_tokens: 0.0006,
                capabilities: vec!["chat".to_string(), "streaming".to_string()],
            },
            CostTableEntry {
                provider: "anthropic".to_string(),
                model: "claude-3-5-haiku-20241022".to_string(),
                model_family: Some("claude-3-5".to_string()),
                cost_per_1k_tokens: 0.004,
                capabilities: vec!["chat".to_string(), "streaming".to_string()],
            },
        ])
    }

    #[test]
    fn cost_table_picks_cheapest_matching_model() {
        let table = sample_cost_table();
        let candidates = vec!["openai".to_string(), "anthropic".to_string()];

        let (provider, cost) = table
            .cheapest_provider(&candidates, Some("gpt-4o-mini"), None, &[])
            .unwrap();
        assert_eq!(provider, "openai");
        assert!((cost - 0.0006).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_table_returns_none_when_model_unlisted() {
        let table = sample_cost_table();
        let candidates = vec!["openai".to_string(), "anthropic".to_string()];

        assert!(table
            .cheapest_provider(&candidates, Some("gpt-5"), None, &[])
            .is_none());
    }

    #[test]
    fn select_cost_optimized_provider_falls_back_without_model() {
        let router = Router::new(RoutingStrategy::CostOptimized {
            cost_table: sample_cost_table(),
        });
        let context = RoutingContext {
            model: None,
            ..Default::default()
        };

        let providers = vec!["openai".to_string(), "anthropic".to_string()];
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "openai");
    }

    #[test]
    fn select_cost_optimized_provider_honors_requested_model() {
        let router = Router::new(RoutingStrategy::CostOptimized {
            cost_table: sample_cost_table(),
        });
        let context = RoutingContext {
            model: Some("claude-3-5-haiku-20241022".to_string()),
            ..Default::default()
        };

        let providers = vec!["openai".to_string(), "anthropic".to_string()];
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "anthropic");
    }

    #[test]
    fn select_cost_optimized_provider_respects_cost_ceiling() {
        let router = Router::new(RoutingStrategy::CostOptimized {
            cost_table: sample_cost_table(),
        });
        let context = RoutingContext {
            max_cost_per_token: Some(0.001),
            ..Default::default()
        };

        let providers = vec!["openai".to_string(), "anthropic".to_string()];
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "openai");
    }

    #[test]
    fn select_cost_optimized_provider_none_when_all_over_ceiling() {
        let router = Router::new(RoutingStrategy::CostOptimized {
            cost_table: sample_cost_table(),
        });
        let context = RoutingContext {
            max_cost_per_token: Some(0.0001),
            ..Default::default()
        };

        let providers = vec!["openai".to_string(), "anthropic".to_string()];
        assert!(router.select_provider(&providers, &context).is_none());
    }

    #[test]
    fn provider_override_bypasses_strategy() {
        let router = Router::new(RoutingStrategy::Single);
        let context = RoutingContext {
            provider_override: Some("anthropic".to_string()),
            ..Default::default()
        };

        let providers = vec!["openai".to_string(), "anthropic".to_string()];
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "anthropic");
        assert_eq!(selection.reason, "Explicit provider override");
    }

    #[test]
    fn provider_override_ignored_when_not_available() {
        let router = Router::new(RoutingStrategy::Single);
        let context = RoutingContext {
            provider_override: Some("azure-openai".to_string()),
            ..Default::default()
        };

        let providers = vec!["openai".to_string(), "anthropic".to_string()];
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "openai");
    }

    fn sample_failover_group(strategy: FailoverStrategy) -> FailoverGroup {
        FailoverGroup::new(
            vec![
                FailoverMember {
                    provider: "openai".to_string(),
                    priority: 1,
                    weight: 0.3,
                },
                FailoverMember {
                    provider: "anthropic".to_string(),
                    priority: 2,
                    weight: 0.7,
                },
            ],
            strategy,
            2,
            0.5,
        )
    }

    #[test]
    fn failover_group_priority_orders_by_priority() {
        let group = sample_failover_group(FailoverStrategy::Priority);
        let healthy = vec!["openai".to_string(), "anthropic".to_string()];
        assert_eq!(group.ordered_candidates(&healthy), vec!["openai", "anthropic"]);
    }

    #[test]
    fn failover_group_drops_unhealthy_members() {
        let group = sample_failover_group(FailoverStrategy::Priority);
        let healthy = vec!["anthropic".to_string()];
        assert_eq!(group.ordered_candidates(&healthy), vec!["anthropic"]);
    }

    #[test]
    fn failover_group_load_balanced_includes_every_healthy_member() {
        let group = sample_failover_group(FailoverStrategy::LoadBalanced);
        let healthy = vec!["openai".to_string(), "anthropic".to_string()];
        let mut ordered = group.ordered_candidates(&healthy);
        ordered.sort();
        assert_eq!(ordered, vec!["anthropic", "openai"]);
    }

    #[test]
    fn failover_group_health_aware_excludes_below_threshold() {
        let group = sample_failover_group(FailoverStrategy::HealthAware);
        group.record_attempt("openai", false, 0);
        group.record_attempt("openai", false, 0);
        group.record_attempt("anthropic", true, 120);

        let healthy = vec!["openai".to_string(), "anthropic".to_string()];
        assert_eq!(group.ordered_candidates(&healthy), vec!["anthropic"]);
    }

    #[test]
    fn failover_group_truncates_to_max_attempts() {
        let mut group = sample_failover_group(FailoverStrategy::Priority);
        group.max_attempts = 1;
        let healthy = vec!["openai".to_string(), "anthropic".to_string()];
        assert_eq!(group.ordered_candidates(&healthy), vec!["openai"]);
    }

    #[test]
    fn failover_group_records_success_rate_and_latency() {
        let group = sample_failover_group(FailoverStrategy::Priority);
        group.record_attempt("openai", true, 100);
        group.record_attempt("openai", true, 300);
        group.record_attempt("openai", false, 0);

        let stats = group.stats_snapshot();
        let openai_stats = stats.get("openai").unwrap();
        assert_eq!(openai_stats.total, 3);
        assert_eq!(openai_stats.successful, 2);
        assert!((openai_stats.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
        assert!((openai_stats.average_latency_ms() - 200.0).abs() < 1e-9);
    }
}
