// Modern Dashboard Architecture
// This module defines the core architecture for the redesigned dashboard

use crate::gateway_error::GatewayError;
use axum::response::Html;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Core dashboard engine that orchestrates all dashboard functionality
#[derive(Clone)]
pub struct DashboardEngine {
    pub config: Arc<DashboardConfig>,
    pub template_engine: Arc<TemplateEngine>,
    pub component_registry: Arc<ComponentRegistry>,
    pub asset_manager: Arc<AssetManager>,
    pub websocket_manager: Arc<WebSocketManager>,
    pub analytics_engine: Arc<AnalyticsEngine>,
    pub security_manager: Arc<SecurityManager>,
}

impl DashboardEngine {
    pub fn new(config: DashboardConfig) -> Self {
        let template_engine = Arc::new(TemplateEngine::new());
        let component_registry = Arc::new(ComponentRegistry::new());
        let asset_manager = Arc::new(AssetManager::new());
        let websocket_manager = Arc::new(WebSocketManager::new());
        let analytics_engine = Arc::new(AnalyticsEngine::new());
        let security_manager = Arc::new(SecurityManager::new());

        Self {
            config: Arc::new(config),
            template_engine,
            component_registry,
            asset_manager,
            websocket_manager,
            analytics_engine,
            security_manager,
        }
    }

    /// Render complete dashboard page
    pub async fn render_dashboard(&self, context: DashboardContext) -> Result<Html<String>, GatewayError> {
        // Security check
        self.security_manager.validate_access(&context)?;

        // Load user configuration
        let user_config = self.load_user_config(&context.user_id).await?;

        // Build dashboard data
        let dashboard_data = self.build_dashboard_data(&context, &user_config).await?;

        // Render with template engine
        let html = self.template_engine.render("dashboard/main", &dashboard_data).await?;

        Ok(Html(html))
    }

    /// Render specific dashboard component
    pub async fn render_component(&self, component_type: ComponentType, context: &DashboardContext) -> Result<String, GatewayError> {
        let component = self.component_registry.get_component(component_type)?;
        let data = component.load_data(context).await?;
        component.render(data).await
    }

    /// Handle real-time dashboard updates
    pub async fn handle_realtime_update(&self, update: DashboardUpdate) -> Result<(), GatewayError> {
        self.websocket_manager.broadcast_update(update).await
    }

    async fn load_user_config(&self, user_id: &str) -> Result<UserDashboardConfig, GatewayError> {
        // Load from database or use defaults
        Ok(UserDashboardConfig::default())
    }

    async fn build_dashboard_data(&self, context: &DashboardContext, user_config: &UserDashboardConfig) -> Result<DashboardData, GatewayError> {
        let mut data = DashboardData::new();

        // Load metrics data
        data.metrics = self.load_metrics_data(context).await?;

        // Load provider data
        data.providers = self.load_provider_data(context).await?;

        // Load analytics data
        data.analytics = self.analytics_engine.generate_analytics(context).await?;

        // Apply user customizations
        data.layout = user_config.layout.clone();
        data.widgets = self.load_user_widgets(&user_config.widgets).await?;

        Ok(data)
    }

    async fn load_metrics_data(&self, _context: &DashboardContext) -> Result<MetricsData, GatewayError> {
        // Implementation will fetch real metrics
        Ok(MetricsData::default())
    }

    async fn load_provider_data(&self, _context: &DashboardContext) -> Result<Vec<ProviderData>, GatewayError> {
        // Implementation will fetch real provider data
        Ok(vec![])
    }

    async fn load_user_widgets(&self, widget_configs: &[WidgetConfig]) -> Result<Vec<DashboardWidget>, GatewayError> {
        let mut widgets = Vec::new();

        for config in widget_configs {
            let widget = DashboardWidget {
                id: config.id.clone(),
                widget_type: config.widget_type.clone(),
                title: config.title.clone(),
                position: config.position.clone(),
                size: config.size.clone(),
                config: config.config.clone(),
                data: serde_json::Value::Null, // Will be populated by component
            };
            widgets.push(widget);
        }

        Ok(widgets)
    }
}

/// Dashboard rendering context
#[derive(Debug, Clone)]
pub struct DashboardContext {
    pub user_id: String,
    pub session_id: String,
    pub request_id: String,
    pub permissions: Vec<String>,
    pub filters: HashMap<String, String>,
    pub time_range: TimeRange,
}

impl DashboardContext {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            session_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            permissions: vec!["dashboard:read".to_string()],
            filters: HashMap::new(),
            time_range: TimeRange::Last24Hours,
        }
    }
}

/// Complete dashboard data structure
#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub metrics: MetricsData,
    pub providers: Vec<ProviderData>,
    pub analytics: AnalyticsData,
    pub layout: DashboardLayout,
    pub widgets: Vec<DashboardWidget>,
    pub theme: ThemeConfig,
    pub user_config: UserDashboardConfig,
}

impl DashboardData {
    pub fn new() -> Self {
        Self {
            metrics: MetricsData::default(),
            providers: vec![],
            analytics: AnalyticsData::default(),
            layout: DashboardLayout::default(),
            widgets: vec![],
            theme: ThemeConfig::default(),
            user_config: UserDashboardConfig::default(),
        }
    }
}

/// Enhanced dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub title: String,
    pub brand: BrandConfig,
    pub features: DashboardFeatures,
    pub security: SecurityConfig,
    pub performance: PerformanceConfig,
    pub integrations: IntegrationConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: "Ultrafast Gateway Dashboard".to_string(),
            brand: BrandConfig::default(),
            features: DashboardFeatures::all_enabled(),
            security: SecurityConfig::secure_defaults(),
            performance: PerformanceConfig::optimized(),
            integrations: IntegrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub logo_url: Option<String>,
    pub primary_color: String,
    pub secondary_color: String,
    pub accent_color: String,
    pub custom_css_url: Option<String>,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            logo_url: None,
            primary_color: "#3b82f6".to_string(),
            secondary_color: "#64748b".to_string(),
            accent_color: "#8b5cf6".to_string(),
            custom_css_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardFeatures {
    pub real_time_updates: bool,
    pub websocket_enabled: bool,
    pub advanced_analytics: bool,
    pub custom_dashboards: bool,
    pub export_functionality: bool,
    pub alert_management: bool,
    pub user_management: bool,
    pub cost_tracking: bool,
    pub provider_health: bool,
    pub error_analytics: bool,
    pub performance_monitoring: bool,
    pub audit_logging: bool,
}

impl DashboardFeatures {
    pub fn all_enabled() -> Self {
        Self {
            real_time_updates: true,
            websocket_enabled: true,
            advanced_analytics: true,
            custom_dashboards: true,
            export_functionality: true,
            alert_management: true,
            user_management: true,
            cost_tracking: true,
            provider_health: true,
            error_analytics: true,
            performance_monitoring: true,
            audit_logging: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub csp_enabled: bool,
    pub session_timeout: u64,
    pub rate_limiting: bool,
    pub audit_logging: bool,
    pub secure_headers: bool,
}

impl SecurityConfig {
    pub fn secure_defaults() -> Self {
        Self {
            csp_enabled: true,
            session_timeout: 3600, // 1 hour
            rate_limiting: true,
            audit_logging: true,
            secure_headers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub cache_enabled: bool,
    pub cache_ttl: u64,
    pub websocket_buffer_size: usize,
    pub max_concurrent_users: usize,
    pub asset_compression: bool,
}

impl PerformanceConfig {
    pub fn optimized() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: 300, // 5 minutes
            websocket_buffer_size: 1024,
            max_concurrent_users: 1000,
            asset_compression: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub prometheus_enabled: bool,
    pub grafana_integration: bool,
    pub slack_alerts: bool,
    pub webhook_notifications: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: true,
            grafana_integration: false,
            slack_alerts: false,
            webhook_notifications: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TimeRange {
    Last5Minutes,
    Last15Minutes,
    Last30Minutes,
    LastHour,
    Last6Hours,
    Last24Hours,
    Last7Days,
    Last30Days,
    Custom { start: i64, end: i64 },
}

// Forward declarations for other modules
pub struct TemplateEngine;
pub struct ComponentRegistry;
pub struct AssetManager;
pub struct WebSocketManager;
pub struct AnalyticsEngine;
pub struct SecurityManager;

// Data structures
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsData {
    pub requests_per_minute: f64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    pub active_connections: u64,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderData {
    pub name: String,
    pub status: ProviderStatus,
    pub requests: u64,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderStatus {
    Healthy,
    Warning,
    Error,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsData {
    pub trends: Vec<TrendData>,
    pub predictions: Vec<PredictionData>,
    pub insights: Vec<InsightData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendData {
    pub metric: String,
    pub direction: TrendDirection,
    pub percentage: f64,
    pub period: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionData {
    pub metric: String,
    pub predicted_value: f64,
    pub confidence: f64,
    pub horizon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightData {
    pub title: String,
    pub description: String,
    pub severity: InsightSeverity,
    pub actionable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InsightSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardLayout {
    pub columns: u8,
    pub rows: u8,
    pub responsive: bool,
    pub sidebar_enabled: bool,
    pub header_enabled: bool,
    pub footer_enabled: bool,
}

impl Default for DashboardLayout {
    fn default() -> Self {
        Self {
            columns: 12,
            rows: 8,
            responsive: true,
            sidebar_enabled: true,
            header_enabled: true,
            footer_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardWidget {
    pub id: String,
    pub widget_type: WidgetType,
    pub title: String,
    pub position: Position,
    pub size: Size,
    pub config: serde_json::Value,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WidgetType {
    MetricsCard,
    LineChart,
    BarChart,
    PieChart,
    Gauge,
    Table,
    Map,
    Heatmap,
    Timeline,
    Custom(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Size {
    pub width: u8,
    pub height: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDashboardConfig {
    pub layout: DashboardLayout,
    pub theme: ThemeConfig,
    pub widgets: Vec<WidgetConfig>,
    pub filters: FilterConfig,
    pub preferences: UserPreferences,
}

impl Default for UserDashboardConfig {
    fn default() -> Self {
        Self {
            layout: DashboardLayout::default(),
            theme: ThemeConfig::default(),
            widgets: Vec::new(),
            filters: FilterConfig::default(),
            preferences: UserPreferences::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub id: String,
    pub widget_type: WidgetType,
    pub title: String,
    pub position: Position,
    pub size: Size,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    pub mode: ThemeMode,
    pub primary_color: String,
    pub secondary_color: String,
    pub accent_color: String,
    pub font_family: String,
    pub font_size: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            mode: ThemeMode::Auto,
            primary_color: "#3b82f6".to_string(),
            secondary_color: "#64748b".to_string(),
            accent_color: "#8b5cf6".to_string(),
            font_family: "Inter, sans-serif".to_string(),
            font_size: "14px".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ThemeMode {
    Light,
    Dark,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    pub time_range: Option<TimeRange>,
    pub providers: Vec<String>,
    pub models: Vec<String>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserPreferences {
    pub refresh_interval: u64,
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
    pub timezone: String,
    pub date_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComponentType {
    Dashboard,
    MetricsOverview,
    PerformanceChart,
    ProviderHealth,
    CostAnalysis,
    ErrorAnalytics,
    UserActivity,
    SystemHealth,
    AlertsPanel,
    ConfigurationPanel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardUpdate {
    pub update_type: UpdateType,
    pub data: serde_json::Value,
    pub timestamp: i64,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UpdateType {
    MetricsUpdate,
    ProviderStatusChange,
    NewAlert,
    ConfigurationChange,
    UserAction,
}