use crate::config::GhostConfig;
use crate::error::GeolocationError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single geolocation fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: f64,
    /// When the fix was captured, milliseconds since the Unix epoch
    pub captured_at_epoch_ms: i64,
}

impl GeoFix {
    /// Whether the fix is younger than `max_age`
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        let age_ms = Utc::now().timestamp_millis() - self.captured_at_epoch_ms;
        age_ms >= 0 && (age_ms as u128) <= max_age.as_millis()
    }
}

/// Kind of store the item was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    #[default]
    Thrift,
    Antique,
    Estate,
    Garage,
    Flea,
    Pawn,
    Auction,
    Retail,
    Other,
}

/// Where the item sits right now
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreInfo {
    pub store_type: StoreType,
    pub name: String,
    pub aisle: Option<String>,
}

/// How long the user is willing to spend acquiring and reselling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HandlingWindow {
    H12,
    #[default]
    H24,
    H48,
    H72,
}

impl HandlingWindow {
    pub fn hours(&self) -> u32 {
        match self {
            HandlingWindow::H12 => 12,
            HandlingWindow::H24 => 24,
            HandlingWindow::H48 => 48,
            HandlingWindow::H72 => 72,
        }
    }
}

/// How quickly an arbitrage opportunity should move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Velocity {
    High,
    Medium,
    Low,
}

impl Velocity {
    /// Pure step function over the margin percentage, boundaries at 50 and 100
    pub fn from_margin_percent(margin_percent: f64) -> Self {
        if margin_percent > 100.0 {
            Velocity::High
        } else if margin_percent > 50.0 {
            Velocity::Medium
        } else {
            Velocity::Low
        }
    }
}

/// Economics computed once the valuation is known
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GhostOutcome {
    pub estimated_margin: f64,
    pub margin_percent: f64,
    pub velocity: Velocity,
}

/// Snapshot of a ready arbitrage overlay, attached to a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostListing {
    pub location: GeoFix,
    pub store: StoreInfo,
    pub shelf_price: f64,
    pub handling: HandlingWindow,
}

/// Single-shot geolocation source. Implementations must resolve, reject,
/// or time out; they never retry on their own.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// Request one high-accuracy fix. `max_age` bounds how stale a fix the
    /// provider may serve from its own cache.
    async fn locate(
        &self,
        timeout: Duration,
        max_age: Duration,
    ) -> Result<GeoFix, GeolocationError>;
}

/// Geolocation provider with a fixed position, for configurations where
/// the operator supplies coordinates up front.
pub struct StaticLocationProvider {
    lat: f64,
    lng: f64,
}

impl StaticLocationProvider {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[async_trait]
impl GeolocationProvider for StaticLocationProvider {
    async fn locate(
        &self,
        _timeout: Duration,
        _max_age: Duration,
    ) -> Result<GeoFix, GeolocationError> {
        Ok(GeoFix {
            lat: self.lat,
            lng: self.lng,
            accuracy_m: 0.0,
            captured_at_epoch_ms: Utc::now().timestamp_millis(),
        })
    }
}

/// Draft state for the Ghost Mode arbitrage overlay. Created empty when
/// the mode is toggled on, mutated by user input, discarded when the
/// session closes.
pub struct GhostMode {
    config: GhostConfig,
    provider: Arc<dyn GeolocationProvider>,
    enabled: bool,
    cached_fix: Option<GeoFix>,
    store: StoreInfo,
    shelf_price: f64,
    handling: HandlingWindow,
    last_error: Option<String>,
}

impl GhostMode {
    pub fn new(config: GhostConfig, provider: Arc<dyn GeolocationProvider>) -> Self {
        Self {
            config,
            provider,
            enabled: false,
            cached_fix: None,
            store: StoreInfo::default(),
            shelf_price: 0.0,
            handling: HandlingWindow::default(),
            last_error: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn location(&self) -> Option<GeoFix> {
        self.cached_fix
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Toggle the overlay. Turning it on requests a location fix when no
    /// fresh one is cached; the request error, if any, is returned so the
    /// caller can prompt for retry, and leaves the mode enabled but not
    /// ready. Turning it off discards store input and error state but
    /// keeps a still-fresh fix for a re-enable within the session.
    pub async fn toggle(&mut self, enabled: bool) -> Result<(), GeolocationError> {
        if enabled == self.enabled {
            return Ok(());
        }

        if enabled {
            info!("Ghost Mode enabled");
            self.enabled = true;
            let max_age = Duration::from_secs(self.config.location_max_age_secs);
            let has_fresh_fix = self
                .cached_fix
                .map(|fix| fix.is_fresh(max_age))
                .unwrap_or(false);
            if !has_fresh_fix {
                self.cached_fix = None;
                return self.request_location().await;
            }
            debug!("Reusing cached location fix");
            Ok(())
        } else {
            info!("Ghost Mode disabled; discarding draft store info");
            self.enabled = false;
            self.store = StoreInfo::default();
            self.shelf_price = 0.0;
            self.handling = HandlingWindow::default();
            self.last_error = None;
            Ok(())
        }
    }

    /// Explicit user-driven retry after a location failure. Single-shot,
    /// like the initial request.
    pub async fn refresh_location(&mut self) -> Result<(), GeolocationError> {
        self.cached_fix = None;
        self.request_location().await
    }

    async fn request_location(&mut self) -> Result<(), GeolocationError> {
        let timeout = Duration::from_secs(self.config.location_timeout_secs);
        let max_age = Duration::from_secs(self.config.location_max_age_secs);

        debug!(
            "Requesting single-shot location fix (timeout {}s, max age {}s)",
            self.config.location_timeout_secs, self.config.location_max_age_secs
        );

        // Providers are not trusted to honor the timeout themselves
        let located = tokio::time::timeout(timeout, self.provider.locate(timeout, max_age))
            .await
            .unwrap_or(Err(GeolocationError::Timeout {
                timeout_secs: timeout.as_secs(),
            }));

        match located {
            Ok(fix) => {
                info!(
                    "Location fix acquired: ({:.5}, {:.5}) ±{:.0}m",
                    fix.lat, fix.lng, fix.accuracy_m
                );
                self.cached_fix = Some(fix);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("Location request failed: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn set_store(&mut self, store: StoreInfo) {
        self.store = store;
    }

    pub fn set_shelf_price(&mut self, shelf_price: f64) {
        self.shelf_price = shelf_price.max(0.0);
    }

    pub fn set_handling(&mut self, handling: HandlingWindow) {
        self.handling = handling;
    }

    /// The overlay is ready when a location is present, the store has a
    /// name, and the shelf price is positive.
    pub fn is_ready(&self) -> bool {
        self.cached_fix.is_some() && !self.store.name.is_empty() && self.shelf_price > 0.0
    }

    /// Margin, margin percentage, and velocity tier for a known valuation.
    /// Returns None when the overlay is not ready or the valuation is not
    /// yet known.
    pub fn compute_outcome(&self, estimated_value: Option<f64>) -> Option<GhostOutcome> {
        if !self.is_ready() {
            return None;
        }
        let estimated_value = estimated_value?;

        let estimated_margin = estimated_value - self.shelf_price;
        let margin_percent = if self.shelf_price > 0.0 {
            estimated_margin / self.shelf_price * 100.0
        } else {
            0.0
        };

        Some(GhostOutcome {
            estimated_margin,
            margin_percent,
            velocity: Velocity::from_margin_percent(margin_percent),
        })
    }

    /// Materialize the overlay for submission. Never produces a listing
    /// unless the readiness predicate holds.
    pub fn snapshot(&self) -> Option<GhostListing> {
        if !self.is_ready() {
            return None;
        }
        Some(GhostListing {
            location: self.cached_fix?,
            store: self.store.clone(),
            shelf_price: self.shelf_price,
            handling: self.handling,
        })
    }

    /// Discard all draft state, including any cached fix. Called on
    /// session close.
    pub fn reset(&mut self) {
        self.enabled = false;
        self.cached_fix = None;
        self.store = StoreInfo::default();
        self.shelf_price = 0.0;
        self.handling = HandlingWindow::default();
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProvider {
        fail: bool,
    }

    #[async_trait]
    impl GeolocationProvider for MockProvider {
        async fn locate(
            &self,
            timeout: Duration,
            _max_age: Duration,
        ) -> Result<GeoFix, GeolocationError> {
            if self.fail {
                Err(GeolocationError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            } else {
                Ok(GeoFix {
                    lat: 40.0,
                    lng: -74.0,
                    accuracy_m: 12.0,
                    captured_at_epoch_ms: Utc::now().timestamp_millis(),
                })
            }
        }
    }

    fn ghost(fail: bool) -> GhostMode {
        GhostMode::new(
            GhostConfig::default(),
            Arc::new(MockProvider { fail }),
        )
    }

    fn make_ready(ghost: &mut GhostMode) {
        ghost.set_store(StoreInfo {
            store_type: StoreType::Thrift,
            name: "Second Chance".to_string(),
            aisle: Some("B3".to_string()),
        });
        ghost.set_shelf_price(5.0);
    }

    #[tokio::test]
    async fn test_toggle_on_acquires_location() {
        let mut g = ghost(false);
        g.toggle(true).await.unwrap();
        assert!(g.is_enabled());
        assert!(g.location().is_some());
    }

    #[tokio::test]
    async fn test_toggle_on_failure_leaves_enabled_but_not_ready() {
        let mut g = ghost(true);
        let result = g.toggle(true).await;
        assert!(result.is_err());
        assert!(g.is_enabled());
        assert!(!g.is_ready());
        assert!(g.last_error().is_some());
    }

    #[tokio::test]
    async fn test_toggle_off_discards_store_but_keeps_fresh_fix() {
        let mut g = ghost(false);
        g.toggle(true).await.unwrap();
        make_ready(&mut g);
        assert!(g.is_ready());

        g.toggle(false).await.unwrap();
        assert!(!g.is_enabled());
        assert!(!g.is_ready());
        // Fresh fix survives an off-on cycle within the session
        assert!(g.location().is_some());

        g.toggle(true).await.unwrap();
        assert!(g.location().is_some());
    }

    #[tokio::test]
    async fn test_readiness_requires_all_three_inputs() {
        // Exhaustive over the incomplete combinations of
        // {location, store name, positive price}
        for bits in 0u8..7 {
            let has_location = bits & 1 != 0;
            let has_name = bits & 2 != 0;
            let has_price = bits & 4 != 0;

            let mut g = ghost(!has_location);
            let _ = g.toggle(true).await;
            if has_name {
                g.set_store(StoreInfo {
                    store_type: StoreType::Pawn,
                    name: "Goldies".to_string(),
                    aisle: None,
                });
            }
            if has_price {
                g.set_shelf_price(9.99);
            }

            assert!(
                !g.is_ready(),
                "combination location={} name={} price={} must not be ready",
                has_location,
                has_name,
                has_price
            );
            assert!(g.compute_outcome(Some(100.0)).is_none());
            assert!(g.snapshot().is_none());
        }

        let mut g = ghost(false);
        g.toggle(true).await.unwrap();
        make_ready(&mut g);
        assert!(g.is_ready());
    }

    #[tokio::test]
    async fn test_outcome_math() {
        // Scenario: $5 shelf price, $20 estimate
        let mut g = ghost(false);
        g.toggle(true).await.unwrap();
        make_ready(&mut g);

        let outcome = g.compute_outcome(Some(20.0)).unwrap();
        assert_eq!(outcome.estimated_margin, 15.0);
        assert_eq!(outcome.margin_percent, 300.0);
        assert_eq!(outcome.velocity, Velocity::High);

        assert!(g.compute_outcome(None).is_none());
    }

    #[test]
    fn test_velocity_boundaries() {
        assert_eq!(Velocity::from_margin_percent(50.0), Velocity::Low);
        assert_eq!(Velocity::from_margin_percent(50.1), Velocity::Medium);
        assert_eq!(Velocity::from_margin_percent(100.0), Velocity::Medium);
        assert_eq!(Velocity::from_margin_percent(100.1), Velocity::High);
        assert_eq!(Velocity::from_margin_percent(-10.0), Velocity::Low);
    }

    #[tokio::test]
    async fn test_snapshot_carries_draft_fields() {
        let mut g = ghost(false);
        g.toggle(true).await.unwrap();
        make_ready(&mut g);
        g.set_handling(HandlingWindow::H48);

        let listing = g.snapshot().unwrap();
        assert_eq!(listing.store.name, "Second Chance");
        assert_eq!(listing.shelf_price, 5.0);
        assert_eq!(listing.handling.hours(), 48);
    }

    #[tokio::test]
    async fn test_reset_discards_everything() {
        let mut g = ghost(false);
        g.toggle(true).await.unwrap();
        make_ready(&mut g);

        g.reset();
        assert!(!g.is_enabled());
        assert!(g.location().is_none());
        assert!(!g.is_ready());
    }

    #[test]
    fn test_negative_shelf_price_is_clamped() {
        let mut g = ghost(false);
        g.set_shelf_price(-3.0);
        assert!(!g.is_ready());
        assert!(g.snapshot().is_none());
    }

    struct HangingProvider;

    #[async_trait]
    impl GeolocationProvider for HangingProvider {
        async fn locate(
            &self,
            _timeout: Duration,
            _max_age: Duration,
        ) -> Result<GeoFix, GeolocationError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_is_bounded_by_timeout() {
        let mut g = GhostMode::new(GhostConfig::default(), Arc::new(HangingProvider));
        let result = g.toggle(true).await;
        assert!(matches!(result, Err(GeolocationError::Timeout { .. })));
        assert!(!g.is_ready());
    }

    #[test]
    fn test_stale_fix_is_not_fresh() {
        let fix = GeoFix {
            lat: 0.0,
            lng: 0.0,
            accuracy_m: 5.0,
            captured_at_epoch_ms: Utc::now().timestamp_millis() - 120_000,
        };
        assert!(!fix.is_fresh(Duration::from_secs(60)));
        assert!(fix.is_fresh(Duration::from_secs(300)));
    }
}
