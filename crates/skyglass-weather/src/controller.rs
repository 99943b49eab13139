//! Fetch-cycle orchestration: geocode, then current conditions and forecast
//! in parallel, then reduce and publish.
//!
//! Every cycle takes a generation number when it starts. A cycle only writes
//! state while its generation is still the newest, so a slow cycle that was
//! superseded by a later trigger never overwrites the later result.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::forecast;
use crate::geocode::Geocoder;
use crate::location::LocationSource;
use crate::provider::WeatherProvider;
use crate::types::{Coordinates, CurrentConditions, ForecastEntry, UnitSystem, WeatherError};

/// Where the controller is in its fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No location known yet
    #[default]
    Idle,
    /// Geocoding in flight
    Resolving,
    /// Current conditions and forecast in flight
    Fetching,
    /// Data present
    Ready,
    /// Last cycle failed; data cleared
    Failed,
}

/// Everything a presentation layer needs to render
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeatherSnapshot {
    pub phase: Phase,
    pub location: String,
    pub unit: UnitSystem,
    pub coordinates: Option<Coordinates>,
    pub current: Option<CurrentConditions>,
    /// `None` until fetched; an empty list is a valid fetched result
    pub forecast: Option<Vec<ForecastEntry>>,
}

#[derive(Debug, Default)]
struct ControllerState {
    snapshot: WeatherSnapshot,
    generation: u64,
}

impl ControllerState {
    /// Start a new cycle, superseding any cycle still in flight.
    fn begin_cycle(&mut self, phase: Phase) -> u64 {
        self.generation += 1;
        self.snapshot.phase = phase;
        self.snapshot.current = None;
        self.snapshot.forecast = None;
        self.generation
    }
}

/// Parameters captured when a cycle starts
struct CyclePlan {
    generation: u64,
    location: String,
    unit: UnitSystem,
    coordinates: Option<Coordinates>,
}

/// Weather orchestrator
///
/// All operations take `&self`; share it through an `Arc` to let triggers
/// overlap.
#[derive(Debug)]
pub struct WeatherController {
    geocoder: Geocoder,
    provider: WeatherProvider,
    locator: LocationSource,
    state: Mutex<ControllerState>,
}

impl WeatherController {
    pub fn new(
        geocoder: Geocoder,
        provider: WeatherProvider,
        locator: LocationSource,
        unit: UnitSystem,
    ) -> Self {
        let state = ControllerState {
            snapshot: WeatherSnapshot {
                unit,
                ..WeatherSnapshot::default()
            },
            generation: 0,
        };

        Self {
            geocoder,
            provider,
            locator,
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> WeatherSnapshot {
        self.state.lock().snapshot.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().snapshot.phase
    }

    pub fn location(&self) -> String {
        self.state.lock().snapshot.location.clone()
    }

    pub fn unit(&self) -> UnitSystem {
        self.state.lock().snapshot.unit
    }

    /// Seed the location from the device position.
    ///
    /// Any failure here is silent: the location stays empty and no cycle runs.
    /// A location committed or typed while the lookup is in flight wins over
    /// the device position.
    pub async fn mount(&self) -> Phase {
        let generation = self.state.lock().generation;

        let position = match self.locator.current_position().await {
            Ok(position) => position,
            Err(e) => {
                tracing::debug!("Device location unavailable: {}", e);
                return self.phase();
            }
        };

        let name = match self
            .geocoder
            .resolve_location_name(position.latitude, position.longitude)
            .await
        {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Reverse geocode of device position failed: {}", e);
                return self.phase();
            }
        };

        let plan = {
            let mut state = self.state.lock();
            if state.generation != generation || !state.snapshot.location.trim().is_empty() {
                tracing::debug!("Location set while resolving device position; keeping it");
                return state.snapshot.phase;
            }
            tracing::info!("Device location resolved to {}", name);
            match Self::plan_commit(&mut state, &name) {
                Some(plan) => plan,
                None => return state.snapshot.phase,
            }
        };

        self.run_cycle(plan).await
    }

    /// Edit the location text without fetching.
    pub fn set_location(&self, text: &str) {
        let mut state = self.state.lock();
        if state.snapshot.location != text {
            state.snapshot.location = text.to_string();
            state.snapshot.coordinates = None;
        }
    }

    /// Commit a location and run a full fetch cycle for it.
    ///
    /// Blank text is stored but issues no requests.
    pub async fn commit_location(&self, text: &str) -> Phase {
        let plan = {
            let mut state = self.state.lock();
            match Self::plan_commit(&mut state, text) {
                Some(plan) => plan,
                None => return state.snapshot.phase,
            }
        };

        self.run_cycle(plan).await
    }

    fn plan_commit(state: &mut ControllerState, text: &str) -> Option<CyclePlan> {
        state.snapshot.location = text.to_string();
        state.snapshot.coordinates = None;
        if text.trim().is_empty() {
            return None;
        }
        Some(CyclePlan {
            generation: state.begin_cycle(Phase::Resolving),
            location: text.to_string(),
            unit: state.snapshot.unit,
            coordinates: None,
        })
    }

    /// Re-run the full cycle for the current location.
    pub async fn refresh(&self) -> Phase {
        let location = self.location();
        self.commit_location(&location).await
    }

    pub async fn toggle_unit(&self) -> Phase {
        self.change_unit(UnitSystem::toggled).await
    }

    pub async fn set_unit(&self, unit: UnitSystem) -> Phase {
        self.change_unit(|_| unit).await
    }

    /// Switch units. With a known location this re-fetches in the new unit,
    /// reusing the resolved coordinates when there are any.
    async fn change_unit(&self, next: impl FnOnce(&UnitSystem) -> UnitSystem) -> Phase {
        let plan = {
            let mut state = self.state.lock();
            let unit = next(&state.snapshot.unit);
            if unit == state.snapshot.unit {
                return state.snapshot.phase;
            }
            state.snapshot.unit = unit;

            if state.snapshot.location.trim().is_empty() {
                // drops any cycle still fetching in the old unit
                state.begin_cycle(Phase::Idle);
                return Phase::Idle;
            }

            let coordinates = state.snapshot.coordinates;
            let phase = if coordinates.is_some() {
                Phase::Fetching
            } else {
                Phase::Resolving
            };
            CyclePlan {
                generation: state.begin_cycle(phase),
                location: state.snapshot.location.clone(),
                unit,
                coordinates,
            }
        };

        self.run_cycle(plan).await
    }

    async fn run_cycle(&self, plan: CyclePlan) -> Phase {
        let CyclePlan {
            generation,
            location,
            unit,
            coordinates,
        } = plan;

        let coordinates = match coordinates {
            Some(c) => c,
            None => match self.geocoder.resolve_coordinates(&location).await {
                Ok(c) => {
                    let advanced = self.update_if_current(generation, |snapshot| {
                        // text edited mid-cycle: the coordinates belong to the old text
                        if snapshot.location == location {
                            snapshot.coordinates = Some(c);
                        }
                        snapshot.phase = Phase::Fetching;
                    });
                    if !advanced {
                        return self.discard_stale(generation, &location);
                    }
                    c
                }
                Err(e) => return self.fail(generation, &location, e),
            },
        };

        match self.provider.fetch_conditions(coordinates, unit).await {
            Ok((current, raw)) => {
                let days = forecast::reduce(raw);
                let day_count = days.len();
                let applied = self.update_if_current(generation, |snapshot| {
                    snapshot.current = Some(current);
                    snapshot.forecast = Some(days);
                    snapshot.phase = Phase::Ready;
                });
                if !applied {
                    return self.discard_stale(generation, &location);
                }
                tracing::info!(
                    "Weather ready for {} ({}, {} forecast days)",
                    location,
                    unit,
                    day_count
                );
                Phase::Ready
            }
            Err(e) => self.fail(generation, &location, e),
        }
    }

    /// Apply `f` only if no newer cycle has started since `generation`.
    fn update_if_current(
        &self,
        generation: u64,
        f: impl FnOnce(&mut WeatherSnapshot),
    ) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        f(&mut state.snapshot);
        true
    }

    fn fail(&self, generation: u64, location: &str, error: WeatherError) -> Phase {
        let applied = self.update_if_current(generation, |snapshot| {
            snapshot.phase = Phase::Failed;
            snapshot.current = None;
            snapshot.forecast = None;
        });
        if !applied {
            return self.discard_stale(generation, location);
        }
        tracing::warn!("Weather refresh for {} failed: {}", location, error);
        Phase::Failed
    }

    fn discard_stale(&self, generation: u64, location: &str) -> Phase {
        tracing::debug!(
            "Discarding result of superseded cycle {} for {}",
            generation,
            location
        );
        self.phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn controller_without_traffic(server: &MockServer) -> WeatherController {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;

        WeatherController::new(
            Geocoder::with_base_url("geo", &server.uri()).unwrap(),
            WeatherProvider::with_base_url("owm", &server.uri()).unwrap(),
            LocationSource::Disabled,
            UnitSystem::Metric,
        )
    }

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let server = MockServer::start().await;
        let controller = controller_without_traffic(&server).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.location.is_empty());
        assert!(snapshot.current.is_none());
        assert!(snapshot.forecast.is_none());
        assert_eq!(snapshot.unit, UnitSystem::Metric);
    }

    #[tokio::test]
    async fn test_blank_commit_issues_no_requests() {
        let server = MockServer::start().await;
        let controller = controller_without_traffic(&server).await;

        assert_eq!(controller.commit_location("").await, Phase::Idle);
        assert_eq!(controller.commit_location("   ").await, Phase::Idle);
    }

    #[tokio::test]
    async fn test_toggle_without_location_only_changes_unit() {
        let server = MockServer::start().await;
        let controller = controller_without_traffic(&server).await;

        assert_eq!(controller.toggle_unit().await, Phase::Idle);
        assert_eq!(controller.unit(), UnitSystem::Imperial);
        assert_eq!(controller.toggle_unit().await, Phase::Idle);
        assert_eq!(controller.unit(), UnitSystem::Metric);
    }

    #[tokio::test]
    async fn test_toggle_after_blank_commit_leaves_no_ready_without_data() {
        let server = MockServer::start().await;
        let controller = controller_without_traffic(&server).await;
        {
            let mut state = controller.state.lock();
            state.snapshot.phase = Phase::Ready;
            state.snapshot.location = "Oslo".to_string();
            state.snapshot.current = Some(CurrentConditions {
                temperature: 4.0,
                feels_like: 1.0,
                condition: "mist".to_string(),
                wind_speed: 2.0,
                humidity: 88,
            });
            state.snapshot.forecast = Some(Vec::new());
        }

        controller.commit_location("").await;
        assert_eq!(controller.toggle_unit().await, Phase::Idle);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.unit, UnitSystem::Imperial);
        assert!(snapshot.current.is_none());
        assert!(snapshot.forecast.is_none());
    }

    #[tokio::test]
    async fn test_set_same_unit_is_noop() {
        let server = MockServer::start().await;
        let controller = controller_without_traffic(&server).await;
        controller.set_location("Oslo");

        assert_eq!(controller.set_unit(UnitSystem::Metric).await, Phase::Idle);
    }

    #[tokio::test]
    async fn test_mount_without_device_location_stays_idle() {
        let server = MockServer::start().await;
        let controller = controller_without_traffic(&server).await;

        assert_eq!(controller.mount().await, Phase::Idle);
        assert!(controller.location().is_empty());
    }

    #[tokio::test]
    async fn test_set_location_does_not_fetch() {
        let server = MockServer::start().await;
        let controller = controller_without_traffic(&server).await;

        controller.set_location("Lisbon");
        assert_eq!(controller.location(), "Lisbon");
        assert_eq!(controller.phase(), Phase::Idle);
    }
}
