//! Shared dependencies handed to every session.

use sar_agent::AgentBridge;
use sar_db::RescueStore;
use sar_detector::{FrameEncoder, ObjectDetector};
use sar_flight::{ControllerFactory, MissionScript};
use sar_telemetry::MetricsCollector;
use std::sync::Arc;

use crate::config::{FleetConfig, SessionConfig};
use crate::deploy::DeploymentRegistry;
use crate::registry::SessionRegistry;

/// Everything a session needs besides its socket. Cloned per connection;
/// the only shared mutable pieces are the persistence sink and the
/// deployment registry.
#[derive(Clone)]
pub struct SessionContext {
    pub config: SessionConfig,
    pub fleet: FleetConfig,
    pub detector: Arc<dyn ObjectDetector>,
    pub encoder: Arc<FrameEncoder>,
    pub store: Arc<dyn RescueStore>,
    /// Produces a fresh controller for each deployment.
    pub controllers: ControllerFactory,
    pub deployments: Arc<DeploymentRegistry>,
    /// Live streaming sessions, for the status endpoint.
    pub sessions: Arc<SessionRegistry>,
    /// Script flown on `DEPLOY`.
    pub mission: Arc<MissionScript>,
    pub metrics: Arc<MetricsCollector>,
    pub bridge: Arc<AgentBridge>,
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use sar_agent::{AgentConfig, ScriptedRuntime};
    use sar_core::{Detection, PixelBox};
    use sar_db::MemoryStore;
    use sar_detector::{DetectorConfig, ScriptedDetector};
    use sar_flight::{MissionStep, SimController, SimLog};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// A mission short enough for unit tests.
    pub fn quick_mission() -> MissionScript {
        MissionScript::new(
            "test-mission",
            vec![
                MissionStep::Takeoff,
                MissionStep::Hover {
                    duration: Duration::from_millis(1),
                },
            ],
        )
    }

    #[derive(Default)]
    struct FactoryOptions {
        fail_takeoff: AtomicBool,
        no_frames: AtomicBool,
    }

    /// Ready-made [`SessionContext`] over simulated adapters, with handles
    /// to everything tests assert on.
    pub struct TestHarness {
        pub ctx: SessionContext,
        pub store: Arc<MemoryStore>,
        logs: Arc<Mutex<Vec<Arc<SimLog>>>>,
        options: Arc<FactoryOptions>,
    }

    impl TestHarness {
        pub fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let logs: Arc<Mutex<Vec<Arc<SimLog>>>> = Arc::new(Mutex::new(Vec::new()));
            let options = Arc::new(FactoryOptions::default());

            let factory_logs = logs.clone();
            let factory_options = options.clone();
            let controllers: ControllerFactory = Arc::new(move || {
                let mut controller = SimController::new("Drone 1");
                controller.set_position(sar_core::LatLng::new(37.7749, -122.4194));
                if factory_options.fail_takeoff.load(Ordering::SeqCst) {
                    controller.fail_takeoff();
                }
                if factory_options.no_frames.load(Ordering::SeqCst) {
                    controller.set_produce_frames(false);
                }
                factory_logs.lock().push(controller.log());
                Box::new(controller)
            });

            let detector = ScriptedDetector::new(
                DetectorConfig::person_only(),
                vec![vec![Detection::new(
                    "person",
                    0.91,
                    PixelBox::new(100, 100, 200, 300),
                )]],
            );

            let bridge = AgentBridge::new(
                Arc::new(ScriptedRuntime::new(Vec::new())),
                store.clone(),
                AgentConfig::default(),
            );

            let ctx = SessionContext {
                config: SessionConfig {
                    tick_interval: Duration::from_millis(10),
                    adapter_timeout: Duration::from_millis(500),
                    mission_step_timeout: Duration::from_millis(500),
                    report_position: true,
                    agent_idle_timeout: Duration::from_secs(120),
                },
                fleet: FleetConfig::with_names(["Drone 1"]),
                detector: Arc::new(detector),
                encoder: Arc::new(FrameEncoder::default()),
                store: store.clone(),
                controllers,
                deployments: Arc::new(DeploymentRegistry::new()),
                sessions: Arc::new(SessionRegistry::new()),
                mission: Arc::new(quick_mission()),
                metrics: Arc::new(MetricsCollector::new().expect("metrics")),
                bridge: Arc::new(bridge),
            };

            Self {
                ctx,
                store,
                logs,
                options,
            }
        }

        pub fn with_failing_takeoff(self) -> Self {
            self.options.fail_takeoff.store(true, Ordering::SeqCst);
            self
        }

        pub fn without_frames(self) -> Self {
            self.options.no_frames.store(true, Ordering::SeqCst);
            self
        }

        pub fn without_position_reporting(mut self) -> Self {
            self.ctx.config.report_position = false;
            self
        }

        pub fn with_store(mut self, store: Arc<dyn RescueStore>) -> Self {
            self.ctx.store = store;
            self
        }

        /// Call logs of every controller the factory produced, in order.
        pub fn controller_logs(&self) -> Vec<Arc<SimLog>> {
            self.logs.lock().clone()
        }
    }
}
