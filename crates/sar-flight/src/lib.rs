//! # SAR Flight
//!
//! Flight-controller adapter for the search-and-rescue drone server.
//! Wraps the drone SDK behind a narrow interface: connect/disconnect,
//! takeoff/land, velocity-vector commands, video stream toggles, frame
//! capture and telemetry.
//!
//! Every operation may block briefly (hardware round-trip); callers must not
//! assume sub-millisecond latency. The adapter enforces no reentrancy guard:
//! exactly one owner at a time, and the owning session is responsible for
//! serializing access.

pub mod error;
pub mod mission;
pub mod sim;
pub mod tello;

pub use error::{FlightError, FlightResult};
pub use mission::{MissionScript, MissionStep};
pub use sim::{SimController, SimLog};
pub use tello::TelloController;

use async_trait::async_trait;
use sar_core::{Frame, LatLng, VelocityCommand};

/// Telemetry read from the flight controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightTelemetry {
    /// Battery percentage (0-100).
    pub battery_level: u8,
    pub connected: bool,
    /// GPS fix, if the hardware has one.
    pub position: Option<LatLng>,
}

/// Narrow interface over a drone flight-control SDK.
#[async_trait]
pub trait FlightController: Send + Sync {
    /// Controller identity, e.g. "Drone 1".
    fn name(&self) -> &str;

    async fn connect(&mut self) -> FlightResult<()>;

    async fn disconnect(&mut self) -> FlightResult<()>;

    async fn takeoff(&mut self) -> FlightResult<()>;

    async fn land(&mut self) -> FlightResult<()>;

    /// Forward a four-axis velocity command. Components must already be
    /// clamped to the SDK's accepted range.
    async fn set_velocity(&mut self, command: VelocityCommand) -> FlightResult<()>;

    async fn stream_on(&mut self) -> FlightResult<()>;

    async fn stream_off(&mut self) -> FlightResult<()>;

    /// Latest captured frame, or `None` when the stream has not produced one.
    async fn frame(&mut self) -> FlightResult<Option<Frame>>;

    async fn telemetry(&mut self) -> FlightResult<FlightTelemetry>;
}

/// Owned controller handle as produced by a factory.
pub type BoxedController = Box<dyn FlightController>;

/// Factory producing fresh controller instances, one per deployment.
pub type ControllerFactory = std::sync::Arc<dyn Fn() -> BoxedController + Send + Sync>;
