//! Simulated flight controller.
//!
//! Stands in for real hardware in simulation mode and in tests. Records
//! every call in a shared [`SimLog`] so tests can assert on lifecycle
//! ordering (in particular that teardown runs exactly once).

use async_trait::async_trait;
use parking_lot::Mutex;
use sar_core::{Frame, LatLng, VelocityCommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use crate::{FlightController, FlightError, FlightResult, FlightTelemetry};

/// Shared call log of a [`SimController`]. Cheap to clone; survives the
/// controller it observes.
#[derive(Debug, Default)]
pub struct SimLog {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    takeoffs: AtomicUsize,
    lands: AtomicUsize,
    stream_ons: AtomicUsize,
    stream_offs: AtomicUsize,
    velocity_commands: Mutex<Vec<VelocityCommand>>,
}

impl SimLog {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn takeoffs(&self) -> usize {
        self.takeoffs.load(Ordering::SeqCst)
    }

    pub fn lands(&self) -> usize {
        self.lands.load(Ordering::SeqCst)
    }

    pub fn stream_ons(&self) -> usize {
        self.stream_ons.load(Ordering::SeqCst)
    }

    pub fn stream_offs(&self) -> usize {
        self.stream_offs.load(Ordering::SeqCst)
    }

    pub fn velocity_commands(&self) -> Vec<VelocityCommand> {
        self.velocity_commands.lock().clone()
    }
}

/// In-memory flight controller with scripted behavior.
pub struct SimController {
    name: String,
    log: Arc<SimLog>,
    connected: AtomicBool,
    streaming: AtomicBool,
    airborne: AtomicBool,
    battery: AtomicU8,
    fail_takeoff: AtomicBool,
    produce_frames: AtomicBool,
    frame_width: u32,
    frame_height: u32,
    position: Option<LatLng>,
}

impl SimController {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: Arc::new(SimLog::default()),
            connected: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            airborne: AtomicBool::new(false),
            battery: AtomicU8::new(100),
            fail_takeoff: AtomicBool::new(false),
            produce_frames: AtomicBool::new(true),
            frame_width: 960,
            frame_height: 720,
            position: None,
        }
    }

    /// Controller plus a handle to its call log.
    pub fn with_log(name: impl Into<String>) -> (Self, Arc<SimLog>) {
        let controller = Self::new(name);
        let log = controller.log.clone();
        (controller, log)
    }

    pub fn log(&self) -> Arc<SimLog> {
        self.log.clone()
    }

    pub fn set_battery(&self, level: u8) {
        self.battery.store(level.min(100), Ordering::SeqCst);
    }

    pub fn set_position(&mut self, position: LatLng) {
        self.position = Some(position);
    }

    /// Make the next takeoff fail, for abort-path tests.
    pub fn fail_takeoff(&self) {
        self.fail_takeoff.store(true, Ordering::SeqCst);
    }

    /// Toggle frame production to simulate a camera dropout.
    pub fn set_produce_frames(&self, produce: bool) {
        self.produce_frames.store(produce, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> FlightResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FlightError::NotConnected)
        }
    }
}

#[async_trait]
impl FlightController for SimController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> FlightResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> FlightResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.streaming.store(false, Ordering::SeqCst);
        self.log.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn takeoff(&mut self) -> FlightResult<()> {
        self.ensure_connected()?;
        if self.fail_takeoff.swap(false, Ordering::SeqCst) {
            return Err(FlightError::rejected("takeoff"));
        }
        self.airborne.store(true, Ordering::SeqCst);
        self.log.takeoffs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn land(&mut self) -> FlightResult<()> {
        self.airborne.store(false, Ordering::SeqCst);
        self.log.lands.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_velocity(&mut self, command: VelocityCommand) -> FlightResult<()> {
        self.ensure_connected()?;
        self.log.velocity_commands.lock().push(command);
        Ok(())
    }

    async fn stream_on(&mut self) -> FlightResult<()> {
        self.ensure_connected()?;
        self.streaming.store(true, Ordering::SeqCst);
        self.log.stream_ons.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stream_off(&mut self) -> FlightResult<()> {
        self.streaming.store(false, Ordering::SeqCst);
        self.log.stream_offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn frame(&mut self) -> FlightResult<Option<Frame>> {
        if self.streaming.load(Ordering::SeqCst) && self.produce_frames.load(Ordering::SeqCst) {
            Ok(Some(Frame::blank(self.frame_width, self.frame_height)))
        } else {
            Ok(None)
        }
    }

    async fn telemetry(&mut self) -> FlightResult<FlightTelemetry> {
        Ok(FlightTelemetry {
            battery_level: self.battery.load(Ordering::SeqCst),
            connected: self.streaming.load(Ordering::SeqCst),
            position: self.position,
        })
    }
}
