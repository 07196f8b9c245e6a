//! One streaming session: command dispatch, the tick pipeline, and the
//! guaranteed controller teardown.
//!
//! A `Session` owns at most one flight controller, acquired on `DEPLOY` and
//! released exactly once on every exit path. Sessions for distinct
//! connections share nothing mutable except the persistence sink and the
//! deployment registry.

use chrono::{DateTime, Utc};
use sar_core::{
    ClientCommand, ControlReply, Detection, DroneStatusSnapshot, Frame, PersonReport,
    TickMessage, VelocityCommand,
};
use sar_db::PersonRecord;
use sar_flight::{BoxedController, FlightTelemetry};
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::SessionContext;
use crate::error::{SessionError, SessionResult};

/// Server-side state for one streaming socket connection.
pub struct Session {
    id: Uuid,
    ctx: SessionContext,
    /// Owned flight controller, present between a successful `DEPLOY` and
    /// teardown.
    controller: Option<BoxedController>,
    /// Last telemetry successfully read, reused when a read times out.
    last_telemetry: Option<FlightTelemetry>,
    last_tick_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
            controller: None,
            last_telemetry: None,
            last_tick_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_deployed(&self) -> bool {
        self.controller.is_some()
    }

    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        self.last_tick_at
    }

    // ========================================================================
    // COMMAND DISPATCH
    // ========================================================================

    /// Handle one inbound command, returning a reply to send when there is
    /// one. Never fatal: failures degrade to an error reply or a log line.
    pub async fn handle_command(&mut self, command: ClientCommand) -> Option<ControlReply> {
        match command {
            ClientCommand::Deploy => match self.deploy().await {
                Ok(()) => None,
                Err(e) => {
                    warn!("Session {}: deploy failed: {}", self.id, e);
                    Some(ControlReply::Error {
                        message: format!("deploy rejected: {}", e),
                    })
                }
            },
            ClientCommand::Move { x, y, z, yaw } => {
                self.handle_move(x, y, z, yaw).await;
                None
            }
            ClientCommand::GetDrones => Some(ControlReply::Drones {
                drones: self.ctx.fleet.known_drones.clone(),
            }),
            ClientCommand::Query { .. } => {
                self.ctx.metrics.record_invalid_command();
                Some(ControlReply::Error {
                    message: "queries are only available on the agent socket".into(),
                })
            }
        }
    }

    /// Forward a velocity command. Silently ignored while no controller is
    /// acquired.
    async fn handle_move(&mut self, x: i32, y: i32, z: i32, yaw: i32) {
        let Some(controller) = self.controller.as_mut() else {
            debug!("Session {}: MOVE ignored, no controller deployed", self.id);
            return;
        };

        // Wire order is (x, y, z, yaw) = (left/right, forward/back, up/down,
        // yaw), matching the SDK's rc argument order.
        let command = VelocityCommand::new(y, x, z, yaw).clamped();

        match timeout(
            self.ctx.config.adapter_timeout,
            controller.set_velocity(command),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Session {}: velocity command failed: {}", self.id, e),
            Err(_) => {
                self.ctx.metrics.record_adapter_timeout();
                warn!(
                    "Session {}: {}",
                    self.id,
                    SessionError::timeout("set_velocity")
                );
            }
        }
    }

    // ========================================================================
    // DEPLOYMENT
    // ========================================================================

    /// Acquire a controller, arm it, and run the deployment mission script.
    /// On any failure the partially armed controller is shut down and the
    /// deployment slot released before returning.
    async fn deploy(&mut self) -> SessionResult<()> {
        if self.controller.is_some() {
            return Err(SessionError::invalid("controller already deployed"));
        }
        if !self.ctx.deployments.try_acquire(self.id) {
            return Err(SessionError::unavailable(
                "another session owns the flight controller",
            ));
        }

        let mut controller = (self.ctx.controllers)();
        info!(
            "Session {}: deploying controller {:?} with mission {:?}",
            self.id,
            controller.name(),
            self.ctx.mission.name()
        );

        match self.arm(&mut controller).await {
            Ok(()) => {
                self.ctx.metrics.deployment_started();
                self.controller = Some(controller);
                Ok(())
            }
            Err(e) => {
                // Abort safely: the drone may already be airborne.
                self.shutdown_controller(&mut controller).await;
                self.ctx.deployments.release(self.id);
                Err(e)
            }
        }
    }

    async fn arm(&self, controller: &mut BoxedController) -> SessionResult<()> {
        let bound = self.ctx.config.adapter_timeout;

        match timeout(bound, controller.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SessionError::unavailable(format!("connect: {}", e))),
            Err(_) => return Err(SessionError::timeout("connect")),
        }

        match timeout(bound, controller.stream_on()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SessionError::unavailable(format!("streamon: {}", e))),
            Err(_) => return Err(SessionError::timeout("streamon")),
        }

        self.ctx
            .mission
            .execute(controller.as_mut(), self.ctx.config.mission_step_timeout)
            .await
            .map_err(|e| SessionError::unavailable(format!("mission aborted: {}", e)))
    }

    // ========================================================================
    // TICK PIPELINE
    // ========================================================================

    /// Run one tick: capture, detect, persist, and build the outbound
    /// message. Returns `None` when there is nothing to push this tick
    /// (no controller, or frame capture yielded no frame).
    pub async fn tick(&mut self) -> Option<TickMessage> {
        self.last_tick_at = Some(Utc::now());

        if self.controller.is_none() {
            return None;
        }

        let started = Instant::now();

        let Some(frame) = self.capture_frame().await else {
            self.ctx.metrics.record_missing_frame();
            return None;
        };

        let detections = self.run_detection(&frame).await;
        let encoded = self.encode_frame(&frame, &detections);
        let status = self.read_status().await;

        self.persist(&detections, &status).await;

        self.ctx
            .metrics
            .record_tick(started.elapsed().as_secs_f64(), detections.len() as u64);

        Some(TickMessage {
            persons: detections.iter().map(PersonReport::from).collect(),
            frame: encoded,
            drone_status: status,
        })
    }

    async fn capture_frame(&mut self) -> Option<Frame> {
        let controller = self.controller.as_mut()?;
        match timeout(self.ctx.config.adapter_timeout, controller.frame()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                warn!("Session {}: frame capture failed: {}", self.id, e);
                None
            }
            Err(_) => {
                self.ctx.metrics.record_adapter_timeout();
                warn!("Session {}: {}", self.id, SessionError::timeout("frame"));
                None
            }
        }
    }

    /// Inference is a blocking external call; run it off the async worker
    /// and bound it like every other adapter call.
    async fn run_detection(&self, frame: &Frame) -> Vec<Detection> {
        let detector = self.ctx.detector.clone();
        let frame = frame.clone();
        let task = tokio::task::spawn_blocking(move || detector.detect(&frame));

        match timeout(self.ctx.config.adapter_timeout, task).await {
            Ok(Ok(Ok(detections))) => detections,
            Ok(Ok(Err(e))) => {
                warn!("Session {}: detection failed: {}", self.id, e);
                Vec::new()
            }
            Ok(Err(join)) => {
                warn!("Session {}: detection task failed: {}", self.id, join);
                Vec::new()
            }
            Err(_) => {
                self.ctx.metrics.record_adapter_timeout();
                warn!("Session {}: {}", self.id, SessionError::timeout("detect"));
                Vec::new()
            }
        }
    }

    fn encode_frame(&self, frame: &Frame, detections: &[Detection]) -> String {
        match self.ctx.encoder.annotate_and_encode(frame, detections) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Session {}: frame encode failed: {}", self.id, e);
                String::new()
            }
        }
    }

    async fn read_status(&mut self) -> DroneStatusSnapshot {
        let name = self
            .controller
            .as_ref()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "Drone 1".to_string());

        let telemetry = match self.controller.as_mut() {
            Some(controller) => {
                match timeout(self.ctx.config.adapter_timeout, controller.telemetry()).await {
                    Ok(Ok(telemetry)) => {
                        self.last_telemetry = Some(telemetry);
                        Some(telemetry)
                    }
                    Ok(Err(e)) => {
                        warn!("Session {}: telemetry read failed: {}", self.id, e);
                        self.last_telemetry
                    }
                    Err(_) => {
                        self.ctx.metrics.record_adapter_timeout();
                        warn!("Session {}: {}", self.id, SessionError::timeout("telemetry"));
                        self.last_telemetry
                    }
                }
            }
            None => None,
        };

        match telemetry {
            Some(t) => {
                let mut status = DroneStatusSnapshot::new(name, t.connected, t.battery_level);
                if self.ctx.config.report_position {
                    status.location = t.position;
                }
                status
            }
            None => DroneStatusSnapshot::offline(name),
        }
    }

    /// Best-effort writes. Failures are logged and counted; they never delay
    /// or drop the outbound telemetry message.
    async fn persist(&self, detections: &[Detection], status: &DroneStatusSnapshot) {
        let bound = self.ctx.config.adapter_timeout;
        let image_ref = format!("frame-{}", status.timestamp.timestamp_millis());

        for detection in detections.iter().filter(|d| d.is_person()) {
            let record = PersonRecord::new(detection.confidence, detection.bbox, &image_ref);
            match timeout(bound, self.ctx.store.insert_person(&record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.ctx.metrics.record_persistence_failure();
                    warn!("Session {}: person insert failed: {}", self.id, e);
                }
                Err(_) => {
                    self.ctx.metrics.record_persistence_failure();
                    warn!("Session {}: person insert timed out", self.id);
                }
            }
        }

        match timeout(bound, self.ctx.store.insert_drone_status(status)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.ctx.metrics.record_persistence_failure();
                warn!("Session {}: status insert failed: {}", self.id, e);
            }
            Err(_) => {
                self.ctx.metrics.record_persistence_failure();
                warn!("Session {}: status insert timed out", self.id);
            }
        }
    }

    // ========================================================================
    // TEARDOWN
    // ========================================================================

    /// Release the owned controller: land, stream off, disconnect, free the
    /// deployment slot. Runs the sequence at most once no matter how many
    /// exit paths reach it.
    pub async fn teardown(&mut self) {
        let Some(mut controller) = self.controller.take() else {
            return;
        };

        info!(
            "Session {}: tearing down controller {:?}",
            self.id,
            controller.name()
        );
        self.shutdown_controller(&mut controller).await;
        self.ctx.deployments.release(self.id);
        self.ctx.metrics.deployment_ended();
    }

    /// Land / stream-off / disconnect, each bounded and best-effort; a
    /// failure in one step must not skip the rest.
    async fn shutdown_controller(&self, controller: &mut BoxedController) {
        let bound = self.ctx.config.adapter_timeout;

        if !matches!(timeout(bound, controller.land()).await, Ok(Ok(()))) {
            warn!("Session {}: land during teardown did not confirm", self.id);
        }
        if !matches!(timeout(bound, controller.stream_off()).await, Ok(Ok(()))) {
            warn!("Session {}: streamoff during teardown failed", self.id);
        }
        if !matches!(timeout(bound, controller.disconnect()).await, Ok(Ok(()))) {
            warn!("Session {}: disconnect during teardown failed", self.id);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::TestHarness;
    use async_trait::async_trait;
    use sar_core::HazardKind;
    use sar_db::{DbError, DbResult, RescueStore};

    /// Store whose writes always fail, for best-effort-path assertions.
    struct FailingStore;

    #[async_trait]
    impl RescueStore for FailingStore {
        async fn insert_person(&self, _: &PersonRecord) -> DbResult<()> {
            Err(DbError::query("disk on fire"))
        }
        async fn insert_drone_status(&self, _: &DroneStatusSnapshot) -> DbResult<()> {
            Err(DbError::query("disk on fire"))
        }
        async fn insert_hazard(&self, _: &sar_core::Hazard) -> DbResult<()> {
            Err(DbError::query("disk on fire"))
        }
        async fn recent_persons(&self, _: usize) -> DbResult<Vec<PersonRecord>> {
            Err(DbError::query("disk on fire"))
        }
        async fn latest_drone_status(&self) -> DbResult<Option<DroneStatusSnapshot>> {
            Err(DbError::query("disk on fire"))
        }
        async fn list_hazards(&self, _: Option<&[HazardKind]>) -> DbResult<Vec<sar_core::Hazard>> {
            Err(DbError::query("disk on fire"))
        }
        async fn execute_read_only(&self, _: &str) -> DbResult<Vec<serde_json::Value>> {
            Err(DbError::query("disk on fire"))
        }
    }

    #[tokio::test]
    async fn test_move_before_deploy_is_ignored() {
        let harness = TestHarness::new();
        let mut session = Session::new(harness.ctx.clone());

        for _ in 0..5 {
            let reply = session
                .handle_command(ClientCommand::Move {
                    x: 50,
                    y: 50,
                    z: 0,
                    yaw: 10,
                })
                .await;
            assert!(reply.is_none());
        }

        // No controller was ever created, so nothing received a velocity.
        assert!(harness.controller_logs().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_runs_mission_and_move_is_forwarded_clamped() {
        let harness = TestHarness::new();
        let mut session = Session::new(harness.ctx.clone());

        assert!(session.handle_command(ClientCommand::Deploy).await.is_none());
        assert!(session.is_deployed());

        session
            .handle_command(ClientCommand::Move {
                x: 250,
                y: -250,
                z: 10,
                yaw: 0,
            })
            .await;

        let log = harness.controller_logs().pop().unwrap();
        assert_eq!(log.takeoffs(), 1);
        let commands = log.velocity_commands();
        let forwarded = commands.last().unwrap();
        assert_eq!(forwarded.left_right, 100);
        assert_eq!(forwarded.forward_back, -100);
        assert_eq!(forwarded.up_down, 10);
    }

    #[tokio::test]
    async fn test_teardown_runs_exactly_once() {
        let harness = TestHarness::new();
        let mut session = Session::new(harness.ctx.clone());

        session.handle_command(ClientCommand::Deploy).await;
        session.teardown().await;
        session.teardown().await;
        session.teardown().await;

        let log = harness.controller_logs().pop().unwrap();
        assert_eq!(log.lands(), 1);
        assert_eq!(log.stream_offs(), 1);
        assert_eq!(log.disconnects(), 1);
        assert!(!harness.ctx.deployments.is_active());
    }

    #[tokio::test]
    async fn test_second_session_deploy_rejected() {
        let harness = TestHarness::new();
        let mut first = Session::new(harness.ctx.clone());
        let mut second = Session::new(harness.ctx.clone());

        assert!(first.handle_command(ClientCommand::Deploy).await.is_none());

        let reply = second.handle_command(ClientCommand::Deploy).await;
        assert!(matches!(reply, Some(ControlReply::Error { .. })));
        assert!(!second.is_deployed());
        // Only the first session's controller exists.
        assert_eq!(harness.controller_logs().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mission_aborts_safely() {
        let harness = TestHarness::new().with_failing_takeoff();
        let mut session = Session::new(harness.ctx.clone());

        let reply = session.handle_command(ClientCommand::Deploy).await;
        assert!(matches!(reply, Some(ControlReply::Error { .. })));
        assert!(!session.is_deployed());
        // Slot is free again for a retry.
        assert!(!harness.ctx.deployments.is_active());

        let log = harness.controller_logs().pop().unwrap();
        assert_eq!(log.lands(), 1);
        assert_eq!(log.stream_offs(), 1);
    }

    #[tokio::test]
    async fn test_tick_without_controller_is_quiet() {
        let harness = TestHarness::new();
        let mut session = Session::new(harness.ctx.clone());

        assert!(session.tick().await.is_none());
        assert!(session.last_tick_at().is_some());
    }

    #[tokio::test]
    async fn test_tick_produces_message_and_persists() {
        let harness = TestHarness::new();
        let mut session = Session::new(harness.ctx.clone());
        session.handle_command(ClientCommand::Deploy).await;

        let message = session.tick().await.expect("tick message");
        assert_eq!(message.persons.len(), 1);
        assert!(message.persons[0].confidence > 0.0);
        assert!(!message.frame.is_empty());
        assert!(message.drone_status.is_connected);
        assert!(message.drone_status.location.is_some());

        assert_eq!(harness.store.person_count(), 1);
        assert_eq!(harness.store.status_count(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_drop_tick() {
        let harness = TestHarness::new().with_store(std::sync::Arc::new(FailingStore));
        let mut session = Session::new(harness.ctx.clone());
        session.handle_command(ClientCommand::Deploy).await;

        let message = session.tick().await;
        assert!(message.is_some());
    }

    #[tokio::test]
    async fn test_missing_frame_skips_tick_but_session_lives() {
        let harness = TestHarness::new().without_frames();
        let mut session = Session::new(harness.ctx.clone());
        session.handle_command(ClientCommand::Deploy).await;

        assert!(session.tick().await.is_none());

        // Commands still work afterwards.
        let reply = session.handle_command(ClientCommand::GetDrones).await;
        assert!(matches!(reply, Some(ControlReply::Drones { .. })));
    }

    #[tokio::test]
    async fn test_get_drones_before_any_deploy() {
        let harness = TestHarness::new();
        let mut session = Session::new(harness.ctx.clone());

        let reply = session.handle_command(ClientCommand::GetDrones).await;
        match reply {
            Some(ControlReply::Drones { drones }) => {
                assert_eq!(drones.len(), harness.ctx.fleet.known_drones.len())
            }
            other => panic!("expected drone roster, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_position_reporting_is_configurable() {
        let harness = TestHarness::new().without_position_reporting();
        let mut session = Session::new(harness.ctx.clone());
        session.handle_command(ClientCommand::Deploy).await;

        let message = session.tick().await.expect("tick message");
        // Never a fabricated 0,0 pair; the field is simply absent.
        assert!(message.drone_status.location.is_none());
    }
}
