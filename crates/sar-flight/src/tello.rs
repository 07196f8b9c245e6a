//! Tello SDK controller over UDP.
//!
//! Speaks the text command protocol on port 8889 ("command", "takeoff",
//! "rc a b c d", ...). Control commands expect an "ok" reply; `rc` commands
//! are fire-and-forget per the SDK. Video arrives as an H.264 stream on UDP
//! 11111 and is decoded through OpenCV when the `opencv` feature is enabled.

use async_trait::async_trait;
use sar_core::{Frame, VelocityCommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{FlightController, FlightError, FlightResult, FlightTelemetry};

/// Default Tello command endpoint on its own access point.
pub const DEFAULT_TELLO_ADDR: &str = "192.168.10.1:8889";

/// Port the drone pushes its video stream to.
pub const VIDEO_PORT: u16 = 11111;

/// Flight controller speaking the Tello UDP text protocol.
pub struct TelloController {
    name: String,
    addr: SocketAddr,
    socket: Option<UdpSocket>,
    response_timeout: Duration,
    streaming: bool,
    /// Latest decoded frame from the video task.
    frame_rx: Option<watch::Receiver<Option<Frame>>>,
    video_stop: Arc<AtomicBool>,
}

impl TelloController {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
            socket: None,
            response_timeout: Duration::from_secs(7),
            streaming: false,
            frame_rx: None,
            video_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Controller talking to a drone on its default access-point address.
    pub fn on_default_network(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_TELLO_ADDR.parse().expect("valid constant"))
    }

    /// Send a control command and wait for the drone's reply.
    async fn command(&mut self, cmd: &str) -> FlightResult<String> {
        let socket = self.socket.as_ref().ok_or(FlightError::NotConnected)?;

        debug!("Tello <- {}", cmd);
        socket.send(cmd.as_bytes()).await?;

        let mut buf = [0u8; 256];
        let len = tokio::time::timeout(self.response_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| FlightError::timeout(cmd))??;

        let reply = String::from_utf8_lossy(&buf[..len]).trim().to_string();
        debug!("Tello -> {}", reply);

        if reply.eq_ignore_ascii_case("error") {
            return Err(FlightError::rejected(cmd));
        }
        Ok(reply)
    }

    /// Fire-and-forget send; `rc` commands get no reply from the SDK.
    async fn send_only(&self, cmd: &str) -> FlightResult<()> {
        let socket = self.socket.as_ref().ok_or(FlightError::NotConnected)?;
        socket.send(cmd.as_bytes()).await?;
        Ok(())
    }

    #[cfg(feature = "opencv")]
    fn spawn_video_task(&mut self) {
        let (tx, rx) = watch::channel(None);
        self.frame_rx = Some(rx);

        let stop = self.video_stop.clone();
        stop.store(false, Ordering::SeqCst);

        tokio::task::spawn_blocking(move || {
            use opencv::{prelude::*, videoio};

            let url = format!("udp://@0.0.0.0:{}", VIDEO_PORT);
            let mut capture = match videoio::VideoCapture::from_file(&url, videoio::CAP_FFMPEG) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("Video capture open failed: {}", e);
                    return;
                }
            };

            let mut mat = opencv::core::Mat::default();
            while !stop.load(Ordering::SeqCst) {
                match capture.read(&mut mat) {
                    Ok(true) => {
                        let (w, h) = (mat.cols() as u32, mat.rows() as u32);
                        if let Ok(bytes) = mat.data_bytes() {
                            let _ = tx.send(Some(Frame::new(bytes.to_vec(), w, h)));
                        }
                    }
                    Ok(false) => std::thread::sleep(Duration::from_millis(10)),
                    Err(e) => {
                        tracing::warn!("Video read failed: {}", e);
                        break;
                    }
                }
            }
        });
    }

    #[cfg(not(feature = "opencv"))]
    fn spawn_video_task(&mut self) {
        // No decoder available; frame() reports None until the opencv
        // feature is enabled.
        self.frame_rx = None;
    }
}

#[async_trait]
impl FlightController for TelloController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> FlightResult<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.addr).await?;
        self.socket = Some(socket);

        // Enter SDK mode.
        self.command("command").await?;
        info!("Connected to Tello at {}", self.addr);
        Ok(())
    }

    async fn disconnect(&mut self) -> FlightResult<()> {
        self.video_stop.store(true, Ordering::SeqCst);
        self.socket = None;
        self.frame_rx = None;
        self.streaming = false;
        info!("Disconnected from Tello at {}", self.addr);
        Ok(())
    }

    async fn takeoff(&mut self) -> FlightResult<()> {
        self.command("takeoff").await.map(|_| ())
    }

    async fn land(&mut self) -> FlightResult<()> {
        self.command("land").await.map(|_| ())
    }

    async fn set_velocity(&mut self, command: VelocityCommand) -> FlightResult<()> {
        let cmd = format!(
            "rc {} {} {} {}",
            command.left_right, command.forward_back, command.up_down, command.yaw
        );
        self.send_only(&cmd).await
    }

    async fn stream_on(&mut self) -> FlightResult<()> {
        self.command("streamon").await?;
        self.streaming = true;
        self.spawn_video_task();
        Ok(())
    }

    async fn stream_off(&mut self) -> FlightResult<()> {
        self.video_stop.store(true, Ordering::SeqCst);
        let result = self.command("streamoff").await.map(|_| ());
        self.streaming = false;
        result
    }

    async fn frame(&mut self) -> FlightResult<Option<Frame>> {
        match &self.frame_rx {
            Some(rx) => Ok(rx.borrow().clone()),
            None => Ok(None),
        }
    }

    async fn telemetry(&mut self) -> FlightResult<FlightTelemetry> {
        let reply = self.command("battery?").await?;
        let battery_level = reply
            .parse::<u8>()
            .map_err(|_| FlightError::Parse(format!("battery reply {:?}", reply)))?;

        Ok(FlightTelemetry {
            battery_level: battery_level.min(100),
            connected: self.streaming,
            // The Tello carries no GPS; position comes from configuration
            // or stays absent.
            position: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal fake drone endpoint answering the text protocol.
    async fn fake_drone(battery: &'static str) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let cmd = String::from_utf8_lossy(&buf[..len]).to_string();
                let reply = match cmd.as_str() {
                    "battery?" => battery,
                    c if c.starts_with("rc ") => continue,
                    _ => "ok",
                };
                let _ = socket.send_to(reply.as_bytes(), peer).await;
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_connect_and_telemetry() {
        let addr = fake_drone("87").await;
        let mut ctrl = TelloController::new("Drone 1", addr);

        ctrl.connect().await.unwrap();
        let telemetry = ctrl.telemetry().await.unwrap();

        assert_eq!(telemetry.battery_level, 87);
        assert!(!telemetry.connected);
        assert!(telemetry.position.is_none());
    }

    #[tokio::test]
    async fn test_stream_flag_reflected_in_telemetry() {
        let addr = fake_drone("55").await;
        let mut ctrl = TelloController::new("Drone 1", addr);

        ctrl.connect().await.unwrap();
        ctrl.stream_on().await.unwrap();
        assert!(ctrl.telemetry().await.unwrap().connected);

        ctrl.stream_off().await.unwrap();
        assert!(!ctrl.telemetry().await.unwrap().connected);
    }

    #[tokio::test]
    async fn test_commands_require_connect() {
        let mut ctrl = TelloController::on_default_network("Drone 1");
        let result = ctrl.takeoff().await;
        assert!(matches!(result, Err(FlightError::NotConnected)));
    }

    #[tokio::test]
    async fn test_rc_command_is_fire_and_forget() {
        let addr = fake_drone("55").await;
        let mut ctrl = TelloController::new("Drone 1", addr);
        ctrl.connect().await.unwrap();

        // Must return immediately even though the fake sends no reply.
        ctrl.set_velocity(VelocityCommand::new(10, 0, 0, -35).clamped())
            .await
            .unwrap();
    }
}
