//! Deployment mission scripts.
//!
//! The scripted maneuver flown on deployment is a named, replaceable value
//! rather than control flow inlined into connection setup. A script is a
//! sequence of steps; execution aborts on the first failed step so the
//! session can tear the controller down safely.

use sar_core::VelocityCommand;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{FlightController, FlightError, FlightResult};

/// One step of a mission script.
#[derive(Debug, Clone, PartialEq)]
pub enum MissionStep {
    /// Wait without touching the controller (e.g. stream warm-up).
    Settle { duration: Duration },
    Takeoff,
    /// Apply a velocity command and hold it for the given duration.
    Velocity {
        command: VelocityCommand,
        hold: Duration,
    },
    /// Zero velocity for the given duration.
    Hover { duration: Duration },
}

/// A predefined sequence of flight commands executed on deployment.
#[derive(Debug, Clone)]
pub struct MissionScript {
    name: String,
    steps: Vec<MissionStep>,
}

impl MissionScript {
    pub fn new(name: impl Into<String>, steps: Vec<MissionStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[MissionStep] {
        &self.steps
    }

    /// Bare minimum: get airborne and hold.
    pub fn takeoff_only() -> Self {
        Self::new(
            "takeoff-only",
            vec![
                MissionStep::Takeoff,
                MissionStep::Hover {
                    duration: Duration::from_secs(1),
                },
            ],
        )
    }

    /// Default deployment script: stream warm-up, takeoff, a forward search
    /// leg, then four orbit segments around the area of interest.
    pub fn orbit_search() -> Self {
        let mut steps = vec![
            MissionStep::Settle {
                duration: Duration::from_secs(4),
            },
            MissionStep::Takeoff,
            MissionStep::Hover {
                duration: Duration::from_secs(2),
            },
            MissionStep::Velocity {
                command: VelocityCommand::new(30, 0, 0, 0),
                hold: Duration::from_secs(1),
            },
            MissionStep::Hover {
                duration: Duration::from_millis(500),
            },
        ];

        for _ in 0..4 {
            steps.push(MissionStep::Velocity {
                command: VelocityCommand::new(40, -5, 0, -35),
                hold: Duration::from_secs(4),
            });
            steps.push(MissionStep::Hover {
                duration: Duration::from_millis(500),
            });
        }

        Self::new("orbit-search", steps)
    }

    /// Run every step against the controller. Each controller call is bounded
    /// by `step_timeout`; the first failure aborts the remainder of the
    /// script and is returned to the caller, which owns teardown.
    pub async fn execute(
        &self,
        controller: &mut dyn FlightController,
        step_timeout: Duration,
    ) -> FlightResult<()> {
        info!(
            "Executing mission script {:?} ({} steps)",
            self.name,
            self.steps.len()
        );

        for (index, step) in self.steps.iter().enumerate() {
            let result = match step {
                MissionStep::Settle { duration } => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
                MissionStep::Takeoff => bounded(controller.takeoff(), step_timeout, "takeoff").await,
                MissionStep::Velocity { command, hold } => {
                    let sent =
                        bounded(controller.set_velocity(command.clamped()), step_timeout, "rc")
                            .await;
                    if sent.is_ok() {
                        tokio::time::sleep(*hold).await;
                    }
                    sent
                }
                MissionStep::Hover { duration } => {
                    let sent = bounded(
                        controller.set_velocity(VelocityCommand::HOVER),
                        step_timeout,
                        "rc",
                    )
                    .await;
                    if sent.is_ok() {
                        tokio::time::sleep(*duration).await;
                    }
                    sent
                }
            };

            if let Err(e) = result {
                warn!(
                    "Mission {:?} aborted at step {}/{}: {}",
                    self.name,
                    index + 1,
                    self.steps.len(),
                    e
                );
                return Err(e);
            }
        }

        info!("Mission script {:?} complete", self.name);
        Ok(())
    }
}

async fn bounded<F>(call: F, limit: Duration, what: &str) -> FlightResult<()>
where
    F: std::future::Future<Output = FlightResult<()>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(FlightError::timeout(what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimController;

    fn quick_script() -> MissionScript {
        MissionScript::new(
            "test",
            vec![
                MissionStep::Takeoff,
                MissionStep::Velocity {
                    command: VelocityCommand::new(30, 0, 0, 0),
                    hold: Duration::from_millis(1),
                },
                MissionStep::Hover {
                    duration: Duration::from_millis(1),
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_script_executes_all_steps() {
        let (mut ctrl, log) = SimController::with_log("Drone 1");
        ctrl.connect().await.unwrap();

        quick_script()
            .execute(&mut ctrl, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(log.takeoffs(), 1);
        // One velocity leg plus the hover stop.
        assert_eq!(log.velocity_commands().len(), 2);
        assert_eq!(log.velocity_commands()[1], VelocityCommand::HOVER);
    }

    #[tokio::test]
    async fn test_script_aborts_on_failed_step() {
        let (mut ctrl, log) = SimController::with_log("Drone 1");
        ctrl.fail_takeoff();
        ctrl.connect().await.unwrap();

        let result = quick_script()
            .execute(&mut ctrl, Duration::from_secs(1))
            .await;

        assert!(result.is_err());
        // Nothing after the failed takeoff ran.
        assert!(log.velocity_commands().is_empty());
    }

    #[test]
    fn test_default_script_ends_stopped() {
        let script = MissionScript::orbit_search();
        let last = script.steps().last().unwrap();
        assert!(matches!(last, MissionStep::Hover { .. }));
    }

    #[test]
    fn test_scripts_are_named() {
        assert_eq!(MissionScript::orbit_search().name(), "orbit-search");
        assert_eq!(MissionScript::takeoff_only().name(), "takeoff-only");
    }
}
