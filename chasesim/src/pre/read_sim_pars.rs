use crate::core::powerup::PowerUpPars;
use crate::core::track::TrackPars;
use crate::core::traffic::TrafficPars;
use crate::core::vehicle::{Role, VehiclePars, ABSOLUTE_MAX_SPEED};
use crate::decision::arbiter::DecisionPars;
use anyhow::Context;
use helpers::general::InputValueError;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::Path;

/// SimPars is used to store all other parameter structs. Missing sections fall back to their
/// defaults.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimPars {
    pub track_pars: TrackPars,
    pub thief_pars: VehiclePars,
    pub police_pars: VehiclePars,
    pub traffic_pars: TrafficPars,
    pub powerup_pars: PowerUpPars,
    pub decision_pars: DecisionPars,
}

impl Default for SimPars {
    fn default() -> Self {
        SimPars {
            track_pars: TrackPars::default(),
            thief_pars: VehiclePars::default_thief(),
            police_pars: VehiclePars::default_police(),
            traffic_pars: TrafficPars::default(),
            powerup_pars: PowerUpPars::default(),
            decision_pars: DecisionPars::default(),
        }
    }
}

fn invalid(parameter: &str, reason: &str) -> anyhow::Error {
    anyhow::Error::new(InputValueError::new(parameter, reason))
        .context("Simulation parameters are inconsistent!")
}

impl SimPars {
    /// The method checks the requirements between the parameters that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        let track = &self.track_pars;
        if track.road_width / 3.0 <= 2.0 * track.lateral_margin {
            return Err(invalid(
                "track_pars.road_width",
                "lanes must be wider than twice the lateral margin",
            ));
        }
        if track.finish_distance <= 0.0 {
            return Err(invalid("track_pars.finish_distance", "must be positive"));
        }

        for (vehicle_pars, role, name) in [
            (&self.thief_pars, Role::Thief, "thief_pars"),
            (&self.police_pars, Role::Police, "police_pars"),
        ]
        .iter()
        {
            if vehicle_pars.role != *role {
                return Err(invalid(&format!("{}.role", name), "role does not match the section"));
            }
            if vehicle_pars.start_lane >= crate::core::track::NO_LANES {
                return Err(invalid(&format!("{}.start_lane", name), "must be 0, 1 or 2"));
            }
            if vehicle_pars.max_speed <= 0.0 || vehicle_pars.max_speed > ABSOLUTE_MAX_SPEED {
                return Err(invalid(
                    &format!("{}.max_speed", name),
                    "must lie in (0, absolute max speed]",
                ));
            }
            if vehicle_pars.acceleration_rate <= 0.0 || vehicle_pars.brake_rate <= 0.0 {
                return Err(invalid(
                    &format!("{}.acceleration_rate/brake_rate", name),
                    "must be positive",
                ));
            }
            if vehicle_pars.steering_rate <= 0.0
                || vehicle_pars.max_steering_rate < vehicle_pars.steering_rate
            {
                return Err(invalid(
                    &format!("{}.steering_rate", name),
                    "must be positive and not above max_steering_rate",
                ));
            }
        }

        let traffic = &self.traffic_pars;
        if traffic.speed_min <= 0.0 || traffic.speed_max < traffic.speed_min {
            return Err(invalid(
                "traffic_pars.speed_min/speed_max",
                "speed range must be positive and non-empty",
            ));
        }
        if traffic.respawn_ahead[1] < traffic.respawn_ahead[0] || traffic.respawn_ahead[0] <= 0.0 {
            return Err(invalid(
                "traffic_pars.respawn_ahead",
                "spawn range must be positive and non-empty",
            ));
        }

        let powerups = &self.powerup_pars;
        if track.finish_distance - powerups.spawn_margin <= powerups.spawn_margin {
            return Err(invalid(
                "powerup_pars.spawn_margin",
                "spawn range between start and finish is empty",
            ));
        }
        if powerups.pickup_radius <= 0.0 {
            return Err(invalid("powerup_pars.pickup_radius", "must be positive"));
        }

        let decision = &self.decision_pars;
        if decision.minimax.depth == 0 {
            return Err(invalid("decision_pars.minimax.depth", "must be at least 1"));
        }
        if decision.minimax.node_budget == Some(0) {
            return Err(invalid(
                "decision_pars.minimax.node_budget",
                "must be at least 1 or null",
            ));
        }
        if decision.astar.max_iterations == 0 {
            return Err(invalid("decision_pars.astar.max_iterations", "must be at least 1"));
        }

        Ok(())
    }
}

/// read_sim_pars reads the JSON file and decodes the JSON string into the simulation parameters
/// struct.
pub fn read_sim_pars(filepath: &Path) -> anyhow::Result<SimPars> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open parameter file {}!",
            filepath.display()
        ))?;
    let pars = serde_json::from_reader(&fh).context(format!(
        "Failed to parse parameter file {}!",
        filepath.display()
    ))?;
    Ok(pars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        assert!(SimPars::default().validate().is_ok());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "track_pars": {{"road_x": 250.0, "road_width": 500.0, "lateral_margin": 35.0,
                    "finish_distance": 20000.0}},
                "decision_pars": {{"minimax": {{"depth": 2, "time_budget_us": 4000, "ply_ticks": 10,
                    "accelerate_delta": 0.5, "brake_delta": 0.8, "traffic_window": 1500.0}}}}
            }}"#
        )
        .unwrap();

        let pars = read_sim_pars(file.path()).unwrap();
        assert_relative_eq!(pars.track_pars.finish_distance, 20_000.0);
        assert_eq!(pars.decision_pars.minimax.depth, 2);
        assert_eq!(pars.decision_pars.minimax.node_budget, Some(5000));
        assert_eq!(pars.thief_pars.role, Role::Thief);
        assert_eq!(pars.traffic_pars.no_cars, 50);
        assert!(pars.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inconsistent_values() {
        let mut pars = SimPars::default();
        pars.thief_pars.max_speed = 20.0;
        let err = pars.validate().unwrap_err();
        assert!(err.root_cause().to_string().contains("thief_pars.max_speed"));

        let mut pars = SimPars::default();
        pars.police_pars.role = Role::Thief;
        assert!(pars.validate().is_err());

        let mut pars = SimPars::default();
        pars.decision_pars.minimax.depth = 0;
        assert!(pars.validate().is_err());

        let mut pars = SimPars::default();
        pars.decision_pars.minimax.node_budget = Some(0);
        assert!(pars.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_sim_pars(Path::new("does/not/exist.json")).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.json"));
    }
}
