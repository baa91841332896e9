use serde::Deserialize;

/// Number of lanes on the track. Lane indices are 0 (left), 1 (center) and 2 (right).
pub const NO_LANES: usize = 3;

/// Index of the center lane, used as fallback lane whenever a classification is ambiguous.
pub const CENTER_LANE: usize = 1;

/// * `road_x` - (px) Lateral coordinate of the left road boundary
/// * `road_width` - (px) Width of the road corridor
/// * `lateral_margin` - (px) Minimum distance between a vehicle center and a road boundary (half
/// vehicle width plus a small safety gap)
/// * `finish_distance` - (units) Longitudinal position of the finish line
#[derive(Debug, Deserialize, Clone)]
pub struct TrackPars {
    pub road_x: f64,
    pub road_width: f64,
    pub lateral_margin: f64,
    pub finish_distance: f64,
}

impl Default for TrackPars {
    fn default() -> Self {
        TrackPars {
            road_x: 250.0,
            road_width: 500.0,
            lateral_margin: 35.0,
            finish_distance: 50_000.0,
        }
    }
}

/// Track holds the static lane geometry. All methods are pure.
#[derive(Debug, Clone)]
pub struct Track {
    pub road_x: f64,
    pub road_width: f64,
    pub lane_width: f64,
    pub lateral_margin: f64,
    pub finish_distance: f64,
    lane_centers: [f64; NO_LANES],
}

impl Track {
    pub fn new(track_pars: &TrackPars) -> Track {
        // lanes are laid out on whole pixels
        let lane_width = (track_pars.road_width / NO_LANES as f64).floor();
        let mut lane_centers = [0.0; NO_LANES];

        for (i, center) in lane_centers.iter_mut().enumerate() {
            *center = track_pars.road_x + i as f64 * lane_width + (lane_width / 2.0).floor();
        }

        Track {
            road_x: track_pars.road_x,
            road_width: track_pars.road_width,
            lane_width,
            lateral_margin: track_pars.lateral_margin,
            finish_distance: track_pars.finish_distance,
            lane_centers,
        }
    }

    /// The method returns the lateral coordinate of the given lane's center line. Lane indices
    /// beyond the last lane are clamped.
    pub fn lane_center_x(&self, lane: usize) -> f64 {
        self.lane_centers[lane.min(NO_LANES - 1)]
    }

    /// The method classifies a lateral coordinate into the lane with the nearest center line.
    /// Ties between two centers resolve to the center lane.
    pub fn lane_from_x(&self, x: f64) -> usize {
        let mut best_lane = CENTER_LANE;
        let mut best_dist = (x - self.lane_centers[CENTER_LANE]).abs();

        for (lane, center) in self.lane_centers.iter().enumerate() {
            let dist = (x - center).abs();
            if dist < best_dist {
                best_dist = dist;
                best_lane = lane;
            }
        }

        best_lane
    }

    /// The method returns the lateral interval [left, right] a vehicle center may occupy.
    pub fn lateral_bounds(&self) -> (f64, f64) {
        (
            self.road_x + self.lateral_margin,
            self.road_x + self.road_width - self.lateral_margin,
        )
    }

    pub fn clamp_x(&self, x: f64) -> f64 {
        let (left, right) = self.lateral_bounds();
        x.max(left).min(right)
    }

    pub fn is_valid_lane(lane: i64) -> bool {
        lane >= 0 && lane < NO_LANES as i64
    }

    /// The method returns the lanes reachable with at most one lane change from the given lane.
    pub fn neighbor_lanes(&self, lane: usize) -> Vec<usize> {
        let lane = lane as i64;
        (lane - 1..=lane + 1)
            .filter(|&l| Track::is_valid_lane(l))
            .map(|l| l as usize)
            .collect()
    }
}

impl Default for Track {
    fn default() -> Self {
        Track::new(&TrackPars::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lane_centers_match_default_road() {
        let track = Track::default();
        assert_relative_eq!(track.lane_width, 166.0);
        assert_relative_eq!(track.lane_center_x(0), 333.0);
        assert_relative_eq!(track.lane_center_x(1), 499.0);
        assert_relative_eq!(track.lane_center_x(2), 665.0);
    }

    #[test]
    fn lane_from_x_uses_nearest_center() {
        let track = Track::default();
        assert_eq!(track.lane_from_x(300.0), 0);
        assert_eq!(track.lane_from_x(520.0), 1);
        assert_eq!(track.lane_from_x(700.0), 2);
        // far outside the road the nearest lane still wins
        assert_eq!(track.lane_from_x(0.0), 0);
    }

    #[test]
    fn lane_from_x_ties_resolve_to_center() {
        let track = Track::default();
        let boundary = (track.lane_center_x(0) + track.lane_center_x(1)) / 2.0;
        assert_eq!(track.lane_from_x(boundary), CENTER_LANE);
    }

    #[test]
    fn lateral_clamp_respects_margin() {
        let track = Track::default();
        assert_relative_eq!(track.clamp_x(100.0), 285.0);
        assert_relative_eq!(track.clamp_x(900.0), 715.0);
    }

    #[test]
    fn neighbor_lanes_stay_on_track() {
        let track = Track::default();
        assert_eq!(track.neighbor_lanes(0), vec![0, 1]);
        assert_eq!(track.neighbor_lanes(1), vec![0, 1, 2]);
        assert_eq!(track.neighbor_lanes(2), vec![1, 2]);
    }
}
