use chm_core::errors::{ChmError, ErrorInfo};
use serde::{Deserialize, Serialize};

use super::{ModifyRate, NodeContext};
use crate::event::CharacterEvent;
use crate::OFF_STATE;

const EARTH_RADIUS_KM: f64 = 6371.0;
const FORCED_LOSS: f64 = 1e10;
const BLOCKED_SITE_GAIN: f64 = 1e-10;
const EMPTY_RANGE_LOSS: f64 = 1e7;
const ADJACENCY_EPS: f64 = 1e-4;

/// Latitude and longitude of an area, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Distance between two coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    /// Great-circle distance in kilometres.
    #[default]
    Haversine,
    /// Euclidean distance between coordinates in radians.
    Euclidean,
}

impl DistanceMetric {
    /// Distance between `a` and `b` under this metric.
    pub fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        let rad = std::f64::consts::PI / 180.0;
        let (lat0, lon0) = (a.latitude * rad, a.longitude * rad);
        let (lat1, lon1) = (b.latitude * rad, b.longitude * rad);
        let dlat = lat0 - lat1;
        let dlon = lon0 - lon1;
        match self {
            DistanceMetric::Haversine => {
                let sin_lat = (dlat / 2.0).sin();
                let sin_lon = (dlon / 2.0).sin();
                let h = (sin_lat * sin_lat + lat0.cos() * lat1.cos() * sin_lon * sin_lon).sqrt();
                // clamp near-antipodal points
                2.0 * h.min(1.0).asin() * EARTH_RADIUS_KM
            }
            DistanceMetric::Euclidean => (dlat * dlat + dlon * dlon).sqrt(),
        }
    }
}

/// Time-stratified area availability and dispersal for range evolution.
///
/// Sites are areas; state 1 means the lineage occupies the area. Each epoch
/// carries a dispersal matrix whose diagonal marks availability. `epochs[i]`
/// is the younger boundary of epoch `i`, listed oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochGeography {
    epochs: Vec<f64>,
    dispersal: Vec<Vec<Vec<f64>>>,
    use_adjacency: bool,
    coordinates: Option<Vec<Coordinate>>,
    metric: DistanceMetric,
    distance_power: f64,
    distances: Vec<Vec<f64>>,
    distance_powers: Vec<Vec<f64>>,
}

impl EpochGeography {
    /// Validates the atlas and builds the modifier.
    pub fn new(
        epochs: Vec<f64>,
        dispersal: Vec<Vec<Vec<f64>>>,
        use_adjacency: bool,
        coordinates: Option<Vec<Coordinate>>,
        metric: DistanceMetric,
        distance_power: f64,
    ) -> Result<Self, ChmError> {
        if epochs.is_empty() || epochs.len() != dispersal.len() {
            return Err(ChmError::Config(
                ErrorInfo::new("epoch-count", "each epoch needs exactly one dispersal matrix")
                    .with_context("epochs", epochs.len().to_string())
                    .with_context("matrices", dispersal.len().to_string()),
            ));
        }
        if epochs.windows(2).any(|pair| pair[0] < pair[1]) {
            return Err(ChmError::Config(
                ErrorInfo::new("epoch-order", "epoch boundaries must be listed oldest first")
                    .with_hint("sort epoch ages in descending order"),
            ));
        }
        let num_areas = dispersal[0].len();
        for (epoch, matrix) in dispersal.iter().enumerate() {
            if matrix.len() != num_areas || matrix.iter().any(|row| row.len() != num_areas) {
                return Err(ChmError::Config(
                    ErrorInfo::new("dispersal-shape", "dispersal matrices must be square and equal in size")
                        .with_context("epoch", epoch.to_string()),
                ));
            }
            if matrix
                .iter()
                .flatten()
                .any(|value| !value.is_finite() || *value < 0.0)
            {
                return Err(ChmError::Config(
                    ErrorInfo::new("dispersal-value", "dispersal weights must be non-negative")
                        .with_context("epoch", epoch.to_string()),
                ));
            }
        }
        if !distance_power.is_finite() {
            return Err(ChmError::Config(ErrorInfo::new(
                "distance-power",
                "distance power must be finite",
            )));
        }

        let mut distances = vec![vec![0.0; num_areas]; num_areas];
        if let Some(coords) = &coordinates {
            if coords.len() != num_areas {
                return Err(ChmError::Config(
                    ErrorInfo::new("coordinate-count", "one coordinate is required per area")
                        .with_context("areas", num_areas.to_string())
                        .with_context("coordinates", coords.len().to_string()),
                ));
            }
            for j in 0..num_areas {
                for k in 0..num_areas {
                    distances[j][k] = metric.distance(&coords[j], &coords[k]);
                }
            }
            for (epoch, matrix) in dispersal.iter().enumerate() {
                for j in 0..num_areas {
                    for k in (j + 1)..num_areas {
                        let adjacent = matrix[j][k] > 0.0 || matrix[k][j] > 0.0;
                        if adjacent && distances[j][k] == 0.0 {
                            return Err(ChmError::Config(
                                ErrorInfo::new("zero-distance", "adjacent areas have zero distance")
                                    .with_context("epoch", epoch.to_string())
                                    .with_context("area_a", j.to_string())
                                    .with_context("area_b", k.to_string()),
                            ));
                        }
                    }
                }
            }
        }

        let mut modifier = Self {
            epochs,
            dispersal,
            use_adjacency,
            coordinates,
            metric,
            distance_power,
            distances,
            distance_powers: vec![vec![1.0; num_areas]; num_areas],
        };
        modifier.update();
        Ok(modifier)
    }

    /// Number of areas.
    pub fn num_areas(&self) -> usize {
        self.distances.len()
    }

    /// Epoch containing `age`.
    pub fn epoch_index(&self, age: f64) -> usize {
        let mut index = 0;
        while index + 1 < self.epochs.len() && age <= self.epochs[index] {
            index += 1;
        }
        index
    }

    /// Whether `area` exists during the epoch containing `age`.
    pub fn is_available(&self, area: usize, age: f64) -> bool {
        self.dispersal[self.epoch_index(age)][area][area] > 0.0
    }

    /// Metric used for area distances.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Current distance power.
    pub fn distance_power(&self) -> f64 {
        self.distance_power
    }

    /// Replaces the distance power and refreshes the cache.
    pub fn set_distance_power(&mut self, power: f64) -> Result<(), ChmError> {
        if !power.is_finite() {
            return Err(ChmError::Config(ErrorInfo::new(
                "distance-power",
                "distance power must be finite",
            )));
        }
        if power != self.distance_power {
            self.distance_power = power;
            self.update();
        }
        Ok(())
    }

    fn weight(&self, epoch: usize, from: usize, to: usize) -> f64 {
        let value = self.dispersal[epoch][from][to];
        if self.coordinates.is_some() && value != 0.0 {
            value * self.distance_powers[from][to]
        } else {
            value
        }
    }

    fn available_areas(&self, epoch: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_areas()).filter(move |&area| self.dispersal[epoch][area][area] > 0.0)
    }

    fn loss_multiplier(&self, current: &[usize], site: usize, epoch: usize) -> f64 {
        if !self.use_adjacency {
            return 1.0;
        }
        let present: Vec<usize> = self
            .available_areas(epoch)
            .filter(|&area| current[area] != OFF_STATE)
            .collect();
        if present.is_empty() {
            return EMPTY_RANGE_LOSS;
        }
        let mut sum = 0.0;
        let mut rate = 0.0;
        for &focal in &present {
            let adjacent: f64 = present
                .iter()
                .map(|&other| self.dispersal[epoch][focal][other])
                .sum();
            let share = if adjacent > 0.0 { 1.0 / adjacent } else { 0.0 };
            sum += share;
            if focal == site {
                rate = share;
            }
        }
        if sum == 0.0 {
            return 0.0;
        }
        rate / (sum / present.len() as f64)
    }

    fn gain_multiplier(&self, current: &[usize], site: usize, epoch: usize) -> f64 {
        let mut present = Vec::new();
        let mut absent = Vec::new();
        if self.use_adjacency {
            for area in self.available_areas(epoch) {
                if current[area] == OFF_STATE {
                    continue;
                }
                let mut reaches_absent = false;
                for target in 0..self.num_areas() {
                    if self.dispersal[epoch][area][target] > ADJACENCY_EPS && current[target] == OFF_STATE {
                        if !absent.contains(&target) {
                            absent.push(target);
                        }
                        reaches_absent = true;
                    }
                }
                if reaches_absent {
                    present.push(area);
                }
            }
        } else {
            for area in self.available_areas(epoch) {
                if current[area] == OFF_STATE {
                    absent.push(area);
                } else {
                    present.push(area);
                }
            }
        }
        if present.is_empty() {
            return 1.0;
        }

        let mut sum = 0.0;
        let mut rate = 0.0;
        for &target in &absent {
            let connectivity: f64 = present
                .iter()
                .map(|&source| self.weight(epoch, source, target))
                .sum();
            sum += connectivity;
            if target == site {
                rate += connectivity;
            }
        }
        if sum == 0.0 {
            return 0.0;
        }
        let balance = if self.use_adjacency {
            present.len() as f64 / absent.len() as f64
        } else {
            1.0
        };
        balance * rate / (sum / absent.len() as f64)
    }
}

impl ModifyRate for EpochGeography {
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        age: f64,
        _node: Option<&NodeContext>,
    ) -> f64 {
        let epoch = self.epoch_index(age);
        let available = self.dispersal[epoch][event.site][event.site] > 0.0;
        match (available, event.state == OFF_STATE) {
            (true, true) => self.loss_multiplier(current, event.site, epoch),
            (true, false) => self.gain_multiplier(current, event.site, epoch),
            (false, true) => FORCED_LOSS,
            (false, false) => 0.0,
        }
    }

    fn site_multiplier(&self, _from: usize, to: usize, site: usize, age: f64) -> f64 {
        if self.is_available(site, age) {
            1.0
        } else if to == OFF_STATE {
            FORCED_LOSS
        } else {
            BLOCKED_SITE_GAIN
        }
    }

    fn update(&mut self) {
        if self.coordinates.is_none() {
            return;
        }
        let power = self.distance_power;
        for (j, row) in self.distance_powers.iter_mut().enumerate() {
            for (k, value) in row.iter_mut().enumerate() {
                *value = if j == k || power == 0.0 {
                    1.0
                } else {
                    self.distances[j][k].powf(-power)
                };
            }
        }
    }

    fn name(&self) -> &'static str {
        "epoch-geography"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_epoch_atlas(use_adjacency: bool) -> EpochGeography {
        // area 2 is unavailable in the older epoch
        let old = vec![
            vec![1.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0],
        ];
        let young = vec![
            vec![1.0, 1.0, 0.0],
            vec![1.0, 1.0, 1.0],
            vec![0.0, 1.0, 1.0],
        ];
        EpochGeography::new(
            vec![5.0, 0.0],
            vec![old, young],
            use_adjacency,
            None,
            DistanceMetric::Haversine,
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn epoch_lookup_uses_younger_boundaries() {
        let atlas = two_epoch_atlas(false);
        assert_eq!(atlas.epoch_index(8.0), 0);
        assert_eq!(atlas.epoch_index(5.0), 1);
        assert_eq!(atlas.epoch_index(1.0), 1);
        assert!(!atlas.is_available(2, 8.0));
        assert!(atlas.is_available(2, 1.0));
    }

    #[test]
    fn unavailable_areas_force_loss_and_block_gain() {
        let atlas = two_epoch_atlas(false);
        let loss = CharacterEvent::new(2, 0, 0.5);
        let gain = CharacterEvent::new(2, 1, 0.5);
        assert_eq!(atlas.compute_multiplier(&[1, 0, 1], &loss, 8.0, None), FORCED_LOSS);
        assert_eq!(atlas.compute_multiplier(&[1, 0, 0], &gain, 8.0, None), 0.0);
        assert_eq!(atlas.site_multiplier(0, 1, 2, 8.0), BLOCKED_SITE_GAIN);
        assert_eq!(atlas.site_multiplier(1, 0, 2, 8.0), FORCED_LOSS);
    }

    #[test]
    fn gain_is_relative_connectivity() {
        let atlas = two_epoch_atlas(false);
        // area 0 disperses to area 1 only, so area 1 takes the whole share
        let to_one = CharacterEvent::new(1, 1, 0.5);
        let to_two = CharacterEvent::new(2, 1, 0.5);
        let current = [1, 0, 0];
        let value = atlas.compute_multiplier(&current, &to_one, 1.0, None);
        assert!((value - 2.0).abs() < 1e-12);
        assert_eq!(atlas.compute_multiplier(&current, &to_two, 1.0, None), 0.0);
    }

    #[test]
    fn adjacency_restricts_gain_targets() {
        let atlas = two_epoch_atlas(true);
        // young epoch: area 0 reaches only area 1
        let to_one = CharacterEvent::new(1, 1, 0.5);
        let to_two = CharacterEvent::new(2, 1, 0.5);
        let current = [1, 0, 0];
        assert!(atlas.compute_multiplier(&current, &to_one, 1.0, None) > 0.0);
        assert_eq!(atlas.compute_multiplier(&current, &to_two, 1.0, None), 0.0);
    }

    #[test]
    fn zero_distance_between_adjacent_areas_is_rejected() {
        let coords = vec![
            Coordinate { latitude: 10.0, longitude: 20.0 },
            Coordinate { latitude: 10.0, longitude: 20.0 },
        ];
        let result = EpochGeography::new(
            vec![0.0],
            vec![vec![vec![1.0, 1.0], vec![1.0, 1.0]]],
            false,
            Some(coords),
            DistanceMetric::Haversine,
            1.0,
        );
        assert_eq!(result.unwrap_err().info().code, "zero-distance");
    }

    #[test]
    fn distance_power_zero_is_uniform() {
        let coords = vec![
            Coordinate { latitude: 0.0, longitude: 0.0 },
            Coordinate { latitude: 0.0, longitude: 10.0 },
            Coordinate { latitude: 0.0, longitude: 40.0 },
        ];
        let full = vec![vec![1.0; 3]; 3];
        let mut atlas = EpochGeography::new(
            vec![0.0],
            vec![full],
            false,
            Some(coords),
            DistanceMetric::Haversine,
            0.0,
        )
        .unwrap();
        let near = CharacterEvent::new(1, 1, 0.5);
        let far = CharacterEvent::new(2, 1, 0.5);
        let current = [1, 0, 0];
        let near_rate = atlas.compute_multiplier(&current, &near, 0.0, None);
        let far_rate = atlas.compute_multiplier(&current, &far, 0.0, None);
        assert!((near_rate - far_rate).abs() < 1e-12);

        atlas.set_distance_power(1.0).unwrap();
        let near_rate = atlas.compute_multiplier(&current, &near, 0.0, None);
        let far_rate = atlas.compute_multiplier(&current, &far, 0.0, None);
        assert!(near_rate > far_rate);
        assert!((near_rate + far_rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn haversine_quarter_circle() {
        let a = Coordinate { latitude: 0.0, longitude: 0.0 };
        let b = Coordinate { latitude: 0.0, longitude: 90.0 };
        let d = DistanceMetric::Haversine.distance(&a, &b);
        let expected = std::f64::consts::PI / 2.0 * EARTH_RADIUS_KM;
        assert!((d - expected).abs() < 1e-6);
    }
}
