//! Triangular fundamental diagram in simulation units.
//!
//! | Quantity         | Unit                         |
//! |------------------|------------------------------|
//! | `ffspeed`        | cells per step               |
//! | `capacity`       | vehicles per step            |
//! | `jam_density`    | vehicles per cell            |
//! | `critical_density` | vehicles per cell          |
//! | `wave_speed`     | cells per step               |
//!
//! Capacity and densities are for the whole lane group (all its lanes).

use ctm_network::RoadParams;

/// Discretization of one lane group.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Discretization {
    pub step_secs:     f64,
    pub cell_length_m: f64,
    pub lanes:         u32,
}

impl Discretization {
    #[inline]
    fn dt_hr(&self) -> f64 {
        self.step_secs / 3600.0
    }

    #[inline]
    fn cell_km(&self) -> f64 {
        self.cell_length_m / 1000.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FundamentalDiagram {
    pub ffspeed:          f64,
    pub capacity:         f64,
    pub jam_density:      f64,
    pub critical_density: f64,
    pub wave_speed:       f64,
}

impl FundamentalDiagram {
    /// Convert macroscopic per-lane parameters.
    pub fn from_road_params(p: &RoadParams, d: &Discretization) -> Self {
        let lanes = f64::from(d.lanes);
        let ffspeed = p.ffspeed_kph * d.dt_hr() / d.cell_km();
        let capacity = p.capacity_vphpl * d.dt_hr() * lanes;
        let jam_density = p.jam_density_vpkpl * d.cell_km() * lanes;
        let critical_density = capacity / ffspeed;
        let wave_speed = capacity / (jam_density - critical_density);
        Self { ffspeed, capacity, jam_density, critical_density, wave_speed }
    }

    /// Diagram of a source lane group: capacity-limited, never jammed.
    pub fn source(p: &RoadParams, d: &Discretization) -> Self {
        let fd = Self::from_road_params(p, d);
        Self {
            jam_density:      f64::INFINITY,
            critical_density: f64::INFINITY,
            wave_speed:       0.0,
            ..fd
        }
    }

    /// Back to macroscopic per-lane units.
    pub fn to_road_params(&self, d: &Discretization) -> RoadParams {
        let lanes = f64::from(d.lanes);
        RoadParams {
            capacity_vphpl:    self.capacity / d.dt_hr() / lanes,
            jam_density_vpkpl: self.jam_density / d.cell_km() / lanes,
            ffspeed_kph:       self.ffspeed * d.cell_km() / d.dt_hr(),
        }
    }

    /// Positivity and CFL (`ffspeed ≤ 1`, `wave_speed ≤ 1`).
    pub fn check(&self) -> Result<(), String> {
        if self.capacity.is_nan() || self.capacity < 0.0 {
            return Err(format!("capacity {:.4} is negative", self.capacity));
        }
        if !is_positive(self.jam_density) {
            return Err(format!("jam density {:.4} is not positive", self.jam_density));
        }
        if !is_positive(self.ffspeed) {
            return Err(format!("free-flow speed {:.4} is not positive", self.ffspeed));
        }
        if self.capacity > 0.0 && !is_positive(self.wave_speed) {
            return Err(format!(
                "wave speed {:.4} is not positive (critical density {:.4} ≥ jam density {:.4})",
                self.wave_speed, self.critical_density, self.jam_density
            ));
        }
        if self.ffspeed > 1.0 {
            return Err(format!("CFL violated: free-flow speed {:.4} cells/step", self.ffspeed));
        }
        if self.wave_speed > 1.0 {
            return Err(format!("CFL violated: wave speed {:.4} cells/step", self.wave_speed));
        }
        Ok(())
    }

    /// Same diagram with a different capacity.  Speed and wave speed are
    /// left alone.
    pub fn with_capacity(self, capacity: f64) -> Self {
        Self { capacity, ..self }
    }

    /// Same diagram with a different free-flow speed; critical density and
    /// wave speed are re-derived from the current capacity.
    pub fn with_ffspeed(self, ffspeed: f64) -> Self {
        let critical_density = self.capacity / ffspeed;
        let wave_speed = self.capacity / (self.jam_density - critical_density);
        Self { ffspeed, critical_density, wave_speed, ..self }
    }

    /// Fraction of a cell's supply open to lateral inflow.
    #[inline]
    pub fn lc_supply_fraction(&self, coefficient: f64) -> f64 {
        coefficient * (1.0 - self.wave_speed)
    }
}

#[inline]
fn is_positive(x: f64) -> bool {
    x > 0.0
}
