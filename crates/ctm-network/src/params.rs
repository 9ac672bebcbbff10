//! Macroscopic road parameters.

/// Per-lane triangular fundamental diagram in macroscopic units.
///
/// These are the values a scenario author writes down; the fluid model
/// converts them to per-step, per-cell units once the discretization is
/// known.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadParams {
    /// Capacity, vehicles per hour per lane.
    pub capacity_vphpl:    f64,
    /// Jam density, vehicles per km per lane.
    pub jam_density_vpkpl: f64,
    /// Free-flow speed, km per hour.
    pub ffspeed_kph:       f64,
}

impl RoadParams {
    pub fn new(capacity_vphpl: f64, jam_density_vpkpl: f64, ffspeed_kph: f64) -> Self {
        Self { capacity_vphpl, jam_density_vpkpl, ffspeed_kph }
    }

    /// Critical density, vehicles per km per lane (`capacity / ffspeed`).
    pub fn critical_density_vpkpl(&self) -> f64 {
        self.capacity_vphpl / self.ffspeed_kph
    }
}

impl Default for RoadParams {
    /// A typical freeway lane: 2000 veh/h, 150 veh/km, 100 km/h.
    fn default() -> Self {
        Self { capacity_vphpl: 2_000.0, jam_density_vpkpl: 150.0, ffspeed_kph: 100.0 }
    }
}
