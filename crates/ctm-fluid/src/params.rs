//! Model-wide configuration.

/// How a downstream lane group's supply is shared among competing road
/// connections.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MergeRule {
    /// Flows scaled by a common factor, so each is proportional to its demand.
    #[default]
    Proportional,
    /// Supply shared by road-connection priority; share a connection cannot
    /// use is passed on to the others.
    Priority,
}

/// How source demand becomes vehicles each step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DemandProcess {
    /// Inject exactly the mean.
    #[default]
    Deterministic,
    /// Draw a Poisson count with the step mean.
    Poisson,
}

/// Configuration of the fluid model.
///
/// With the `serde` feature every field is optional in the serialized form
/// and falls back to [`FluidParams::default`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FluidParams {
    /// Simulation step in seconds.
    pub step_secs: f64,

    /// Upper bound on cell length in metres.  Each link is cut into the
    /// smallest number of equal cells not exceeding it.
    pub max_cell_length_m: f64,

    /// Fraction of `(1 - w) · supply` a cell offers to lateral inflow.
    pub lc_coefficient: f64,

    pub merge_rule: MergeRule,

    pub demand_process: DemandProcess,
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            step_secs:         2.0,
            max_cell_length_m: 100.0,
            lc_coefficient:    0.9,
            merge_rule:        MergeRule::Proportional,
            demand_process:    DemandProcess::Deterministic,
        }
    }
}
