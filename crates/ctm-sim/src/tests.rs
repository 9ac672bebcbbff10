//! Integration tests for ctm-sim.

use approx::assert_abs_diff_eq;

use ctm_core::{CommodityId, ControllerId, LaneGroupId, LinkId, NodeId, SimConfig, SimTime};
use ctm_dispatch::Action;
use ctm_fluid::{FluidError, FluidNetworkModel, FluidParams};
use ctm_network::{NetworkBuilder, RoadParams};

use crate::{
    CapacityActuator, FixedRateController, NoopObserver, ScheduleController, ScheduleEntry, SimBuilder, SimError,
    SimObserver,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn config(duration_secs: f64) -> SimConfig {
    SimConfig { start_secs: 0.0, duration_secs, seed: 7 }
}

struct Corridor {
    model:   FluidNetworkModel,
    src:     LinkId,
    main:    LinkId,
    main_lg: LaneGroupId,
    car:     CommodityId,
}

/// `src → main (1000 m, 10 cells) → out`, one lane, 0.4 cells/step.
fn corridor(rate_vps: f64) -> Corridor {
    let road = RoadParams::new(2_000.0, 150.0, 72.0);
    let mut b = NetworkBuilder::new();
    let n: Vec<NodeId> = (0..4).map(|_| b.add_node()).collect();
    let (src, src_lgs) = b.add_link_with_lanes(n[0], n[1], 100.0, road, &[1]);
    let (main, main_lgs) = b.add_link_with_lanes(n[1], n[2], 1_000.0, road, &[1]);
    let (_, out_lgs) = b.add_link_with_lanes(n[2], n[3], 100.0, road, &[1]);
    b.connect(&src_lgs, &main_lgs);
    b.connect(&main_lgs, &out_lgs);
    let car = b.add_commodity("car", false);
    let mut model = FluidNetworkModel::configure(b.build().unwrap(), FluidParams::default(), 7).unwrap();
    if rate_vps > 0.0 {
        model.set_source_demand(src, car, None, rate_vps).unwrap();
    }
    Corridor { model, src, main, main_lg: main_lgs[0], car }
}

/// Records the current capacity of one lane group after every step.
struct CapacityTrace {
    lane_group: LaneGroupId,
    samples:    Vec<(f64, f64)>,
    started:    bool,
    ended:      bool,
}

impl CapacityTrace {
    fn new(lane_group: LaneGroupId) -> Self {
        Self { lane_group, samples: Vec::new(), started: false, ended: false }
    }

    fn at(&self, secs: f64) -> f64 {
        self.samples.iter().find(|(t, _)| *t == secs).map(|&(_, c)| c).unwrap()
    }
}

impl SimObserver<FluidNetworkModel> for CapacityTrace {
    fn on_start(&mut self, _now: SimTime, _model: &FluidNetworkModel) {
        self.started = true;
    }

    fn on_step_end(&mut self, now: SimTime, model: &FluidNetworkModel) {
        self.samples.push((now.secs(), model.lane_group(self.lane_group).fd().capacity));
    }

    fn on_sim_end(&mut self, _now: SimTime, _model: &FluidNetworkModel) {
        self.ended = true;
    }
}

fn validation_messages(err: SimError) -> Vec<String> {
    match err {
        SimError::Validation(log) => log.errors().map(str::to_owned).collect(),
        other => panic!("expected validation error, got {other}"),
    }
}

// ── SimBuilder validation ─────────────────────────────────────────────────────

#[cfg(test)]
mod builder_tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let c = corridor(0.5);
        let sim = SimBuilder::new(config(100.0), c.model).build().unwrap();
        assert_eq!(sim.now(), SimTime::ZERO);
        assert_eq!(sim.stats().steps, 0);
    }

    #[test]
    fn bad_duration_rejected() {
        let c = corridor(0.5);
        let err = SimBuilder::new(config(-5.0), c.model).build().err().unwrap();
        assert_eq!(validation_messages(err).len(), 1);
    }

    #[test]
    fn all_problems_reported_together() {
        let c = corridor(0.5);
        let actuator = CapacityActuator::on_link(c.model.network(), c.main).unwrap();
        let id = ControllerId(0);
        let err = SimBuilder::new(config(100.0), c.model)
            .controller(ScheduleController::new(id, actuator.clone(), Vec::new()))
            .controller(FixedRateController::new(id, actuator, Some(0.2)))
            .schedule(10.0, Action::FluidFlowUpdate)
            .schedule(500.0, Action::ResetToNominal { lane_group: c.main_lg })
            .schedule(10.0, Action::ControllerPoke { controller: ControllerId(9) })
            .build()
            .err()
            .unwrap();
        let msgs = validation_messages(err);
        assert_eq!(msgs.len(), 5, "{msgs:?}");
        assert!(msgs.iter().any(|m| m.contains("no entries")));
        assert!(msgs.iter().any(|m| m.contains("registered twice")));
        assert!(msgs.iter().any(|m| m.contains("run loop")));
        assert!(msgs.iter().any(|m| m.contains("outside the run")));
        assert!(msgs.iter().any(|m| m.contains("unregistered")));
    }

    #[test]
    fn non_finite_command_values_rejected() {
        let c = corridor(0.5);
        let (lg, src, car) = (c.main_lg, c.src, c.car);
        let err = SimBuilder::new(config(100.0), c.model)
            .schedule(10.0, Action::OverrideCapacity { lane_group: lg, rate_vps: f64::NAN })
            .schedule(10.0, Action::OverrideCapacity { lane_group: lg, rate_vps: -0.1 })
            .schedule(10.0, Action::OverrideSpeed { lane_group: lg, speed_mps: f64::INFINITY })
            .schedule(10.0, Action::SetSourceDemand { link: src, commodity: car, path: None, rate_vps: f64::NAN })
            .schedule(10.0, Action::OverrideCapacity { lane_group: lg, rate_vps: 0.0 })
            .build()
            .err()
            .unwrap();
        let msgs = validation_messages(err);
        assert_eq!(msgs.len(), 4, "{msgs:?}");
        assert_eq!(msgs.iter().filter(|m| m.contains("rate must be finite")).count(), 3);
        assert!(msgs.iter().any(|m| m.contains("speed must be finite")));
    }

    #[test]
    fn unsorted_schedule_rejected() {
        let c = corridor(0.5);
        let actuator = CapacityActuator::on_link(c.model.network(), c.main).unwrap();
        let entries = vec![
            ScheduleEntry { start_secs: 100.0, rate_vps: Some(0.2) },
            ScheduleEntry { start_secs: 50.0, rate_vps: None },
        ];
        let err = SimBuilder::new(config(200.0), c.model)
            .controller(ScheduleController::new(ControllerId(0), actuator, entries))
            .build()
            .err()
            .unwrap();
        assert!(validation_messages(err)[0].contains("does not follow"));
    }
}

// ── Run loop ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod run_loop {
    use super::*;

    #[test]
    fn steps_until_end_time() {
        let c = corridor(0.5);
        let mut sim = SimBuilder::new(config(1_000.0), c.model).build().unwrap();
        let mut trace = CapacityTrace::new(c.main_lg);
        let stats = sim.run(&mut trace).unwrap();

        assert_eq!(stats.steps, 500);
        assert_eq!(trace.samples.len(), 500);
        assert!(trace.started && trace.ended);
        assert_eq!(sim.now(), SimTime::from_secs(1_000.0));
        assert!(sim.dispatcher.is_stopped());

        let m = sim.model();
        assert_abs_diff_eq!(m.injected_total(), 500.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.injected_total(), m.total_vehicles() + m.exited_total(), epsilon = 1e-6);
        // Free flow: 0.5 veh/s out at steady state.
        for veh in m.lane_group(c.main_lg).cell_vehicles() {
            assert_abs_diff_eq!(veh, 2.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn runs_only_once() {
        let c = corridor(0.5);
        let mut sim = SimBuilder::new(config(10.0), c.model).build().unwrap();
        sim.run(&mut NoopObserver).unwrap();
        assert!(matches!(sim.run(&mut NoopObserver), Err(SimError::AlreadyRan)));
    }

    #[test]
    fn failing_update_stops_the_run() {
        let c = corridor(0.5);
        // 20 veh/km is 2 vehicles per 100 m cell; the corridor holds 2.5.
        let tighten = Action::SetRoadParams {
            lane_group:        c.main_lg,
            capacity_vphpl:    200.0,
            jam_density_vpkpl: 20.0,
            ffspeed_kph:       72.0,
        };
        let mut sim = SimBuilder::new(config(1_000.0), c.model).schedule(400.0, tighten).build().unwrap();
        let err = sim.run(&mut NoopObserver).unwrap_err();

        assert!(matches!(err, SimError::Fluid(FluidError::JamDensityExceeded { .. })));
        assert!(sim.dispatcher.is_stopped());
        assert_eq!(sim.now(), SimTime::from_secs(400.0));
        assert_eq!(sim.stats().steps, 200);
    }

    #[test]
    fn scheduled_demand_change() {
        let c = corridor(0.0);
        let demand = Action::SetSourceDemand { link: c.src, commodity: c.car, path: None, rate_vps: 0.5 };
        let mut sim = SimBuilder::new(config(200.0), c.model).schedule(100.0, demand).build().unwrap();
        sim.run(&mut NoopObserver).unwrap();
        // Injection from the flow update at 100 s on: 51 steps of one vehicle.
        assert_abs_diff_eq!(sim.model().injected_total(), 51.0, epsilon = 1e-9);
    }

    #[test]
    fn rejected_override_is_counted_not_fatal() {
        let c = corridor(0.5);
        let crawl = Action::OverrideSpeed { lane_group: c.main_lg, speed_mps: 1.0 };
        let mut sim = SimBuilder::new(config(100.0), c.model).schedule(50.0, crawl).build().unwrap();
        let stats = sim.run(&mut NoopObserver).unwrap();
        assert_eq!(stats.rejected_overrides, 1);
        assert_eq!(stats.steps, 50);
    }
}

// ── Controllers ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod controllers {
    use super::*;

    #[test]
    fn actuator_splits_by_lanes() {
        let road = RoadParams::default();
        let mut b = NetworkBuilder::new();
        let n: Vec<NodeId> = (0..4).map(|_| b.add_node()).collect();
        let (_, src_lgs) = b.add_link_with_lanes(n[0], n[1], 100.0, road, &[3]);
        let (link, lgs) = b.add_link_with_lanes(n[1], n[2], 200.0, road, &[2, 1]);
        let (_, out_lgs) = b.add_link_with_lanes(n[2], n[3], 100.0, road, &[3]);
        b.connect(&src_lgs, &lgs);
        b.connect(&lgs, &out_lgs);
        let net = b.build().unwrap();
        let actuator = CapacityActuator::on_link(&net, link).unwrap();

        let cmds = actuator.commands(Some(0.9));
        assert_eq!(cmds.len(), 2);
        match (&cmds[0], &cmds[1]) {
            (
                Action::OverrideCapacity { lane_group: a, rate_vps: ra },
                Action::OverrideCapacity { lane_group: b, rate_vps: rb },
            ) => {
                assert_eq!((*a, *b), (lgs[0], lgs[1]));
                assert_abs_diff_eq!(*ra, 0.6, epsilon = 1e-12);
                assert_abs_diff_eq!(*rb, 0.3, epsilon = 1e-12);
            }
            other => panic!("unexpected commands {other:?}"),
        }
        assert!(actuator.commands(None).is_empty());
        assert_eq!(actuator.release().len(), 2);
    }

    #[test]
    fn schedule_meters_then_releases() {
        let c = corridor(0.5);
        let actuator = CapacityActuator::on_link(c.model.network(), c.main).unwrap();
        let nominal = c.model.lane_group(c.main_lg).nominal().capacity;
        let entries = vec![
            ScheduleEntry { start_secs: 0.0, rate_vps: Some(0.25) },
            ScheduleEntry { start_secs: 500.0, rate_vps: None },
        ];
        let mut sim = SimBuilder::new(config(1_000.0), c.model)
            .controller(ScheduleController::new(ControllerId(0), actuator, entries))
            .build()
            .unwrap();
        let mut trace = CapacityTrace::new(c.main_lg);
        let stats = sim.run(&mut trace).unwrap();

        assert_eq!(stats.pokes, 2);
        assert_abs_diff_eq!(trace.at(2.0), 0.5, epsilon = 1e-12);
        // The release at 500 s runs after that instant's state update.
        assert_abs_diff_eq!(trace.at(500.0), 0.5, epsilon = 1e-12);
        assert_eq!(trace.at(502.0), nominal);
    }

    #[test]
    fn schedule_switch_cancels_stale_pokes() {
        let c = corridor(0.5);
        let actuator = CapacityActuator::on_link(c.model.network(), c.main).unwrap();
        let id = ControllerId(3);
        let entries = vec![
            ScheduleEntry { start_secs: 0.0, rate_vps: Some(0.3) },
            ScheduleEntry { start_secs: 150.0, rate_vps: None },
        ];
        let mut sim = SimBuilder::new(config(200.0), c.model)
            .controller(ScheduleController::new(id, actuator, entries))
            .schedule(100.0, Action::ControllerPoke { controller: id })
            .build()
            .unwrap();
        let stats = sim.run(&mut NoopObserver).unwrap();
        assert_eq!(stats.pokes, 2);
    }

    #[test]
    fn fixed_rate_controller_repeats() {
        let c = corridor(0.5);
        let actuator = CapacityActuator::on_link(c.model.network(), c.main).unwrap();
        let ctrl = FixedRateController::new(ControllerId(0), actuator, Some(0.4))
            .starting_at(SimTime::from_secs(60.0))
            .every(60.0);
        let mut sim = SimBuilder::new(config(300.0), c.model).controller(ctrl).build().unwrap();
        let stats = sim.run(&mut NoopObserver).unwrap();

        // 60, 120, 180, 240, 300.
        assert_eq!(stats.pokes, 5);
        assert_abs_diff_eq!(sim.model().lane_group(c.main_lg).fd().capacity, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn none_rate_is_a_no_op() {
        let c = corridor(0.5);
        let actuator = CapacityActuator::on_link(c.model.network(), c.main).unwrap();
        let nominal = c.model.lane_group(c.main_lg).nominal().capacity;
        let ctrl = FixedRateController::new(ControllerId(0), actuator, None);
        let mut sim = SimBuilder::new(config(50.0), c.model).controller(ctrl).build().unwrap();
        let stats = sim.run(&mut NoopObserver).unwrap();
        assert_eq!(stats.pokes, 1);
        assert_eq!(sim.model().lane_group(c.main_lg).fd().capacity, nominal);
    }
}
