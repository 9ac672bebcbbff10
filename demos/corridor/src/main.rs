//! corridor — a metered on-ramp merging onto a two-lane freeway.
//!
//! ```text
//!   fwy_src ──────────────┐
//!                         ▼
//!   ramp_src → ramp ──→ (merge) ── main (1.5 km, 2 lanes) ──→ out
//! ```
//!
//! Freeway plus ramp demand exceeds the capacity of `main` until the
//! freeway demand drops at 30 min.  A time-of-day ramp meter holds the ramp
//! back between 10 and 40 min.  Run with `RUST_LOG=ctm=debug` for the event
//! log.

use std::time::Instant;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ctm_core::{ControllerId, LinkId, NodeId, SimConfig, SimTime};
use ctm_dispatch::Action;
use ctm_fluid::{AccumulatorRequest, FluidNetworkModel, FluidParams};
use ctm_network::{NetworkBuilder, RoadParams};
use ctm_sim::{CapacityActuator, ScheduleController, ScheduleEntry, SimBuilder, SimObserver};

// ── Constants ─────────────────────────────────────────────────────────────────

const SEED:            u64 = 42;
const DURATION_SECS:   f64 = 3_600.0;
const REPORT_EVERY:    u64 = 150; // steps; 5 min at 2 s
const FWY_DEMAND_VPS:  f64 = 1.0;
const FWY_LATER_VPS:   f64 = 0.6;
const RAMP_DEMAND_VPS: f64 = 0.3;

const PARAMS_JSON: &str = r#"{
    "step_secs":         2.0,
    "max_cell_length_m": 100.0,
    "merge_rule":        "priority",
    "demand_process":    "poisson"
}"#;

const METER_JSON: &str = r#"[
    { "start_secs":  600.0, "rate_vps": 0.1  },
    { "start_secs": 2400.0, "rate_vps": null }
]"#;

// ── Observer ──────────────────────────────────────────────────────────────────

/// Prints vehicles per link every `REPORT_EVERY` steps.
struct Occupancy {
    links: Vec<(&'static str, LinkId)>,
    steps: u64,
}

impl Occupancy {
    fn header(&self) {
        print!("{:>8}", "time");
        for (name, _) in &self.links {
            print!(" {name:>9}");
        }
        println!(" {:>9}", "total");
    }
}

impl SimObserver<FluidNetworkModel> for Occupancy {
    fn on_start(&mut self, _now: SimTime, _model: &FluidNetworkModel) {
        self.header();
    }

    fn on_step_end(&mut self, now: SimTime, model: &FluidNetworkModel) {
        self.steps += 1;
        if self.steps % REPORT_EVERY != 0 {
            return;
        }
        print!("{:>7.0}s", now.secs());
        for &(_, link) in &self.links {
            print!(" {:>9.1}", model.link_vehicles(link));
        }
        println!(" {:>9.1}", model.total_vehicles());
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,ctm=info")))
        .init();

    println!("=== corridor — metered on-ramp ===");

    // 1. Network.
    let freeway = RoadParams::new(2_000.0, 150.0, 100.0);
    let ramp_road = RoadParams::new(1_800.0, 150.0, 60.0);

    let mut b = NetworkBuilder::new();
    let n: Vec<NodeId> = (0..6).map(|_| b.add_node()).collect();
    let (fwy_src, fwy_src_lgs) = b.add_link_with_lanes(n[0], n[3], 100.0, freeway, &[2]);
    let (ramp_src, ramp_src_lgs) = b.add_link_with_lanes(n[1], n[2], 100.0, ramp_road, &[1]);
    let (ramp, ramp_lgs) = b.add_link_with_lanes(n[2], n[3], 300.0, ramp_road, &[1]);
    let (main, main_lgs) = b.add_link_with_lanes(n[3], n[4], 1_500.0, freeway, &[1, 1]);
    let (out, out_lgs) = b.add_link_with_lanes(n[4], n[5], 100.0, freeway, &[2]);
    b.connect_with_priority(&fwy_src_lgs, &main_lgs, 2.0);
    b.connect_with_priority(&ramp_lgs, &main_lgs[1..], 1.0);
    b.connect(&ramp_src_lgs, &ramp_lgs);
    b.connect(&main_lgs, &out_lgs);
    let car = b.add_commodity("car", false);
    let net = b.build()?;

    // 2. Fluid model.
    let params: FluidParams = serde_json::from_str(PARAMS_JSON)?;
    let mut model = FluidNetworkModel::configure(net, params, SEED)?;
    model.set_source_demand(fwy_src, car, None, FWY_DEMAND_VPS)?;
    model.set_source_demand(ramp_src, car, None, RAMP_DEMAND_VPS)?;
    for &lg in &main_lgs {
        model.subscribe(AccumulatorRequest::LaneGroupExit(lg))?;
        model.subscribe(AccumulatorRequest::TravelTime(lg))?;
    }
    println!(
        "Network: {} lane groups, {} node models",
        model.lane_groups().len(),
        model.node_models().len()
    );

    // 3. Ramp meter.
    let entries: Vec<ScheduleEntry> = serde_json::from_str(METER_JSON)?;
    let actuator = CapacityActuator::on_link(model.network(), ramp)?;
    let meter = ScheduleController::new(ControllerId(0), actuator, entries);

    // 4. Sim.
    let config = SimConfig { start_secs: 0.0, duration_secs: DURATION_SECS, seed: SEED };
    let demand_drop = Action::SetSourceDemand { link: fwy_src, commodity: car, path: None, rate_vps: FWY_LATER_VPS };
    let mut sim = SimBuilder::new(config, model)
        .controller(meter)
        .schedule(1_800.0, demand_drop)
        .build()?;

    // 5. Run.
    let mut obs = Occupancy {
        links: vec![("fwy_src", fwy_src), ("ramp_src", ramp_src), ("ramp", ramp), ("main", main), ("out", out)],
        steps: 0,
    };
    let t0 = Instant::now();
    let stats = sim.run(&mut obs)?;
    let elapsed = t0.elapsed();

    // 6. Summary.
    let model = sim.model();
    println!();
    println!("Simulation complete in {:.3} s", elapsed.as_secs_f64());
    println!(
        "  steps {}  events {}  pokes {}  rejected overrides {}",
        stats.steps, stats.events, stats.pokes, stats.rejected_overrides
    );
    println!(
        "  injected {:.1}  exited {:.1}  in network {:.1}",
        model.injected_total(),
        model.exited_total(),
        model.total_vehicles()
    );
    for (lane, &lg) in main_lgs.iter().enumerate() {
        let g = model.lane_group(lg);
        let exited = g.exit_flow().map_or(0.0, |a| a.total());
        let travel = g.travel_timer().and_then(|t| t.mean()).unwrap_or(f64::NAN);
        println!("  main lane {lane}: {exited:>8.1} veh out, mean travel time {travel:.1} s");
    }
    let link_travel = model.link_travel_time(main).unwrap_or(f64::NAN);
    println!("  main link: mean travel time {link_travel:.1} s");

    Ok(())
}
