use fxhash::FxHashMap;
use htm_pattern_learning::{
    config::HtmConfig,
    core::{
        homeostatic_plasticity::{
            HomeostaticConfig, HomeostaticPlasticityController, Phase, StabilityState, Transition,
        },
        spatial_pooler::SpatialPooler,
        PoolingEngine, StepOutput,
    },
    encoder::{
        scalar::{ScalarEncoder, ScalarEncoderConfig},
        Encoder,
    },
    experiment::{
        cycle::{CycleConfig, CycleLoop},
        heatmap::{GridShape, HeatmapExporter},
        reconstruct_inputs,
        reconstruction::Reconstructor,
    },
    Error,
};
use std::fs;

/// Engine that reports stability according to a fixed script of learning steps.
struct ScriptedEngine {
    width: usize,
    columns: usize,
    step: u64,
    stable_from: Option<u64>,
    regress_at: Option<u64>,
    was_stable: bool,
}

impl ScriptedEngine {
    fn new(width: usize, stable_from: Option<u64>) -> Self {
        Self {
            width,
            columns: 64,
            step: 0,
            stable_from,
            regress_at: None,
            was_stable: false,
        }
    }
}

impl PoolingEngine for ScriptedEngine {
    fn num_inputs(&self) -> usize {
        self.width
    }

    fn num_columns(&self) -> usize {
        self.columns
    }

    fn compute_step(&mut self, input: &[bool], learn: bool) -> StepOutput {
        let first = input.iter().position(|&b| b).unwrap_or(0);
        let active_columns = vec![first % self.columns];

        if !learn {
            return StepOutput {
                active_columns,
                stability: None,
            };
        }

        self.step += 1;
        let is_stable = self.stable_from.is_some_and(|from| self.step >= from)
            && self.regress_at != Some(self.step);
        let transition = match (self.was_stable, is_stable) {
            (false, true) => Transition::EnteredStable,
            (true, false) => Transition::Regressed,
            _ => Transition::None,
        };
        self.was_stable = is_stable;

        StepOutput {
            active_columns,
            stability: Some(StabilityState {
                is_stable,
                phase: if is_stable {
                    Phase::Stable
                } else {
                    Phase::Stabilizing
                },
                transition,
                num_patterns_seen: self.step,
                avg_active_columns: 1.0,
                num_distinct_inputs: 0,
            }),
        }
    }

    fn reconstruct(&self, active_columns: &[usize]) -> FxHashMap<usize, f64> {
        active_columns.iter().map(|&c| (c, 0.9)).collect()
    }
}

fn encoder() -> ScalarEncoder {
    ScalarEncoder::new(ScalarEncoderConfig {
        width: 40,
        active_bits: 5,
        min: 0.0,
        max: 10.0,
        periodic: false,
        clip_input: false,
    })
    .unwrap()
}

fn inputs() -> Vec<f64> {
    (0..10).map(f64::from).collect()
}

fn cycle_loop(max_cycles: usize) -> CycleLoop {
    CycleLoop::new(CycleConfig {
        max_cycles,
        required_stable_cycles: 5,
    })
    .unwrap()
}

#[test]
fn stops_once_stable_cycles_exceed_the_requirement() {
    let trained = cycle_loop(100)
        .run(ScriptedEngine::new(40, Some(1)), &encoder(), &inputs())
        .unwrap();

    assert!(trained.report.converged);
    assert_eq!(trained.report.cycles_run, 6);
    assert_eq!(trained.report.stable_cycles, 6);
    assert_eq!(trained.engine.step, 60);
}

#[test]
fn late_stability_delays_termination() {
    let trained = cycle_loop(100)
        .run(ScriptedEngine::new(40, Some(31)), &encoder(), &inputs())
        .unwrap();

    assert!(trained.report.converged);
    assert_eq!(trained.report.cycles_run, 9);
    assert_eq!(trained.report.events.len(), 1);
    assert_eq!(trained.report.events[0].cycle, 3);
}

#[test]
fn never_exceeds_max_cycles() {
    let unstable = cycle_loop(7)
        .run(ScriptedEngine::new(40, None), &encoder(), &inputs())
        .unwrap();
    assert!(!unstable.report.converged);
    assert_eq!(unstable.report.cycles_run, 7);
    assert_eq!(unstable.report.stable_cycles, 0);

    // Stable from the start, but the counter only reaches 5, which does not exceed 5.
    let short = cycle_loop(5)
        .run(ScriptedEngine::new(40, Some(1)), &encoder(), &inputs())
        .unwrap();
    assert!(!short.report.converged);
    assert_eq!(short.report.cycles_run, 5);
    assert_eq!(short.report.stable_cycles, 5);
}

#[test]
fn regression_is_recorded_and_the_run_continues() {
    let mut engine = ScriptedEngine::new(40, Some(1));
    engine.regress_at = Some(25);

    let trained = cycle_loop(100).run(engine, &encoder(), &inputs()).unwrap();
    let report = &trained.report;

    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].cycle, 2);
    assert_eq!(report.anomalies[0].num_patterns_seen, 25);
    assert_eq!(report.anomalies[0].input, 4.0);

    let transitions: Vec<_> = report.events.iter().map(|e| e.state.transition).collect();
    assert_eq!(
        transitions,
        vec![
            Transition::EnteredStable,
            Transition::Regressed,
            Transition::EnteredStable
        ]
    );
    assert!(report.converged);
    assert_eq!(report.cycles_run, 6);
}

#[test]
fn history_tracks_similarity_per_input() {
    let trained = cycle_loop(3)
        .run(ScriptedEngine::new(40, None), &encoder(), &inputs())
        .unwrap();

    for value in inputs() {
        let record = trained.report.record(value).unwrap();
        assert_eq!(record.value, value);
        assert_eq!(record.active_columns.len(), 1);
        assert_eq!(record.similarity, 1.0);
    }
}

#[test]
fn mismatched_encoder_width_fails_before_learning() {
    let result = cycle_loop(10).run(ScriptedEngine::new(41, Some(1)), &encoder(), &inputs());
    match result {
        Err(Error::Config(message)) => assert!(message.contains("width")),
        other => panic!("expected a configuration error, got {:?}", other.map(|t| t.report)),
    }
}

#[test]
fn export_failures_do_not_abort_reconstruction() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();

    let mut engine = ScriptedEngine::new(40, None);
    let exporter: HeatmapExporter = HeatmapExporter::default();
    let report = reconstruct_inputs(
        &mut engine,
        &encoder(),
        &inputs(),
        &Reconstructor::default(),
        &exporter,
        GridShape { rows: 8, cols: 8 },
        &blocker.join("out"),
    )
    .unwrap();

    assert!(report.written.is_empty());
    assert_eq!(report.failures.len(), inputs().len());
    assert!(matches!(report.failures[0].error, Error::Resource { .. }));
}

#[test]
fn reconstruction_rejects_a_mismatched_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = ScriptedEngine::new(200, None);
    let exporter: HeatmapExporter = HeatmapExporter::default();

    let result = reconstruct_inputs(
        &mut engine,
        &encoder(),
        &inputs(),
        &Reconstructor::default(),
        &exporter,
        GridShape { rows: 8, cols: 8 },
        dir.path(),
    );

    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(engine.step, 0);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn grid_must_cover_every_column() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = ScriptedEngine::new(40, None);
    let exporter: HeatmapExporter = HeatmapExporter::default();

    let result = reconstruct_inputs(
        &mut engine,
        &encoder(),
        &inputs(),
        &Reconstructor::default(),
        &exporter,
        GridShape { rows: 8, cols: 7 },
        dir.path(),
    );
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn spatial_pooler_learns_and_reconstructs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let htm = HtmConfig {
        input_bit_width: 40,
        num_columns: 64,
        potential_radius: 8,
        num_active_columns_per_inh_area: 4.0,
        stimulus_threshold: 1.0,
        duty_cycle_period: 20,
        update_period: 10,
        ..HtmConfig::default()
    };
    let controller = HomeostaticPlasticityController::new(
        inputs().len(),
        HomeostaticConfig {
            min_cycles_multiplier: 4,
            window: 2,
            ..HomeostaticConfig::default()
        },
    )
    .unwrap();
    let sp = SpatialPooler::new(&htm)
        .unwrap()
        .with_homeostatic_controller(controller);

    let trained = CycleLoop::new(CycleConfig {
        max_cycles: 1000,
        required_stable_cycles: 2,
    })
    .unwrap()
    .run(sp, &encoder(), &inputs())
    .unwrap();

    let report = &trained.report;
    assert!(report.converged);
    assert!(report.cycles_run >= 4 && report.cycles_run < 1000);
    assert_eq!(report.history.len(), 10);

    let entered = report
        .events
        .iter()
        .find(|e| e.state.transition == Transition::EnteredStable)
        .unwrap();
    assert!(entered.state.num_patterns_seen >= 40);
    assert!(report
        .events
        .iter()
        .filter(|e| e.state.is_stable)
        .all(|e| e.state.num_patterns_seen >= 40));
    assert_eq!(report.last_state.as_ref().map(|s| s.is_stable), Some(true));
    assert_eq!(
        report.last_state.as_ref().map(|s| s.num_patterns_seen),
        Some((report.cycles_run * 10) as u64)
    );

    let mut engine = trained.engine;
    let out_dir = dir.path().join("reconstruction");
    let exporter: HeatmapExporter = HeatmapExporter::default();
    let outcome = reconstruct_inputs(
        &mut engine,
        &encoder(),
        &inputs(),
        &Reconstructor::default(),
        &exporter,
        GridShape { rows: 8, cols: 8 },
        &out_dir,
    )
    .unwrap();

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.written.len(), 10);
    assert!(out_dir.join("3_threshold_heatmap.png").exists());

    let bits = encoder().encode(3.0).unwrap();
    let active = engine.compute_step(&bits, false).active_columns;
    let thresholded = Reconstructor::default().reconstruct(&engine, &active, 64);
    assert_eq!(thresholded.len(), 64);
    assert!(thresholded.iter().all(|&v| v == 0.0 || v == 1.0));
}
