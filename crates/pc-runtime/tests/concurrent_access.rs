//! Integration test: concurrent readers and writers against a running loop.
//!
//! Readers must always see a self-consistent snapshot: the status must match
//! the output it was committed with, and tick numbers never go backwards.

use pc_controls::{PidController, PidParams, SensorLimits, SensorValidator};
use pc_runtime::{
    ControlLoop, LoopConfig, ProcessSnapshot, ProcessState, ProcessStatus, SetpointRange,
};
use pc_sim::{FirstOrderParams, FirstOrderPlant};
use std::sync::Arc;
use tokio::sync::watch;

const OUT_LIMIT: f64 = 100.0;
const SETPOINTS: [f64; 3] = [50.0, 10.0, 90.0];

fn spawn_loop(state: Arc<ProcessState>) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    // High gain so setpoint swings drive the output into saturation
    let params = PidParams::new(20.0, 1.0, 0.0, -OUT_LIMIT, OUT_LIMIT)
        .unwrap()
        .with_integral_limits(-10.0, 10.0)
        .unwrap();
    let validator = SensorValidator::new(SensorLimits {
        min_valid: -1000.0,
        max_valid: 1000.0,
        max_rate_of_change: 1.0e6,
    })
    .unwrap();
    let plant = FirstOrderPlant::new(
        FirstOrderParams {
            gain: 1.0,
            time_constant: 0.5,
        },
        0.0,
    )
    .unwrap();
    let control = ControlLoop::new(
        LoopConfig {
            dt: 0.001,
            fault_threshold: 3,
            safe_output: 0.0,
        },
        PidController::new(params).unwrap(),
        validator,
        plant,
        state,
    )
    .unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        control.run(rx).await.unwrap();
    });
    (tx, handle)
}

fn assert_consistent(snap: &ProcessSnapshot) {
    assert!(snap.output.abs() <= OUT_LIMIT);
    match snap.status {
        ProcessStatus::Saturated => assert_eq!(snap.output.abs(), OUT_LIMIT),
        ProcessStatus::Nominal => assert!(snap.output.abs() < OUT_LIMIT),
        ProcessStatus::SensorFault => panic!("unexpected sensor fault"),
    }
    assert!(SETPOINTS.contains(&snap.setpoint));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_readers_see_consistent_snapshots() {
    let state = Arc::new(
        ProcessState::new(
            ProcessSnapshot::initial(50.0, 0.0, 0.0),
            SetpointRange::new(0.0, 100.0).unwrap(),
        )
        .unwrap(),
    );
    let (shutdown, loop_handle) = spawn_loop(state.clone());

    let writer = {
        let state = state.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                state.write_setpoint(SETPOINTS[i % SETPOINTS.len()]).unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
    };

    let readers: Vec<_> = (0..100)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move {
                let mut last_tick = 0;
                for _ in 0..200 {
                    let snap = state.snapshot();
                    assert_consistent(&snap);
                    assert!(snap.tick >= last_tick, "tick went backwards");
                    last_tick = snap.tick;
                    tokio::task::yield_now().await;
                }
                last_tick
            })
        })
        .collect();

    for reader in readers {
        reader.await.unwrap();
    }
    writer.await.unwrap();

    shutdown.send(true).unwrap();
    loop_handle.await.unwrap();

    let snap = state.snapshot();
    assert!(snap.tick > 0);
    assert_consistent(&snap);
}

#[test]
fn blocking_threads_read_and_write_without_tearing() {
    let state = Arc::new(
        ProcessState::new(
            ProcessSnapshot::initial(50.0, 0.0, 0.0),
            SetpointRange::new(0.0, 100.0).unwrap(),
        )
        .unwrap(),
    );

    std::thread::scope(|scope| {
        for i in 0..4 {
            let state = &state;
            scope.spawn(move || {
                for j in 0..500 {
                    state
                        .write_setpoint(SETPOINTS[(i + j) % SETPOINTS.len()])
                        .unwrap();
                }
            });
        }
        for _ in 0..8 {
            let state = &state;
            scope.spawn(move || {
                for _ in 0..500 {
                    let snap = state.snapshot();
                    assert!(SETPOINTS.contains(&snap.setpoint));
                    assert!(state.write_setpoint(1e9).is_err());
                }
            });
        }
    });

    assert!(SETPOINTS.contains(&state.setpoint()));
}
