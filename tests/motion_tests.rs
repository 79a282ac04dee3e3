//! Conversion, scheduling and abort behavior of the motion core

use rs_engine::{
    hal::{Bench, MockBoard, MockClock, MockConsole},
    AxleRegistry, AxleSpec, BoardSlot, Executor, Gearing, MicrostepConverter, MotionConfig,
    MotionError, MoveKind, Rotation, Window,
};

type MockBench = Bench<MockBoard, MockConsole, MockClock>;

fn motion() -> MotionConfig {
    MotionConfig::default()
        .with_timeunit_ms(20)
        .with_tick_us(100)
}

fn queue_and_run(
    reg: &mut AxleRegistry,
    bench: &mut MockBench,
    motion: &MotionConfig,
    name: &str,
    kind: MoveKind,
    distance: i32,
) {
    let id = reg.find(name).unwrap();
    MicrostepConverter::new(motion)
        .queue(reg, id, kind, distance, Window::FULL)
        .unwrap();
    Executor::new(motion)
        .run(reg, bench, motion.timeunit_us())
        .unwrap();
}

// ============================================================================
// Accumulated Error Tests
// ============================================================================

const DISTANCES: [i32; 10] = [7, -3, 13, 1, -11, 29, 2, -1, 17, 5];

#[test]
fn lift_drift_stays_under_one_microstep() {
    let motion = motion();
    let mut reg = AxleRegistry::new(&[AxleSpec::lifter("l", "lifter").at(1, 1)]).unwrap();
    let mut bench = Bench::mock();
    let slot = BoardSlot::new(1, 1);

    // exact microsteps are sum(mils) * 254 / 100
    let mut requested = 0i64;
    for round in 0..20 {
        for &d in &DISTANCES {
            queue_and_run(&mut reg, &mut bench, &motion, "l", MoveKind::Lift, d * (round % 3 + 1));
            requested += (d * (round % 3 + 1)) as i64;
            let error = requested * 254 - bench.board.position(slot) * 100;
            assert!((0..100).contains(&error), "error {error}/100 after {requested} mils");
        }
    }
}

#[test]
fn geared_rotation_drift_stays_under_one_microstep() {
    let motion = motion();
    let mut reg = AxleRegistry::new(&[AxleSpec::rotator("r", "geared rotator")
        .geared(Gearing::GEARMOTOR)
        .at(1, 1)])
    .unwrap();
    let mut bench = Bench::mock();
    let slot = BoardSlot::new(1, 1);
    let denom = 360 * 11;

    let mut requested = 0i64;
    for _ in 0..10 {
        for &d in &DISTANCES {
            queue_and_run(&mut reg, &mut bench, &motion, "r", MoveKind::Rotate, d);
            requested += d as i64;
            let error = requested * 800 * 57 - bench.board.position(slot) * denom;
            assert!((0..denom).contains(&error));
        }
    }
}

#[test]
fn ten_single_degrees_match_one_ten_degree_rotation() {
    let motion = motion();
    let spec = [AxleSpec::rotator("r", "geared rotator")
        .geared(Gearing::GEARMOTOR)
        .at(1, 1)];
    let slot = BoardSlot::new(1, 1);

    let mut reg = AxleRegistry::new(&spec).unwrap();
    let mut bench = Bench::mock();
    for _ in 0..10 {
        queue_and_run(&mut reg, &mut bench, &motion, "r", MoveKind::Rotate, 1);
    }
    let stepped = bench.board.position(slot);

    let mut reg = AxleRegistry::new(&spec).unwrap();
    let mut bench = Bench::mock();
    queue_and_run(&mut reg, &mut bench, &motion, "r", MoveKind::Rotate, 10);

    // 10 * 800 * 57 / (360 * 11) = 115.15
    assert_eq!(bench.board.position(slot), 115);
    assert_eq!(stepped, 115);
}

// ============================================================================
// Scheduling Tests
// ============================================================================

#[test]
fn late_window_continues_into_next_unit() {
    let motion = motion();
    let mut reg = AxleRegistry::prototype().unwrap();
    let mut bench = Bench::mock();
    let a2k = reg.find("a2k").unwrap();
    let slot = reg[a2k].slot().unwrap();

    MicrostepConverter::new(&motion)
        .queue(&mut reg, a2k, MoveKind::Lift, 100, Window::new(50, 199).unwrap())
        .unwrap();
    let exec = Executor::new(&motion);

    // percentages 50..99 are a third of 50..199
    let first = exec.run(&mut reg, &mut bench, motion.timeunit_us()).unwrap();
    assert_eq!(first.steps, 254 * 50 / 150);
    let rest = reg[a2k].movement.unwrap();
    assert_eq!(rest.steps_needed, 254 - first.steps);
    assert_eq!(rest.window, Window::new(0, 99).unwrap());

    let second = exec.run(&mut reg, &mut bench, motion.timeunit_us()).unwrap();
    assert_eq!(first.steps + second.steps, 254);
    assert!(!reg[a2k].is_queued());
    assert_eq!(bench.board.position(slot), 254);
}

#[test]
fn second_queue_leaves_first_untouched() {
    let motion = motion();
    let mut reg = AxleRegistry::prototype().unwrap();
    let conv = MicrostepConverter::new(&motion);
    let a2l = reg.find("a2l").unwrap();
    let a2r = reg.find("a2r").unwrap();

    conv.queue(&mut reg, a2l, MoveKind::Lift, 10, Window::FULL).unwrap();
    let queued = reg[a2l].movement;
    let deficit = reg[a2l].deficit;

    assert_eq!(
        conv.queue(&mut reg, a2l, MoveKind::Lift, 50, Window::DELAYED),
        Err(MotionError::AlreadyQueued { axle: "a2l" })
    );
    // the compensating lifter is busy, so the rotator is refused too
    assert_eq!(
        conv.queue(&mut reg, a2r, MoveKind::Rotate, 36, Window::FULL),
        Err(MotionError::AlreadyQueued { axle: "a2l" })
    );

    assert_eq!(reg[a2l].movement, queued);
    assert_eq!(reg[a2l].deficit, deficit);
    assert!(!reg[a2r].is_queued());
    assert_eq!(reg[a2r].deficit, 0);
}

#[test]
fn compensated_rotation_counter_rotates_lifter() {
    let motion = motion();
    let mut reg = AxleRegistry::prototype().unwrap();
    let mut bench = Bench::mock();
    queue_and_run(&mut reg, &mut bench, &motion, "s1r", MoveKind::Rotate, 18);

    let s1r = reg[reg.find("s1r").unwrap()].slot().unwrap();
    let s1l = reg[reg.find("s1l").unwrap()].slot().unwrap();
    assert!(bench.board.position(s1r) > 0);
    assert!(bench.board.position(s1l) < 0);
    assert!(bench
        .board
        .pulses_for(s1l)
        .all(|r| r == Rotation::CounterClockwise));
}

// ============================================================================
// Abort Tests
// ============================================================================

#[test]
fn fault_mid_unit_stops_every_axle() {
    let motion = motion();
    let mut reg = AxleRegistry::prototype().unwrap();
    let mut bench = Bench::mock();
    bench.board.fault_after_steps = Some(10);
    let conv = MicrostepConverter::new(&motion);
    for name in ["a2k", "p22", "rp2"] {
        let id = reg.find(name).unwrap();
        conv.queue(&mut reg, id, MoveKind::Lift, 100, Window::FULL).unwrap();
    }

    let err = Executor::new(&motion)
        .run(&mut reg, &mut bench, motion.timeunit_us())
        .unwrap_err();

    assert_eq!(err, MotionError::Fault);
    assert_eq!(bench.board.pulses.len(), 10);
    assert_eq!(reg.queued_count(), 0);
}
