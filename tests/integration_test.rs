//! Integration tests for the PID controller, its error history and the run log

use lab_pid_control::{
    read_records, ControlError, OutputMode, PidConfig, PidController, Regime, RegimeSwitch, RollingErrorBuffer,
    RunConfig, RunLogWriter, Term, TickRecord,
};
use std::time::Duration;

fn p_only(p: f64, setpoint: f64) -> PidController {
    let mut pid = PidController::new(PidConfig {
        p,
        ..PidConfig::default()
    })
    .expect("valid config");
    pid.set_setpoint(setpoint);
    pid
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// ROLLING ERROR BUFFER
// ============================================================================

#[test]
fn test_buffer_starts_full_of_zeros() {
    let buffer = RollingErrorBuffer::new(5).unwrap();
    assert_eq!(buffer.values(), &[0.0; 5]);
}

#[test]
fn test_buffer_rejects_zero_capacity() {
    assert!(matches!(
        RollingErrorBuffer::new(0),
        Err(ControlError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_buffer_evicts_oldest() {
    let mut buffer = RollingErrorBuffer::new(3).unwrap();
    for v in [1.0, 2.0, 3.0, 4.0] {
        buffer.push(v);
    }
    assert_eq!(buffer.values(), &[2.0, 3.0, 4.0]);
    assert_eq!(buffer.newest(), 4.0);
}

#[test]
fn test_trapezoid_over_window() {
    let mut buffer = RollingErrorBuffer::new(4).unwrap();
    for _ in 0..4 {
        buffer.push(1.0);
    }
    buffer.push(5.0);
    assert_eq!(buffer.values(), &[1.0, 1.0, 1.0, 5.0]);
    // (1+1)/2 + (1+1)/2 + (1+5)/2 = 1 + 1 + 3
    assert!(approx(buffer.trapezoid(), 5.0));
}

#[test]
fn test_single_sample_window_has_no_area_or_slope() {
    let mut buffer = RollingErrorBuffer::new(1).unwrap();
    buffer.push(7.0);
    assert_eq!(buffer.trapezoid(), 0.0);
    assert_eq!(buffer.derivative(), 0.0);
}

#[test]
fn test_derivative_uses_newest_difference() {
    let mut buffer = RollingErrorBuffer::new(4).unwrap();
    for v in [1.0, 1.0, 1.0, 5.0] {
        buffer.push(v);
    }
    // diffs [0, 0, 4], the newest difference is taken as is
    assert!(approx(buffer.derivative(), 4.0));
}

#[test]
fn test_derivative_divides_by_differences_after_it() {
    let mut buffer = RollingErrorBuffer::new(5).unwrap();
    for v in [2.0, 2.0, 2.0] {
        buffer.push(v);
    }
    // [0, 0, 2, 2, 2] -> diffs [0, 2, 0, 0], nonzero at k = 1 with two after it
    assert_eq!(buffer.derivative(), 1.0);

    let mut longer = RollingErrorBuffer::new(6).unwrap();
    for v in [6.0, 6.0, 6.0] {
        longer.push(v);
    }
    // diffs [0, 0, 6, 0, 0] -> 6 / 2
    assert_eq!(longer.derivative(), 3.0);

    let mut single_after = RollingErrorBuffer::new(4).unwrap();
    for v in [0.0, 4.0, 4.0] {
        single_after.push(v);
    }
    // [0, 0, 4, 4] -> diffs [0, 4, 0] -> 4 / 1
    assert_eq!(single_after.derivative(), 4.0);
}

#[test]
fn test_derivative_falls_back_to_latest_difference() {
    let mut buffer = RollingErrorBuffer::new(4).unwrap();
    for v in [3.0, 3.0, 3.0] {
        buffer.push(v);
    }
    // [0, 3, 3, 3] -> only the first difference is nonzero
    assert_eq!(buffer.derivative(), 0.0);

    let flat = RollingErrorBuffer::new(4).unwrap();
    assert_eq!(flat.derivative(), 0.0);
}

#[test]
fn test_resize_keeps_newest_samples() {
    let mut buffer = RollingErrorBuffer::new(4).unwrap();
    for v in [1.0, 2.0, 3.0, 4.0] {
        buffer.push(v);
    }
    buffer.resize(2).unwrap();
    assert_eq!(buffer.values(), &[3.0, 4.0]);
    buffer.resize(4).unwrap();
    assert_eq!(buffer.values(), &[0.0, 0.0, 3.0, 4.0]);
    assert!(buffer.resize(0).is_err());
}

// ============================================================================
// PID CONTROLLER
// ============================================================================

#[test]
fn test_defaults_enable_only_proportional() {
    let pid = PidController::new(PidConfig::default()).unwrap();
    assert!(pid.is_enabled(Term::P));
    assert!(!pid.is_enabled(Term::I));
    assert!(!pid.is_enabled(Term::D));
    assert_eq!(pid.mode(), OutputMode::Auto);
    assert_eq!(pid.history().capacity(), 100);
    assert_eq!(pid.integral_limits(), (-500.0, 500.0));
}

#[test]
fn test_history_length_is_constant() {
    let mut pid = PidController::new(PidConfig {
        p: 1.0,
        history_size: 7,
        ..PidConfig::default()
    })
    .unwrap();
    assert_eq!(pid.history().values().len(), 7);
    for m in 0..50 {
        pid.feed(m as f64);
        assert_eq!(pid.history().values().len(), 7);
    }
}

#[test]
fn test_proportional_only_output() {
    let mut pid = p_only(1.0, 10.0);
    assert_eq!(pid.feed(10.0), 0.0);
    assert_eq!(pid.feed(7.0), 3.0);
    assert_eq!(pid.output(), 3.0);
    assert_eq!(pid.error(), 3.0);
    assert_eq!(pid.measurement(), 7.0);
}

#[test]
fn test_disabling_p_forces_zero_output() {
    let mut pid = PidController::new(PidConfig {
        p: 2.0,
        i: 1.0,
        d: 1.0,
        ..PidConfig::default()
    })
    .unwrap();
    pid.set_setpoint(20.0);
    pid.set_enabled(Term::I, true);
    pid.set_enabled(Term::D, true);
    assert!(pid.feed(15.0) != 0.0);

    pid.set_enabled(Term::P, false);
    for m in [0.0, 15.0, 40.0] {
        assert_eq!(pid.feed(m), 0.0);
    }
    // terms are still tracked while the output is forced to zero
    assert_eq!(pid.terms().0, 2.0 * (20.0 - 40.0));
}

#[test]
fn test_manual_mode_overrides_control_law() {
    let mut pid = PidController::new(PidConfig {
        p: 3.0,
        i: 0.5,
        d: 0.1,
        ..PidConfig::default()
    })
    .unwrap();
    pid.set_setpoint(50.0);
    pid.set_enabled(Term::I, true);
    pid.set_enabled(Term::D, true);

    pid.set_manual(true, Some(42.0));
    assert_eq!(pid.feed(10.0), 42.0);
    assert_eq!(pid.mode(), OutputMode::Manual(42.0));

    pid.set_manual(true, None);
    assert_eq!(pid.feed(10.0), 0.0);

    pid.set_manual(false, None);
    assert!(pid.feed(10.0) > 100.0);
}

#[test]
fn test_integral_gate_keeps_previous_estimate() {
    let mut pid = PidController::new(PidConfig {
        p: 10.0,
        i: 0.1,
        history_size: 4,
        ..PidConfig::default()
    })
    .unwrap();
    pid.set_enabled(Term::I, true);

    pid.feed(-5.0); // [0, 0, 0, 5] -> 2.5, |10 * 2.5| < 100
    assert!(approx(pid.integral(), 2.5));
    pid.feed(-5.0); // [0, 0, 5, 5] -> 7.5, 75 < 100
    assert!(approx(pid.integral(), 7.5));
    pid.feed(-5.0); // [0, 5, 5, 5] -> 12.5, 125 is gated out
    assert!(approx(pid.integral(), 7.5));

    let (term_p, term_i, term_d) = pid.terms();
    assert!(approx(term_p, 50.0));
    assert!(approx(term_i, 10.0 * 0.1 * 7.5));
    assert_eq!(term_d, 0.0);
    assert!(approx(pid.output(), 57.5));
}

#[test]
fn test_derivative_term_opposes_rising_error() {
    let mut pid = PidController::new(PidConfig {
        p: 2.0,
        d: 0.5,
        history_size: 4,
        ..PidConfig::default()
    })
    .unwrap();
    pid.set_enabled(Term::D, true);

    // history [0, 0, 0, 1]: derivative 1, term_d = -2 * 0.5 * 1
    let output = pid.feed(-1.0);
    assert!(approx(pid.derivative(), 1.0));
    assert!(approx(pid.terms().2, -1.0));
    assert!(approx(output, 1.0));
}

#[test]
fn test_history_updates_while_terms_disabled() {
    let mut pid = PidController::new(PidConfig {
        p: 1.0,
        i: 0.5,
        ..PidConfig::default()
    })
    .unwrap();
    pid.feed(-2.0);
    pid.feed(-2.0);
    // [.., 0, 2, 2] -> 1 + 2
    assert!(approx(pid.integral(), 3.0));
    assert_eq!(pid.terms().1, 0.0);

    pid.set_enabled(Term::I, true);
    assert!(approx(pid.update(), 2.0 + 0.5 * 3.0));
}

#[test]
fn test_clear_history_restarts_integral() {
    let mut pid = PidController::new(PidConfig {
        p: 1.0,
        i: 1.0,
        history_size: 10,
        ..PidConfig::default()
    })
    .unwrap();
    pid.set_enabled(Term::I, true);
    for _ in 0..5 {
        pid.feed(-3.0);
    }

    pid.clear_history();
    assert!(pid.history().values().iter().all(|v| *v == 0.0));

    pid.feed(-50.0);
    let values = pid.history().values();
    assert!(values[..9].iter().all(|v| *v == 0.0));
    assert_eq!(values[9], 50.0);
    // a lone sample contributes half its value to the window area
    assert!(approx(pid.integral(), 25.0));
}

#[test]
fn test_configure_is_idempotent() {
    let config = PidConfig {
        p: 4.0,
        i: 0.3,
        d: 0.2,
        history_size: 6,
        ..PidConfig::default()
    };
    let mut once = PidController::new(config).unwrap();
    let mut twice = PidController::new(config).unwrap();
    twice.configure(config).unwrap();
    twice.configure(config).unwrap();

    for pid in [&mut once, &mut twice] {
        pid.set_setpoint(12.0);
        pid.set_enabled(Term::I, true);
        pid.set_enabled(Term::D, true);
    }
    for m in [10.0, 11.0, 11.5, 13.0, 12.0, 12.2] {
        assert_eq!(once.feed(m), twice.feed(m));
    }
}

#[test]
fn test_configure_resizes_without_clearing() {
    let mut pid = p_only(1.0, 0.0);
    pid.feed(-1.0);
    pid.feed(-2.0);
    pid.configure(PidConfig {
        p: 1.0,
        history_size: 3,
        ..PidConfig::default()
    })
    .unwrap();
    assert_eq!(pid.history().values(), &[0.0, 1.0, 2.0]);
}

#[test]
fn test_invalid_gains_are_rejected() {
    let bad = PidConfig {
        i: f64::NAN,
        ..PidConfig::default()
    };
    assert!(matches!(PidController::new(bad), Err(ControlError::InvalidConfiguration(_))));

    let mut pid = p_only(1.0, 0.0);
    let err = pid
        .configure(PidConfig {
            d: f64::INFINITY,
            ..PidConfig::default()
        })
        .unwrap_err();
    assert!(matches!(err, ControlError::InvalidConfiguration(_)));
    assert_eq!(pid.config().p, 1.0);
}

#[test]
fn test_non_finite_measurement_propagates() {
    let mut pid = p_only(1.0, 10.0);
    pid.feed(8.0);
    let integral = pid.integral();
    assert!(pid.feed(f64::NAN).is_nan());
    assert_eq!(pid.integral(), integral);
}

#[test]
fn test_setpoint_change_applies_on_next_feed() {
    let mut pid = p_only(2.0, 10.0);
    assert_eq!(pid.feed(10.0), 0.0);
    pid.set_setpoint(11.0);
    assert_eq!(pid.output(), 0.0);
    assert_eq!(pid.feed(10.0), 2.0);
}

// ============================================================================
// REGIME SWITCH
// ============================================================================

#[test]
fn test_regime_below_setpoint_integrates() {
    let mut pid = p_only(1.0, 30.0);
    let mut regime = RegimeSwitch::default();
    pid.set_enabled(Term::D, true);

    assert_eq!(regime.apply(&mut pid, 29.0), Regime::Below { history_cleared: false });
    assert!(pid.is_enabled(Term::I));
    assert!(!pid.is_enabled(Term::D));
}

#[test]
fn test_regime_above_setpoint_freezes_integral() {
    let mut pid = p_only(1.0, 30.0);
    let mut regime = RegimeSwitch::new(1.0);
    pid.set_enabled(Term::I, true);

    assert_eq!(regime.apply(&mut pid, 30.5), Regime::Above { derivative: true });
    assert!(!pid.is_enabled(Term::I));
    assert!(pid.is_enabled(Term::D));

    assert_eq!(regime.apply(&mut pid, 32.0), Regime::Above { derivative: false });
    assert!(!pid.is_enabled(Term::D));
    assert!(regime.was_above());
}

#[test]
fn test_regime_clears_history_once_on_falling_edge() {
    let mut pid = p_only(1.0, 30.0);
    let mut regime = RegimeSwitch::default();

    pid.feed(31.0);
    regime.apply(&mut pid, 31.0);
    pid.feed(29.5);
    assert!(pid.history().values().iter().any(|v| *v != 0.0));

    assert_eq!(regime.apply(&mut pid, 29.5), Regime::Below { history_cleared: true });
    assert!(pid.history().values().iter().all(|v| *v == 0.0));

    pid.feed(29.0);
    assert_eq!(regime.apply(&mut pid, 29.0), Regime::Below { history_cleared: false });
    assert_eq!(pid.history().newest(), 1.0);
}

// ============================================================================
// RUN LOG
// ============================================================================

#[test]
fn test_run_log_round_trip() {
    let ticks: Vec<(f64, f64)> = (0..25).map(|n| (20.0 + n as f64 * 0.137, (n as f64 * 3.3) % 100.0)).collect();

    let mut writer = RunLogWriter::new(Vec::new(), false);
    for (m, out) in &ticks {
        writer.write_record(&TickRecord::compact(*m, *out)).unwrap();
    }
    assert_eq!(writer.records_written(), 25);
    let bytes = writer.into_inner();

    let records = read_records(bytes.as_slice()).unwrap();
    let pairs: Vec<(f64, f64)> = records.iter().map(|r| (r.measurement, r.output)).collect();
    assert_eq!(pairs, ticks);
}

#[test]
fn test_run_log_compact_line_format() {
    let line = TickRecord::compact(29.5, 12.25).to_line();
    assert_eq!(line, "29.5\t12.25\n");
}

#[test]
fn test_run_log_extended_records() {
    let mut pid = p_only(2.0, 30.0);
    pid.feed(29.0);
    let mut writer = RunLogWriter::new(Vec::new(), true);
    writer.log_tick(&pid.snapshot(), 2.0).unwrap();
    let text = String::from_utf8(writer.into_inner()).unwrap();
    assert_eq!(text.trim_end().split('\t').count(), 6);

    let records = read_records(text.as_bytes()).unwrap();
    let detail = records[0].detail.expect("extended columns");
    assert_eq!(detail.error, 1.0);
    assert_eq!(detail.term_p, 2.0);
}

#[test]
fn test_run_log_skips_comments_and_reports_bad_lines() {
    let text = "# measurement\toutput\n\n25.0\t10.0\n25.1\t9.0\t1.0\n";
    match read_records(text.as_bytes()) {
        Err(ControlError::MalformedRecord { line, .. }) => assert_eq!(line, 4),
        other => panic!("expected malformed record, got {:?}", other),
    }

    let records = read_records("# header\n25.0\t10.0\n".as_bytes()).unwrap();
    assert_eq!(records, vec![TickRecord::compact(25.0, 10.0)]);
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[test]
fn test_config_defaults_match_heater_stabilization() {
    let config = RunConfig::from_toml("").unwrap();
    assert_eq!(config, RunConfig::default());
    assert_eq!(config.setpoint, 30.0);
    assert_eq!(config.pid.history_size, 25);
    assert_eq!(config.control.output_max, 100.0);
    assert!(config.regime.enabled);
}

#[test]
fn test_config_file_values() {
    let config = RunConfig::from_toml(
        r#"
        setpoint = 45.5

        [loop]
        interval_ms = 250
        max_ticks = 10

        [pid]
        p = 5.0
        i = 0.5
        d = 0.0
        history_size = 40

        [regime]
        derivative_band = 0.5
        "#,
    )
    .unwrap();
    assert_eq!(config.setpoint, 45.5);
    assert_eq!(config.control.interval, Duration::from_millis(250));
    assert_eq!(config.control.max_ticks, Some(10));
    assert_eq!(config.pid.p, 5.0);
    assert_eq!(config.pid.history_size, 40);
    assert_eq!(config.regime.derivative_band, 0.5);
}

#[test]
fn test_config_rejects_invalid_values() {
    assert!(matches!(
        RunConfig::from_toml("[pid]\nhistory_size = 0\n"),
        Err(ControlError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        RunConfig::from_toml("[loop]\noutput_min = 10.0\noutput_max = 5.0\n"),
        Err(ControlError::InvalidConfiguration(_))
    ));
    assert!(RunConfig::from_toml("no_such_key = 1\n").is_err());
}

#[test]
fn test_config_rejects_mistyped_table_keys() {
    for text in [
        "[pid]\nkp = 20.0\n",
        "[loop]\ninterval = 500\n",
        "[regime]\nband = 1.0\n",
        "[log]\nfile = \"heat.dat\"\n",
        "[hardware]\npwm = 1\n",
        "[simulation]\nenable = true\n",
        "[simulation.plant]\nnoise = 0.1\n",
    ] {
        assert!(
            matches!(RunConfig::from_toml(text), Err(ControlError::InvalidConfiguration(_))),
            "accepted {text:?}"
        );
    }
}

#[test]
fn test_config_rejects_invalid_plant() {
    for plant in [
        "noise_amplitude = inf",
        "noise_amplitude = -0.1",
        "time_constant_s = 0.0",
        "dropout = 1.5",
        "busy = nan",
    ] {
        let text = format!("[simulation]\nenabled = true\n\n[simulation.plant]\n{plant}\n");
        assert!(
            matches!(RunConfig::from_toml(&text), Err(ControlError::InvalidConfiguration(_))),
            "accepted {plant:?}"
        );
    }

    let config = RunConfig::from_toml("[simulation]\nenabled = true\n\n[simulation.plant]\ndropout = 0.25\n").unwrap();
    assert_eq!(config.simulation.plant.dropout, 0.25);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let path = std::env::temp_dir().join("lab-pid-control-no-such-config.toml");
    let _ = std::fs::remove_file(&path);
    assert_eq!(RunConfig::load(&path).unwrap(), RunConfig::default());
}
