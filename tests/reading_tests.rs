use mcremote::error::ReadingError;
use mcremote::reading::{celsius_to_fahrenheit, EngineTiming, Reading, MAX_PIOS, MAX_REPORT_SIZE};

fn parse(reading: &Reading) -> serde_json::Value {
    serde_json::from_str(reading.to_json().unwrap().as_str()).unwrap()
}

#[test]
fn test_celsius_to_fahrenheit_is_exact_at_fixed_points() {
    assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
    assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
    assert_eq!(celsius_to_fahrenheit(-40.0), -40.0);
}

#[test]
fn test_envelope_keys_are_always_present() {
    let reading = Reading::celsius("ow-28ff640e", 1_700_000_000, 21.5);
    let value = parse(&reading);

    assert_eq!(value["device"], "ow-28ff640e");
    assert_eq!(value["mtime"], 1_700_000_000u64);
    assert_eq!(value["type"], "celsius");
}

#[test]
fn test_celsius_reading_round_trips_exactly() {
    let reading = Reading::celsius("ow-28ff640e", 100, 21.5);
    let value = parse(&reading);

    assert_eq!(value["tc"].as_f64().unwrap() as f32, 21.5f32);
    assert_eq!(
        value["tf"].as_f64().unwrap() as f32,
        celsius_to_fahrenheit(21.5)
    );
}

#[test]
fn test_humidity_extends_celsius_with_one_field() {
    let reading = Reading::humidity("i2c-44", 100, 20.0, 55.5);
    let value = parse(&reading);

    assert_eq!(value["type"], "humidity");
    assert_eq!(value["tc"].as_f64().unwrap() as f32, 20.0f32);
    assert_eq!(value["tf"].as_f64().unwrap() as f32, 68.0f32);
    assert_eq!(value["rh"].as_f64().unwrap() as f32, 55.5f32);
}

#[test]
fn test_switch_reading_expands_bits_per_pin() {
    let reading = Reading::switch("ow-29112233", 100, 3, 0b101).unwrap();
    let value = parse(&reading);

    assert_eq!(value["type"], "switch");
    assert_eq!(value["pio_count"], 3);

    let states = value["states"].as_array().unwrap();
    assert_eq!(states.len(), 3);
    assert_eq!(states[0], serde_json::json!({ "pio": 0, "state": true }));
    assert_eq!(states[1], serde_json::json!({ "pio": 1, "state": false }));
    assert_eq!(states[2], serde_json::json!({ "pio": 2, "state": true }));
}

#[test]
fn test_switch_reading_rejects_oversized_banks() {
    assert_eq!(
        Reading::switch("ow-29112233", 100, MAX_PIOS + 1, 0).unwrap_err(),
        ReadingError::TooManyPios(MAX_PIOS + 1)
    );
    assert!(Reading::switch("ow-29112233", 100, MAX_PIOS, 0xffff).is_ok());
}

#[test]
fn test_widest_switch_reading_fits_report_buffer() {
    let reading = Reading::switch("ow-2911223344556677", 1_700_000_000, MAX_PIOS, 0xaaaa).unwrap();
    let buffer = reading.to_json().unwrap();
    assert!(buffer.len() <= MAX_REPORT_SIZE);

    let states = parse(&reading)["states"].as_array().unwrap().clone();
    assert_eq!(states.len(), usize::from(MAX_PIOS));
}

#[test]
fn test_pwm_reading_carries_duty_bounds() {
    let reading = Reading::pwm("pwm-01", 100, 2048, 0, 4095);
    let value = parse(&reading);

    assert_eq!(value["type"], "pwm");
    assert_eq!(value["duty"], 2048);
    assert_eq!(value["duty_min"], 0);
    assert_eq!(value["duty_max"], 4095);
}

#[test]
fn test_ram_reading_reports_counters() {
    let reading = Reading::ram("node-deadbeef0001", 100, 98_304, 196_608);
    let value = parse(&reading);

    assert_eq!(value["type"], "ram");
    assert_eq!(value["freeram"], 98_304);
    assert_eq!(value["maxram"], 196_608);
}

#[test]
fn test_startup_reading_is_envelope_only() {
    let reading = Reading::startup("node-deadbeef0001", 100);
    let value = parse(&reading);

    assert_eq!(value["type"], "startup");
    assert_eq!(value.as_object().unwrap().len(), 3);
}

#[test]
fn test_engine_timing_serializes_phase_durations() {
    let timing = EngineTiming {
        engine: "ds",
        discover_us: 1_200,
        convert_us: 94_000,
        report_us: 310,
    };
    let reading = Reading::engine_timing("node-deadbeef0001", 100, timing);
    let value = parse(&reading);

    assert_eq!(value["type"], "engine");
    assert_eq!(value["engine"], "ds");
    assert_eq!(value["discover_us"], 1_200);
    assert_eq!(value["convert_us"], 94_000);
    assert_eq!(value["report_us"], 310);
}

#[test]
fn test_all_zero_engine_timing_is_flagged_for_suppression() {
    let silent = EngineTiming {
        engine: "i2c",
        discover_us: 0,
        convert_us: 0,
        report_us: 0,
    };
    assert!(!silent.has_nonzero_values());

    let active = EngineTiming {
        convert_us: 1,
        ..silent
    };
    assert!(active.has_nonzero_values());
}

#[test]
fn test_type_tag_is_fixed_at_construction() {
    let reading = Reading::humidity("i2c-44", 100, 20.0, 55.5);
    assert_eq!(reading.type_tag(), "humidity");

    // Serializing never rewrites the tag.
    let before = reading.type_tag();
    let _ = reading.to_json().unwrap();
    assert_eq!(reading.type_tag(), before);
}
