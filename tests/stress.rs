//! Stress tests for barchart
//!
//! Run with: cargo test --release stress -- --ignored

use barchart::*;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::time::Instant;

// 2024-05-01T00:00:00Z
const START: i64 = 1_714_521_600;

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_readings() {
    let config = ChartConfig::with_window(Granularity::Minutes, 60).with_time_zone(TimeZoneMode::Utc);
    let mut node = BarChartNode::new(config, MemoryStore::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let topic = format!("sensor-{}", i % 8);
        let value = rng.gen_range(-50.0..50.0);
        node.handle(&InboundEvent::reading(&topic, value, START + i as i64))
            .unwrap();
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Handled {} readings in {:?}", iterations, elapsed);
    println!("Rate: {:.0} readings/second", rate);

    // Eviction keeps every topic bounded by the window
    for topic in node.store().topics() {
        assert!(node.store().buckets(&topic).unwrap().len() <= 60);
    }
}

#[test]
#[ignore]
fn stress_test_meter_never_negative() {
    let config = ChartConfig::meter(Granularity::Hours, 24, true).with_time_zone(TimeZoneMode::Utc);
    let mut node = BarChartNode::new(config, MemoryStore::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let mut absolute = 10_000.0;
    let mut clamped = 0;
    for i in 0..50_000 {
        // Occasional meter resets
        absolute = if rng.gen_bool(0.01) {
            rng.gen_range(0.0..100.0)
        } else {
            absolute + rng.gen_range(0.0..2.0)
        };
        let outcome = node
            .handle(&InboundEvent::reading("meter", absolute, START + i * 7))
            .unwrap();
        clamped += outcome.warnings.len();

        let chart = outcome.message.as_chart().unwrap();
        assert!(chart.data_min >= 0.0, "negative bucket at iteration {}", i);
    }

    println!("Clamped {} regressions", clamped);
    assert!(clamped > 0);
}

#[test]
#[ignore]
fn stress_test_snapshot_restore_cycle() {
    let config = ChartConfig::with_window(Granularity::QuarterHours, 96)
        .with_strategy(Strategy::Avg)
        .with_time_zone(TimeZoneMode::Utc);
    let mut node = BarChartNode::new(config.clone(), MemoryStore::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    for i in 0..1_000 {
        let ts = START + i * 60;
        let outcome = node
            .handle(&InboundEvent::reading("t", rng.gen_range(0.0..10.0), ts))
            .unwrap();

        // Restart from the emitted message every 100 readings
        if i % 100 == 99 {
            let mut wire = serde_json::to_value(&outcome.message).unwrap();
            wire["ts"] = serde_json::json!(ts);
            let before = outcome.message.as_chart().unwrap().payload.clone();

            node = BarChartNode::new(config.clone(), MemoryStore::new()).unwrap();
            let restored = node.handle_json(wire).unwrap();
            assert_eq!(restored.message.as_chart().unwrap().payload, before);
        }
    }
}
