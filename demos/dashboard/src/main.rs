//! A small system dashboard: the whole engine wired end to end.
//!
//! Two title fades run under a barrier that releases a gauge slide;
//! a pair of marquee tickers chase each other with SYNC/WAIT_FOR; a
//! CPU data trigger flashes a warning sequence when load crosses 80%.
//! A producer thread feeds fake CPU samples through a ring buffer, the
//! frame driver pulses at 60 Hz, and everything lands in a SQLite file
//! next to the binary.
//!
//! Run with `cargo run -p dashboard`; RUST_LOG=debug shows the plumbing.

use std::time::Duration;

use tickloom::{
    AnimId, AnimKind, AnimationDef, BarrierTimeoutPolicy, Direction,
    LoopCount, MarqueeProgram, Orchestrator, PrimitiveId, PrimitiveSpec,
    PropertySet, Rgb, Sample, SampleValue, SequenceStep, Statement,
    TickloomConfig, TriggerAction,
};
use tickloom_driver::{DriverConfig, FrameDriver};

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn build_engine() -> Result<Orchestrator, tickloom::TickloomError> {
    let config = TickloomConfig {
        persistence_path: Some("dashboard.db".into()),
        ..TickloomConfig::with_fps(60)
    }
    .with_env_overrides();
    let mut engine = Orchestrator::new(config)?;

    // Two intro fades, one second each.
    for id in ["title", "subtitle"] {
        engine.register_animation(
            AnimationDef::builder(id, AnimKind::Fade)
                .duration_ticks(60)
                .easing("ease_out_quad")
                .start_values(PropertySet::new().with_opacity(0.0))
                .end_values(PropertySet::new().with_opacity(1.0))
                .build()?,
        )?;
        engine.start_animation(&AnimId::new(id))?;
    }

    // The gauge slides in once both fades finish.
    engine.register_animation(
        AnimationDef::builder("gauge", AnimKind::Slide)
            .duration_ticks(45)
            .easing("ease_out_cubic")
            .start_values(PropertySet::new().with_position(-64, 8))
            .end_values(PropertySet::new().with_position(4, 8))
            .build()?,
    )?;
    engine.register_primitive(
        PrimitiveId::new("intro_done"),
        PrimitiveSpec::Barrier {
            barrier_tick: 60,
            waiting_ids: vec![AnimId::new("title"), AnimId::new("subtitle")],
            dependents: vec![AnimId::new("gauge")],
            timeout_ticks: Some(120),
            on_timeout: BarrierTimeoutPolicy::Release,
        },
    )?;

    // The warning flash the CPU trigger releases: three red pulses.
    engine.register_animation(
        AnimationDef::builder("warn_flash", AnimKind::Color)
            .duration_ticks(20)
            .repeat_count(3)
            .reverse_on_repeat(true)
            .start_values(PropertySet::new().with_color(Rgb::new(32, 32, 32)))
            .end_values(PropertySet::new().with_color(Rgb::new(255, 48, 48)))
            .build()?,
    )?;
    engine.register_primitive(
        PrimitiveId::new("warn_seq"),
        PrimitiveSpec::Sequence {
            start_tick: None,
            steps: vec![SequenceStep {
                offset_ticks: 0,
                animation_id: AnimId::new("warn_flash"),
            }],
        },
    )?;
    let trigger_id = PrimitiveId::new("cpu_hot");
    let trigger = engine.data_trigger(
        &trigger_id,
        "cpu > 80",
        &["cpu"],
        true,
        TriggerAction::ActivatePrimitive {
            primitive: PrimitiveId::new("warn_seq"),
        },
    )?;
    engine.register_primitive(trigger_id, trigger)?;

    // The CPU percentage drives the gauge's progress parameter too.
    engine.bind_data("cpu", AnimId::new("gauge"), "progress", "value / 100")?;

    // Marquee pair: the headline scrolls left and cues the footer.
    engine.set_marquee_program(MarqueeProgram::new(
        "headline",
        vec![Statement::Loop {
            count: LoopCount::Infinite,
            body: vec![
                Statement::step_move(Direction::Left, 128),
                Statement::Sync {
                    event: "wrapped".to_string(),
                },
            ],
        }],
    ))?;
    engine.set_marquee_program(
        MarqueeProgram::new(
            "footer",
            vec![Statement::Loop {
                count: LoopCount::Infinite,
                body: vec![
                    Statement::WaitFor {
                        event: "wrapped".to_string(),
                        timeout_ticks: 240,
                    },
                    Statement::step_move(Direction::Right, 128),
                ],
            }],
        )
        .with_origin(0, 15),
    )?;

    Ok(engine)
}

// ---------------------------------------------------------------------------
// Fake data producer
// ---------------------------------------------------------------------------

/// Pushes a synthetic CPU load curve: calm, a spike past 80%, calm.
fn spawn_cpu_producer(ring: tickloom::RingBuffer, fps: u32) {
    std::thread::spawn(move || {
        let frame = Duration::from_secs_f64(1.0 / f64::from(fps));
        for i in 0u64.. {
            let tick = i * 10; // one sample every 10 frames
            let load = match tick {
                0..=180 => 35.0 + (i % 5) as f64,
                181..=420 => 92.0,
                _ => 40.0,
            };
            let sample =
                match Sample::new("cpu", SampleValue::Number(load), tick) {
                    Ok(sample) => sample,
                    Err(_) => continue,
                };
            if ring.push(sample) {
                tracing::debug!("cpu sample displaced an unread one");
            }
            std::thread::sleep(frame * 10);
        }
    });
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut engine = build_engine()?;
    let ring = engine.create_buffer("sys");
    spawn_cpu_producer(ring, engine.config().fps);

    let mut driver = FrameDriver::new(DriverConfig::with_fps(engine.config().fps));
    let run_for = Duration::from_secs(10);
    let started = std::time::Instant::now();

    tracing::info!("dashboard running for {run_for:?}");
    while started.elapsed() < run_for {
        driver.next_pulse().await;
        let frame = engine.on_tick_pulse();

        // Stand-in for a renderer: log a one-line summary every second.
        if frame.tick % 60 == 0 {
            let title = frame
                .states
                .get(&AnimId::new("title"))
                .and_then(|s| s.opacity)
                .unwrap_or(0.0);
            let headline = frame
                .marquee
                .get(&tickloom::WidgetId::new("headline"))
                .copied()
                .unwrap_or((0, 0));
            tracing::info!(
                tick = frame.tick,
                title_opacity = format!("{title:.2}"),
                headline_x = headline.0,
                events = frame.events.len(),
                "frame"
            );
        }
        for event in &frame.events {
            tracing::info!(tick = event.tick, kind = %event.kind, id = %event.primitive_id, "event");
        }
        driver.finish_pulse();
    }

    let metrics = engine.metrics().snapshot();
    tracing::info!(
        ?metrics,
        load = %driver.load_level(),
        slots_lost = driver.total_slots_lost(),
        "final counters"
    );
    engine.shutdown();
    Ok(())
}
