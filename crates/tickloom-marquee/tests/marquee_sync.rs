//! Integration tests for cross-widget marquee resolution.

use tickloom_marquee::{
    Direction, LoopCount, MarqueeDiagnostic, MarqueeProgram, MarqueeResolver,
    ResolverConfig, Statement, WidgetId,
};

fn resolver() -> MarqueeResolver {
    MarqueeResolver::new(ResolverConfig {
        fixed_point_iterations: 16,
        unroll_horizon_ticks: 1200,
    })
}

// =========================================================================
// Seed scenario 3: SYNC / WAIT_FOR pair
// =========================================================================

#[test]
fn test_sync_wait_for_pair_scenario() {
    let mut resolver = resolver();

    // W1: LOOP(INFINITE){ MOVE(LEFT, 100){step=1}; SYNC(e) }
    resolver
        .set_program(MarqueeProgram::new(
            "w1",
            vec![Statement::Loop {
                count: LoopCount::Infinite,
                body: vec![
                    Statement::step_move(Direction::Left, 100),
                    Statement::Sync {
                        event: "e".to_string(),
                    },
                ],
            }],
        ))
        .unwrap();

    // W2: LOOP(INFINITE){ WAIT_FOR(e, 50); MOVE(RIGHT, 100){step=1} }
    resolver
        .set_program(MarqueeProgram::new(
            "w2",
            vec![Statement::Loop {
                count: LoopCount::Infinite,
                body: vec![
                    Statement::WaitFor {
                        event: "e".to_string(),
                        timeout_ticks: 50,
                    },
                    Statement::step_move(Direction::Right, 100),
                ],
            }],
        ))
        .unwrap();

    resolver.resolve();
    assert!(resolver.diagnostics().is_empty());

    // W1 emits e at 100, 200, 300, …
    let occurrences = resolver.event_occurrences("e");
    for expected in [100, 200, 300, 400] {
        assert!(occurrences.contains(&expected), "missing e@{expected}");
    }

    let w2 = WidgetId::new("w2");
    // W2 holds until the first occurrence of e.
    assert_eq!(resolver.position_at(&w2, 0).unwrap(), (0, 0));
    assert_eq!(resolver.position_at(&w2, 99).unwrap(), (0, 0));
    // First right-move spans 100..200; halfway through, x == 50.
    assert_eq!(resolver.position_at(&w2, 150).unwrap(), (50, 0));
    assert_eq!(resolver.position_at(&w2, 200).unwrap(), (100, 0));

    // W1 scrolls left a pixel per tick.
    let w1 = WidgetId::new("w1");
    assert_eq!(resolver.position_at(&w1, 37).unwrap(), (-37, 0));
    assert_eq!(resolver.position_at(&w1, 100).unwrap(), (-100, 0));
}

#[test]
fn test_timelines_are_identical_across_resolvers() {
    let build = || {
        let mut r = resolver();
        r.set_program(MarqueeProgram::new(
            "a",
            vec![Statement::Loop {
                count: LoopCount::Infinite,
                body: vec![
                    Statement::step_move(Direction::Left, 64),
                    Statement::Pause { ticks: 16 },
                    Statement::Sync {
                        event: "turn".to_string(),
                    },
                ],
            }],
        ))
        .unwrap();
        r.set_program(MarqueeProgram::new(
            "b",
            vec![Statement::Loop {
                count: LoopCount::Infinite,
                body: vec![
                    Statement::WaitFor {
                        event: "turn".to_string(),
                        timeout_ticks: 40,
                    },
                    Statement::step_move(Direction::Down, 8),
                ],
            }],
        ))
        .unwrap();
        r.resolve();
        r
    };

    let first = build();
    let second = build();
    for widget in ["a", "b"] {
        let id = WidgetId::new(widget);
        assert_eq!(
            first.timeline(&id).unwrap(),
            second.timeline(&id).unwrap(),
            "widget {widget}"
        );
    }
}

// =========================================================================
// Cycles
// =========================================================================

#[test]
fn test_mutual_wait_cycle_resolves_by_fixed_point() {
    let mut resolver = resolver();

    // A rendezvous: each widget announces itself, waits for the other,
    // then moves. The first fixed-point round resolves the waits via
    // timeout; the second sees both announcements at tick 0 and
    // stabilizes.
    for (widget, own, other, dir) in [
        ("a", "ready_a", "ready_b", Direction::Right),
        ("b", "ready_b", "ready_a", Direction::Left),
    ] {
        resolver
            .set_program(MarqueeProgram::new(
                widget,
                vec![
                    Statement::Sync {
                        event: own.to_string(),
                    },
                    Statement::WaitFor {
                        event: other.to_string(),
                        timeout_ticks: 10,
                    },
                    Statement::step_move(dir, 5),
                ],
            ))
            .unwrap();
    }

    resolver.resolve();
    assert!(resolver.diagnostics().is_empty(), "cycle should converge");

    // Both announcements land at tick 0, so both moves start at 0.
    assert_eq!(
        resolver.position_at(&WidgetId::new("a"), 5).unwrap(),
        (5, 0)
    );
    assert_eq!(
        resolver.position_at(&WidgetId::new("b"), 5).unwrap(),
        (-5, 0)
    );

    // Fixed point: resolving again changes nothing.
    let before = resolver.timeline(&WidgetId::new("a")).unwrap().clone();
    resolver.resolve();
    assert_eq!(resolver.timeline(&WidgetId::new("a")).unwrap(), &before);
}

#[test]
fn test_non_convergence_reports_diagnostic() {
    // A pathological pair with a 1-iteration budget cannot stabilize.
    let mut resolver = MarqueeResolver::new(ResolverConfig {
        fixed_point_iterations: 1,
        unroll_horizon_ticks: 400,
    });
    for (widget, own, other) in
        [("a", "ping", "pong"), ("b", "pong", "ping")]
    {
        resolver
            .set_program(MarqueeProgram::new(
                widget,
                vec![Statement::Loop {
                    count: LoopCount::Finite(4),
                    body: vec![
                        Statement::WaitFor {
                            event: other.to_string(),
                            timeout_ticks: 7,
                        },
                        Statement::step_move(Direction::Right, 3),
                        Statement::Sync {
                            event: own.to_string(),
                        },
                    ],
                }],
            ))
            .unwrap();
    }
    resolver.resolve();

    // Timelines exist (timeout-expiry fallback) and the diagnostic
    // names the unsettled events.
    assert!(resolver.timeline(&WidgetId::new("a")).is_ok());
    match &resolver.diagnostics()[0] {
        MarqueeDiagnostic::NotConverged {
            iterations,
            unresolved_events,
        } => {
            assert_eq!(*iterations, 1);
            assert!(unresolved_events.contains(&"ping".to_string()));
            assert!(unresolved_events.contains(&"pong".to_string()));
        }
    }
}

// =========================================================================
// Incremental recompilation
// =========================================================================

#[test]
fn test_editing_emitter_invalidates_waiter() {
    let mut resolver = resolver();
    resolver
        .set_program(MarqueeProgram::new(
            "emitter",
            vec![
                Statement::Pause { ticks: 30 },
                Statement::Sync {
                    event: "go".to_string(),
                },
                Statement::Pause { ticks: 500 },
            ],
        ))
        .unwrap();
    resolver
        .set_program(MarqueeProgram::new(
            "waiter",
            vec![
                Statement::WaitFor {
                    event: "go".to_string(),
                    timeout_ticks: 1000,
                },
                Statement::step_move(Direction::Right, 10),
            ],
        ))
        .unwrap();
    resolver.resolve();
    assert_eq!(
        resolver.position_at(&WidgetId::new("waiter"), 35).unwrap(),
        (5, 0)
    );

    // Move the emission later; the waiter must follow.
    resolver
        .set_program(MarqueeProgram::new(
            "emitter",
            vec![
                Statement::Pause { ticks: 60 },
                Statement::Sync {
                    event: "go".to_string(),
                },
                Statement::Pause { ticks: 500 },
            ],
        ))
        .unwrap();
    assert!(resolver.has_dirty());
    resolver.resolve();
    assert_eq!(
        resolver.position_at(&WidgetId::new("waiter"), 35).unwrap(),
        (0, 0)
    );
    assert_eq!(
        resolver.position_at(&WidgetId::new("waiter"), 65).unwrap(),
        (5, 0)
    );
}

#[test]
fn test_unrelated_widget_keeps_cached_timeline() {
    let mut resolver = resolver();
    resolver
        .set_program(MarqueeProgram::new(
            "lonely",
            vec![Statement::step_move(Direction::Down, 20)],
        ))
        .unwrap();
    resolver
        .set_program(MarqueeProgram::new(
            "other",
            vec![Statement::step_move(Direction::Up, 20)],
        ))
        .unwrap();
    resolver.resolve();
    let before = resolver.timeline(&WidgetId::new("lonely")).unwrap().clone();

    resolver
        .set_program(MarqueeProgram::new(
            "other",
            vec![Statement::step_move(Direction::Up, 40)],
        ))
        .unwrap();
    resolver.resolve();
    assert_eq!(
        resolver.timeline(&WidgetId::new("lonely")).unwrap(),
        &before
    );
}

// =========================================================================
// Cycle wrapping beyond the horizon
// =========================================================================

#[test]
fn test_infinite_loop_wraps_past_horizon() {
    let mut resolver = MarqueeResolver::new(ResolverConfig {
        fixed_point_iterations: 16,
        unroll_horizon_ticks: 500,
    });
    resolver
        .set_program(MarqueeProgram::new(
            "ticker",
            vec![Statement::Loop {
                count: LoopCount::Infinite,
                body: vec![
                    Statement::step_move(Direction::Left, 50),
                    Statement::Pause { ticks: 50 },
                ],
            }],
        ))
        .unwrap();
    resolver.resolve();

    let id = WidgetId::new("ticker");
    let timeline = resolver.timeline(&id).unwrap();
    assert!(timeline.cycle.is_some());

    // Far beyond the unroll horizon the cycle keeps the pattern exact:
    // period 100, drift -50 per cycle.
    let early = resolver.position_at(&id, 25).unwrap();
    let late = resolver.position_at(&id, 25 + 100 * 1000).unwrap();
    assert_eq!(early, (-25, 0));
    assert_eq!(late, (-25 - 50 * 1000, 0));
}
