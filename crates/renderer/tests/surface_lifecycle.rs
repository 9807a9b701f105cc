use std::time::Duration;

use renderer::{
    default_uniforms, CompileStage, DriverState, HeadlessHost, Ledger, Quality, RuntimeError,
    RuntimeOptions, ShaderSource, ShaderSurface, TickOutcome, UniformDescriptor, UniformError,
    UniformKind, UniformValue,
};

const GRADIENT: &str = r"
precision mediump float;
uniform float time;
uniform vec2 resolution;
void main() {
    vec2 uv = gl_FragCoord.xy / resolution;
    gl_FragColor = vec4(uv, 0.5 + 0.5 * sin(time), 1.0);
}
";

const PALETTE: &str = r"
precision mediump float;
uniform float time;
uniform vec2 resolution;
uniform vec3 palette[5];
uniform int paletteSize;
uniform bool reducedMotion;
void main() {
    vec3 color = vec3(0.0);
    for (int i = 0; i < 5; i++) {
        if (i < paletteSize) {
            color += palette[i];
        }
    }
    float t = reducedMotion ? 0.0 : time;
    gl_FragColor = vec4(color * (0.5 + 0.5 * sin(t)), 1.0);
}
";

fn scalar(ledger: &Ledger, name: &str) -> f32 {
    match ledger.uniform(name) {
        Some(UniformValue::Scalar(value)) => value,
        other => panic!("expected scalar '{name}', found {other:?}"),
    }
}

fn gradient_surface(host: HeadlessHost, options: RuntimeOptions) -> ShaderSurface<HeadlessHost> {
    ShaderSurface::create(
        host,
        ShaderSource::fragment_only(GRADIENT),
        default_uniforms(),
        options,
    )
    .expect("headless surface")
}

fn palette_uniforms() -> Vec<UniformDescriptor> {
    let mut uniforms = default_uniforms();
    uniforms.push(UniformDescriptor::value(
        "palette",
        UniformKind::Vec3Array { capacity: 5 },
    ));
    uniforms.push(UniformDescriptor::length_of("paletteSize", "palette"));
    uniforms.push(UniformDescriptor::reduced_motion("reducedMotion"));
    uniforms
}

#[test]
fn low_quality_surface_animates_then_stops_after_destroy() {
    let host = HeadlessHost::new(400.0, 300.0, 2.0);
    let ledger = host.ledger();
    let clock = host.clock();
    let mut surface = gradient_surface(
        host,
        RuntimeOptions {
            quality: Quality::Low,
            ..RuntimeOptions::default()
        },
    );

    assert_eq!(surface.size().dimensions(), (400, 300));
    assert_eq!(ledger.surface_size(), Some((400, 300)));
    assert_eq!(surface.state(), DriverState::Running);

    clock.advance(Duration::from_millis(250));
    assert_eq!(surface.tick(), TickOutcome::Drawn);
    assert!((scalar(&ledger, "time") - 0.25).abs() < 1e-4);
    assert_eq!(
        ledger.uniform("resolution"),
        Some(UniformValue::Vec2([400.0, 300.0]))
    );
    assert!(ledger.tick_pending());

    surface.destroy();
    assert_eq!(surface.state(), DriverState::Destroyed);
    assert!(!ledger.tick_pending());
    assert_eq!(ledger.live_handles(), 0);

    let draws = ledger.draws();
    clock.advance(Duration::from_millis(16));
    assert_eq!(surface.tick(), TickOutcome::Inactive);
    assert_eq!(ledger.draws(), draws);
    assert!(!ledger.tick_pending());
}

#[test]
fn second_destroy_issues_no_backend_calls() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let mut surface = gradient_surface(host, RuntimeOptions::default());

    surface.destroy();
    let calls = ledger.calls();
    let cancels = ledger.tick_cancels();
    let released = ledger.contexts_released();

    surface.destroy();
    drop(surface);
    assert_eq!(ledger.calls(), calls);
    assert_eq!(ledger.tick_cancels(), cancels);
    assert_eq!(ledger.contexts_released(), released);
    assert_eq!(released, 1);
}

#[test]
fn dropping_a_live_surface_releases_everything() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let surface = gradient_surface(host, RuntimeOptions::default());
    assert!(ledger.live_handles() > 0);

    drop(surface);
    assert_eq!(ledger.live_handles(), 0);
    assert!(!ledger.tick_pending());
    assert_eq!(ledger.contexts_released(), 1);
}

#[test]
fn broken_fragment_leaves_idle_surface_without_leaks() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let broken = GRADIENT.replace("sin(time)", "sin(time");
    let mut surface = ShaderSurface::create(
        host,
        ShaderSource::fragment_only(broken),
        default_uniforms(),
        RuntimeOptions::default(),
    )
    .expect("compile failures do not fail creation");

    assert_eq!(surface.state(), DriverState::Idle);
    let err = surface.last_compile_error().expect("compile error kept");
    assert_eq!(err.stage, CompileStage::Fragment);
    assert_eq!(ledger.live_programs(), 0);
    // Only the quad buffer survives a failed compile.
    assert_eq!(ledger.live_handles(), 1);
    assert_eq!(ledger.tick_requests(), 0);
    assert_eq!(surface.tick(), TickOutcome::Inactive);

    surface
        .update_shader_source(ShaderSource::fragment_only(GRADIENT))
        .expect("valid source compiles");
    assert_eq!(surface.state(), DriverState::Running);
    assert!(surface.last_compile_error().is_none());
}

#[test]
fn failed_link_is_reported_as_link_stage() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let mut surface = gradient_surface(host, RuntimeOptions::default());

    ledger.fail_next_link("ERROR: varying vUv not written");
    let err = surface
        .update_shader_source(ShaderSource::fragment_only(GRADIENT))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Compile(ref e) if e.stage == CompileStage::Link));
    assert_eq!(ledger.live_handles(), 1);
    assert_eq!(surface.state(), DriverState::Idle);
}

#[test]
fn suspend_and_resume_keep_the_clock_monotonic() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let clock = host.clock();
    let mut surface = gradient_surface(host, RuntimeOptions::default());

    for _ in 0..5 {
        clock.advance(Duration::from_millis(100));
        assert_eq!(surface.tick(), TickOutcome::Drawn);
    }
    let before = scalar(&ledger, "time");
    assert!((before - 0.5).abs() < 1e-4);

    surface.set_visible(false).expect("alive");
    assert_eq!(surface.state(), DriverState::Suspended);
    clock.advance(Duration::from_secs(3));

    surface.set_visible(true).expect("alive");
    clock.advance(Duration::from_millis(16));
    assert_eq!(surface.tick(), TickOutcome::Drawn);
    let after = scalar(&ledger, "time");
    assert!(after >= before);
    assert!(after < before + 0.1, "clock jumped to {after}");
}

#[test]
fn paused_clock_suspends_the_loop() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let clock = host.clock();
    let mut surface = gradient_surface(host, RuntimeOptions::default());

    clock.advance(Duration::from_secs(1));
    surface.tick();
    surface.set_playing(false);
    assert_eq!(surface.state(), DriverState::Suspended);
    clock.advance(Duration::from_secs(5));
    assert_eq!(surface.tick(), TickOutcome::Inactive);

    surface.set_playing(true);
    assert_eq!(surface.state(), DriverState::Running);
    assert_eq!(surface.elapsed(), Duration::from_secs(1));
}

#[test]
fn context_loss_is_recovered_by_rebuild() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let clock = host.clock();
    let mut surface = gradient_surface(host, RuntimeOptions::default());

    clock.advance(Duration::from_secs(1));
    assert_eq!(surface.tick(), TickOutcome::Drawn);

    ledger.lose_context();
    clock.advance(Duration::from_millis(500));
    assert_eq!(surface.tick(), TickOutcome::ContextLost);
    assert_eq!(surface.state(), DriverState::Lost);
    assert!(!ledger.tick_pending());
    assert_eq!(surface.tick(), TickOutcome::Inactive);

    clock.advance(Duration::from_secs(10));
    surface.rebuild().expect("fresh context");
    assert_eq!(surface.state(), DriverState::Running);
    assert_eq!(ledger.contexts_acquired(), 2);
    assert_eq!(ledger.live_programs(), 1);
    assert_eq!(surface.elapsed(), Duration::from_millis(1500));

    clock.advance(Duration::from_millis(250));
    assert_eq!(surface.tick(), TickOutcome::Drawn);
    assert!((scalar(&ledger, "time") - 1.75).abs() < 1e-4);
}

#[test]
fn short_palette_binds_its_length_and_leaves_trailing_slots() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let mut surface = ShaderSurface::create(
        host,
        ShaderSource::fragment_only(PALETTE),
        palette_uniforms(),
        RuntimeOptions::default(),
    )
    .expect("headless surface");

    let full = vec![[0.1, 0.1, 0.1]; 5];
    surface
        .update_uniform_values([("palette", UniformValue::Vec3Array(full))])
        .expect("declared array");
    surface.tick();

    let short = vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    surface
        .update_uniform_values([("palette", UniformValue::Vec3Array(short))])
        .expect("declared array");
    surface.tick();

    assert_eq!(ledger.uniform("paletteSize"), Some(UniformValue::Int(3)));
    let Some(UniformValue::Vec3Array(slots)) = ledger.uniform("palette") else {
        panic!("palette not bound");
    };
    assert_eq!(slots.len(), 5);
    assert_eq!(slots[2], [0.0, 0.0, 1.0]);
    assert_eq!(slots[3], [0.1, 0.1, 0.1]);
    assert_eq!(slots[4], [0.1, 0.1, 0.1]);
    assert_eq!(ledger.oversized_array_writes(), 0);
}

#[test]
fn oversized_palette_is_clamped_to_capacity() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let mut surface = ShaderSurface::create(
        host,
        ShaderSource::fragment_only(PALETTE),
        palette_uniforms(),
        RuntimeOptions::default(),
    )
    .expect("headless surface");

    surface
        .update_uniform_values([("palette", UniformValue::Vec3Array(vec![[0.5; 3]; 8]))])
        .expect("declared array");
    surface.tick();

    assert_eq!(ledger.uniform("paletteSize"), Some(UniformValue::Int(5)));
    assert_eq!(ledger.oversized_array_writes(), 0);
}

#[test]
fn reduced_motion_pins_time_and_sets_flag() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let ledger = host.ledger();
    let clock = host.clock();
    let mut surface = ShaderSurface::create(
        host,
        ShaderSource::fragment_only(PALETTE),
        palette_uniforms(),
        RuntimeOptions {
            reduced_motion: true,
            ..RuntimeOptions::default()
        },
    )
    .expect("headless surface");

    clock.advance(Duration::from_secs(2));
    surface.tick();
    assert_eq!(scalar(&ledger, "time"), 0.0);
    assert_eq!(ledger.uniform("reducedMotion"), Some(UniformValue::Bool(true)));

    surface.set_reduced_motion(false);
    clock.advance(Duration::from_secs(1));
    surface.tick();
    assert!((scalar(&ledger, "time") - 3.0).abs() < 1e-4);
}

#[test]
fn invalid_partial_update_applies_nothing() {
    let host = HeadlessHost::new(64.0, 64.0, 1.0);
    let mut surface = ShaderSurface::create(
        host,
        ShaderSource::fragment_only(PALETTE),
        palette_uniforms(),
        RuntimeOptions::default(),
    )
    .expect("headless surface");

    let err = surface
        .update_uniform_values([
            ("palette", UniformValue::Vec3Array(vec![[1.0; 3]])),
            ("paletteSize", UniformValue::Int(4)),
        ])
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Uniform(UniformError::Derived(ref name)) if name == "paletteSize"));
    assert_eq!(
        surface.values().get("palette"),
        Some(&UniformValue::Vec3Array(Vec::new()))
    );

    let err = surface
        .update_uniform_values([("mouse", UniformValue::Vec2([0.0, 0.0]))])
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Uniform(UniformError::Unknown(_))));
}

#[test]
fn degenerate_host_box_is_clamped() {
    let mut host = HeadlessHost::new(0.0, 0.0, 1.0);
    host.set_device_pixel_ratio(2.0);
    let ledger = host.ledger();
    let mut surface = gradient_surface(host, RuntimeOptions::default());
    assert_eq!(ledger.surface_size(), Some((1, 1)));

    surface.host_mut().set_pixel_box(320.0, 240.0);
    surface.resize();
    assert_eq!(ledger.surface_size(), Some((640, 480)));
}
