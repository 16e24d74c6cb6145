//! 端到端场景：模拟 → 快照 → 渲染侧

use anyhow::{anyhow, Context};
use glam::{Mat4, Vec3};
use particle_engine::config::{RenderConfig, SimulationConfig};
use particle_engine::particles::modules::{LifetimeModule, VelocityModule};
use particle_engine::particles::{
    EmitterInstance, EmitterTemplate, LodLevel, ParticlePool, ParticleStats,
    ParticleSystemComponent, ParticleSystemTemplate, RequiredModule, SortMode, SpawnModule,
    PARTICLE_RECORD_SIZE,
};
use particle_engine::render::{
    fill_emitter, render_channel, renderer_for, FillInput, FillTask, FillWorkerPool,
    RenderResources, RenderScene, SceneView,
};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

fn emitter(template: EmitterTemplate) -> anyhow::Result<(EmitterInstance, Arc<ParticleStats>)> {
    let stats = Arc::new(ParticleStats::new());
    let instance = EmitterInstance::new(
        Arc::new(template),
        0,
        &SimulationConfig::default(),
        Arc::clone(&stats),
    )?;
    Ok((instance, stats))
}

fn fountain(rate: f32) -> EmitterTemplate {
    EmitterTemplate::new("fountain").with_seed(7).with_lod(
        LodLevel::new(0.0)
            .with_required(RequiredModule {
                sort_mode: SortMode::ViewProjDepth,
                ..RequiredModule::default()
            })
            .with_spawn(SpawnModule::with_rate(rate))
            .with_module(LifetimeModule::new(10.0))
            .with_module(VelocityModule::new(Vec3::new(0.0, 1.0, -1.0))),
    )
}

fn camera() -> SceneView {
    SceneView::look_at(0, Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0)
}

#[test]
fn test_rate_spawn_over_two_seconds() -> anyhow::Result<()> {
    let (mut emitter, _) = emitter(fountain(10.0))?;
    emitter.set_transform(Mat4::IDENTITY);
    for _ in 0..20 {
        emitter.tick(0.1, false);
    }
    let active = emitter.active_particles();
    assert!((19..=21).contains(&active), "active {active}");
    Ok(())
}

#[test]
fn test_burst_over_capacity() -> anyhow::Result<()> {
    let template = EmitterTemplate::new("burst").with_max_particles(4).with_lod(
        LodLevel::new(0.0)
            .with_required(RequiredModule::default())
            .with_spawn(SpawnModule::with_rate(0.0).burst(0.0, 6))
            .with_module(LifetimeModule::new(10.0)),
    );
    let (mut emitter, stats) = emitter(template)?;
    let report = emitter.tick(0.05, false);
    assert_eq!(report.spawned, 4);
    assert_eq!(report.dropped, 2);
    assert_eq!(emitter.active_particles(), 4);
    assert_eq!(stats.snapshot().capacity_exceeded, 2);
    Ok(())
}

#[test]
fn test_kill_swaps_last_into_hole() -> anyhow::Result<()> {
    let mut pool = ParticlePool::with_capacity(PARTICLE_RECORD_SIZE, 8)?;
    for i in 0..5 {
        pool.acquire_slot().context("pool has free slots")?;
        let view = pool.particle_mut(i).context("slot just acquired")?;
        view.record.position = Vec3::splat(i as f32);
    }
    let before: Vec<Vec<u8>> = (0..5)
        .filter_map(|i| pool.particle_bytes(i).map(<[u8]>::to_vec))
        .collect();
    assert_eq!(before.len(), 5);

    assert!(pool.kill_at(2));
    assert_eq!(pool.active_count(), 4);
    assert_eq!(pool.particle_bytes(2), Some(before[4].as_slice()));
    for i in [0, 1, 3] {
        assert_eq!(pool.particle_bytes(i), Some(before[i].as_slice()));
    }
    Ok(())
}

#[test]
fn test_snapshot_is_a_value_copy() -> anyhow::Result<()> {
    let (mut emitter, _) = emitter(fountain(50.0))?;
    emitter.tick(0.2, false);
    let snapshot = emitter.build_snapshot().context("emitter has particles")?;
    let bytes = snapshot.replay.bytes().to_vec();
    let count = snapshot.replay.active_count;

    for _ in 0..5 {
        emitter.tick(0.2, false);
    }
    emitter.kill_all();

    assert_eq!(snapshot.replay.active_count, count);
    assert_eq!(snapshot.replay.bytes(), bytes.as_slice());
    Ok(())
}

#[test]
fn test_fill_falls_back_to_render_thread_when_workers_busy() -> anyhow::Result<()> {
    let (mut emitter, stats) = emitter(fountain(40.0))?;
    emitter.tick(0.5, false);
    let snapshot = Arc::new(emitter.build_snapshot().context("emitter has particles")?);
    let view = camera();
    let renderer = renderer_for(snapshot.emitter_type());

    let expected = fill_emitter(
        renderer,
        &FillInput {
            snapshot: &snapshot,
            view: &view,
            local_to_world: Mat4::IDENTITY,
            order: None,
        },
    )?;

    let workers = FillWorkerPool::new(1, Arc::clone(&stats))?;
    let (release, gate) = mpsc::channel::<()>();
    let blocker = FillTask::new(99, 99, move || {
        let _ = gate.recv();
        Ok(Default::default())
    });
    workers.schedule(&blocker);

    let make_task = |view_index: usize| {
        let snapshot = Arc::clone(&snapshot);
        let mut view = camera();
        view.index = view_index;
        FillTask::new(0, view_index, move || {
            fill_emitter(
                renderer,
                &FillInput {
                    snapshot: &snapshot,
                    view: &view,
                    local_to_world: Mat4::IDENTITY,
                    order: None,
                },
            )
        })
    };
    let task_a = make_task(0);
    let task_b = make_task(1);
    workers.schedule(&task_a);
    workers.schedule(&task_b);

    let output_a = task_a.ensure_complete(&stats)?;
    assert!(task_a.ran_inline());
    assert_eq!(output_a.vertex_data, expected.vertex_data);
    assert_eq!(output_a.index_data, expected.index_data);

    release.send(())?;
    let output_b = task_b.ensure_complete(&stats)?;
    assert_eq!(output_b.vertex_count, expected.vertex_count);
    blocker.ensure_complete(&stats)?;
    assert!(stats.snapshot().fill_sync_fallbacks >= 1);
    Ok(())
}

#[test]
fn test_proxy_tracks_last_two_bundles() -> anyhow::Result<()> {
    let stats = Arc::new(ParticleStats::new());
    let template = Arc::new(ParticleSystemTemplate::new("fx").with_emitter(fountain(20.0)));
    let mut system =
        ParticleSystemComponent::new(template, &SimulationConfig::default(), Arc::clone(&stats))?;
    system.activate(true);

    let (sender, receiver) = render_channel();
    let resources = RenderResources::new(&RenderConfig::default(), Arc::clone(&stats))?;
    let mut scene = RenderScene::new(receiver, resources);

    for n in 1..=5u64 {
        system.tick(0.1, &[Vec3::ZERO]);
        system.submit(&sender)?;
        if n % 2 == 1 {
            scene.begin_frame();
            let proxy = scene.proxy(system.id())?;
            assert_eq!(proxy.current().map(|b| b.frame), Some(system.frame()));
            if n > 1 {
                assert_eq!(proxy.previous().map(|b| b.frame), Some(system.frame() - 1));
            }
        }
    }

    let draws = scene.render_views(&[camera()]);
    assert_eq!(draws.len(), 1);
    assert!(draws[0].output.vertex_count > 0);

    system.remove_from_scene(&sender)?;
    scene.begin_frame();
    assert_eq!(scene.proxy_count(), 0);
    Ok(())
}

#[test]
fn test_simulation_and_render_threads() -> anyhow::Result<()> {
    const FRAMES: u64 = 60;
    let stats = Arc::new(ParticleStats::new());
    let (sender, receiver) = render_channel();
    let config = RenderConfig {
        worker_threads: 2,
        min_particles_for_async_fill: 1,
        ..RenderConfig::default()
    };
    let resources = RenderResources::new(&config, Arc::clone(&stats))?;

    let render = thread::spawn(move || {
        let mut scene = RenderScene::new(receiver, resources);
        let mut second = camera();
        second.index = 1;
        let views = [camera(), second];
        let mut last_frame = 0;
        let mut draws = 0;
        loop {
            let update = scene.wait_frame();
            for proxy in scene.proxies() {
                let frame = proxy.frame().unwrap_or(0);
                assert!(frame >= last_frame);
                last_frame = frame;
            }
            draws += scene.render_views(&views).len();
            if update.disconnected {
                break;
            }
        }
        (last_frame, draws)
    });

    let template = Arc::new(ParticleSystemTemplate::new("fx").with_emitter(fountain(120.0)));
    let sim_stats = Arc::clone(&stats);
    let simulation = thread::spawn(move || -> anyhow::Result<u64> {
        let mut system =
            ParticleSystemComponent::new(template, &SimulationConfig::default(), sim_stats)?;
        system.activate(true);
        for _ in 0..FRAMES {
            system.tick(1.0 / 60.0, &[Vec3::ZERO]);
            system.submit(&sender)?;
        }
        Ok(system.frame())
    });

    let submitted = simulation
        .join()
        .map_err(|_| anyhow!("simulation thread panicked"))??;
    let (last_frame, draws) = render
        .join()
        .map_err(|_| anyhow!("render thread panicked"))?;
    assert_eq!(submitted, FRAMES);
    assert_eq!(last_frame, FRAMES);
    assert!(draws > 0);

    let totals = stats.snapshot();
    assert_eq!(totals.bundles_submitted, FRAMES);
    assert_eq!(totals.bundles_applied, FRAMES);
    assert_eq!(totals.fill_failures, 0);
    Ok(())
}
