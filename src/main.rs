//! 粒子演示
//!
//! 模拟线程与渲染线程通过命令队列相连：模拟线程每帧 tick 并提交快照，
//! 渲染线程在帧开始时应用快照并为一个视图填充缓冲区。

use glam::{Mat4, Vec3};
use particle_engine::config::EngineConfig;
use particle_engine::core::error::{EngineError, EngineResult};
use particle_engine::core::initialize_logging;
use particle_engine::particles::modules::{
    AccelerationModule, CollisionModule, CollisionPlane, ColorOverLifeModule, InitialSizeModule,
    LifetimeModule, LocationModule, MeshRotationModule, ParticleShape, SizeByLifeModule,
    SubUvMode, SubUvModule, VelocityModule,
};
use particle_engine::particles::{
    ColorGradient, EmitterTemplate, EmitterTypeSettings, LinearColor, LodLevel, MeshHandle,
    ParticleStats, ParticleSystemComponent, ParticleSystemTemplate, RequiredModule, SortMode,
    SpawnModule, TrailSettings, VectorDistribution,
};
use particle_engine::render::{render_channel, RenderResources, RenderScene, SceneView};
use std::sync::Arc;
use std::thread;

const CONFIG_PATH: &str = "particle_engine.toml";
const FRAMES: u64 = 240;
const FRAME_TIME: f32 = 1.0 / 60.0;

fn fountain() -> EmitterTemplate {
    let fade = ColorGradient::new()
        .add_stop(0.0, LinearColor::new(1.0, 0.9, 0.6, 1.0))
        .add_stop(1.0, LinearColor::new(0.8, 0.2, 0.1, 0.0));
    EmitterTemplate::new("fountain").with_lod(
        LodLevel::new(0.0)
            .with_required(RequiredModule {
                sort_mode: SortMode::ViewProjDepth,
                sub_images_horizontal: 4,
                sub_images_vertical: 4,
                ..RequiredModule::default()
            })
            .with_spawn(SpawnModule::with_rate(120.0))
            .with_module(LifetimeModule::uniform(1.0, 2.0))
            .with_module(LocationModule::new(ParticleShape::Sphere { radius: 0.2 }))
            .with_module(VelocityModule::new(VectorDistribution::Uniform {
                min: Vec3::new(-1.0, 4.0, -1.0),
                max: Vec3::new(1.0, 6.0, 1.0),
            }))
            .with_module(InitialSizeModule::uniform(0.1, 0.3))
            .with_module(AccelerationModule::gravity(9.8))
            .with_module(ColorOverLifeModule::new(fade))
            .with_module(SubUvModule::new(SubUvMode::Linear)),
    )
}

fn debris() -> EmitterTemplate {
    EmitterTemplate::new("debris")
        .with_type(EmitterTypeSettings::Mesh { mesh: MeshHandle(1) })
        .with_lod(
            LodLevel::new(0.0)
                .with_required(RequiredModule {
                    duration: 2.0,
                    ..RequiredModule::default()
                })
                .with_spawn(SpawnModule::with_rate(0.0).burst(0.0, 30))
                .with_module(LifetimeModule::uniform(2.0, 3.0))
                .with_module(VelocityModule::new(VectorDistribution::Uniform {
                    min: Vec3::new(-3.0, 2.0, -3.0),
                    max: Vec3::new(3.0, 5.0, 3.0),
                }))
                .with_module(MeshRotationModule {
                    start_rotation: VectorDistribution::Uniform {
                        min: Vec3::ZERO,
                        max: Vec3::ONE,
                    },
                })
                .with_module(AccelerationModule::gravity(9.8))
                .with_module(CollisionModule::new(CollisionPlane::ground(0.0))),
        )
}

fn ribbon() -> EmitterTemplate {
    EmitterTemplate::new("ribbon")
        .with_type(EmitterTypeSettings::Ribbon(TrailSettings {
            max_trails: 1,
            tessellation: 4,
            tiling_distance: 1.0,
        }))
        .with_lod(
            LodLevel::new(0.0)
                .with_required(RequiredModule::default())
                .with_spawn(SpawnModule::with_rate(30.0))
                .with_module(LifetimeModule::uniform(1.0, 1.0))
                .with_module(VelocityModule::new(Vec3::new(0.0, 1.5, 0.0)))
                .with_module(SizeByLifeModule::linear(0.4, 0.0)),
        )
}

fn demo_template() -> ParticleSystemTemplate {
    ParticleSystemTemplate::new("demo")
        .with_emitter(fountain())
        .with_emitter(debris())
        .with_emitter(ribbon())
}

fn join<T>(handle: thread::JoinHandle<T>, name: &str) -> EngineResult<T> {
    handle
        .join()
        .map_err(|_| EngineError::Thread(format!("{name} thread panicked")))
}

fn run() -> EngineResult<()> {
    let mut config = EngineConfig::load_or_default(CONFIG_PATH);
    config.apply_env_overrides();
    config.validate()?;
    initialize_logging(&config.logging);

    let stats = Arc::new(ParticleStats::new());
    let (sender, receiver) = render_channel();
    let resources = RenderResources::new(&config.render, Arc::clone(&stats))?;
    let camera = Vec3::new(0.0, 3.0, 12.0);

    let render = thread::Builder::new()
        .name("render".to_string())
        .spawn(move || {
            let mut scene = RenderScene::new(receiver, resources);
            let views = [SceneView::look_at(0, camera, Vec3::ZERO, Vec3::Y, 1.0, 16.0 / 9.0)];
            let (mut frames, mut draws) = (0u64, 0usize);
            loop {
                let update = scene.wait_frame();
                if update.applied > 0 {
                    draws += scene.render_views(&views).len();
                    frames += 1;
                }
                if update.disconnected {
                    break;
                }
            }
            (frames, draws)
        })?;

    let template = Arc::new(demo_template());
    let simulation_config = config.simulation.clone();
    let simulation_stats = Arc::clone(&stats);
    let simulation = thread::Builder::new()
        .name("simulation".to_string())
        .spawn(move || -> EngineResult<u64> {
            let mut system =
                ParticleSystemComponent::new(template, &simulation_config, simulation_stats)?;
            system.activate(true);
            for frame in 0..FRAMES {
                let angle = frame as f32 * FRAME_TIME * 0.5;
                system.set_transform(Mat4::from_rotation_y(angle));
                system.tick(FRAME_TIME, &[camera]);
                system.submit(&sender)?;
            }
            system.remove_from_scene(&sender)?;
            Ok(system.frame())
        })?;

    let submitted = join(simulation, "simulation")??;
    let (rendered, draws) = join(render, "render")?;

    let totals = stats.snapshot();
    tracing::info!(
        target: "engine",
        submitted,
        rendered,
        draws,
        spawned = totals.spawned,
        killed = totals.killed,
        capacity_exceeded = totals.capacity_exceeded,
        fill_tasks = totals.fill_tasks_scheduled,
        sync_fallbacks = totals.fill_sync_fallbacks,
        "Demo finished"
    );
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Particle demo failed: {}", e);
        std::process::exit(1);
    }
}
