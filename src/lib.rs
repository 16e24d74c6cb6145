//! # Particle Engine
//!
//! A CPU particle simulation core with module-driven emitters and a
//! double-buffered handoff to a render thread.
//!
//! ## Features
//!
//! - **Particle arena**: fixed-stride records with an active-index indirection table (O(1) kill)
//! - **Module stack**: spawn/update modules resolved once into a payload offset table
//! - **LOD**: per-level module parameters with stable payload offsets
//! - **Snapshots**: immutable per-frame value copies sent over a command queue
//! - **Buffer fill**: sprite, mesh, beam, ribbon and anim-trail vertex generation, optionally on worker threads
//!
//! ## Architecture Design
//!
//! - **Simulation thread**: owns [`particles::ParticleSystemComponent`]s and ticks them
//! - **Render thread**: owns [`render::RenderScene`] and its scene proxies
//! - **Worker pool**: transient per-view buffer fill tasks
//!
//! ### Example
//!
//! ```ignore
//! use particle_engine::prelude::*;
//!
//! let (sender, receiver) = render_channel();
//! let mut system = ParticleSystemComponent::new(template, &config.simulation, stats.clone())?;
//! system.activate(true);
//! system.tick(1.0 / 60.0, &[camera]);
//! system.submit(&sender)?;
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Errors, logging and macros
//! - [`config`]: TOML/JSON configuration
//! - [`particles`]: Simulation side
//! - [`render`]: Render side

/// Errors, logging initialization and shared macros
pub mod core;
/// Configuration system
pub mod config;
/// CPU particle simulation
pub mod particles;
/// Render-thread proxies, sorting and buffer fill
pub mod render;

/// 常用类型
pub mod prelude {
    pub use crate::config::{EngineConfig, RenderConfig, SimulationConfig};
    pub use crate::core::error::{EngineError, EngineResult};
    pub use crate::particles::{
        EmitterInstance, EmitterTemplate, EmitterTypeSettings, FrameSnapshotBundle, LodLevel,
        ParticleStats, ParticleSystemComponent, ParticleSystemTemplate, RequiredModule,
        SpawnModule,
    };
    pub use crate::render::{render_channel, RenderResources, RenderScene, SceneView};
}
