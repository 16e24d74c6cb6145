//! 发射器实例与时间推进

mod instance;
pub mod timing;

pub use instance::{EmitterInstance, TickReport};
pub use timing::{EmitterClock, SpawnEvent, SpawnPlan, TimeStep};
