// Step sequencing: the timing model, the trigger dispatch rules, the
// look-ahead scheduler, and the thread that drives it.

pub mod dispatch;
pub mod scheduler;
pub mod thread;
pub mod timing;

pub use dispatch::{resolve, ChannelSnapshot, Fired};
pub use scheduler::{Scheduler, SchedulerUpdate, TickOutput, TriggerEvent};
pub use thread::{HostMessage, SchedulerHandle, SchedulerMessage};
pub use timing::Durations;
