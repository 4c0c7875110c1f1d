//! Predictive cache warming.
//!
//! - [`cycles`]: fixed-cadence warming runs gated by local-time windows
//! - [`chains`]: delayed preloads triggered by domain events
//! - [`scheduler`]: owns the timers, the chain subscriptions and the pending steps

pub mod chains;
pub mod clock;
pub mod cycles;
pub mod pending;
pub mod scheduler;
pub mod stats;

pub use chains::{ChainDefinition, ChainStep, PreloadTask, default_chains};
pub use clock::{Clock, FixedClock, SystemClock};
pub use cycles::{CadenceEntry, CycleKind, CycleReport, TOMORROW_MORNING_HINT, TickOutcome, cadence_plan};
pub use pending::{PendingSteps, StepKey};
pub use scheduler::{PreloadFlags, PreloadScheduler, SchedulerError, ShutdownReport};
pub use stats::{BackgroundStats, ChainStats, CycleStats};
