pub mod schedule;
pub mod timer;

pub use schedule::{EventLabel, EventSchedule, TrialClock};
pub use timer::{CalibrationStats, HighPrecisionTimer, ManualTimer, Timer};
