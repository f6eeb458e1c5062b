mod clock;
mod model;
mod runner;
mod state;

pub use clock::{Clock, TokioClock};
pub use model::{Job, JobOutcome};
pub use runner::{JobRunner, PollingPolicy};
pub use state::{JobEvent, JobState, StateMachine, StatusClass, StatusClassifier};

#[cfg(test)]
pub(crate) use clock::ManualClock;
