//! Identification state machines
//!
//! Two cooperating machines share the capture and remote layers:
//! - OneShotIdentifier: Idle, Recording, Processing, then Success or Failure
//! - ContinuousDetector: Idle, Listening, AwaitingResult, looped while enabled

mod detector;
mod failure;
mod oneshot;

pub use detector::{ContinuousDetector, DetectorControl, LoopState};
pub use failure::IdentifyFailure;
pub use oneshot::{OneShotHandle, OneShotIdentifier, OneShotState};
