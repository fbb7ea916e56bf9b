//! Builder lifecycle state machine.
//!
//! ```text
//! Uninitialized → Initialized → ImagePrepared → ContainerReady → Benchmarked → CleanedUp
//!        └──────────────┴──────────────┴───────────────┴──────────→ Failed(stage)
//! ```
//!
//! Every stage except cleanup requires the state its predecessor leaves
//! behind. Cleanup is accepted from any state.

use std::fmt;

use crate::error::{BenchError, Stage};

/// Where a builder is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Uninitialized,
    Initialized,
    ImagePrepared,
    ContainerReady,
    Benchmarked,
    CleanedUp,
    /// The named stage failed.
    Failed(Stage),
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderState::Uninitialized => write!(f, "uninitialized"),
            BuilderState::Initialized => write!(f, "initialized"),
            BuilderState::ImagePrepared => write!(f, "image prepared"),
            BuilderState::ContainerReady => write!(f, "container ready"),
            BuilderState::Benchmarked => write!(f, "benchmarked"),
            BuilderState::CleanedUp => write!(f, "cleaned up"),
            BuilderState::Failed(stage) => write!(f, "failed at {stage}"),
        }
    }
}

fn required_state(stage: Stage) -> Option<BuilderState> {
    match stage {
        Stage::Init => Some(BuilderState::Uninitialized),
        Stage::PrepareImage => Some(BuilderState::Initialized),
        Stage::SetupContainer => Some(BuilderState::ImagePrepared),
        Stage::Benchmark => Some(BuilderState::ContainerReady),
        Stage::Cleanup => None,
    }
}

fn reached_state(stage: Stage) -> BuilderState {
    match stage {
        Stage::Init => BuilderState::Initialized,
        Stage::PrepareImage => BuilderState::ImagePrepared,
        Stage::SetupContainer => BuilderState::ContainerReady,
        Stage::Benchmark => BuilderState::Benchmarked,
        Stage::Cleanup => BuilderState::CleanedUp,
    }
}

/// Tracks and enforces the lifecycle of one builder.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: BuilderState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: BuilderState::Uninitialized,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Fails with `Precondition` unless `stage` may run now.
    pub fn check(&self, stage: Stage) -> Result<(), BenchError> {
        match required_state(stage) {
            Some(required) if required != self.state => Err(BenchError::Precondition(format!(
                "{stage} requires the builder to be {required}, but it is {}",
                self.state
            ))),
            _ => Ok(()),
        }
    }

    /// Moves to the state `stage` leads to, or to `Failed(stage)` on error.
    pub fn record<T>(
        &mut self,
        stage: Stage,
        result: Result<T, BenchError>,
    ) -> Result<T, BenchError> {
        match &result {
            Ok(_) => self.state = reached_state(stage),
            Err(_) if self.state != BuilderState::CleanedUp => {
                self.state = BuilderState::Failed(stage)
            }
            Err(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance(lifecycle: &mut Lifecycle, stage: Stage) {
        lifecycle.check(stage).unwrap();
        lifecycle.record(stage, Ok(())).unwrap();
    }

    #[test]
    fn test_happy_path() {
        let mut lifecycle = Lifecycle::new();
        for stage in [
            Stage::Init,
            Stage::PrepareImage,
            Stage::SetupContainer,
            Stage::Benchmark,
            Stage::Cleanup,
        ] {
            advance(&mut lifecycle, stage);
        }
        assert_eq!(lifecycle.state(), BuilderState::CleanedUp);
    }

    #[test]
    fn test_out_of_order_is_precondition() {
        let mut lifecycle = Lifecycle::new();
        advance(&mut lifecycle, Stage::Init);

        let err = lifecycle.check(Stage::Benchmark).unwrap_err();
        assert!(matches!(err, BenchError::Precondition(_)));
        assert_eq!(
            err.to_string(),
            "precondition failed: benchmark requires the builder to be container ready, but it is initialized"
        );
    }

    #[test]
    fn test_failure_is_recorded() {
        let mut lifecycle = Lifecycle::new();
        advance(&mut lifecycle, Stage::Init);

        let result: Result<(), BenchError> = lifecycle.record(
            Stage::PrepareImage,
            Err(BenchError::Precondition("boom".to_string())),
        );
        assert!(result.is_err());
        assert_eq!(
            lifecycle.state(),
            BuilderState::Failed(Stage::PrepareImage)
        );
        assert!(lifecycle.check(Stage::SetupContainer).is_err());
    }

    #[test]
    fn test_cleanup_allowed_from_any_state() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.check(Stage::Cleanup).is_ok());

        lifecycle
            .record::<()>(Stage::Init, Err(BenchError::Configuration("x".to_string())))
            .unwrap_err();
        assert!(lifecycle.check(Stage::Cleanup).is_ok());
    }

    #[test]
    fn test_cleaned_up_is_terminal() {
        let mut lifecycle = Lifecycle::new();
        advance(&mut lifecycle, Stage::Cleanup);

        lifecycle
            .record::<()>(Stage::Init, Err(BenchError::Precondition("late".to_string())))
            .unwrap_err();
        assert_eq!(lifecycle.state(), BuilderState::CleanedUp);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BuilderState::ImagePrepared.to_string(), "image prepared");
        assert_eq!(
            BuilderState::Failed(Stage::Init).to_string(),
            "failed at init"
        );
    }
}
