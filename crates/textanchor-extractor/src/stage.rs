//! Document-level pipeline stages

use std::fmt;

/// Stage of a document moving through the pipeline
///
/// `Pending → Chunked → Dispatched → Resolving → Aligning → Merged → Done`,
/// with `Failed` reachable only from `Dispatched` or `Resolving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Accepted, not yet split
    Pending,
    /// Split into chunks
    Chunked,
    /// Chunk jobs handed to the worker pool
    Dispatched,
    /// Model answers being parsed
    Resolving,
    /// Candidates being anchored to the text
    Aligning,
    /// Passes and chunks merged into one result
    Merged,
    /// Result assembled
    Done,
    /// Run stopped by a fatal failure or cancellation
    Failed,
}

impl PipelineStage {
    /// Whether moving from `self` to `next` is legal
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Pending, Chunked)
                | (Chunked, Dispatched)
                | (Dispatched, Resolving)
                | (Resolving, Aligning)
                | (Aligning, Merged)
                | (Merged, Done)
                | (Dispatched, Failed)
                | (Resolving, Failed)
        )
    }

    /// Whether the stage ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    /// Get the stage name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Pending => "pending",
            PipelineStage::Chunked => "chunked",
            PipelineStage::Dispatched => "dispatched",
            PipelineStage::Resolving => "resolving",
            PipelineStage::Aligning => "aligning",
            PipelineStage::Merged => "merged",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineStage::*;

    const ALL: [PipelineStage; 8] = [Pending, Chunked, Dispatched, Resolving, Aligning, Merged, Done, Failed];

    #[test]
    fn test_happy_path_is_legal() {
        let path = [Pending, Chunked, Dispatched, Resolving, Aligning, Merged, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_only_from_dispatched_or_resolving() {
        for stage in ALL {
            let expected = matches!(stage, Dispatched | Resolving);
            assert_eq!(stage.can_transition_to(Failed), expected, "{} -> failed", stage);
        }
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!Pending.can_transition_to(Dispatched));
        assert!(!Merged.can_transition_to(Aligning));
        assert!(!Done.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Done));
        for stage in ALL {
            assert!(!stage.can_transition_to(stage));
        }
    }

    #[test]
    fn test_terminal_stages() {
        let terminal: Vec<_> = ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![&Done, &Failed]);
    }
}
