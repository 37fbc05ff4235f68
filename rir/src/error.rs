use thiserror::Error;

/// These errors are for internal IR and driver failures, not designed to be useful to a user of
/// the source language, but for users of the `rir` crate, i.e., optimizer developers.
///
/// Registry errors are programmer errors in the optimization driver; data-dependent absence
/// (unreached blocks, unknown origins) is never reported through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("Analysis '{0}' is not a registered analysis.")]
    UnknownAnalysis(String),
    #[error("Analysis '{analysis}' depends on '{dependency}', which is not active.")]
    MissingAnalysisDependency {
        analysis: String,
        dependency: String,
    },
    #[error("Analysis result {0} is not produced by any active analysis.")]
    AnalysisNotRegistered(String),
    #[error("Analysis '{analysis}' is {actual}-scoped and was requested {requested}-scoped.")]
    AnalysisScopeMismatch {
        analysis: String,
        actual: &'static str,
        requested: &'static str,
    },
    #[error("Unit-scoped analysis '{analysis}' cannot depend on CFG-scoped analysis '{dependency}'.")]
    UnitAnalysisDependsOnCfg {
        analysis: String,
        dependency: String,
    },
    #[error("Analysis '{0}' depends on itself, transitively.")]
    AnalysisDependencyCycle(String),
    #[error("CFG does not belong to unit '{0}'.")]
    ForeignCfg(String),
    #[error("Analysis '{analysis}' produced a result of an unexpected type.")]
    AnalysisResultMismatch { analysis: String },

    #[error("Verification failed: block {0} is missing its jump.")]
    VerifyMissingJump(String),
    #[error("Verification failed: block {0} belongs to another CFG than the one listing it.")]
    VerifyBlockParentMismatch(String),
    #[error("Verification failed: block {0} jumps to {1}, which is in another CFG.")]
    VerifyJumpToForeignBlock(String, String),
    #[error("Verification failed: jump from {from} to {to} passes {found} arguments, expected {expected}.")]
    VerifyBranchParamsMismatch {
        from: String,
        to: String,
        expected: usize,
        found: usize,
    },
    #[error("Verification failed: entry block of the CFG has predecessors: {0:?}.")]
    VerifyEntryBlockHasPredecessors(Vec<String>),
    #[error("Verification failed: register {0} is defined more than once.")]
    VerifyRegisterRedefined(String),
    #[error("Verification failed: register {0} is defined outside of its own CFG, at {1}.")]
    VerifyRegisterDefinedInForeignCfg(String, String),
    #[error("Verification failed: register {0} is not visible at {1}.")]
    VerifyRegisterNotVisible(String, String),
    #[error("Verification failed: promise created at {0} is not nested in the creating CFG.")]
    VerifyPromiseParentMismatch(String),
    #[error("Verification failed: promise body created at {0} belongs to another unit.")]
    VerifyPromiseInForeignUnit(String),
}
