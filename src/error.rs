use std::fmt;

// Mirrors the ISTATUS codes of the original C core (see
// examples/original_source/iris/inc/iris_error.h): `Success` isn't a variant
// here, it's `Ok(())`/`Ok(T)` on `Result`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An arena or pointer list could not grow to satisfy an allocation.
    AllocationFailed,
    /// A caller-supplied argument violates a documented precondition.
    InvalidArgument,
    /// A combination of otherwise-valid arguments is jointly invalid (e.g. a
    /// zero-extent frustum or orthographic range).
    InvalidArgumentCombination,
    /// A matrix was singular, or a degenerate geometric quantity (a
    /// zero-length rotation axis) made an operation numerically meaningless.
    ArithmeticError,
    /// A size or count computation would overflow its integer representation.
    IntegerOverflow,
    /// Iteration reached the end of a sequence. Not really an error: callers
    /// use it as a normal loop-termination signal.
    NoMoreData,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::AllocationFailed => "allocation failed",
            Self::InvalidArgument => "invalid argument",
            Self::InvalidArgumentCombination => "invalid combination of arguments",
            Self::ArithmeticError => "arithmetic error",
            Self::IntegerOverflow => "integer overflow",
            Self::NoMoreData => "no more data",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for CoreError {}

pub type Result<T> = std::result::Result<T, CoreError>;
