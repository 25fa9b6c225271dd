//! Parse outcomes.
//!
//! Malformed Markdown is never an error: every incomplete construct degrades
//! to literal text. The only ways a parse can end early are a sink asking to
//! stop, or a broken internal invariant.

use std::ops::ControlFlow;

/// Why a parse stopped before delivering the whole event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A sink callback returned `ControlFlow::Break`.
    ///
    /// Events delivered before the break remain valid.
    #[error("parse aborted by the event sink")]
    Aborted,
    /// The open-container or delimiter stack lost consistency.
    ///
    /// This is a parser defect, never a property of the input.
    #[error("internal consistency violation: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Whether the error came from the sink rather than the parser.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

/// Convert a sink's answer into a parser result.
#[inline]
pub(crate) fn check(flow: ControlFlow<()>) -> Result<(), Error> {
    match flow {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => Err(Error::Aborted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_becomes_abort() {
        assert_eq!(check(ControlFlow::Break(())), Err(Error::Aborted));
        assert_eq!(check(ControlFlow::Continue(())), Ok(()));
    }

    #[test]
    fn display_messages() {
        assert_eq!(Error::Aborted.to_string(), "parse aborted by the event sink");
        assert_eq!(
            Error::Internal("container stack underflow").to_string(),
            "internal consistency violation: container stack underflow"
        );
        assert!(Error::Aborted.is_abort());
    }
}
