//! Error reporting.
//!
//! Every phase fails with its own error type wrapped in [`Located`].
//! The pipeline is fail-fast, so a [`Diagnostics`] holds exactly the
//! first failure and renders it with an excerpt of the offending line.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

pub struct Diagnostics {
    kind: &'static str,
    error: Box<dyn 'static + LocatedError>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    /// Location of the reported error.
    pub fn location(&self) -> &Location {
        self.error.location()
    }

    /// The reported error, without location.
    pub fn error(&self) -> &dyn Error {
        self.error.source()
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            kind: "error",
            error: Box::new(error),
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {} at {}", self.kind, self.error(), self.location())
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, error } = self;

        writeln!(fmt, "{}: {}", kind, error.source())?;

        let location = error.location();
        writeln!(fmt, " --> {}", location)?;

        let start = location.start();
        let end = location.end();

        let digits = start.line().to_string().chars().count();
        writeln!(fmt, "{:digits$} |", "", digits = digits)?;

        location.source().with_line(start.line(), |line| {
            writeln!(fmt, "{:>digits$} | {}", start.line(), line, digits = digits)
        })?;

        // Multi-line spans are underlined on their first line only
        let to = if end.line() == start.line() {
            end.column().max(start.column() + 1) - 1
        } else {
            start.column()
        };

        let skip = (start.column() - 1) as usize;
        let highlight = (to - start.column() + 1) as usize;

        writeln!(
            fmt,
            "{:digits$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            digits = digits,
            skip = skip,
            highlight = highlight
        )?;

        writeln!(fmt)?;
        writeln!(fmt, "Build failed with 1 error")
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("Something went wrong")]
    struct Failure;

    #[test]
    fn renders_excerpt_and_underline() {
        let (_, stream) = source::consume("s[0] = $\n".as_bytes(), "prog.kair");
        let chars: Vec<_> = stream.map(Result::unwrap).collect();

        // Location of `$`, carried by the character before it
        let (_, dollar) = chars[6].clone();
        let rendered = Diagnostics::from(Located::at(Failure, dollar))
            .kind("Lexical error")
            .to_string();

        assert!(rendered.starts_with("Lexical error: Something went wrong\n"));
        assert!(rendered.contains(" --> prog.kair:1:8\n"));
        assert!(rendered.contains("1 | s[0] = $\n"));
        assert!(rendered.contains("  |        ^\n"));
        assert!(rendered.ends_with("Build failed with 1 error\n"));
    }
}
