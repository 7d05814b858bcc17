//! Source locations attached to goto instructions.

use std::fmt;
use symgo_ir::Name;

/// Where an instruction came from in the source program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: Name,
    pub line: u32,
    pub function: Name,
}

impl Location {
    pub fn new(file: Name, line: u32, function: Name) -> Self {
        Location {
            file,
            line,
            function,
        }
    }

    /// Location for instructions the engine or a builder synthesised.
    pub fn builtin(function: Name) -> Self {
        Location {
            file: Name::new("<builtin>"),
            line: 0,
            function,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if !self.function.as_str().is_empty() {
            write!(f, " ({})", self.function)?;
        }
        Ok(())
    }
}
