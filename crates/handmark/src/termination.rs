//! Exit status of the application code started by `#[handmark::main]`.

use std::{convert::Infallible, fmt::Debug, process};

/// A [`process::Termination`] whose success can be inspected.
///
/// The GUI event loop owns the main thread and never returns on some platforms, so the process
/// has to be exited manually once the application code finishes. This trait tells whether to exit
/// with a success or failure status.
pub trait Termination: process::Termination {
    fn is_success(&self) -> bool;
}

impl Termination for Infallible {
    fn is_success(&self) -> bool {
        match *self {}
    }
}

impl Termination for () {
    fn is_success(&self) -> bool {
        true
    }
}

impl<T: Termination, E: Debug> Termination for Result<T, E> {
    fn is_success(&self) -> bool {
        matches!(self, Ok(t) if t.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_success() {
        assert!(().is_success());
        assert!(Ok::<(), String>(()).is_success());
        assert!(!Err::<(), _>("camera unplugged").is_success());
        assert!(!Ok::<Result<(), &str>, &str>(Err("nested")).is_success());
    }
}
