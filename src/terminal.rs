use std::io::{self, IsTerminal};

/// Reports whether the standard streams are attached to a terminal.
///
/// Injected into [`crate::run_with_clients`] so tests can force plain,
/// uncoloured output.
pub trait TerminalClient {
    /// Returns `true` when stdout renders to an interactive terminal.
    fn stdout_is_terminal(&self) -> bool;

    /// Returns `true` when stderr renders to an interactive terminal.
    fn stderr_is_terminal(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}
