//! Backend commands queued from UI to backend worker.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCommand {
    Connect,
    Mint,
    Shutdown,
}

impl BackendCommand {
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Mint => "mint",
            Self::Shutdown => "shutdown",
        }
    }
}
