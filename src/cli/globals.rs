use crate::upload::{DEFAULT_CONCURRENCY, MAX_RETRIES, TransferConfig};

// Define the global arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalArgs {
    pub retries: u32,
    pub concurrency: usize,
    pub quiet: bool,
}

impl Default for GlobalArgs {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalArgs {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            retries: MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            quiet: false,
        }
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries.max(1);
    }

    pub fn set_concurrency(&mut self, concurrency: usize) {
        self.concurrency = concurrency.max(1);
    }

    #[must_use]
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            concurrency: self.concurrency,
            max_retries: self.retries,
            ..TransferConfig::default()
        }
    }
}
