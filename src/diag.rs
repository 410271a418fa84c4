use crate::channel::Action;
use log::{debug, info, warn};

/// Diagnostics handle scoped to one game run.
///
/// The engine reports everything through the handle it was constructed
/// with, so log lines carry the run tag and no process-global engine
/// state exists. The backing `log` sink is whatever the embedding binary
/// installed.
#[derive(Debug, Clone)]
pub struct RunLog {
    tag: String,
}

impl RunLog {
    pub fn new(tag: impl Into<String>) -> Self {
        RunLog { tag: tag.into() }
    }

    pub fn round(&self, iteration: u64) {
        debug!("[{}] iteration {iteration}: board received", self.tag);
    }

    pub fn deductions(&self, iteration: u64, stage: &str, mines: usize, safes: usize) {
        if mines + safes > 0 {
            debug!(
                "[{}] iteration {iteration}: {stage} found {mines} mine(s), {safes} safe cell(s)",
                self.tag
            );
        }
    }

    pub fn note(&self, iteration: u64, message: &str) {
        debug!("[{}] iteration {iteration}: {message}", self.tag);
    }

    pub fn warning(&self, iteration: u64, message: &str) {
        warn!("[{}] iteration {iteration}: {message}", self.tag);
    }

    pub fn action(&self, iteration: u64, action: &Action) {
        info!("[{}] iteration {iteration}: {action}", self.tag);
    }

    pub fn outcome(&self, won: bool) {
        if won {
            info!("[{}] game won", self.tag);
        } else {
            info!("[{}] game lost", self.tag);
        }
    }
}
