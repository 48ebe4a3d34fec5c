//! Size-limited batches of ordered commands.

use crate::command::ModificationCommand;
use crate::config::UpdateConfig;
use crate::ordering::CommandOrderer;
use rowmap_core::Result;
use std::sync::Arc;

/// Commands that will be sent to the store together, in order.
#[derive(Debug)]
pub struct ModificationCommandBatch<C: ModificationCommand> {
    commands: Vec<Arc<C>>,
    max_batch_size: usize,
    min_batch_size: usize,
}

impl<C: ModificationCommand> ModificationCommandBatch<C> {
    fn new(max_batch_size: usize, min_batch_size: usize) -> Self {
        Self {
            commands: Vec::new(),
            max_batch_size,
            min_batch_size,
        }
    }

    /// Append `command` unless the batch is full.
    pub fn try_add_command(&mut self, command: Arc<C>) -> bool {
        if self.is_full() {
            return false;
        }
        self.commands.push(command);
        true
    }

    pub fn is_full(&self) -> bool {
        self.commands.len() >= self.max_batch_size
    }

    /// Too few commands for batching to pay off.
    pub fn is_below_minimum(&self) -> bool {
        self.commands.len() < self.min_batch_size
    }

    pub fn commands(&self) -> &[Arc<C>] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

/// Creates batches sized by an [`UpdateConfig`].
#[derive(Debug, Clone, Copy)]
pub struct BatchFactory {
    max_batch_size: usize,
    min_batch_size: usize,
}

impl BatchFactory {
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            // A zero limit would never accept a command.
            max_batch_size: config.effective_max_batch_size().max(1),
            min_batch_size: config.min_batch_size,
        }
    }

    /// Create an empty batch.
    pub fn create<C: ModificationCommand>(&self) -> ModificationCommandBatch<C> {
        ModificationCommandBatch::new(self.max_batch_size, self.min_batch_size)
    }

    /// Split already ordered commands into consecutive batches.
    #[tracing::instrument(level = "debug", skip(self, commands), fields(commands = commands.len()))]
    pub fn batch_commands<C: ModificationCommand>(
        &self,
        commands: &[Arc<C>],
    ) -> Vec<ModificationCommandBatch<C>> {
        let mut batches = Vec::new();
        let mut current = self.create();
        for command in commands {
            if !current.try_add_command(Arc::clone(command)) {
                tracing::trace!(size = current.len(), "Closed full batch");
                batches.push(std::mem::replace(&mut current, self.create()));
                // Every batch holds at least one command.
                current.commands.push(Arc::clone(command));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        tracing::debug!(batches = batches.len(), "Batched commands");
        batches
    }

    /// Order `commands` by their dependencies, then batch them.
    pub fn order_and_batch<C: ModificationCommand>(
        &self,
        orderer: &CommandOrderer<'_>,
        commands: &[Arc<C>],
    ) -> Result<Vec<ModificationCommandBatch<C>>> {
        let ordered = orderer.order(commands)?;
        Ok(self.batch_commands(&ordered))
    }
}
