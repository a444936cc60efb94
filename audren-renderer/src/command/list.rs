//! One frame's ordered commands plus the frame shape they render

use super::Command;

#[derive(Debug)]
pub struct CommandList {
    pub sample_rate: u32,
    pub sample_count: u32,
    /// Mix buffers plus per-voice scratch buffers
    pub buffer_count: u32,
    commands: Vec<Box<Command>>,
}

impl CommandList {
    pub fn new(sample_rate: u32, sample_count: u32, buffer_count: u32, capacity: usize) -> Self {
        Self {
            sample_rate,
            sample_count,
            buffer_count,
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Clear for reuse under a new frame shape, keeping the storage
    pub fn reset(&mut self, sample_rate: u32, sample_count: u32, buffer_count: u32) {
        self.sample_rate = sample_rate;
        self.sample_count = sample_count;
        self.buffer_count = buffer_count;
        self.commands.clear();
    }

    pub fn capacity(&self) -> usize {
        self.commands.capacity()
    }

    pub fn push(&mut self, command: Box<Command>) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Box<Command>] {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut [Box<Command>] {
        &mut self.commands
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().map(|c| c.as_ref())
    }

    /// Summed estimate of the commands still enabled
    pub fn enabled_estimated_time(&self) -> u64 {
        self.iter()
            .filter(|c| c.enabled)
            .map(|c| u64::from(c.estimated_processing_time))
            .sum()
    }

    /// Give up the commands so they can be returned to their pools
    pub fn drain(&mut self) -> std::vec::Drain<'_, Box<Command>> {
        self.commands.drain(..)
    }
}
