//! Layered print job model
//!
//! A slicer hands post-processors the print as an ordered list of text
//! blocks: a prelude (header and start G-code) followed by one block per
//! layer. Every processor consumes a [`Job`] and returns a job with the same
//! number of blocks in the same order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GcodeError, Result};

/// Comment marking the start of a layer, followed by the layer ordinal
pub const LAYER_SENTINEL: &str = ";LAYER:";

/// Comment reporting cumulative print time (seconds) at the end of a layer
pub const TIME_ELAPSED_SENTINEL: &str = ";TIME_ELAPSED:";

/// An ordered sequence of layer blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    layers: Vec<String>,
}

impl Job {
    /// Create a job from already-split layer blocks
    pub fn new(layers: Vec<String>) -> Self {
        Self { layers }
    }

    /// Split a complete G-code program into layer blocks
    ///
    /// Everything before the first `;LAYER:` line forms the prelude block;
    /// each `;LAYER:` line opens a new block. Concatenating the blocks with
    /// [`Job::to_gcode`] reproduces the input byte for byte.
    pub fn from_gcode(text: &str) -> Self {
        let mut layers = Vec::new();
        let mut current = String::new();

        for line in text.split_inclusive('\n') {
            if line.starts_with(LAYER_SENTINEL) && !current.is_empty() {
                layers.push(std::mem::take(&mut current));
            }
            current.push_str(line);
        }

        if !current.is_empty() {
            layers.push(current);
        }

        tracing::debug!("Split G-code into {} blocks", layers.len());
        Self { layers }
    }

    /// Read and split a G-code file
    pub fn read_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GcodeError::FileError {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;

        let job = Self::from_gcode(&text);
        if job.is_empty() {
            return Err(GcodeError::EmptyJob.into());
        }
        Ok(job)
    }

    /// Write the concatenated job to a file
    pub fn write_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_gcode()).map_err(|e| GcodeError::FileError {
            reason: format!("Failed to write {}: {}", path.display(), e),
        })?;
        Ok(())
    }

    /// Concatenate all blocks back into a single program
    pub fn to_gcode(&self) -> String {
        self.layers.concat()
    }

    /// Layer blocks in print order
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Take ownership of the layer blocks
    pub fn into_layers(self) -> Vec<String> {
        self.layers
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if the job has no blocks
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl From<Vec<String>> for Job {
    fn from(layers: Vec<String>) -> Self {
        Self::new(layers)
    }
}
