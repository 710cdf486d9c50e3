// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for floor plan analysis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during floor plan analysis
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input raster: {0}")]
    InvalidInput(String),

    #[error("Stage '{stage}' failed: {message}")]
    StageFailure { stage: String, message: String },

    #[error("Text recognition failed: {0}")]
    Recognition(String),
}

impl Error {
    pub fn stage(stage: &str, message: impl Into<String>) -> Self {
        Error::StageFailure {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}
