// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LindaSpace.
//
// LindaSpace is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LindaSpace is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LindaSpace. If not, see <https://www.gnu.org/licenses/>.

//! Error types for tuplespace operations.
//!
//! Shutdown and timeout are not errors: blocked retrievals observe them as a
//! clean `Ok(None)`. Only caller mistakes surface here, and a validation
//! failure never leaves a side effect in any store.

use thiserror::Error;

/// Result type for tuplespace operations.
pub type SpaceResult<T> = Result<T, SpaceError>;

/// Errors that can occur during tuplespace operations.
#[derive(Error, Debug)]
pub enum SpaceError {
    /// Tuple rejected at construction (empty field map, empty field name)
    #[error("Invalid tuple: {0}")]
    InvalidTuple(String),

    /// Template rejected at construction (empty field map, empty field name)
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Transaction used after commit or rollback
    #[error("Transaction already finished: {0}")]
    TransactionFinished(String),
}
