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

//! Linda-style in-process tuplespace coordination
//!
//! Concurrent participants publish immutable records ("tuples") into a
//! shared [`Space`] and retrieve them by value-pattern matching
//! ("templates"), destructively with [`Space::take`] or non-destructively
//! with [`Space::get`], blocking until a match appears. Tuples may expire on
//! a TTL, and a two-phase [`Transaction`] overlay stages operations until
//! commit or rollback.
//!
//! ```rust,no_run
//! use lindaspace::{tuple, template, Space, TemplateField::Wildcard, Timeout};
//!
//! # async fn example() -> Result<(), lindaspace::SpaceError> {
//! let space = Space::new("jobs");
//! space.put(tuple! {"task" => "render", "frame" => 17}, None, None).await?;
//!
//! let job = space
//!     .take(template! {"task" => "render", "frame" => Wildcard}, Timeout::Forever, None)
//!     .await?;
//! assert!(job.is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod registry;
pub mod space;
pub mod storage;
pub mod transaction;
pub mod tuple;

mod expiry;

// Re-export main types
pub use config::SpaceConfig;
pub use error::{SpaceError, SpaceResult};
pub use registry::{SpaceRegistry, DEFAULT_SPACE};
pub use space::{Lifetime, Space, SpaceSnapshot, Timeout};
pub use storage::{memory::MemoryStore, StoreSnapshot, TupleStore};
pub use transaction::Transaction;
pub use tuple::{
    shape_hash, Fields, OrderedFloat, Template, TemplateField, TemplateFields, Tuple, Value,
};
