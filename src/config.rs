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

//! Space configuration.
//!
//! ## Configuration Hierarchy
//! 1. **CODE**: explicit `SpaceConfig` passed to
//!    [`Space::with_config`](crate::Space::with_config) (highest priority)
//! 2. **ENV**: `LINDASPACE_*` environment variables
//! 3. **DEFAULT**: in-memory defaults (lowest priority)

use crate::space::Lifetime;

/// Environment variable selecting the initial bucket-map capacity.
pub const ENV_INITIAL_CAPACITY: &str = "LINDASPACE_INITIAL_CAPACITY";

/// Environment variable selecting the default tuple TTL in milliseconds;
/// zero or unset means tuples live until taken.
pub const ENV_DEFAULT_TTL_MS: &str = "LINDASPACE_DEFAULT_TTL_MS";

/// Tunables for a single Space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceConfig {
    /// Pre-allocated capacity of the primary store's bucket maps
    pub initial_capacity: usize,
    /// Lifetime applied to tuples `put` without an explicit TTL
    pub default_ttl: Lifetime,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        SpaceConfig {
            initial_capacity: 1000,
            default_ttl: Lifetime::Forever,
        }
    }
}

impl SpaceConfig {
    /// Build a configuration from `LINDASPACE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = SpaceConfig::default();
        let initial_capacity = std::env::var(ENV_INITIAL_CAPACITY)
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(defaults.initial_capacity);
        let default_ttl = std::env::var(ENV_DEFAULT_TTL_MS)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(|ms| {
                if ms == 0 {
                    Lifetime::Forever
                } else {
                    Lifetime::Millis(ms)
                }
            })
            .unwrap_or(defaults.default_ttl);
        SpaceConfig {
            initial_capacity,
            default_ttl,
        }
    }
}
