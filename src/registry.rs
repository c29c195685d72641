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

//! Process-wide registry of named Spaces.
//!
//! Maps names to live [`Space`] instances. `get_space` is an atomic
//! get-or-create, so concurrent callers asking for the same name always
//! share one Space. Closing through the registry both shuts the Space down
//! and drops it from the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::debug;

use crate::config::SpaceConfig;
use crate::space::Space;

/// Name of the space returned by [`SpaceRegistry::default_space`].
pub const DEFAULT_SPACE: &str = "default";

/// Registry of named Spaces.
#[derive(Default)]
pub struct SpaceRegistry {
    spaces: Mutex<HashMap<String, Arc<Space>>>,
}

impl SpaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        SpaceRegistry::default()
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static SpaceRegistry {
        static GLOBAL: OnceLock<SpaceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SpaceRegistry::new)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Space>>> {
        self.spaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the Space registered under `name`, creating it atomically if
    /// absent. Must be called within a tokio runtime.
    pub fn get_space(&self, name: &str) -> Arc<Space> {
        let mut spaces = self.lock();
        spaces
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(space = name, "creating space");
                Space::with_config(name, SpaceConfig::from_env())
            })
            .clone()
    }

    /// The space named [`DEFAULT_SPACE`].
    pub fn default_space(&self) -> Arc<Space> {
        self.get_space(DEFAULT_SPACE)
    }

    /// Close one Space and drop it from the registry. Unknown names are
    /// ignored.
    pub async fn close(&self, name: &str) {
        let space = self.lock().remove(name);
        if let Some(space) = space {
            debug!(space = name, "closing registered space");
            space.close().await;
        }
    }

    /// Close and drop every registered Space.
    pub async fn close_all(&self) {
        let spaces: Vec<Arc<Space>> = self.lock().drain().map(|(_, space)| space).collect();
        for space in spaces {
            space.close().await;
        }
    }

    /// Number of registered Spaces.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no Space is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
