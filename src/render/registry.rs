//! Per-connection RENDER state
//!
//! The registry maps each live connection to one `CapabilityEntry` holding
//! the extension codes and, once built, the format catalog. A single weak
//! "last used" slot short-circuits repeated lookups for the same connection.
//! Entries are removed by a close hook registered on the connection, so they
//! are dropped exactly once whether or not the server has RENDER.

use super::catalog::FormatCatalog;
use super::probe::DepthProbeRecord;
use super::query::query_formats;
use super::RENDER_EXTENSION_NAME;
use crate::connection::{ConnectionId, XConnection};
use crate::error::{Error, Result};
use crate::protocol::ExtensionCodes;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Catalog slot of an entry
#[derive(Debug, Clone)]
pub enum CatalogState {
    /// Not built yet, or the last attempt failed in a retryable way
    Pending,
    Ready(Arc<FormatCatalog>),
    /// The depth probe failed; the extension is unusable on this connection
    Unusable { screen: usize, missing_depths: u32 },
}

/// Cached RENDER capabilities of one connection
#[derive(Debug)]
pub struct CapabilityEntry {
    connection: ConnectionId,
    codes: Option<ExtensionCodes>,
    catalog: Mutex<CatalogState>,
}

impl CapabilityEntry {
    fn new(connection: ConnectionId, codes: Option<ExtensionCodes>) -> Self {
        CapabilityEntry {
            connection,
            codes,
            catalog: Mutex::new(CatalogState::Pending),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Extension codes, `None` if the server lacks RENDER
    pub fn codes(&self) -> Option<ExtensionCodes> {
        self.codes
    }

    pub fn is_present(&self) -> bool {
        self.codes.is_some()
    }

    pub fn catalog_state(&self) -> CatalogState {
        lock(&self.catalog).clone()
    }

    /// The catalog, if it has been built
    pub fn catalog(&self) -> Option<Arc<FormatCatalog>> {
        match &*lock(&self.catalog) {
            CatalogState::Ready(catalog) => Some(catalog.clone()),
            _ => None,
        }
    }
}

#[derive(Default)]
pub(crate) struct RegistryState {
    entries: HashMap<ConnectionId, Arc<CapabilityEntry>>,
    mru: Option<Weak<CapabilityEntry>>,
    pub(crate) probes: Vec<DepthProbeRecord>,
    pub(crate) next_probe: u64,
}

impl RegistryState {
    fn remember(&mut self, entry: &Arc<CapabilityEntry>) {
        self.mru = Some(Arc::downgrade(entry));
    }

    fn remove(&mut self, connection: ConnectionId) -> bool {
        let Some(entry) = self.entries.remove(&connection) else {
            return false;
        };
        let points_here = self
            .mru
            .as_ref()
            .is_some_and(|mru| mru.ptr_eq(&Arc::downgrade(&entry)));
        if points_here {
            self.mru = None;
        }
        true
    }
}

/// Process-wide (or test-local) map of connection capabilities
#[derive(Clone, Default)]
pub struct Registry {
    pub(crate) inner: Arc<Mutex<RegistryState>>,
}

impl Registry {
    /// A registry independent of the global one
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry the compositor-facing entry points use
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState> {
        lock(&self.inner)
    }

    /// MRU slot first, then the map. Both sit under the one registry lock;
    /// the slot only saves the hash lookup, and the lock is held for a few
    /// loads either way.
    fn lookup(&self, connection: ConnectionId) -> Option<Arc<CapabilityEntry>> {
        let mut state = self.lock();
        if let Some(entry) = state.mru.as_ref().and_then(Weak::upgrade) {
            if entry.connection == connection {
                return Some(entry);
            }
        }
        let entry = state.entries.get(&connection).cloned()?;
        state.remember(&entry);
        Some(entry)
    }

    /// Entry for `conn`, created on first use.
    ///
    /// Creating an entry costs one QueryExtension round trip, made without
    /// holding the registry lock.
    pub fn get_or_create<S: Read + Write>(
        &self,
        conn: &mut XConnection<S>,
    ) -> Result<Arc<CapabilityEntry>> {
        let id = conn.id();
        if let Some(entry) = self.lookup(id) {
            return Ok(entry);
        }

        let codes = conn.query_extension(RENDER_EXTENSION_NAME)?;

        let entry = {
            let mut state = self.lock();
            if let Some(entry) = state.entries.get(&id).cloned() {
                state.remember(&entry);
                return Ok(entry);
            }
            let entry = Arc::new(CapabilityEntry::new(id, codes));
            state.entries.insert(id, entry.clone());
            state.remember(&entry);
            entry
        };

        let registry = Arc::downgrade(&self.inner);
        conn.on_close(Box::new(move |closed| {
            if let Some(inner) = registry.upgrade() {
                if lock(&inner).remove(closed) {
                    log::debug!("Dropped RENDER state for connection {}", closed.get());
                }
            }
        }));

        log::debug!(
            "New RENDER entry for connection {} (present: {})",
            id.get(),
            codes.is_some()
        );
        Ok(entry)
    }

    /// Build the format catalog of `entry` if needed and return it.
    ///
    /// A failed depth probe marks the entry unusable for good; decode and
    /// protocol failures leave it pending so a later call retries.
    pub fn ensure_format_catalog<S: Read + Write>(
        &self,
        conn: &mut XConnection<S>,
        entry: &CapabilityEntry,
    ) -> Result<Arc<FormatCatalog>> {
        debug_assert_eq!(entry.connection, conn.id());
        let codes = entry.codes.ok_or(Error::ExtensionAbsent)?;

        match &*lock(&entry.catalog) {
            CatalogState::Ready(catalog) => return Ok(catalog.clone()),
            CatalogState::Unusable {
                screen,
                missing_depths,
            } => {
                return Err(Error::CapabilityMismatch {
                    screen: *screen,
                    missing_depths: *missing_depths,
                })
            }
            CatalogState::Pending => {}
        }

        if let Err(err) = self.probe_depths(conn) {
            if let Error::CapabilityMismatch {
                screen,
                missing_depths,
            } = err
            {
                *lock(&entry.catalog) = CatalogState::Unusable {
                    screen,
                    missing_depths,
                };
            }
            return Err(err);
        }

        let catalog = Arc::new(query_formats(conn, &codes)?);
        log::info!(
            "RENDER {}.{}: {} formats on {} screens",
            catalog.version().major,
            catalog.version().minor,
            catalog.formats().len(),
            catalog.screens().len()
        );
        *lock(&entry.catalog) = CatalogState::Ready(catalog.clone());
        Ok(catalog)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.lock().entries.contains_key(&connection)
    }

    /// Connection of the entry in the last-used slot, if still live
    pub fn mru_connection(&self) -> Option<ConnectionId> {
        self.lock()
            .mru
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|entry| entry.connection)
    }

    /// Depth probes currently in flight
    pub fn active_probes(&self) -> usize {
        self.lock().probes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_clears_matching_mru_only() {
        let mut state = RegistryState::default();
        let a = Arc::new(CapabilityEntry::new(ConnectionId::for_tests(1), None));
        let b = Arc::new(CapabilityEntry::new(ConnectionId::for_tests(2), None));
        state.entries.insert(a.connection, a.clone());
        state.entries.insert(b.connection, b.clone());

        state.remember(&a);
        assert!(state.remove(b.connection));
        assert!(state.mru.as_ref().and_then(Weak::upgrade).is_some());

        assert!(state.remove(a.connection));
        assert!(state.mru.is_none());
        assert!(!state.remove(a.connection));
    }
}
