use core::ops::{Range, RangeFrom, RangeToInclusive};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{ensure, Result};
use im::OrdMap;
use tap::Pipe as _;
use thiserror::Error;
use unwrap_none::UnwrapNone as _;

/// Keys of a record type share a prefix so that all records of that type can be iterated over.
///
/// Prefixes of different record types must not be prefixes of each other.
pub trait PrefixableKey {
    const PREFIX: &'static str;

    #[must_use]
    fn has_prefix(bytes: &[u8]) -> bool {
        bytes.starts_with(Self::PREFIX.as_bytes())
    }
}

/// An ordered key-value store.
///
/// Writes can be buffered in a [branch](Database::branch) and merged back with
/// [`Database::commit`]. Branching is cheap because the underlying map shares structure between
/// versions.
pub struct Database {
    state: Mutex<State>,
}

#[derive(Clone, Default)]
struct State {
    // Values are shared between branches, so they must be cheaply cloneable.
    // This disqualifies `Vec<u8>` and `Box<[u8]>`.
    map: InMemoryMap,
    // Incremented on every write. Used to detect writes to a parent while a branch is open.
    version: u64,
    // Version of the parent at the time this database was branched from it.
    base_version: Option<u64>,
}

impl Database {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::default(),
        }
    }

    /// Creates a buffered view of this database.
    ///
    /// Writes to the branch are invisible to `self` until the branch is committed.
    #[must_use]
    pub fn branch(&self) -> Self {
        let state = self.lock();

        Self {
            state: Mutex::new(State {
                map: state.map.clone(),
                version: 0,
                base_version: Some(state.version),
            }),
        }
    }

    /// Replaces the contents of this database with those of `branch`.
    ///
    /// Fails if `branch` was not created from this database with [`Database::branch`] or if this
    /// database has been written to since then.
    pub fn commit(&self, branch: Self) -> Result<()> {
        let branch = branch
            .state
            .into_inner()
            .expect("in-memory database mutex is poisoned");

        let mut state = self.lock();

        ensure!(
            branch.base_version == Some(state.version),
            Error::ConflictingWrite {
                base_version: branch.base_version,
                current_version: state.version,
            },
        );

        if branch.version > 0 {
            state.map = branch.map;
            state.version += 1;
        }

        Ok(())
    }

    /// Runs `scope` against a branch of this database and commits the branch only if `scope`
    /// succeeds. On failure nothing written by `scope` remains visible.
    pub fn transaction<T>(&self, scope: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let branch = self.branch();
        let output = scope(&branch)?;
        self.commit(branch)?;
        Ok(output)
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let mut state = self.lock();

        if state.map.remove(key.as_ref()).is_some() {
            state.version += 1;
        }

        Ok(())
    }

    pub fn delete_range(&self, range: Range<impl AsRef<[u8]>>) -> Result<()> {
        let start = range.start.as_ref();
        let end = range.end.as_ref();

        // Update the map atomically for consistency with `Database::put_batch`.
        let mut state = self.lock();
        let mut new_map = state.map.clone();

        let end_pair = state.map.get_key_value(end);
        let (below, _) = new_map.split(start);
        let (_, above) = new_map.split(end);

        new_map = below.union(above);

        if let Some((key, value)) = end_pair {
            new_map
                .insert(key.clone(), value.clone())
                .expect_none("end_pair should have been discarded by OrdMap::split");
        }

        state.map = new_map;
        state.version += 1;

        Ok(())
    }

    pub fn delete_prefix(&self, prefix: impl AsRef<[u8]>) -> Result<()> {
        let prefix = prefix.as_ref();

        match prefix_end(prefix) {
            Some(end) => self.delete_range(prefix..end.as_slice()),
            None => {
                let mut state = self.lock();
                let (below, _) = state.map.split(prefix);
                state.map = below;
                state.version += 1;
                Ok(())
            }
        }
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.lock().map.contains_key(key.as_ref()))
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.lock()
            .map
            .get(key.as_ref())
            .map(|value| value.to_vec())
            .pipe(Ok)
    }

    pub fn iterator_ascending(
        &self,
        range: RangeFrom<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> {
        let start = range.start.as_ref();

        let state = self.lock();
        let start_pair = state.map.get_key_value(start);
        let (_, mut above) = state.map.split(start);

        if let Some((key, value)) = start_pair {
            above
                .insert(key.clone(), value.clone())
                .expect_none("start_pair should have been discarded by OrdMap::split");
        }

        above
            .into_iter()
            .map(|(key, value)| Ok((key.to_vec(), value.to_vec())))
            .pipe(Ok)
    }

    pub fn iterator_descending(
        &self,
        range: RangeToInclusive<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> {
        let end = range.end.as_ref();

        let state = self.lock();
        let end_pair = state.map.get_key_value(end);
        let (mut below, _) = state.map.split(end);

        if let Some((key, value)) = end_pair {
            below
                .insert(key.clone(), value.clone())
                .expect_none("end_pair should have been discarded by OrdMap::split");
        }

        below
            .into_iter()
            .rev()
            .map(|(key, value)| Ok((key.to_vec(), value.to_vec())))
            .pipe(Ok)
    }

    /// Iterates over all pairs whose key starts with `prefix`, in ascending key order.
    pub fn prefix_iterator(
        &self,
        prefix: impl AsRef<[u8]>,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> {
        let prefix = prefix.as_ref().to_vec();

        self.iterator_ascending(prefix.clone()..)?
            .take_while(move |result| {
                result
                    .as_ref()
                    .map_or(true, |(key, _)| key.starts_with(&prefix))
            })
            .pipe(Ok)
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch(core::iter::once((key, value)))
    }

    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        let mut state = self.lock();
        let mut new_map = state.map.clone();

        for (key, value) in pairs {
            new_map.insert(key.as_ref().into(), value.as_ref().into());
        }

        state.map = new_map;
        state.version += 1;

        Ok(())
    }

    /// Returns the first key-value pair whose key is less than or equal to `key`.
    ///
    /// Behaves like [`im::OrdMap::get_prev`].
    ///
    /// [`im::OrdMap::get_prev`]: https://docs.rs/im/15.1.0/im/ordmap/struct.OrdMap.html#method.get_prev
    pub fn prev(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.lock()
            .map
            .get_prev(key.as_ref())
            .map(|(key, value)| (key.to_vec(), value.to_vec()))
            .pipe(Ok)
    }

    /// Returns the first key-value pair whose key is greater than or equal to `key`.
    ///
    /// Behaves like [`im::OrdMap::get_next`].
    ///
    /// [`im::OrdMap::get_next`]: https://docs.rs/im/15.1.0/im/ordmap/struct.OrdMap.html#method.get_next
    pub fn next(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.lock()
            .map
            .get_next(key.as_ref())
            .map(|(key, value)| (key.to_vec(), value.to_vec()))
            .pipe(Ok)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("in-memory database mutex is poisoned")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "database was written to while a branch was open \
         (base_version: {base_version:?}, current_version: {current_version})"
    )]
    ConflictingWrite {
        base_version: Option<u64>,
        current_version: u64,
    },
}

type InMemoryMap = OrdMap<Arc<[u8]>, Arc<[u8]>>;

// The smallest key greater than every key starting with `prefix`.
// `None` if no such key exists (the prefix consists entirely of 0xff bytes).
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();

    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }

    None
}
