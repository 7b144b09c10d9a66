//! File session registry.
//!
//! Maps a data file identity (name, shot, run) to one open store. Opening
//! the same identity twice shares the store; closing marks the entry closed
//! and a later open of the same path reuses that entry and its id.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::array::put_array;
use crate::config::Config;
use crate::digest::file_digest;
use crate::store::{Backend, GroupId};
use crate::util::{path, DataBuffer, Error, Result, Shape};

/// Group receiving the creation metadata of a file.
pub const METADATA_GROUP: &str = "metadata";

/// Registry index of a file session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub usize);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.0)
    }
}

/// How a caller names a session to close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRef<'a> {
    Id(SessionId),
    Identity { name: &'a str, shot: i32, run: i32 },
}

struct Entry<B> {
    path: PathBuf,
    store: Option<B>,
    /// Bumped each time a closed entry is reopened.
    generation: u64,
}

/// Summary of one registry entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub path: PathBuf,
    pub open: bool,
}

/// Open files, indexed by [`SessionId`].
pub struct SessionRegistry<B> {
    config: Config,
    entries: Vec<Entry<B>>,
}

impl<B: Backend> SessionRegistry<B> {
    pub fn new(config: Config) -> Self {
        Self { config, entries: Vec::new() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn find_path(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    fn register(&mut self, path: &Path, store: B) -> SessionId {
        match self.find_path(path) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                entry.store = Some(store);
                entry.generation += 1;
                SessionId(idx)
            }
            None => {
                self.entries.push(Entry { path: path.to_path_buf(), store: Some(store), generation: 0 });
                SessionId(self.entries.len() - 1)
            }
        }
    }

    fn open_path(&mut self, path: &Path) -> Result<SessionId> {
        if let Some(idx) = self.find_path(path) {
            if self.entries[idx].store.is_some() {
                debug!(path = %path.display(), id = idx, "file already open");
                return Ok(SessionId(idx));
            }
        }
        if !path.exists() {
            return Err(Error::not_found(path.display().to_string()));
        }
        let store = B::open(path)?;
        let id = self.register(path, store);
        info!(path = %path.display(), id = id.0, "opened file");
        Ok(id)
    }

    /// Open an existing data file.
    #[instrument(level = "debug", skip(self))]
    pub fn open(&mut self, name: &str, shot: i32, run: i32) -> Result<SessionId> {
        let path = self.config.data_file(name, shot, run)?;
        self.open_path(&path)
    }

    /// Create a data file.
    ///
    /// From a model: an existing file (or open session) for the identity is
    /// simply opened; otherwise the model file is copied, opened and stamped
    /// with creation metadata. Without a model: a new empty file is created
    /// and an existing one is an error.
    #[instrument(level = "debug", skip(self))]
    pub fn create(
        &mut self,
        name: &str,
        shot: i32,
        run: i32,
        ref_shot: i32,
        ref_run: i32,
        from_model: bool,
    ) -> Result<SessionId> {
        let path = self.config.data_file(name, shot, run)?;
        let registered_open = self
            .find_path(&path)
            .is_some_and(|idx| self.entries[idx].store.is_some());

        if !from_model {
            if registered_open || path.exists() {
                return Err(Error::AlreadyExists(path.display().to_string()));
            }
            let store = B::create_new(&path)?;
            let id = self.register(&path, store);
            info!(path = %path.display(), id = id.0, ref_shot, ref_run, "created empty file");
            return Ok(id);
        }

        if registered_open || path.exists() {
            return self.open_path(&path);
        }

        let model = self.config.model_file(name)?;
        if !model.exists() {
            return Err(Error::FileNotFound(model));
        }
        fs::copy(&model, &path)?;
        let meta = fs::metadata(&path)?;
        if meta.permissions().readonly() {
            return Err(Error::store(format!("{} has incorrect permissions", path.display())));
        }

        let id = self.open_path(&path)?;
        info!(path = %path.display(), model = %model.display(), ref_shot, ref_run, "created file from model");
        self.stamp_metadata(id, &model, shot, run)?;
        Ok(id)
    }

    fn stamp_metadata(&mut self, id: SessionId, model: &Path, shot: i32, run: i32) -> Result<()> {
        let created = creation_stamp();
        let hash = file_digest(model)?;
        let model_name = model.display().to_string();
        let device = self.config.device.clone();
        let version = self.config.ids_version.clone();

        let store = self.store_mut(id)?;
        let text = |s: &str| DataBuffer::text(s);
        put_array(store, METADATA_GROUP, "created", &Shape::scalar(), false, &text(&created))?;
        if let Some(device) = device {
            put_array(store, METADATA_GROUP, "device", &Shape::scalar(), false, &text(&device))?;
        }
        put_array(store, METADATA_GROUP, "shot", &Shape::d1(1), false, &DataBuffer::from(vec![shot]))?;
        put_array(store, METADATA_GROUP, "run", &Shape::d1(1), false, &DataBuffer::from(vec![run]))?;
        if let Some(version) = version {
            put_array(store, METADATA_GROUP, "idsVersion", &Shape::scalar(), false, &text(&version))?;
        }
        put_array(store, METADATA_GROUP, "modelFileName", &Shape::scalar(), false, &text(&model_name))?;
        put_array(store, METADATA_GROUP, "modelHash", &Shape::scalar(), false, &text(&hash))?;
        store.flush()
    }

    /// Create an empty model file holding one group per IDS root.
    #[instrument(level = "debug", skip(self, roots))]
    pub fn create_model(&self, name: &str, roots: &[&str]) -> Result<PathBuf> {
        let model = self.config.model_file(name)?;
        if let Some(dir) = model.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut store = B::create_new(&model)?;
        for root in roots {
            path::check_legal(root)?;
            let g = store.open_group(GroupId::ROOT, root, true, false)?;
            store.close_group(g)?;
        }
        store.close()?;
        info!(path = %model.display(), roots = roots.len(), "created model file");
        Ok(model)
    }

    fn resolve(&self, r: SessionRef<'_>) -> Result<usize> {
        match r {
            SessionRef::Id(id) => {
                if id.0 < self.entries.len() {
                    Ok(id.0)
                } else {
                    Err(Error::not_found(id.to_string()))
                }
            }
            SessionRef::Identity { name, shot, run } => {
                let path = self.config.data_file(name, shot, run)?;
                self.find_path(&path)
                    .ok_or_else(|| Error::not_found(path.display().to_string()))
            }
        }
    }

    /// Flush and close a session. The file stays on disk.
    pub fn close(&mut self, r: SessionRef<'_>) -> Result<()> {
        let idx = self.resolve(r)?;
        let entry = &mut self.entries[idx];
        let store = entry
            .store
            .take()
            .ok_or_else(|| Error::not_found(format!("open session for {}", entry.path.display())))?;
        store.close()?;
        info!(path = %entry.path.display(), id = idx, "closed file");
        Ok(())
    }

    /// Close every open session, returning the first failure.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first = None;
        for idx in 0..self.entries.len() {
            if self.entries[idx].store.is_some() {
                if let Err(e) = self.close(SessionRef::Id(SessionId(idx))) {
                    warn!(id = idx, error = %e, "close failed");
                    first.get_or_insert(e);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    pub fn is_open(&self, id: SessionId) -> bool {
        self.entries.get(id.0).is_some_and(|e| e.store.is_some())
    }

    /// Generation of an open session. Objects opened in an earlier
    /// generation hold handles of a store that no longer exists.
    pub fn generation(&self, id: SessionId) -> Option<u64> {
        self.entries.get(id.0).filter(|e| e.store.is_some()).map(|e| e.generation)
    }

    pub fn session_path(&self, id: SessionId) -> Option<&Path> {
        self.entries.get(id.0).map(|e| e.path.as_path())
    }

    /// Every registry entry, open or closed.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| SessionInfo { id: SessionId(i), path: e.path.clone(), open: e.store.is_some() })
            .collect()
    }

    /// Store of an open session.
    pub fn store(&self, id: SessionId) -> Result<&B> {
        match self.entries.get(id.0) {
            Some(Entry { store: Some(s), .. }) => Ok(s),
            Some(_) => Err(Error::SessionClosed(id.0)),
            None => Err(Error::not_found(id.to_string())),
        }
    }

    pub fn store_mut(&mut self, id: SessionId) -> Result<&mut B> {
        match self.entries.get_mut(id.0) {
            Some(Entry { store: Some(s), .. }) => Ok(s),
            Some(_) => Err(Error::SessionClosed(id.0)),
            None => Err(Error::not_found(id.to_string())),
        }
    }
}

/// Local time as `Www Mmm dd hh:mm:ss yyyy`.
fn creation_stamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let fmt = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
    );
    now.format(fmt).unwrap_or_else(|_| now.unix_timestamp().to_string())
}
