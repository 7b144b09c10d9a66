//! Public entry point.
//!
//! [`Engine`] owns the session registry and the object table behind one
//! lock. Every public operation takes the lock for its whole duration.

use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::warn;

use crate::array;
use crate::config::Config;
use crate::handle_table::{LocalObjectTable, ObjectId};
use crate::interp::{self, InterpolatedSlice, InterpolationPolicy, SliceQuery};
use crate::object::{FieldRequest, FieldSlice, Object, Timedness};
use crate::session::{SessionId, SessionInfo, SessionRef, SessionRegistry};
use crate::slice::{self, SliceMode};
use crate::store::{ArchiveStore, Backend};
use crate::util::{DataBuffer, ElementType, Result, Shape};

/// Registry and object table, the state behind [`Engine`]'s lock.
pub struct EngineState<B> {
    pub sessions: SessionRegistry<B>,
    pub objects: LocalObjectTable<Object>,
}

impl<B: Backend> EngineState<B> {
    pub fn new(config: Config) -> Self {
        Self { sessions: SessionRegistry::new(config), objects: LocalObjectTable::new() }
    }
}

/// Storage engine over backend `B`.
pub struct Engine<B: Backend = ArchiveStore> {
    state: Mutex<EngineState<B>>,
}

impl Engine<ArchiveStore> {
    /// Engine over archive files, configured from the environment.
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }
}

impl<B: Backend> Engine<B> {
    pub fn new(config: Config) -> Self {
        Self { state: Mutex::new(EngineState::new(config)) }
    }

    pub fn config(&self) -> Config {
        self.state.lock().sessions.config().clone()
    }

    /// Run `f` with the store of an open session.
    pub fn with_store<T>(&self, session: SessionId, f: impl FnOnce(&mut B) -> Result<T>) -> Result<T> {
        let mut st = self.state.lock();
        f(st.sessions.store_mut(session)?)
    }

    // Sessions

    pub fn create(
        &self,
        name: &str,
        shot: i32,
        run: i32,
        ref_shot: i32,
        ref_run: i32,
        from_model: bool,
    ) -> Result<SessionId> {
        self.state.lock().sessions.create(name, shot, run, ref_shot, ref_run, from_model)
    }

    pub fn open(&self, name: &str, shot: i32, run: i32) -> Result<SessionId> {
        self.state.lock().sessions.open(name, shot, run)
    }

    pub fn close(&self, session: SessionRef<'_>) -> Result<()> {
        self.state.lock().sessions.close(session)
    }

    pub fn create_model(&self, name: &str, roots: &[&str]) -> Result<PathBuf> {
        self.state.lock().sessions.create_model(name, roots)
    }

    pub fn flush(&self, session: SessionId) -> Result<()> {
        self.with_store(session, |s| s.flush())
    }

    pub fn session_path(&self, session: SessionId) -> Option<PathBuf> {
        self.state.lock().sessions.session_path(session).map(PathBuf::from)
    }

    pub fn is_open(&self, session: SessionId) -> bool {
        self.state.lock().sessions.is_open(session)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.state.lock().sessions.sessions()
    }

    // Whole arrays

    pub fn put_array(
        &self,
        session: SessionId,
        group_path: &str,
        field: &str,
        shape: &Shape,
        timed: bool,
        data: &DataBuffer,
    ) -> Result<()> {
        self.with_store(session, |s| array::put_array(s, group_path, field, shape, timed, data))
    }

    pub fn get_array(
        &self,
        session: SessionId,
        group_path: &str,
        field: &str,
        etype: ElementType,
        rank: usize,
    ) -> Result<(Shape, DataBuffer)> {
        self.with_store(session, |s| array::get_array(s, group_path, field, etype, rank))
    }

    pub fn delete_array(&self, session: SessionId, group_path: &str, field: &str) -> Result<()> {
        self.with_store(session, |s| array::delete_array(s, group_path, field))
    }

    pub fn get_dimension(&self, session: SessionId, group_path: &str, field: &str) -> Result<Shape> {
        self.with_store(session, |s| array::get_dimension(s, group_path, field))
    }

    // Time slices

    pub fn put_slice(
        &self,
        session: SessionId,
        group_path: &str,
        field: &str,
        shape: &Shape,
        data: &DataBuffer,
        mode: SliceMode,
    ) -> Result<()> {
        self.with_store(session, |s| slice::put_slice(s, group_path, field, shape, data, mode))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn read_slices(
        &self,
        session: SessionId,
        group_path: &str,
        field: &str,
        etype: ElementType,
        rank: usize,
        start: usize,
        count: usize,
    ) -> Result<(Shape, DataBuffer)> {
        self.with_store(session, |s| slice::read_slices(s, group_path, field, etype, rank, start, count))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_slice_interpolated(
        &self,
        session: SessionId,
        group_path: &str,
        field: &str,
        etype: ElementType,
        rank: usize,
        query: &SliceQuery,
        policy: InterpolationPolicy,
    ) -> Result<InterpolatedSlice> {
        self.with_store(session, |s| {
            interp::get_slice_interpolated(s, group_path, field, etype, rank, query, policy)
        })
    }

    // Objects

    pub fn begin(
        &self,
        session: SessionId,
        parent: Option<ObjectId>,
        index: usize,
        rel_path: &str,
        timedness: Timedness,
    ) -> Result<ObjectId> {
        self.state.lock().begin(session, parent, index, rel_path, timedness)
    }

    pub fn get_group(&self, session: SessionId, backing_path: &str, ids_path: &str, timed: bool) -> Result<ObjectId> {
        self.state.lock().get_group(session, backing_path, ids_path, timed)
    }

    pub fn get_group_at_time(
        &self,
        session: SessionId,
        backing_path: &str,
        ids_path: &str,
        query: &SliceQuery,
    ) -> Result<ObjectId> {
        self.state.lock().get_group_at_time(session, backing_path, ids_path, query)
    }

    pub fn get_from_object(&self, parent: ObjectId, rel_path: &str, index: usize) -> Result<ObjectId> {
        self.state.lock().get_from_object(parent, rel_path, index)
    }

    pub fn put_field_slice(
        &self,
        object: ObjectId,
        field_path: &str,
        index: usize,
        shape: &Shape,
        data: &DataBuffer,
    ) -> Result<()> {
        self.state.lock().put_field_slice(object, field_path, index, shape, data)
    }

    pub fn get_field_slice(
        &self,
        object: ObjectId,
        field_path: &str,
        index: usize,
        request: FieldRequest,
        rank: usize,
    ) -> Result<FieldSlice> {
        self.state.lock().get_field_slice(object, field_path, index, request, rank)
    }

    pub fn release(&self, object: ObjectId) -> Result<()> {
        self.state.lock().release(object)
    }

    /// Snapshot of a live object.
    pub fn object(&self, object: ObjectId) -> Result<Object> {
        self.state.lock().object(object).cloned()
    }

    /// Element count of an object as seen by readers.
    pub fn object_dim(&self, object: ObjectId) -> Result<usize> {
        Ok(self.state.lock().object(object)?.dim)
    }

    /// Number of live objects.
    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Close every open session.
    pub fn close_all(&self) -> Result<()> {
        self.state.lock().sessions.close_all()
    }
}

impl<B: Backend> Drop for Engine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().sessions.close_all() {
            warn!(error = %e, "closing sessions on drop failed");
        }
    }
}
