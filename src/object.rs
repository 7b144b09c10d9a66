//! Array-of-structures object model.
//!
//! An object is an open group standing for one element (or all time slices)
//! of an array of structures. Fields below an object are stored per slice in
//! two variable-length datasets: `<field>_size` holds the slice shape and
//! `<field>` holds the slice values. Slice `k` of a field is entry `k` of
//! both.
//!
//! Top-level objects own a chain of the descendants opened through them.
//! Releasing an object releases it and everything after it in that chain.

use tracing::{debug, instrument, warn};

use crate::array::get_dimension;
use crate::engine::EngineState;
use crate::handle_table::ObjectId;
use crate::interp::SliceQuery;
use crate::session::SessionId;
use crate::store::{with_group, Backend, GroupId};
use crate::util::{path, DataBuffer, ElementType, Error, Result, Shape};

/// Path that makes a nested object share its parent's group.
pub const ALL_TIMES: &str = "ALLTIMES";
/// Group holding time-dependent object data.
pub const TIMED_GROUP: &str = "timed";
/// Group holding time-independent object data.
pub const NON_TIMED_GROUP: &str = "non_timed";
/// Time vector of an IDS, next to its object groups.
pub const TIME_FIELD: &str = "time";
/// Suffix of the dataset holding per-slice shapes.
pub const SIZE_SUFFIX: &str = "_size";

/// What an object's group handle is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// The object opened the group and closes it on release.
    Owned(GroupId),
    /// Shares the group of another object.
    Alias(ObjectId),
    /// Opened for reading but the group does not exist.
    Detached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timedness {
    NonTimed,
    /// Writes go to the slice given at begin.
    Timed,
    /// Timed, group cleared, slice index bound later by a nested object.
    TimedClear,
}

impl Timedness {
    fn group_name(self) -> &'static str {
        match self {
            Self::NonTimed => NON_TIMED_GROUP,
            Self::Timed | Self::TimedClear => TIMED_GROUP,
        }
    }

    fn clears(self) -> bool {
        !matches!(self, Self::Timed)
    }
}

/// Live object entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub session: SessionId,
    pub binding: Binding,
    /// Element count seen by readers: link count or number of slices.
    pub dim: usize,
    /// Slice index writes and reads go to.
    pub time_idx: Option<usize>,
    /// Top-level object this one was opened through; itself for a root.
    pub root: ObjectId,
    /// Session generation the object's group handles belong to.
    pub generation: u64,
    chain: Vec<ObjectId>,
}

impl Object {
    fn root_of(
        id: ObjectId,
        session: SessionId,
        generation: u64,
        binding: Binding,
        dim: usize,
        time_idx: Option<usize>,
    ) -> Self {
        Self { session, binding, dim, time_idx, root: id, generation, chain: Vec::new() }
    }

    /// Descendants opened through this object, oldest first.
    pub fn chain(&self) -> &[ObjectId] {
        &self.chain
    }
}

/// What a field read returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRequest {
    Data(ElementType),
    /// Only the stored rank, as `Int([rank])`.
    DimensionOnly,
}

/// One slice of an object field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSlice {
    pub shape: Shape,
    pub data: DataBuffer,
    present: bool,
}

impl FieldSlice {
    /// Result of reading a field that has nothing stored for the slice.
    ///
    /// Rank 0 yields the type's sentinel, higher ranks an all-zero shape
    /// and an empty buffer.
    pub fn absent(etype: ElementType, rank: usize) -> Self {
        if rank == 0 {
            Self { shape: Shape::scalar(), data: DataBuffer::sentinel(etype), present: false }
        } else {
            Self { shape: Shape::zeros(rank), data: DataBuffer::empty(etype), present: false }
        }
    }

    fn found(shape: Shape, data: DataBuffer) -> Self {
        Self { shape, data, present: true }
    }

    /// False when the value is the absent placeholder.
    pub fn is_present(&self) -> bool {
        self.present
    }
}

fn open_or_detach<B: Backend>(store: &mut B, parent: GroupId, group_path: &str) -> Result<Option<GroupId>> {
    match store.open_group(parent, group_path, false, false) {
        Ok(g) => Ok(Some(g)),
        Err(e) if e.is_absence() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Length of an existing variable-length dataset, checking its type.
fn vlen_extent<B: Backend>(store: &B, g: GroupId, name: &str, etype: ElementType) -> Result<Option<usize>> {
    if !store.link_exists(g, name)? {
        return Ok(None);
    }
    let info = store.dataset_info(g, name)?;
    if !info.vlen || info.etype != etype {
        return Err(Error::TypeMismatch {
            name: name.to_string(),
            expected: format!("variable-length {}", etype),
            actual: if info.vlen { format!("variable-length {}", info.etype) } else { info.etype.to_string() },
        });
    }
    Ok(Some(store.vlen_len(g, name)?))
}

fn check_order(name: &str, len: Option<usize>, index: usize) -> Result<()> {
    match len {
        Some(len) if len > 0 && index + 1 < len => {
            Err(Error::OrderViolation { name: name.to_string(), index, last: len - 1 })
        }
        _ => Ok(()),
    }
}

/// Write `value` as entry `index`, padding skipped entries with `filler`.
fn write_entry<B: Backend>(
    store: &mut B,
    g: GroupId,
    name: &str,
    len: Option<usize>,
    index: usize,
    filler: &DataBuffer,
    value: DataBuffer,
) -> Result<()> {
    let len = match len {
        Some(len) => len,
        None => {
            store.create_vlen_dataset(g, name, value.element_type())?;
            0
        }
    };
    if index < len {
        return store.write_vlen(g, name, index, &[value]);
    }
    let mut entries = vec![filler.clone(); index - len];
    entries.push(value);
    if index > len {
        debug!(field = name, from = len, to = index, "backfilling skipped slices");
    }
    store.write_vlen(g, name, len, &entries)
}

fn read_entry<B: Backend>(
    store: &B,
    g: GroupId,
    field: &str,
    index: usize,
    request: FieldRequest,
    rank: usize,
) -> Result<Option<FieldSlice>> {
    let shape = if rank > 0 {
        let size_name = format!("{}{}", field, SIZE_SUFFIX);
        match vlen_extent(store, g, &size_name, ElementType::Int)? {
            Some(len) if index < len => {}
            _ => return Ok(None),
        }
        let dims = store.read_vlen(g, &size_name, index)?;
        let dims = dims.as_int().unwrap_or(&[]);
        let shape = Shape::from(dims.iter().map(|&d| d.max(0) as usize).collect::<Vec<_>>());
        if request == FieldRequest::DimensionOnly {
            return Ok(Some(FieldSlice::found(Shape::d1(1), DataBuffer::Int(vec![shape.rank() as i32]))));
        }
        // Backfilled slice.
        if shape.num_points() == 0 {
            return Ok(None);
        }
        shape
    } else {
        Shape::scalar()
    };

    let etype = match request {
        FieldRequest::DimensionOnly => {
            if rank == 0 && !store.link_exists(g, field)? {
                return Ok(None);
            }
            return Ok(Some(FieldSlice::found(Shape::d1(1), DataBuffer::Int(vec![shape.rank() as i32]))));
        }
        FieldRequest::Data(etype) => etype,
    };

    match vlen_extent(store, g, field, etype)? {
        Some(len) if index < len => {}
        _ => return Ok(None),
    }
    let data = store.read_vlen(g, field, index)?;
    if rank == 0 && data.is_empty() {
        return Ok(None);
    }
    if data.len() != shape.num_points() {
        return Err(Error::ShapeMismatch {
            name: field.to_string(),
            expected: format!("{} elements for {}", shape.num_points(), shape),
            actual: format!("{} elements", data.len()),
        });
    }
    Ok(Some(FieldSlice::found(shape, data)))
}

impl<B: Backend> EngineState<B> {
    pub(crate) fn object(&self, id: ObjectId) -> Result<&Object> {
        self.objects.find(id).ok_or(Error::ObjectNotFound(id.0))
    }

    /// Group an object reads and writes through, following aliases.
    fn resolve_group(&self, id: ObjectId) -> Result<Option<GroupId>> {
        let mut cur = id;
        loop {
            match self.object(cur)?.binding {
                Binding::Owned(g) => return Ok(Some(g)),
                Binding::Detached => return Ok(None),
                Binding::Alias(target) => cur = target,
            }
        }
    }

    /// Fail unless `obj` was opened in the session's current generation.
    fn check_current(&self, obj: &Object) -> Result<()> {
        if self.sessions.generation(obj.session) == Some(obj.generation) {
            Ok(())
        } else {
            Err(Error::SessionClosed(obj.session.0))
        }
    }

    /// Store a nested object and append it to its root's chain.
    fn attach(&mut self, obj: Object) -> ObjectId {
        let root = obj.root;
        let id = self.objects.put(obj);
        if let Some(r) = self.objects.find_mut(root) {
            r.chain.push(id);
        }
        id
    }

    fn add_root(&mut self, session: SessionId, binding: Binding, dim: usize, time_idx: Option<usize>) -> ObjectId {
        let id = self.objects.next_id();
        let generation = self.sessions.generation(session).unwrap_or_default();
        self.objects.put(Object::root_of(id, session, generation, binding, dim, time_idx))
    }

    /// Open an object for writing.
    ///
    /// Without `parent`, `rel_path` is an IDS path below the file root and
    /// the object is top level. Nested objects live in their parent's
    /// session; `session` is only used at top level.
    #[instrument(level = "debug", skip(self))]
    pub fn begin(
        &mut self,
        session: SessionId,
        parent: Option<ObjectId>,
        index: usize,
        rel_path: &str,
        timedness: Timedness,
    ) -> Result<ObjectId> {
        let Some(parent) = parent else {
            let group_path = path::join(rel_path, timedness.group_name());
            let store = self.sessions.store_mut(session)?;
            let g = store.open_group(GroupId::ROOT, &group_path, true, timedness.clears())?;
            let time_idx = match timedness {
                Timedness::Timed => Some(index),
                Timedness::TimedClear => None,
                Timedness::NonTimed => Some(0),
            };
            let id = self.add_root(session, Binding::Owned(g), 0, time_idx);
            debug!(%id, group = %group_path, "began top-level object");
            return Ok(id);
        };

        let p = self.object(parent)?;
        self.check_current(p)?;
        let (p_session, p_time, p_root, p_gen) = (p.session, p.time_idx, p.root, p.generation);

        if rel_path == ALL_TIMES {
            let time_idx = p_time.or(Some(index));
            let obj = Object {
                session: p_session,
                binding: Binding::Alias(parent),
                dim: 0,
                time_idx,
                root: p_root,
                generation: p_gen,
                chain: Vec::new(),
            };
            return Ok(self.attach(obj));
        }

        let rel = path::substitute_leading(rel_path, index)?;
        let pg = self
            .resolve_group(parent)?
            .ok_or_else(|| Error::not_found(format!("group of {}", parent)))?;
        let store = self.sessions.store_mut(p_session)?;
        let g = store.open_group(pg, &rel, true, timedness.clears())?;
        let obj = Object {
            session: p_session,
            binding: Binding::Owned(g),
            dim: 0,
            time_idx: p_time,
            root: p_root,
            generation: p_gen,
            chain: Vec::new(),
        };
        let id = self.attach(obj);
        debug!(%id, %parent, group = %rel, "began nested object");
        Ok(id)
    }

    /// Open an IDS object group for reading.
    ///
    /// A missing group gives a detached object with `dim == 0`.
    pub fn get_group(&mut self, session: SessionId, backing_path: &str, ids_path: &str, timed: bool) -> Result<ObjectId> {
        let kind = if timed { TIMED_GROUP } else { NON_TIMED_GROUP };
        let group_path = path::join(&path::join(backing_path, ids_path), kind);
        let store = self.sessions.store_mut(session)?;

        let Some(g) = open_or_detach(store, GroupId::ROOT, &group_path)? else {
            let time_idx = if timed { None } else { Some(0) };
            return Ok(self.add_root(session, Binding::Detached, 0, time_idx));
        };

        if !timed {
            let dim = match store.num_links(g) {
                Ok(n) => n,
                Err(e) => {
                    store.close_group(g)?;
                    return Err(e);
                }
            };
            return Ok(self.add_root(session, Binding::Owned(g), dim, Some(0)));
        }

        let dim = match get_dimension(store, backing_path, TIME_FIELD) {
            Ok(shape) => shape.size(0).unwrap_or(0),
            Err(e) => {
                store.close_group(g)?;
                return Err(e);
            }
        };
        Ok(self.add_root(session, Binding::Owned(g), dim, None))
    }

    /// Open the timed group of an IDS bound to the slice nearest `query.time`.
    pub fn get_group_at_time(
        &mut self,
        session: SessionId,
        backing_path: &str,
        ids_path: &str,
        query: &SliceQuery,
    ) -> Result<ObjectId> {
        let group_path = path::join(&path::join(backing_path, ids_path), TIMED_GROUP);
        let store = self.sessions.store_mut(session)?;
        let time_idx = Some(query.nearest_index());
        let id = match open_or_detach(store, GroupId::ROOT, &group_path)? {
            Some(g) => self.add_root(session, Binding::Owned(g), 1, time_idx),
            None => self.add_root(session, Binding::Detached, 0, time_idx),
        };
        Ok(id)
    }

    /// Open a nested object for reading.
    pub fn get_from_object(&mut self, parent: ObjectId, rel_path: &str, index: usize) -> Result<ObjectId> {
        let p = self.object(parent)?;
        self.check_current(p)?;
        let (session, p_time, root, generation) = (p.session, p.time_idx, p.root, p.generation);
        let pg = self.resolve_group(parent)?;

        if rel_path == ALL_TIMES {
            let dim = match pg {
                Some(g) => self.sessions.store(session)?.num_links(g)?,
                None => 0,
            };
            let time_idx = p_time.or(Some(index));
            let obj = Object { session, binding: Binding::Alias(parent), dim, time_idx, root, generation, chain: Vec::new() };
            return Ok(self.attach(obj));
        }

        let rel = path::substitute_leading(rel_path, index)?;
        let (binding, dim) = match pg {
            Some(pg) => {
                let store = self.sessions.store_mut(session)?;
                match open_or_detach(store, pg, &rel)? {
                    Some(g) => {
                        let dim = match store.num_links(g) {
                            Ok(n) => n,
                            Err(e) => {
                                store.close_group(g)?;
                                return Err(e);
                            }
                        };
                        (Binding::Owned(g), dim)
                    }
                    None => (Binding::Detached, 0),
                }
            }
            None => (Binding::Detached, 0),
        };
        let obj = Object { session, binding, dim, time_idx: p_time, root, generation, chain: Vec::new() };
        Ok(self.attach(obj))
    }

    /// Write one slice of a field below an object, at the object's slice
    /// index.
    ///
    /// `field_path` is `<aos>/<sub..>/<field>`; the `<aos>` segment is
    /// replaced by `index`.
    #[instrument(level = "debug", skip(self, data), fields(n = data.len()))]
    pub fn put_field_slice(
        &mut self,
        object: ObjectId,
        field_path: &str,
        index: usize,
        shape: &Shape,
        data: &DataBuffer,
    ) -> Result<()> {
        let obj = self.object(object)?;
        self.check_current(obj)?;
        let session = obj.session;
        let t = obj.time_idx.ok_or(Error::ObjectNotBound(object.0))?;
        let og = self
            .resolve_group(object)?
            .ok_or_else(|| Error::not_found(format!("group of {}", object)))?;

        let (group_part, field) = path::split_field(field_path);
        if data.len() != shape.num_points() {
            return Err(Error::ShapeMismatch {
                name: field.to_string(),
                expected: format!("{} elements for {}", shape.num_points(), shape),
                actual: format!("{} elements", data.len()),
            });
        }
        let group_path = path::indexed_group(group_part, index);
        let etype = data.element_type();
        let rank = shape.rank();
        let size_name = format!("{}{}", field, SIZE_SUFFIX);

        let store = self.sessions.store_mut(session)?;
        with_group(store, og, &group_path, true, |store, g| {
            let size_len = if rank > 0 { vlen_extent(store, g, &size_name, ElementType::Int)? } else { None };
            let data_len = vlen_extent(store, g, field, etype)?;
            if rank > 0 {
                check_order(&size_name, size_len, t)?;
            }
            check_order(field, data_len, t)?;

            if rank > 0 {
                let dims = DataBuffer::Int(shape.sizes().iter().map(|&d| d as i32).collect());
                write_entry(store, g, &size_name, size_len, t, &DataBuffer::Int(vec![0]), dims)?;
            }
            write_entry(store, g, field, data_len, t, &DataBuffer::empty(etype), data.clone())
        })
    }

    /// Read one slice of a field below an object.
    ///
    /// Missing data is not an error: the result is the absent placeholder,
    /// see [`FieldSlice::absent`].
    pub fn get_field_slice(
        &mut self,
        object: ObjectId,
        field_path: &str,
        index: usize,
        request: FieldRequest,
        rank: usize,
    ) -> Result<FieldSlice> {
        let obj = self.object(object)?;
        self.check_current(obj)?;
        let (session, time_idx) = (obj.session, obj.time_idx);
        let etype = match request {
            FieldRequest::Data(etype) => etype,
            FieldRequest::DimensionOnly => ElementType::Int,
        };
        let absent = FieldSlice::absent(etype, rank);
        let (Some(t), Some(og)) = (time_idx, self.resolve_group(object)?) else {
            return Ok(absent);
        };

        let (group_part, field) = path::split_field(field_path);
        let group_path = path::indexed_group(group_part, index);
        let store = self.sessions.store_mut(session)?;
        let result = with_group(store, og, &group_path, false, |store, g| {
            read_entry(&*store, g, field, t, request, rank)
        });
        match result {
            Ok(Some(slice)) => Ok(slice),
            Ok(None) => Ok(absent),
            Err(e) if e.is_absence() => Ok(absent),
            Err(e) => Err(e),
        }
    }

    /// Release an object and every object opened after it through the same
    /// root. Each owned group handle is closed once; aliases close nothing.
    #[instrument(level = "debug", skip(self))]
    pub fn release(&mut self, object: ObjectId) -> Result<()> {
        let root = self.object(object)?.root;
        let chain = self.objects.find(root).map(|r| r.chain.clone()).unwrap_or_default();

        let doomed: Vec<ObjectId> = if root == object {
            std::iter::once(root).chain(chain.iter().copied()).collect()
        } else {
            let pos = chain
                .iter()
                .position(|&id| id == object)
                .ok_or_else(|| Error::invalid(format!("{} missing from the chain of {}", object, root)))?;
            if let Some(r) = self.objects.find_mut(root) {
                r.chain.truncate(pos);
            }
            chain[pos..].to_vec()
        };

        let mut first_err = None;
        for id in doomed {
            let Some(obj) = self.objects.take(id) else { continue };
            let Binding::Owned(g) = obj.binding else { continue };
            // Handles of a closed or reopened session are already gone.
            if self.sessions.generation(obj.session) != Some(obj.generation) {
                continue;
            }
            let closed = self.sessions.store_mut(obj.session).and_then(|s| s.close_group(g));
            if let Err(e) = closed {
                warn!(%id, group = %g, error = %e, "closing object group failed");
                first_err.get_or_insert(e);
            }
        }
        debug!(%object, "released object");
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::SessionRef;
    use crate::store::ArchiveStore;

    fn state() -> (tempfile::TempDir, EngineState<ArchiveStore>, SessionId) {
        let dir = tempfile::tempdir().unwrap();
        let mut state = EngineState::new(Config::default().with_data_base(dir.path()));
        let sid = state.sessions.create("obj", 1, 1, 0, 0, false).unwrap();
        (dir, state, sid)
    }

    fn open_handles(state: &EngineState<ArchiveStore>, sid: SessionId) -> usize {
        state.sessions.store(sid).unwrap().open_group_count()
    }

    #[test]
    fn test_non_timed_round_trip() {
        let (_dir, mut st, sid) = state();
        let obj = st.begin(sid, None, 0, "componentA", Timedness::NonTimed).unwrap();
        let v = DataBuffer::from(vec![1.0f32, 2.0, 3.0]);
        st.put_field_slice(obj, "aos/x", 0, &Shape::d1(3), &v).unwrap();

        let got = st.get_field_slice(obj, "aos/x", 0, FieldRequest::Data(ElementType::Float), 1).unwrap();
        assert!(got.is_present());
        assert_eq!(got.shape, Shape::d1(3));
        assert_eq!(got.data, v);

        let dim = st.get_field_slice(obj, "aos/x", 0, FieldRequest::DimensionOnly, 1).unwrap();
        assert_eq!(dim.data, DataBuffer::Int(vec![1]));
        assert_eq!(dim.shape, Shape::d1(1));

        st.release(obj).unwrap();
        assert_eq!(open_handles(&st, sid), 0);
        assert!(matches!(st.release(obj), Err(Error::ObjectNotFound(_))));
    }

    #[test]
    fn test_backfill() {
        let (_dir, mut st, sid) = state();
        let obj = st.begin(sid, None, 0, "ids", Timedness::Timed).unwrap();
        st.put_field_slice(obj, "aos/v", 0, &Shape::d1(2), &DataBuffer::from(vec![1, 2])).unwrap();
        st.release(obj).unwrap();

        let obj = st.begin(sid, None, 3, "ids", Timedness::Timed).unwrap();
        st.put_field_slice(obj, "aos/v", 0, &Shape::d1(2), &DataBuffer::from(vec![7, 8])).unwrap();
        st.release(obj).unwrap();

        let store = st.sessions.store_mut(sid).unwrap();
        let g = store.open_group(GroupId::ROOT, "ids/timed/0", false, false).unwrap();
        assert_eq!(store.vlen_len(g, "v_size").unwrap(), 4);
        assert_eq!(store.vlen_len(g, "v").unwrap(), 4);
        assert_eq!(store.read_vlen(g, "v_size", 1).unwrap(), DataBuffer::Int(vec![0]));
        assert_eq!(store.read_vlen(g, "v", 2).unwrap(), DataBuffer::Int(vec![]));
        assert_eq!(store.read_vlen(g, "v", 3).unwrap(), DataBuffer::Int(vec![7, 8]));
        store.close_group(g).unwrap();

        // Backfilled slices read as absent.
        let reader = st.begin(sid, None, 1, "ids", Timedness::Timed).unwrap();
        let got = st.get_field_slice(reader, "aos/v", 0, FieldRequest::Data(ElementType::Int), 1).unwrap();
        assert!(!got.is_present());
        assert_eq!(got.shape, Shape::zeros(1));
        // The placeholder still records a rank-1 slice.
        let dim = st.get_field_slice(reader, "aos/v", 0, FieldRequest::DimensionOnly, 1).unwrap();
        assert!(dim.is_present());
        assert_eq!(dim.data, DataBuffer::Int(vec![1]));
    }

    #[test]
    fn test_order_violation_leaves_store_unchanged() {
        let (_dir, mut st, sid) = state();
        for t in [0, 1, 2] {
            let obj = st.begin(sid, None, t, "ids", Timedness::Timed).unwrap();
            st.put_field_slice(obj, "aos/s", 0, &Shape::scalar(), &DataBuffer::from(vec![t as f64])).unwrap();
            st.release(obj).unwrap();
        }
        // Equal index replaces.
        let obj = st.begin(sid, None, 2, "ids", Timedness::Timed).unwrap();
        st.put_field_slice(obj, "aos/s", 0, &Shape::scalar(), &DataBuffer::from(vec![9.0])).unwrap();
        st.release(obj).unwrap();

        let obj = st.begin(sid, None, 1, "ids", Timedness::Timed).unwrap();
        let err = st.put_field_slice(obj, "aos/s", 0, &Shape::scalar(), &DataBuffer::from(vec![5.0])).unwrap_err();
        assert!(matches!(err, Error::OrderViolation { index: 1, last: 2, .. }));
        let got = st.get_field_slice(obj, "aos/s", 0, FieldRequest::Data(ElementType::Double), 0).unwrap();
        assert_eq!(got.data, DataBuffer::Double(vec![1.0]));
        st.release(obj).unwrap();

        let obj = st.begin(sid, None, 2, "ids", Timedness::Timed).unwrap();
        let got = st.get_field_slice(obj, "aos/s", 0, FieldRequest::Data(ElementType::Double), 0).unwrap();
        assert_eq!(got.data, DataBuffer::Double(vec![9.0]));
    }

    #[test]
    fn test_absent_reads() {
        let (_dir, mut st, sid) = state();
        let obj = st.get_group(sid, "", "missing", false).unwrap();
        assert_eq!(st.object(obj).unwrap().binding, Binding::Detached);
        assert_eq!(st.object(obj).unwrap().dim, 0);

        let got = st.get_field_slice(obj, "aos/x", 0, FieldRequest::Data(ElementType::Double), 0).unwrap();
        assert!(!got.is_present());
        assert_eq!(got.data, DataBuffer::Double(vec![-f64::MAX]));
        let got = st.get_field_slice(obj, "aos/x", 0, FieldRequest::Data(ElementType::Text), 0).unwrap();
        assert_eq!(got.data, DataBuffer::text(""));
        let got = st.get_field_slice(obj, "aos/x", 0, FieldRequest::Data(ElementType::Int), 2).unwrap();
        assert_eq!(got.shape, Shape::zeros(2));
        assert!(got.data.is_empty());

        let writer = st.begin(sid, None, 0, "w", Timedness::TimedClear).unwrap();
        let err = st.put_field_slice(writer, "aos/x", 0, &Shape::scalar(), &DataBuffer::from(vec![1])).unwrap_err();
        assert!(matches!(err, Error::ObjectNotBound(_)));
    }

    #[test]
    fn test_release_walks_chain() {
        let (_dir, mut st, sid) = state();
        let root = st.begin(sid, None, 0, "ids", Timedness::TimedClear).unwrap();
        let all = st.begin(sid, Some(root), 4, ALL_TIMES, Timedness::Timed).unwrap();
        assert_eq!(st.object(all).unwrap().time_idx, Some(4));
        let child = st.begin(sid, Some(all), 0, "aos/sub", Timedness::Timed).unwrap();
        let grandchild = st.begin(sid, Some(child), 2, "inner/deep", Timedness::Timed).unwrap();
        assert_eq!(open_handles(&st, sid), 3);
        assert_eq!(st.object(root).unwrap().chain(), &[all, child, grandchild]);

        // Releasing the child frees it and the grandchild.
        st.release(child).unwrap();
        assert_eq!(open_handles(&st, sid), 1);
        assert!(st.object(grandchild).is_err());
        assert_eq!(st.object(root).unwrap().chain(), &[all]);

        st.release(root).unwrap();
        assert_eq!(open_handles(&st, sid), 0);
        assert!(st.objects.is_empty());
    }

    #[test]
    fn test_nested_path_substitution() {
        let (_dir, mut st, sid) = state();
        let root = st.begin(sid, None, 0, "ids", Timedness::NonTimed).unwrap();
        assert!(matches!(st.begin(sid, Some(root), 0, "noslash", Timedness::NonTimed), Err(Error::InvalidPath(_))));
        let child = st.begin(sid, Some(root), 2, "coil/element", Timedness::NonTimed).unwrap();
        st.put_field_slice(child, "turns", 0, &Shape::scalar(), &DataBuffer::from(vec![12])).unwrap();
        st.release(root).unwrap();

        let store = st.sessions.store_mut(sid).unwrap();
        let g = store.open_group(GroupId::ROOT, "ids/non_timed/2/element/0", false, false).unwrap();
        assert_eq!(store.read_vlen(g, "turns", 0).unwrap(), DataBuffer::Int(vec![12]));
        store.close_group(g).unwrap();

        let reader = st.get_group(sid, "", "ids", false).unwrap();
        assert_eq!(st.object(reader).unwrap().dim, 1);
        let child = st.get_from_object(reader, "coil/element", 2).unwrap();
        let got = st.get_field_slice(child, "turns", 0, FieldRequest::Data(ElementType::Int), 0).unwrap();
        assert_eq!(got.data, DataBuffer::Int(vec![12]));
        let missing = st.get_from_object(reader, "coil/element", 5).unwrap();
        assert_eq!(st.object(missing).unwrap().binding, Binding::Detached);
        st.release(reader).unwrap();
        assert_eq!(open_handles(&st, sid), 0);
    }

    #[test]
    fn test_timed_get_group_needs_time() {
        let (_dir, mut st, sid) = state();
        let w = st.begin(sid, None, 0, "ids", Timedness::Timed).unwrap();
        st.release(w).unwrap();
        let err = st.get_group(sid, "ids", "", true).unwrap_err();
        assert!(err.is_absence());
        assert_eq!(open_handles(&st, sid), 0);

        let store = st.sessions.store_mut(sid).unwrap();
        crate::array::put_array(store, "ids", TIME_FIELD, &Shape::d1(3), true, &DataBuffer::from(vec![0.0, 1.0, 2.0]))
            .unwrap();
        let r = st.get_group(sid, "ids", "", true).unwrap();
        assert_eq!(st.object(r).unwrap().dim, 3);
        assert_eq!(st.object(r).unwrap().time_idx, None);

        let q = SliceQuery::between(1.6, (1, 1.0), (2, 2.0));
        let at = st.get_group_at_time(sid, "ids", "", &q).unwrap();
        assert_eq!(st.object(at).unwrap().time_idx, Some(2));
        assert_eq!(st.object(at).unwrap().dim, 1);
    }

    #[test]
    fn test_reopened_session_ignores_stale_objects() {
        let (_dir, mut st, sid) = state();
        let stale = st.begin(sid, None, 0, "a", Timedness::NonTimed).unwrap();
        st.sessions.close(SessionRef::Id(sid)).unwrap();
        assert_eq!(st.sessions.open("obj", 1, 1).unwrap(), sid);

        // Same handle number as the stale object's group in the new store.
        let live = st.begin(sid, None, 0, "b", Timedness::NonTimed).unwrap();
        assert_eq!(st.object(live).unwrap().binding, st.object(stale).unwrap().binding);
        let one = DataBuffer::from(vec![1]);
        let err = st.put_field_slice(stale, "aos/x", 0, &Shape::scalar(), &one).unwrap_err();
        assert!(matches!(err, Error::SessionClosed(_)));

        st.release(stale).unwrap();
        assert_eq!(open_handles(&st, sid), 1);
        st.put_field_slice(live, "aos/x", 0, &Shape::scalar(), &one).unwrap();
        let got = st.get_field_slice(live, "aos/x", 0, FieldRequest::Data(ElementType::Int), 0).unwrap();
        assert_eq!(got.data, one);
        st.release(live).unwrap();
        assert_eq!(open_handles(&st, sid), 0);
    }

    #[test]
    fn test_all_times_read_through_root() {
        let (_dir, mut st, sid) = state();
        for t in 0..2 {
            let obj = st.begin(sid, None, t, "ids", Timedness::Timed).unwrap();
            let v = DataBuffer::from(vec![10 + t as i32]);
            st.put_field_slice(obj, "aos/v", 0, &Shape::d1(1), &v).unwrap();
            st.release(obj).unwrap();
        }
        let store = st.sessions.store_mut(sid).unwrap();
        crate::array::put_array(store, "ids", TIME_FIELD, &Shape::d1(2), true, &DataBuffer::from(vec![0.0, 1.0]))
            .unwrap();

        let root = st.get_group(sid, "ids", "", true).unwrap();
        assert_eq!(st.object(root).unwrap().dim, 2);
        for t in 0..2 {
            let all = st.get_from_object(root, ALL_TIMES, t).unwrap();
            let obj = st.object(all).unwrap();
            assert_eq!(obj.binding, Binding::Alias(root));
            assert_eq!(obj.time_idx, Some(t));
            // One link: the `0` group of the array of structures.
            assert_eq!(obj.dim, 1);
            let got = st.get_field_slice(all, "aos/v", 0, FieldRequest::Data(ElementType::Int), 1).unwrap();
            assert_eq!(got.data, DataBuffer::Int(vec![10 + t as i32]));
        }
        assert_eq!(open_handles(&st, sid), 1);
        st.release(root).unwrap();
        assert_eq!(open_handles(&st, sid), 0);
        assert!(st.objects.is_empty());
    }
}
