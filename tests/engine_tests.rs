//! Integration tests driving the engine end to end.

use idstore::prelude::*;
use idstore::store::GroupId;
use tempfile::TempDir;

fn engine() -> (TempDir, Engine) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config::default().with_data_base(dir.path()).with_model_base(dir.path());
    (dir, Engine::new(config))
}

#[test]
fn test_scenario_round_trip() {
    let (dir, engine) = engine();
    engine.create_model("scenario", &["componentA"]).expect("Failed to create model");

    let sid = engine.create("scenario", 100, 1, 0, 0, true).expect("Failed to create from model");
    let obj = engine.begin(sid, None, 0, "componentA", Timedness::NonTimed).expect("begin");
    let values = DataBuffer::from(vec![1.0f32, 2.0, 3.0]);
    engine.put_field_slice(obj, "aos/x", 0, &Shape::d1(3), &values).expect("put");
    engine.release(obj).expect("release");
    engine.close(SessionRef::Id(sid)).expect("close");
    assert!(dir.path().join("scenario_100_1.hd5").exists());

    let sid2 = engine.open("scenario", 100, 1).expect("reopen");
    assert_eq!(sid2, sid, "closed entry should be reused");
    let obj = engine.get_group(sid2, "", "componentA", false).expect("get_group");
    assert_eq!(engine.object_dim(obj).unwrap(), 1);
    let got = engine
        .get_field_slice(obj, "aos/x", 0, FieldRequest::Data(ElementType::Float), 1)
        .expect("get_field_slice");
    assert!(got.is_present());
    assert_eq!(got.shape, Shape::d1(3));
    assert_eq!(got.data, values);
    engine.release(obj).unwrap();
    assert_eq!(engine.live_objects(), 0);
}

#[test]
fn test_whole_array_round_trip() {
    let (_dir, engine) = engine();
    let sid = engine.create("arrays", 1, 1, 0, 0, false).unwrap();

    let psi = DataBuffer::from(vec![0.5f64, 1.5, 2.5, 3.5, 4.5, 5.5]);
    engine.put_array(sid, "equilibrium", "profiles_2d/psi", &Shape::from(vec![2, 3]), false, &psi).unwrap();
    let comment = "x".repeat(300);
    engine
        .put_array(sid, "equilibrium", "ids_properties/comment", &Shape::scalar(), false, &DataBuffer::text(comment.clone()))
        .unwrap();
    engine.close(SessionRef::Identity { name: "arrays", shot: 1, run: 1 }).unwrap();

    let sid = engine.open("arrays", 1, 1).unwrap();
    let (shape, data) = engine.get_array(sid, "equilibrium", "profiles_2d/psi", ElementType::Double, 2).unwrap();
    assert_eq!(shape.sizes(), &[2, 3]);
    assert_eq!(data, psi);

    let (shape, text) = engine.get_array(sid, "equilibrium", "ids_properties/comment", ElementType::Text, 0).unwrap();
    assert!(shape.is_scalar());
    assert_eq!(text, DataBuffer::text(comment));
    assert_eq!(engine.get_dimension(sid, "equilibrium", "ids_properties/comment").unwrap(), Shape::d1(3));

    // Zero elements: nothing stored.
    engine.put_array(sid, "equilibrium", "empty", &Shape::d1(0), false, &DataBuffer::Double(vec![])).unwrap();
    let err = engine.get_array(sid, "equilibrium", "empty", ElementType::Double, 1).unwrap_err();
    assert!(err.is_absence());
}

#[test]
fn test_append_and_replace_slices() {
    let (_dir, engine) = engine();
    let sid = engine.create("slices", 2, 1, 0, 0, false).unwrap();
    let shape = Shape::d1(3);
    for k in 0..3 {
        let v = DataBuffer::from(vec![k as f32; 3]);
        engine.put_slice(sid, "core_profiles", "te", &shape, &v, SliceMode::Append).unwrap();
        assert_eq!(engine.get_dimension(sid, "core_profiles", "te").unwrap().sizes(), &[3, k + 1]);
    }

    let v = DataBuffer::from(vec![9.0f32; 3]);
    engine.put_slice(sid, "core_profiles", "te", &shape, &v, SliceMode::ReplaceLast).unwrap();
    assert_eq!(engine.get_dimension(sid, "core_profiles", "te").unwrap().sizes(), &[3, 3]);

    let (s, last) = engine.read_slices(sid, "core_profiles", "te", ElementType::Float, 1, 2, 1).unwrap();
    assert_eq!(s.sizes(), &[3, 1]);
    assert_eq!(last, v);
    let (_, first) = engine.read_slices(sid, "core_profiles", "te", ElementType::Float, 1, 0, 1).unwrap();
    assert_eq!(first, DataBuffer::from(vec![0.0f32; 3]));
}

#[test]
fn test_interpolated_read() {
    let (_dir, engine) = engine();
    let sid = engine.create("interp", 3, 1, 0, 0, false).unwrap();
    for v in [2.0f64, 6.0] {
        engine
            .put_slice(sid, "ids", "ip", &Shape::scalar(), &DataBuffer::from(vec![v]), SliceMode::Append)
            .unwrap();
    }
    let q = SliceQuery::between(1.5, (0, 1.0), (1, 2.0));
    let expected = [
        (InterpolationPolicy::Interpolation, 4.0),
        (InterpolationPolicy::ClosestSample, 6.0),
        (InterpolationPolicy::PreviousSample, 2.0),
    ];
    for (policy, want) in expected {
        let r = engine
            .get_slice_interpolated(sid, "ids", "ip", ElementType::Double, 0, &q, policy)
            .unwrap();
        assert_eq!(r.data, DataBuffer::Double(vec![want]), "{:?}", policy);
    }
}

#[test]
fn test_backfill_and_order() {
    let (_dir, engine) = engine();
    let sid = engine.create("order", 4, 1, 0, 0, false).unwrap();

    let put = |t: usize, v: i32| {
        let obj = engine.begin(sid, None, t, "magnetics", Timedness::Timed).unwrap();
        let r = engine.put_field_slice(obj, "flux_loop/flux", 0, &Shape::d1(2), &DataBuffer::from(vec![v, v]));
        engine.release(obj).unwrap();
        r
    };
    put(0, 1).unwrap();
    put(3, 4).unwrap();
    put(3, 5).unwrap();
    let err = put(1, 9).unwrap_err();
    assert!(matches!(err, Error::OrderViolation { index: 1, last: 3, .. }));

    let read = |t: usize| {
        let obj = engine.begin(sid, None, t, "magnetics", Timedness::Timed).unwrap();
        let r = engine
            .get_field_slice(obj, "flux_loop/flux", 0, FieldRequest::Data(ElementType::Int), 1)
            .unwrap();
        engine.release(obj).unwrap();
        r
    };
    assert_eq!(read(0).data, DataBuffer::Int(vec![1, 1]));
    assert!(!read(1).is_present());
    assert!(!read(2).is_present());
    assert_eq!(read(3).data, DataBuffer::Int(vec![5, 5]));
    assert!(!read(7).is_present());

    engine
        .with_store(sid, |store| {
            let g = store.open_group(GroupId::ROOT, "magnetics/timed/0", false, false)?;
            assert_eq!(store.vlen_len(g, "flux_size")?, 4);
            assert_eq!(store.vlen_len(g, "flux")?, 4);
            store.close_group(g)
        })
        .unwrap();
}

#[test]
fn test_release_closes_each_handle_once() {
    let (_dir, engine) = engine();
    let sid = engine.create("release", 5, 1, 0, 0, false).unwrap();
    let root = engine.begin(sid, None, 0, "pf_active", Timedness::NonTimed).unwrap();
    let alias = engine.begin(sid, Some(root), 0, "ALLTIMES", Timedness::NonTimed).unwrap();
    let child = engine.begin(sid, Some(alias), 1, "coil/element", Timedness::NonTimed).unwrap();
    let open = |engine: &Engine| engine.with_store(sid, |s| Ok(s.open_group_count())).unwrap();
    assert_eq!(open(&engine), 2);

    let root_group = match engine.object(root).unwrap().binding {
        idstore::object::Binding::Owned(g) => g,
        other => panic!("unexpected binding {:?}", other),
    };

    engine.release(root).unwrap();
    assert_eq!(open(&engine), 0);
    assert!(matches!(engine.release(child), Err(Error::ObjectNotFound(_))));
    assert!(matches!(engine.release(alias), Err(Error::ObjectNotFound(_))));

    // A second close of the same handle is rejected by the store.
    let err = engine.with_store(sid, |s| s.close_group(root_group)).unwrap_err();
    assert!(matches!(err, Error::BackingStore(_)));
}

#[test]
fn test_release_after_reopen_keeps_live_objects() {
    let (_dir, engine) = engine();
    let sid = engine.create("reopen", 1, 1, 0, 0, false).unwrap();
    let stale = engine.begin(sid, None, 0, "a", Timedness::NonTimed).unwrap();
    engine.close(SessionRef::Id(sid)).unwrap();
    assert_eq!(engine.open("reopen", 1, 1).unwrap(), sid);

    let live = engine.begin(sid, None, 0, "b", Timedness::NonTimed).unwrap();
    engine.release(stale).expect("stale release");
    let values = DataBuffer::from(vec![4.0]);
    engine.put_field_slice(live, "aos/x", 0, &Shape::scalar(), &values).expect("live object still usable");
    engine.release(live).unwrap();
    assert_eq!(engine.with_store(sid, |s| Ok(s.open_group_count())).unwrap(), 0);
}

#[test]
fn test_session_errors() {
    let (_dir, engine) = engine();
    assert!(engine.open("nothing", 1, 1).unwrap_err().is_absence());
    assert!(matches!(engine.open("bad name", 1, 1), Err(Error::InvalidPath(_))));

    let sid = engine.create("dup", 1, 1, 0, 0, false).unwrap();
    assert!(matches!(engine.create("dup", 1, 1, 0, 0, false), Err(Error::AlreadyExists(_))));
    engine.close(SessionRef::Id(sid)).unwrap();
    assert!(engine.close(SessionRef::Id(sid)).unwrap_err().is_absence());
    assert!(matches!(
        engine.put_array(sid, "ids", "x", &Shape::scalar(), false, &DataBuffer::from(vec![1])),
        Err(Error::SessionClosed(_))
    ));
}
