use verso::{FatVector, Persistent, PersistentList, PersistentVector};

#[test]
fn test_push_back_and_restore() {
    let mut v = PersistentVector::new();
    let ver0 = v.version();
    v.push_back(1);
    let ver1 = v.version();

    assert!(ver0 != ver1);
    assert_eq!(v.len(), 1);
    assert_eq!(v.get(0), Some(1));

    v.set_version(ver0);
    assert_eq!(v.len(), 0);
}

#[test]
fn test_every_version_keeps_its_length() {
    let n = 10;
    let mut v = PersistentVector::new();
    let ver0 = v.version();
    let mut ver1 = None;
    let mut previous = v.version();

    for i in 0..n {
        v.push_back(i);
        assert!(v.version() != previous);
        previous = v.version();
        if i == 0 {
            ver1 = Some(previous.clone());
        }
    }
    assert_eq!(v.len(), n as usize);

    v.set_version(ver0);
    assert_eq!(v.len(), 0);
    v.set_version(ver1.expect("first push recorded"));
    assert_eq!(v.len(), 1);
}

#[test]
fn test_update_and_remove() {
    let mut v = PersistentVector::new();
    for i in 0..5 {
        v.push_back(i);
    }
    let before = v.version();

    v.update(2, 77);
    assert_eq!(v.get(2), Some(77));

    assert_eq!(v.remove(0), Some(0));
    assert_eq!(v.len(), 4);
    assert_eq!(v.iter().collect::<Vec<_>>(), vec![1, 77, 3, 4]);

    assert_eq!(v.remove(10), None);

    let old = v.with_version(before);
    assert_eq!(old.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_resize_is_versioned() {
    let mut v = PersistentVector::new();
    v.push_back(1);
    let small = v.version();
    v.resize(4, 0);
    assert_eq!(v.len(), 4);
    assert_eq!(v.iter().collect::<Vec<_>>(), vec![1, 0, 0, 0]);

    v.set_version(small);
    assert_eq!(v.len(), 1);
}

#[test]
fn test_undo_redo_scenario() {
    let mut seq = PersistentVector::new();
    for i in 0..10 {
        seq.push_back(i);
    }
    seq.push_back(-1);

    seq.undo();
    assert_eq!(seq.len(), 10);

    seq.redo();
    assert_eq!(seq.len(), 11);
    assert_eq!(seq.get(10), Some(-1));

    seq.undo();
    seq.push_back(1);
    seq.push_back(2);
    assert_eq!(seq.len(), 12);
    assert_eq!(seq.get(10), Some(1));
    assert_eq!(seq.get(11), Some(2));
}

#[test]
fn test_nested_vectors() {
    let mut v: PersistentVector<PersistentVector<i32>> = PersistentVector::new();
    v.push_back(PersistentVector::new());
    v.push_back(PersistentVector::new());
    let ver2 = v.version();

    let mut first = v.get(0).unwrap();
    first.push_back(1);

    assert_eq!(v.get(0).unwrap().len(), 1);

    v.set_version(ver2);
    assert_eq!(v.get(0).unwrap().len(), 0);
}

#[test]
fn test_fat_construction() {
    let mut v = FatVector::new();
    v.resize(10, 0);
    assert_eq!(v.len(), 10);
    for i in 0..10 {
        assert_eq!(v.get(i), Some(0));
    }
    assert_eq!(v.get(10), None);
}

#[test]
fn test_fat_conversion_from_list() {
    let n = 10;
    let mut list = PersistentList::new();
    for i in 0..n {
        list.push_front(i);
    }

    let mut v = FatVector::from_list(&list);
    assert_eq!(v.len(), 10);
    assert_eq!(v.get(0), Some(9));

    v.push_back(101);
    assert_eq!(v.len(), 11);

    assert_eq!(v.remove(2), Some(7));
    assert_eq!(
        v.iter().collect::<Vec<_>>(),
        vec![9, 8, 6, 5, 4, 3, 2, 1, 0, 101]
    );
}

#[test]
fn test_fat_length_is_versioned() {
    let mut v = FatVector::new();
    for i in 0..5 {
        v.push_back(i);
    }
    let full = v.version();

    assert_eq!(v.remove(0), Some(0));
    assert_eq!(v.len(), 4);
    assert_eq!(v.get(0), Some(1));

    let old = v.with_version(full);
    assert_eq!(old.len(), 5);
    assert_eq!(old.get(0), Some(0));
    assert_eq!(old.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_fat_update_history_survives_splits() {
    let mut v = FatVector::new();
    v.push_back(0);
    let mut recorded = vec![(v.version(), 0)];
    for i in 1..40 {
        v.update(0, i);
        recorded.push((v.version(), i));
    }
    for (version, expected) in recorded {
        assert_eq!(v.with_version(version).get(0), Some(expected));
    }
}

#[test]
fn test_fat_undo_redo() {
    let mut v = FatVector::new();
    for i in 0..10 {
        v.push_back(i);
    }
    v.push_back(-1);
    v.undo();
    assert_eq!(v.len(), 10);
    v.redo();
    assert_eq!(v.len(), 11);
    assert_eq!(v.get(10), Some(-1));
}

#[test]
fn test_fat_nested_propagation() {
    let mut outer: FatVector<PersistentVector<i32>> = FatVector::new();
    outer.push_back(PersistentVector::new());
    let v0 = outer.version();

    let mut inner = outer.get(0).unwrap();
    inner.push_back(5);

    assert_eq!(outer.get(0).unwrap().len(), 1);
    assert_eq!(outer.with_version(v0).get(0).unwrap().len(), 0);
}

#[test]
fn test_fat_sibling_handles_are_isolated() {
    let mut a = FatVector::new();
    a.push_back(0);
    let base = a.version();

    let mut b = a.with_version(base);
    a.update(0, 1);
    b.update(0, 2);

    assert_eq!(a.get(0), Some(1));
    assert_eq!(b.get(0), Some(2));
}
