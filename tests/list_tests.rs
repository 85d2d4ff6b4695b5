use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use verso::{Persistent, PersistentList};

fn construct_random_list(size: usize, rng: &mut StdRng) -> PersistentList<i32> {
    let mut list = PersistentList::new();
    for _ in 0..size {
        list.push_front(rng.gen_range(0..100));
    }
    list
}

#[test]
fn test_construction() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut list = construct_random_list(5, &mut rng);
    assert_eq!(list.len(), 5);

    list.push_front(0);
    list.push_front(0);
    assert_eq!(list.len(), 7);

    assert!(list.remove(&0));
    assert_eq!(list.len(), 6);
}

#[test]
fn test_branching_restore() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut list = construct_random_list(5, &mut rng);
    let full = list.version();

    for _ in 0..5 {
        list.pop_front();
    }
    assert_eq!(list.len(), 0);
    assert!(list.is_empty());

    list.set_version(full);
    assert_eq!(list.len(), 5);
}

#[test]
fn test_iteration_order() {
    let mut list = PersistentList::new();
    for i in 0..5 {
        list.push_front(i);
    }
    let seen: Vec<_> = list.iter().collect();
    assert_eq!(seen, vec![4, 3, 2, 1, 0]);
}

#[test]
fn test_seed_branching_scenario() {
    let mut list = PersistentList::new();
    for i in 0..5 {
        list.push_front(i);
    }
    let v_full = list.version();

    for _ in 0..5 {
        assert!(list.pop_front().is_some());
    }
    assert!(list.is_empty());
    assert!(list.pop_front().is_none());

    list.set_version(v_full);
    assert_eq!(list.len(), 5);
    assert_eq!(list.iter().collect::<Vec<_>>(), vec![4, 3, 2, 1, 0]);
}

#[test]
fn test_pop_front_yields_head_values() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut list = construct_random_list(5, &mut rng);
    let values: Vec<_> = list.iter().collect();

    for expected in values {
        assert_eq!(list.front(), Some(expected));
        assert_eq!(list.pop_front(), Some(expected));
    }
    assert!(list.is_empty());
}

#[test]
fn test_remove_interior_and_missing() {
    let mut list = PersistentList::new();
    for i in 0..5 {
        list.push_front(i);
    }
    // List reads 4 3 2 1 0; remove an interior element.
    let before = list.version();
    assert!(list.remove(&2));
    assert_eq!(list.iter().collect::<Vec<_>>(), vec![4, 3, 1, 0]);

    let v = list.version();
    assert!(!list.remove(&77));
    assert_eq!(list.version(), v);

    assert_eq!(
        list.with_version(before).iter().collect::<Vec<_>>(),
        vec![4, 3, 2, 1, 0]
    );
}

#[test]
fn test_remove_first_occurrence() {
    let mut list = PersistentList::new();
    list.push_front(1);
    list.push_front(0);
    list.push_front(1);
    // Reads 1 0 1; removing 1 drops the head occurrence.
    assert!(list.remove(&1));
    assert_eq!(list.iter().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_long_mutation_chain_survives_splits() {
    // Repeated erase/push churn on the same handful of nodes overflows their
    // mod logs; every recorded version must keep its contents.
    let mut list = PersistentList::new();
    for i in 0..4 {
        list.push_front(i);
    }
    let mut recorded = vec![(list.version(), list.iter().collect::<Vec<_>>())];
    for round in 0..30 {
        if round % 2 == 0 {
            list.pop_front();
        } else {
            list.push_front(round);
        }
        recorded.push((list.version(), list.iter().collect()));
    }
    for (v, expected) in recorded {
        assert_eq!(list.with_version(v).iter().collect::<Vec<_>>(), expected);
    }
}

#[test]
fn test_undo_redo() {
    let mut list = PersistentList::new();
    list.push_front(1);
    list.push_front(2);
    list.undo();
    assert_eq!(list.iter().collect::<Vec<_>>(), vec![1]);
    list.redo();
    assert_eq!(list.iter().collect::<Vec<_>>(), vec![2, 1]);
}

#[test]
fn test_contains() {
    let mut list = PersistentList::new();
    list.push_front(10);
    assert!(list.contains(&10));
    assert!(!list.contains(&11));
}

#[test]
fn test_display() {
    let mut list = PersistentList::new();
    list.push_front(2);
    list.push_front(1);
    assert_eq!(list.to_string(), "1\n2\n");
}
