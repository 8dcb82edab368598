/// Tests for SequenceList error handling

use ghostnet_shared::{SequenceError, SequenceList};

#[derive(Debug, PartialEq)]
struct TestItem {
    value: i32,
}

#[test]
fn try_insert_keeps_sequence_order() {
    let mut list = SequenceList::new();

    assert!(list.try_insert(100, TestItem { value: 1 }).is_ok());
    assert!(list.try_insert(200, TestItem { value: 2 }).is_ok());
    assert!(list.try_insert(150, TestItem { value: 3 }).is_ok());

    let order: Vec<u16> = list.iter().map(|(sequence, _)| *sequence).collect();
    assert_eq!(order, vec![100, 150, 200]);
}

#[test]
fn try_insert_duplicate_error() {
    let mut list = SequenceList::new();
    list.try_insert(100, TestItem { value: 1 }).unwrap();

    let result = list.try_insert(100, TestItem { value: 2 });
    match result {
        Err(SequenceError::DuplicateSequence { sequence }) => assert_eq!(sequence, 100),
        Ok(_) => panic!("Expected error, got Ok"),
    }
    assert_eq!(list.len(), 1);
}

#[test]
fn try_insert_orders_across_wrap() {
    let mut list = SequenceList::new();
    list.try_insert(2, TestItem { value: 3 }).unwrap();
    list.try_insert(65534, TestItem { value: 1 }).unwrap();
    list.try_insert(65535, TestItem { value: 2 }).unwrap();

    assert_eq!(list.front_sequence(), Some(65534));
    assert_eq!(list.pop_front_if(65534), Some(TestItem { value: 1 }));
    assert_eq!(list.pop_front_if(2), None);
    assert_eq!(list.pop_front_if(65535), Some(TestItem { value: 2 }));
}

#[test]
fn duplicate_error_message() {
    let error = SequenceError::DuplicateSequence { sequence: 42 };
    let msg = format!("{}", error);
    assert!(msg.contains("42"));
    assert!(msg.contains("Duplicate"));
}
