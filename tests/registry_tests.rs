use std::fs;
use std::sync::Arc;

use gpiofwd::{
    Attribute, Direction, Edge, GpioError, ManualQueue, MockSysfs, Pin, PinCallback, PinOptions,
    PinRegistry, PinState, RegistryConfig, SysfsGpio, dispatch_ready,
};
use parking_lot::Mutex;

type Calls = Arc<Mutex<Vec<(u32, u8)>>>;

fn recording_callback() -> (PinCallback, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let callback: PinCallback =
        Arc::new(move |pin: &Pin, value: u8| sink.lock().push((pin.number(), value)));
    (callback, calls)
}

fn mock_registry(
    pins: &[u32],
) -> (
    PinRegistry<MockSysfs, ManualQueue>,
    Arc<MockSysfs>,
    Arc<ManualQueue>,
) {
    let fs = Arc::new(MockSysfs::default());
    let queue = Arc::new(ManualQueue::default());
    let registry = PinRegistry::new(
        RegistryConfig::new(pins.iter().copied()),
        fs.clone(),
        queue.clone(),
    );
    (registry, fs, queue)
}

#[test]
fn second_alloc_of_same_pin_fails() {
    let (mut registry, fs, _) = mock_registry(&[5]);

    registry
        .alloc_pin(5, Direction::Output, PinOptions::default())
        .unwrap();
    let err = registry
        .alloc_pin(5, Direction::Output, PinOptions::default())
        .unwrap_err();

    assert!(matches!(err, GpioError::PinAlreadyAllocated(5)));
    assert_eq!(fs.export_writes(), vec![5]);
}

#[test]
fn pins_outside_available_set_are_rejected() {
    let (mut registry, fs, _) = mock_registry(&[1, 2, 3]);

    for number in [0, 4, 17, 1000] {
        let err = registry
            .alloc_pin(number, Direction::Input, PinOptions::default())
            .unwrap_err();
        assert!(matches!(err, GpioError::InvalidPin(n) if n == number));
        assert!(err.is_validation());
    }
    assert!(fs.export_writes().is_empty());
}

#[test]
fn callback_without_edge_is_rejected_before_export() {
    let (mut registry, fs, queue) = mock_registry(&[5]);
    let (callback, _) = recording_callback();

    let missing = PinOptions {
        callback: Some(callback.clone()),
        ..Default::default()
    };
    assert!(matches!(
        registry.alloc_pin(5, Direction::Input, missing),
        Err(GpioError::InvalidEdge(_))
    ));

    let none = PinOptions::watch(callback, Edge::None);
    assert!(matches!(
        registry.alloc_pin(5, Direction::Input, none),
        Err(GpioError::InvalidEdge(_))
    ));

    assert!(fs.export_writes().is_empty());
    assert_eq!(queue.registrations(), 0);
    assert!(!registry.is_allocated(5));
}

#[test]
fn invalid_active_low_is_rejected_before_export() {
    let (mut registry, fs, _) = mock_registry(&[5]);

    let err = registry
        .alloc_pin(5, Direction::Output, PinOptions::default().with_active_low(3))
        .unwrap_err();

    assert!(matches!(err, GpioError::InvalidActiveLow(3)));
    assert!(fs.export_writes().is_empty());
}

#[test]
fn edge_notification_invokes_callback_once() {
    let (mut registry, fs, queue) = mock_registry(&[5]);
    let (callback, calls) = recording_callback();

    let pin = registry
        .alloc_pin(5, Direction::Input, PinOptions::watch(callback, Edge::Both))
        .unwrap();
    assert_eq!(pin.state(), PinState::Watched);
    assert_eq!(fs.attribute(5, Attribute::Edge).as_deref(), Some("both"));
    assert_eq!(fs.attribute(5, Attribute::Direction).as_deref(), Some("in"));

    fs.set_value(5, "1");
    assert!(queue.notify(5));
    assert_eq!(dispatch_ready(&mut registry, queue.take_ready()), 1);

    assert_eq!(*calls.lock(), vec![(5, 1)]);
    assert_eq!(registry.get_pin(5).unwrap().last_value(), Some(1));
}

#[test]
fn notifications_dispatch_in_reported_order() {
    let (mut registry, fs, queue) = mock_registry(&[2, 7]);
    let (callback, calls) = recording_callback();

    for number in [2, 7] {
        registry
            .alloc_pin(
                number,
                Direction::Input,
                PinOptions::watch(callback.clone(), Edge::Rising),
            )
            .unwrap();
    }

    fs.set_value(7, "1");
    queue.notify(7);
    queue.notify(2);
    dispatch_ready(&mut registry, queue.take_ready());

    assert_eq!(*calls.lock(), vec![(7, 1), (2, 0)]);
}

#[test]
fn dealloc_of_unknown_pin_fails() {
    let (mut registry, fs, _) = mock_registry(&[5]);

    assert!(matches!(
        registry.dealloc_pin(5),
        Err(GpioError::PinNotAllocated(5))
    ));
    assert!(fs.unexport_writes().is_empty());
}

#[test]
fn dealloc_unexports_and_unwatches_input() {
    let (mut registry, fs, queue) = mock_registry(&[5]);
    let (callback, _) = recording_callback();
    registry
        .alloc_pin(5, Direction::Input, PinOptions::watch(callback, Edge::Falling))
        .unwrap();
    assert!(queue.is_registered(5));

    registry.dealloc_pin(5).unwrap();

    assert_eq!(fs.unexport_writes(), vec![5]);
    assert!(!queue.is_registered(5));
    assert!(!registry.is_allocated(5));

    // the number can be allocated again afterwards
    registry
        .alloc_pin(5, Direction::Output, PinOptions::default())
        .unwrap();
    assert_eq!(fs.export_writes(), vec![5, 5]);
}

#[test]
fn failed_unexport_keeps_entry() {
    let (mut registry, fs, queue) = mock_registry(&[5]);
    registry
        .alloc_pin(5, Direction::Input, PinOptions::default())
        .unwrap();
    fs.fail_unexport(5);

    assert!(matches!(registry.dealloc_pin(5), Err(GpioError::Sysfs(_))));
    assert!(registry.is_allocated(5));
    assert!(queue.is_registered(5));
}

#[test]
fn set_and_reset_are_read_back() {
    let (mut registry, fs, _) = mock_registry(&[8]);
    registry
        .alloc_pin(8, Direction::Output, PinOptions::default())
        .unwrap();

    registry.set_pin(8).unwrap();
    assert_eq!(fs.value(8), "1");
    assert!(registry.get_pin_state(8).unwrap());

    registry.reset_pin(8).unwrap();
    assert_eq!(fs.value(8), "0");
    assert!(!registry.get_pin_state(8).unwrap());
}

#[test]
fn operations_on_unallocated_pins_fail() {
    let (mut registry, _, _) = mock_registry(&[8]);

    assert!(matches!(registry.get_pin(8), Err(GpioError::PinNotAllocated(8))));
    assert!(matches!(registry.set_pin(8), Err(GpioError::PinNotAllocated(8))));
    assert!(matches!(registry.reset_pin(8), Err(GpioError::PinNotAllocated(8))));
    assert!(matches!(
        registry.get_pin_state(8),
        Err(GpioError::PinNotAllocated(8))
    ));
    assert!(matches!(registry.dispatch(8), Err(GpioError::PinNotAllocated(8))));
}

#[test]
fn already_exported_pin_skips_export_write() {
    let (mut registry, fs, _) = mock_registry(&[5]);
    fs.mark_exported(5);

    registry
        .alloc_pin(5, Direction::Input, PinOptions::default())
        .unwrap();

    assert!(fs.export_writes().is_empty());
    assert!(registry.is_allocated(5));
}

#[test]
fn outputs_are_never_watched() {
    let (mut registry, _, queue) = mock_registry(&[6]);

    let pin = registry
        .alloc_pin(6, Direction::Output, PinOptions::default())
        .unwrap();

    assert_eq!(pin.state(), PinState::Configured);
    assert!(!queue.is_registered(6));
    assert_eq!(registry.dispatch(6).unwrap(), None);
}

#[test]
fn pin_state_read_keeps_input_watched() {
    let (mut registry, fs, queue) = mock_registry(&[5]);
    let (callback, calls) = recording_callback();
    registry
        .alloc_pin(5, Direction::Input, PinOptions::watch(callback, Edge::Both))
        .unwrap();

    fs.set_value(5, "1");
    assert!(registry.get_pin_state(5).unwrap());

    assert!(queue.is_registered(5));
    assert_eq!(queue.registrations(), 2);
    assert_eq!(registry.get_pin(5).unwrap().state(), PinState::Watched);
    // a synchronous read is not a transition
    assert!(calls.lock().is_empty());

    // the wake that follows re-registration reports the level just read
    queue.notify(5);
    assert_eq!(dispatch_ready(&mut registry, queue.take_ready()), 0);
    assert!(calls.lock().is_empty());

    fs.set_value(5, "0");
    queue.notify(5);
    assert_eq!(dispatch_ready(&mut registry, queue.take_ready()), 1);
    assert_eq!(*calls.lock(), vec![(5, 0)]);
}

#[test]
fn level_change_after_pin_state_read_is_dispatched() {
    let (mut registry, fs, queue) = mock_registry(&[5]);
    let (callback, calls) = recording_callback();
    registry
        .alloc_pin(5, Direction::Input, PinOptions::watch(callback, Edge::Both))
        .unwrap();

    assert!(!registry.get_pin_state(5).unwrap());

    // an edge landing together with the re-registration wake is not lost
    fs.set_value(5, "1");
    queue.notify(5);
    assert_eq!(dispatch_ready(&mut registry, queue.take_ready()), 1);
    assert_eq!(*calls.lock(), vec![(5, 1)]);
}

#[test]
fn dispatch_failure_leaves_other_pins_alone() {
    let (mut registry, fs, queue) = mock_registry(&[1, 2]);
    let (callback, calls) = recording_callback();
    for number in [1, 2] {
        registry
            .alloc_pin(
                number,
                Direction::Input,
                PinOptions::watch(callback.clone(), Edge::Both),
            )
            .unwrap();
    }

    fs.set_value(1, "garbage");
    fs.set_value(2, "1");
    queue.notify(1);
    queue.notify(2);

    assert_eq!(dispatch_ready(&mut registry, queue.take_ready()), 1);
    assert_eq!(*calls.lock(), vec![(2, 1)]);
    assert!(registry.is_allocated(1));
}

#[test]
fn available_set_can_be_replaced() {
    let (mut registry, _, _) = mock_registry(&[1]);
    registry
        .alloc_pin(1, Direction::Output, PinOptions::default())
        .unwrap();

    registry.set_available_pins([9]);

    assert!(registry.available_pins().contains(&9));
    assert!(matches!(
        registry.alloc_pin(1, Direction::Output, PinOptions::default()),
        Err(GpioError::InvalidPin(1))
    ));
    registry
        .alloc_pin(9, Direction::Output, PinOptions::default())
        .unwrap();
    assert_eq!(registry.allocated_pins(), vec![1, 9]);
}

#[test]
fn dealloc_all_releases_everything() {
    let (mut registry, fs, queue) = mock_registry(&[1, 2, 3]);
    for number in [3, 1, 2] {
        registry
            .alloc_pin(number, Direction::Input, PinOptions::default())
            .unwrap();
    }
    fs.fail_unexport(2);

    assert!(matches!(registry.dealloc_all(), Err(GpioError::Sysfs(_))));
    assert_eq!(fs.unexport_writes(), vec![1, 3]);
    assert_eq!(registry.allocated_pins(), vec![2]);
    assert!(queue.is_registered(2));
}

#[test]
fn sysfs_tree_allocation_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("export"), "").unwrap();
    fs::write(dir.path().join("unexport"), "").unwrap();
    let pin_dir = dir.path().join("gpio5");
    fs::create_dir(&pin_dir).unwrap();
    fs::write(pin_dir.join("value"), "0").unwrap();

    let queue = Arc::new(ManualQueue::default());
    let mut registry = PinRegistry::new(
        RegistryConfig::new([5]),
        Arc::new(SysfsGpio::new(dir.path())),
        queue.clone(),
    );
    let (callback, calls) = recording_callback();

    let pin = registry
        .alloc_pin(
            5,
            Direction::Input,
            PinOptions::watch(callback, Edge::Both).with_active_low(1),
        )
        .unwrap();
    assert!(pin.active_low());

    // directory existed, so no export write happened
    assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "");
    assert_eq!(fs::read_to_string(pin_dir.join("direction")).unwrap(), "in");
    assert_eq!(fs::read_to_string(pin_dir.join("edge")).unwrap(), "both");
    assert_eq!(fs::read_to_string(pin_dir.join("active_low")).unwrap(), "1");
    assert!(queue.registered_fd(5).is_some_and(|fd| fd >= 0));

    fs::write(pin_dir.join("value"), "1").unwrap();
    queue.notify(5);
    dispatch_ready(&mut registry, queue.take_ready());
    assert_eq!(*calls.lock(), vec![(5, 1)]);

    registry.dealloc_pin(5).unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("unexport")).unwrap(), "5");
}
