use super::*;

use std::sync::Mutex as StdMutex;

fn point(longitude: f64, latitude: f64) -> Point {
    Point::new(longitude, latitude).expect("valid point")
}

fn recorder() -> (Arc<StdMutex<Vec<Point>>>, impl Fn(Point) + Send + Sync + 'static) {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |p| sink.lock().expect("seen").push(p))
}

#[test]
fn starts_empty() {
    let store = LocationStore::new();
    assert_eq!(store.current(), None);
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn publish_sets_current_without_subscribers() {
    let store = LocationStore::new();
    store.publish(point(10.0, 20.0));
    assert_eq!(store.current(), Some(point(10.0, 20.0)));
}

#[test]
fn early_subscribers_observe_every_publish_in_order() {
    let store = LocationStore::new();
    let (first_seen, first) = recorder();
    let (second_seen, second) = recorder();
    let _first = store.subscribe(first);
    let _second = store.subscribe(second);

    let sequence = [point(1.0, 1.0), point(2.0, 2.0), point(3.0, 3.0)];
    for p in sequence {
        store.publish(p);
    }

    assert_eq!(*first_seen.lock().expect("seen"), sequence.to_vec());
    assert_eq!(*second_seen.lock().expect("seen"), sequence.to_vec());
    assert_eq!(store.current(), Some(point(3.0, 3.0)));
}

#[test]
fn subscribers_are_notified_in_registration_order() {
    let store = LocationStore::new();
    let order = Arc::new(StdMutex::new(Vec::new()));
    let subscriptions: Vec<_> = (0..3)
        .map(|index| {
            let order = Arc::clone(&order);
            store.subscribe(move |_| order.lock().expect("order").push(index))
        })
        .collect();

    store.publish(point(0.0, 0.0));

    assert_eq!(*order.lock().expect("order"), vec![0, 1, 2]);
    drop(subscriptions);
}

#[test]
fn late_subscriber_misses_earlier_publishes() {
    let store = LocationStore::new();
    store.publish(point(1.0, 1.0));

    let (seen, callback) = recorder();
    let _subscription = store.subscribe(callback);
    assert!(seen.lock().expect("seen").is_empty());

    store.publish(point(2.0, 2.0));
    assert_eq!(*seen.lock().expect("seen"), vec![point(2.0, 2.0)]);
}

#[test]
fn unsubscribe_twice_is_a_no_op() {
    let store = LocationStore::new();
    let (_seen, keep) = recorder();
    let (_other_seen, other) = recorder();
    let _kept = store.subscribe(keep);
    let mut subscription = store.subscribe(other);
    assert_eq!(store.subscriber_count(), 2);

    subscription.unsubscribe();
    assert_eq!(store.subscriber_count(), 1);
    subscription.unsubscribe();
    assert_eq!(store.subscriber_count(), 1);

    assert!(!store.unsubscribe(subscription.id()));
    assert_eq!(store.subscriber_count(), 1);
}

#[test]
fn unsubscribe_unknown_id_is_a_no_op() {
    let store = LocationStore::new();
    assert!(!store.unsubscribe(SubscriptionId(42)));
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn unsubscribe_after_store_is_gone_is_a_no_op() {
    let store = LocationStore::new();
    let (_seen, callback) = recorder();
    let mut subscription = store.subscribe(callback);
    drop(store);

    assert!(!subscription.is_active());
    subscription.unsubscribe();
    subscription.unsubscribe();
}

#[test]
fn dropping_subscription_unsubscribes() {
    let store = LocationStore::new();
    let (seen, callback) = recorder();
    let subscription = store.subscribe(callback);
    drop(subscription);

    store.publish(point(5.0, 5.0));
    assert_eq!(store.subscriber_count(), 0);
    assert!(seen.lock().expect("seen").is_empty());
}

#[test]
fn reentrant_publish_reaches_everyone_after_current_pass() {
    let store = LocationStore::new();
    let log = Arc::new(StdMutex::new(Vec::<(&'static str, Point)>::new()));

    let echo_store = Arc::downgrade(&store);
    let echo_log = Arc::clone(&log);
    let _echo = store.subscribe(move |p| {
        echo_log.lock().expect("log").push(("echo", p));
        if p == point(1.0, 1.0) {
            if let Some(store) = echo_store.upgrade() {
                store.publish(point(2.0, 2.0));
            }
        }
    });

    let tail_log = Arc::clone(&log);
    let _tail = store.subscribe(move |p| tail_log.lock().expect("log").push(("tail", p)));

    store.publish(point(1.0, 1.0));

    assert_eq!(
        *log.lock().expect("log"),
        vec![
            ("echo", point(1.0, 1.0)),
            ("tail", point(1.0, 1.0)),
            ("echo", point(2.0, 2.0)),
            ("tail", point(2.0, 2.0)),
        ]
    );
    assert_eq!(store.current(), Some(point(2.0, 2.0)));
}

#[test]
fn subscriber_removed_mid_pass_is_skipped() {
    let store = LocationStore::new();
    let (seen, victim_callback) = recorder();
    let victim = Arc::new(StdMutex::new(None::<Subscription>));

    let remover_slot = Arc::clone(&victim);
    let _remover = store.subscribe(move |_| {
        if let Some(mut subscription) = remover_slot.lock().expect("slot").take() {
            subscription.unsubscribe();
        }
    });
    *victim.lock().expect("slot") = Some(store.subscribe(victim_callback));

    store.publish(point(3.0, 4.0));

    assert!(seen.lock().expect("seen").is_empty());
    assert_eq!(store.subscriber_count(), 1);
}

#[test]
fn set_location_rejects_out_of_range_and_keeps_prior_value() {
    let store = LocationStore::new();
    let (seen, callback) = recorder();
    let _subscription = store.subscribe(callback);

    store.set_location(10.0, 20.0).expect("valid");
    let err = store
        .set_location(10.0, 95.0)
        .expect_err("latitude out of range");

    assert_eq!(err, CoordinateError::LatitudeOutOfRange(95.0));
    assert_eq!(store.current(), Some(point(10.0, 20.0)));
    assert_eq!(*seen.lock().expect("seen"), vec![point(10.0, 20.0)]);
}

#[test]
fn panicking_subscriber_does_not_wedge_the_store() {
    let store = LocationStore::new();
    let mut panicker = store.subscribe(|_| panic!("subscriber failure"));

    let publisher = Arc::clone(&store);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        publisher.publish(point(1.0, 1.0));
    }));
    assert!(outcome.is_err());
    panicker.unsubscribe();

    let (seen, callback) = recorder();
    let _subscription = store.subscribe(callback);
    store.publish(point(2.0, 2.0));
    assert_eq!(*seen.lock().expect("seen"), vec![point(2.0, 2.0)]);
}

#[test]
fn publish_queued_before_a_panic_is_still_delivered_in_that_pass() {
    let store = LocationStore::new();

    let echo_store = Arc::downgrade(&store);
    let _republisher = store.subscribe(move |p| {
        if p == point(1.0, 1.0) {
            if let Some(store) = echo_store.upgrade() {
                store.publish(point(2.0, 2.0));
            }
        }
    });
    let mut panicker = store.subscribe(|p| {
        if p == point(1.0, 1.0) {
            panic!("subscriber failure");
        }
    });
    let (seen, callback) = recorder();
    let _tail = store.subscribe(callback);

    let publisher = Arc::clone(&store);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        publisher.publish(point(1.0, 1.0));
    }));

    assert!(outcome.is_err());
    assert_eq!(store.current(), Some(point(2.0, 2.0)));
    assert_eq!(
        *seen.lock().expect("seen"),
        vec![point(1.0, 1.0), point(2.0, 2.0)]
    );

    panicker.unsubscribe();
    store.publish(point(3.0, 3.0));
    assert_eq!(
        *seen.lock().expect("seen"),
        vec![point(1.0, 1.0), point(2.0, 2.0), point(3.0, 3.0)]
    );
}

#[test]
fn concurrent_publishers_end_with_one_of_their_values() {
    let store = LocationStore::new();
    let (seen, callback) = recorder();
    let _subscription = store.subscribe(callback);

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for step in 0..25 {
                    store.publish(point(index as f64, step as f64));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("publisher thread");
    }

    assert_eq!(seen.lock().expect("seen").len(), 100);
    let current = store.current().expect("current");
    assert_eq!(current.latitude(), 24.0);
}
