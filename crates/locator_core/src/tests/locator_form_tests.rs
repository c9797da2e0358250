use super::*;

use tokio::sync::broadcast::error::TryRecvError;

fn point(longitude: f64, latitude: f64) -> Point {
    Point::new(longitude, latitude).expect("valid point")
}

fn form() -> (Arc<LocationStore>, LocatorFormController) {
    let store = LocationStore::new();
    let form = LocatorFormController::new(Arc::clone(&store), DEFAULT_FORM_TITLE);
    (store, form)
}

#[test]
fn fields_start_empty_with_title() {
    let (_store, form) = form();
    assert_eq!(form.title(), "Locator");
    assert_eq!(form.fields(), (None, None));
    assert_eq!(form.locate_point(), None);
}

#[test]
fn set_point_round_trips_through_fields() {
    let (store, form) = form();
    let p = point(-122.4194, 37.7749);

    form.set_point(p);

    let (longitude, latitude) = form.fields();
    let rebuilt = Point::new(longitude.expect("lng"), latitude.expect("lat")).expect("point");
    assert_eq!(rebuilt, p);
    assert_eq!(form.locate_point(), Some(p));
    assert_eq!(store.current(), None, "set_point has no side effects");
}

#[test]
fn submit_emits_then_publishes() {
    let (store, form) = form();
    let mut events = form.subscribe_events();
    form.set_field(Axis::Longitude, 10.0);
    form.set_field(Axis::Latitude, 20.0);

    let located = form.submit().expect("submit");

    assert_eq!(located, point(10.0, 20.0));
    assert_eq!(events.try_recv(), Ok(FormEvent::Located(located)));
    assert_eq!(store.current(), Some(located));
    assert_eq!(form.locate_point(), Some(located));
}

#[test]
fn out_of_range_submission_is_rejected_without_side_effects() {
    let (store, form) = form();
    let mut events = form.subscribe_events();
    form.set_point(point(1.0, 2.0));
    form.set_field(Axis::Latitude, 123.0);

    let err = form.submit().expect_err("latitude out of range");

    assert_eq!(err, CoordinateError::LatitudeOutOfRange(123.0));
    assert_eq!(store.current(), None);
    assert_eq!(form.locate_point(), Some(point(1.0, 2.0)));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn submission_with_an_empty_field_is_rejected() {
    let (store, form) = form();
    form.set_field(Axis::Latitude, 5.0);

    assert_eq!(
        form.submit(),
        Err(CoordinateError::Missing(Axis::Longitude))
    );
    assert_eq!(store.current(), None);
}

#[test]
fn typed_text_is_parsed_or_left_alone() {
    let (_store, form) = form();
    form.set_field_text(Axis::Longitude, " 2.3522 ").expect("number");
    form.set_field_text(Axis::Latitude, "48.8566").expect("number");

    let err = form
        .set_field_text(Axis::Latitude, "north")
        .expect_err("not a number");
    assert!(matches!(
        err,
        CoordinateError::Unparseable {
            axis: Axis::Latitude,
            ..
        }
    ));
    assert_eq!(form.fields(), (Some(2.3522), Some(48.8566)));
}

#[test]
fn attached_form_follows_store_publishes() {
    let (store, form) = form();
    form.attach();
    form.attach();
    assert!(form.is_attached());
    assert_eq!(store.subscriber_count(), 1);

    store.publish(point(7.0, 8.0));

    assert_eq!(form.fields(), (Some(7.0), Some(8.0)));
    assert_eq!(form.locate_point(), Some(point(7.0, 8.0)));
}

#[test]
fn own_submission_echo_is_harmless() {
    let (store, form) = form();
    form.attach();
    form.set_point(point(3.0, 4.0));

    form.submit().expect("submit");

    assert_eq!(form.fields(), (Some(3.0), Some(4.0)));
    assert_eq!(store.current(), Some(point(3.0, 4.0)));
}

#[test]
fn detach_without_attach_is_a_no_op() {
    let (store, form) = form();
    form.detach();
    form.detach();
    assert!(!form.is_attached());
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn detach_stops_following_the_store() {
    let (store, form) = form();
    form.attach();
    form.detach();
    form.detach();
    assert_eq!(store.subscriber_count(), 0);

    store.publish(point(9.0, 9.0));
    assert_eq!(form.fields(), (None, None));
}
