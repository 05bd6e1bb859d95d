use myuplink::{DevicePoint, Notification, System};
use serde::Deserialize;

#[derive(Deserialize)]
struct SystemsPage {
    systems: Vec<System>,
}

#[derive(Deserialize)]
struct NotificationsPage {
    notifications: Vec<Notification>,
}

#[test]
fn systems_fixture() {
    let page: SystemsPage = serde_json::from_str(include_str!("data/systems.json")).unwrap();
    assert_eq!(page.systems.len(), 2);
    assert_eq!(page.systems[0].devices[0].product.name, "S1255-6 E EM 3x400V");
}

#[test]
fn device_points_fixture() {
    let points: Vec<DevicePoint> = serde_json::from_str(include_str!("data/device_points.json")).unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(points[0].value.to_string(), "-3.40");
    assert!(points[0]
        .smart_home_categories
        .as_ref()
        .is_some_and(|c| c.contains("sh-outdoorTemp")));
}

#[test]
fn notifications_fixture() {
    let page: NotificationsPage = serde_json::from_str(include_str!("data/notifications.json")).unwrap();
    assert_eq!(page.notifications[0].equip_name, "S1255");
}
