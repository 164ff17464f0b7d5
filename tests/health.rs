use marketplace_api::routes::health::HealthData;

#[test]
fn health_reports_database_state() {
    let up = HealthData::from_probe(true);
    assert_eq!(up.status, "ok");
    assert_eq!(up.database, "up");

    let down = HealthData::from_probe(false);
    assert_eq!(down.status, "degraded");
    assert_eq!(down.database, "down");
}
