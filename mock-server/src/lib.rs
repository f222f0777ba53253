use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const API_KEY: &str = "test-api-key";
pub const ACCOUNT_ID: u64 = 1507;
pub const ELEC_METER_POINT_ID: u64 = 1496;
pub const GAS_METER_POINT_ID: u64 = 1497;
pub const MPAN_CORE_ID: &str = "9910000001507";
pub const MPRN: &str = "3226987202";
pub const ELEC_MPAN: &str = "1900025225872";

/// Accounts with a completed sign-up, served two per page.
pub const SIGNED_UP: [u64; 5] = [1500, 1503, 1507, 1510, 1512];
const SIGN_UP_PAGE_SIZE: usize = 2;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterReading {
    #[serde(default)]
    pub id: u64,
    pub register_id: u64,
    pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub meter_point_id: u64,
    pub date_time: String,
    pub meter_reading_source: Option<String>,
    pub readings: Vec<RegisterReading>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub account_id: u64,
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeUpdate {
    pub updated_attributes: Vec<Attribute>,
    #[serde(default)]
    pub deleted_attributes: Vec<Attribute>,
}

#[derive(Default)]
pub struct Store {
    pub readings: HashMap<u64, Vec<Reading>>,
    pub attributes: HashMap<u64, Vec<Attribute>>,
    next_register_reading_id: u64,
}

/// Shared server state. `fail_next` makes the next N requests answer 503,
/// `hits` counts every request that reached the router.
#[derive(Default)]
pub struct Mock {
    pub store: RwLock<Store>,
    fail_next: AtomicUsize,
    hits: AtomicUsize,
}

impl Mock {
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub type Db = Arc<Mock>;

pub fn app() -> Router {
    app_with_state(Db::default())
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/accounts/{account_id}", get(get_account))
        .route("/accounts/{account_id}/AccountSettings", get(get_account_settings))
        .route(
            "/accounts/{account_id}/Attributes",
            get(get_attributes).put(update_attributes),
        )
        .route("/SignUps/Completed", get(completed_signups))
        .route("/Accounts/{account_id}/MeterPoints", get(meter_points))
        .route("/Accounts/{account_id}/Readings", axum::routing::post(create_readings))
        .route("/Accounts/{account_id}/Tariffs", get(tariffs))
        .route("/Accounts/{account_id}/LiveBalances", get(live_balances))
        .route(
            "/Accounts/{account_id}/LiveBalancesWithDetail",
            get(live_balances_detailed),
        )
        .route(
            "/Accounts/Lookups/MeterPoints/{meter_point_id}",
            get(account_for_meter_point),
        )
        .route("/MeterPoints/{meter_point_id}/Readings", get(meter_point_readings))
        .route("/Regions/{postcode}", get(region_for_postcode))
        .route("/UtilitiesLookups/Gas/{mprn}", get(gas_utility))
        .route("/UtilitiesLookups/Elec/{mpan_core_id}", get(electricity_utility))
        .route("/PostcodeLookups", get(addresses_at_postcode))
        .layer(middleware::from_fn_with_state(db.clone(), gatekeeper))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

/// Counts requests, injects scripted 503s and enforces the bearer token.
async fn gatekeeper(State(db): State<Db>, request: Request, next: Next) -> Response {
    db.hits.fetch_add(1, Ordering::SeqCst);

    let failing = db
        .fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        tracing::debug!(uri = %request.uri(), "injected failure");
        return (StatusCode::SERVICE_UNAVAILABLE, "injected failure").into_response();
    }

    let expected = format!("Bearer {API_KEY}");
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(request).await
}

/// Parses an account id, 400 when malformed, 404 when unknown.
fn known_account(raw: &str) -> Result<u64, StatusCode> {
    let id: u64 = raw.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    if id == ACCOUNT_ID {
        Ok(id)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn get_account(Path(account_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    let id = known_account(&account_id)?;
    Ok(Json(json!({
        "id": id,
        "externalReference": "GNG-1507",
        "primaryContact": {"firstName": "Ada", "lastName": "Lovelace"},
        "siteAddress": {"postcode": "SE1 4YU"},
    })))
}

async fn get_account_settings(Path(account_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    known_account(&account_id)?;
    Ok(Json(json!({
        "billingPeriod": "Monthly",
        "paperlessBilling": true,
    })))
}

async fn get_attributes(
    State(db): State<Db>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<Attribute>>, StatusCode> {
    let id = known_account(&account_id)?;
    let store = db.store.read().await;
    Ok(Json(store.attributes.get(&id).cloned().unwrap_or_default()))
}

async fn update_attributes(
    State(db): State<Db>,
    Path(account_id): Path<String>,
    Json(update): Json<AttributeUpdate>,
) -> Result<String, StatusCode> {
    let id = known_account(&account_id)?;
    let mut store = db.store.write().await;
    let attributes = store.attributes.entry(id).or_default();
    for removed in &update.deleted_attributes {
        attributes.retain(|a| a.name != removed.name);
    }
    for updated in update.updated_attributes {
        attributes.retain(|a| a.name != updated.name);
        attributes.push(updated);
    }
    Ok(format!("{} attribute(s) saved", attributes.len()))
}

#[derive(Deserialize)]
struct AfterQuery {
    after: Option<u64>,
}

async fn completed_signups(Query(query): Query<AfterQuery>) -> Json<Value> {
    let after = query.after.unwrap_or(0);
    let results: Vec<Value> = SIGNED_UP
        .iter()
        .filter(|id| **id > after)
        .take(SIGN_UP_PAGE_SIZE)
        .map(|id| json!({"accountId": id, "status": "Complete"}))
        .collect();
    Json(json!({
        "results": results,
        "meta": {"after": query.after, "pageSize": SIGN_UP_PAGE_SIZE},
    }))
}

async fn meter_points(Path(account_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    known_account(&account_id)?;
    Ok(Json(json!([
        {
            "id": ELEC_METER_POINT_ID,
            "meterPointNumber": MPAN_CORE_ID,
            "meterPointType": "E",
            "isSmart": true,
            "meters": [{"registers": [{"id": ELEC_METER_POINT_ID}]}],
        },
        {
            "id": GAS_METER_POINT_ID,
            "meterPointNumber": MPRN,
            "meterPointType": "G",
            "isSmart": false,
            "meters": [{"registers": [{"id": GAS_METER_POINT_ID}]}],
        },
    ])))
}

async fn create_readings(
    State(db): State<Db>,
    Path(account_id): Path<String>,
    Json(readings): Json<Vec<Reading>>,
) -> Result<Json<Value>, StatusCode> {
    known_account(&account_id)?;
    if readings.is_empty()
        || readings
            .iter()
            .any(|r| ![ELEC_METER_POINT_ID, GAS_METER_POINT_ID].contains(&r.meter_point_id))
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut store = db.store.write().await;
    for mut reading in readings {
        for register in &mut reading.readings {
            store.next_register_reading_id += 1;
            register.id = store.next_register_reading_id;
        }
        store
            .readings
            .entry(reading.meter_point_id)
            .or_default()
            .push(reading);
    }
    Ok(Json(json!([])))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TariffQuery {
    #[serde(default)]
    include_history: bool,
}

async fn tariffs(
    Path(account_id): Path<String>,
    Query(query): Query<TariffQuery>,
) -> Result<Json<Value>, StatusCode> {
    known_account(&account_id)?;
    let mut current = json!({
        "tariffName": "Standard Variable",
        "startDate": "2017-01-01T00:00:00",
        "endDate": null,
        "tariffType": "Variable",
    });
    if query.include_history {
        current["history"] = json!([
            {"tariffName": "Fixed 12M", "startDate": "2016-01-01T00:00:00", "endDate": "2016-12-31T00:00:00"}
        ]);
    }
    Ok(Json(current))
}

async fn live_balances(Path(account_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    known_account(&account_id)?;
    Ok(Json(json!({"currentBalance": -12.5})))
}

async fn live_balances_detailed(Path(account_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    known_account(&account_id)?;
    Ok(Json(json!({
        "currentBalance": -12.5,
        "detail": [{"fuel": "Electricity", "balance": -10.0}, {"fuel": "Gas", "balance": -2.5}],
    })))
}

async fn account_for_meter_point(Path(meter_point_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if meter_point_id == MPAN_CORE_ID || meter_point_id == MPRN {
        Ok(Json(json!({"accountId": ACCOUNT_ID})))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn meter_point_readings(
    State(db): State<Db>,
    Path(meter_point_id): Path<String>,
) -> Result<Json<Vec<Reading>>, StatusCode> {
    let id: u64 = meter_point_id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    if ![ELEC_METER_POINT_ID, GAS_METER_POINT_ID].contains(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let store = db.store.read().await;
    Ok(Json(store.readings.get(&id).cloned().unwrap_or_default()))
}

fn valid_postcode(postcode: &str) -> bool {
    !postcode.is_empty() && postcode.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
}

async fn region_for_postcode(Path(postcode): Path<String>) -> Result<Json<Value>, StatusCode> {
    if valid_postcode(&postcode) {
        Ok(Json(json!(12)))
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

async fn gas_utility(Path(mprn): Path<String>) -> Result<Json<Value>, StatusCode> {
    if mprn != MPRN {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "MeterPoint": MPRN,
        "ldz": "NT",
        "gasTransporter": "National Grid Gas",
        "fuelType": "Gas",
        "meterDetails": [{"meterSerialNumber": "00659516"}],
        "matchType": "Confirmed",
    })))
}

async fn electricity_utility(Path(mpan_core_id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if mpan_core_id != ELEC_MPAN {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "MeterPoint": ELEC_MPAN,
        "distributor": "SEEB",
        "fuelType": "Electricity",
        "profileClass": "00",
        "smetsVersion": "SMETS1",
        "matchType": "Confirmed",
    })))
}

#[derive(Deserialize)]
struct PostcodeQuery {
    postcode: Option<String>,
}

async fn addresses_at_postcode(Query(query): Query<PostcodeQuery>) -> Result<Json<Value>, StatusCode> {
    let postcode = query.postcode.ok_or(StatusCode::BAD_REQUEST)?;
    if !valid_postcode(&postcode) {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!([
        {"buildingNameNumber": "1", "postcode": postcode},
        {"buildingNameNumber": "2", "postcode": postcode},
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_uses_camel_case_on_the_wire() {
        let reading = Reading {
            meter_point_id: 1496,
            date_time: "2018-05-01T09:00:00+00:00".to_string(),
            meter_reading_source: None,
            readings: vec![RegisterReading {
                id: 0,
                register_id: 1496,
                value: 2.0,
            }],
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["meterPointId"], 1496);
        assert!(json["meterReadingSource"].is_null());
        assert_eq!(json["readings"][0]["registerId"], 1496);
    }

    #[test]
    fn incoming_register_reading_defaults_id() {
        let register: RegisterReading =
            serde_json::from_str(r#"{"registerId":7,"value":1.5}"#).unwrap();
        assert_eq!(register.id, 0);
        assert_eq!(register.register_id, 7);
    }

    #[test]
    fn attribute_kind_is_named_type() {
        let attr: Attribute = serde_json::from_str(
            r#"{"accountId":1507,"name":"PSR","value":"true","type":"Boolean"}"#,
        )
        .unwrap();
        assert_eq!(attr.kind, "Boolean");
    }

    #[test]
    fn known_account_classifies_ids() {
        assert_eq!(known_account("1507"), Ok(1507));
        assert_eq!(known_account("aaa"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(known_account("1234567890"), Err(StatusCode::NOT_FOUND));
    }

    #[test]
    fn fail_next_counts_down() {
        let mock = Mock::default();
        mock.fail_next(2);
        let take = || {
            mock.fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        };
        assert!(take());
        assert!(take());
        assert!(!take());
    }
}
