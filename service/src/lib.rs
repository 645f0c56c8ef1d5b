mod error;
mod extract;
mod logger;
mod service;

use std::sync::Arc;

use abi::{Config, ParkingError};
use axum::{
    routing::{get, post, put},
    Router,
};
use parking::ParkingManager;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use extract::{Identity, PathId, Payload, QueryParams, USER_ID_HEADER, USER_ROLE_HEADER};
pub use logger::init_logger;

#[derive(Debug, Clone)]
pub struct ParkingService {
    manager: Arc<ParkingManager>,
}

impl ParkingService {
    pub fn new(manager: ParkingManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, ParkingError> {
        Ok(Self::new(ParkingManager::from_config(config).await?))
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/lots", post(service::create_lot).get(service::list_lots))
            .route(
                "/lots/{id}",
                get(service::get_lot).delete(service::delete_lot),
            )
            .route("/lots/{id}/occupancy", get(service::lot_occupancy))
            .route("/lots/{id}/slots", get(service::list_slots))
            .route("/slots/{id}/maintenance", put(service::set_maintenance))
            .route(
                "/vehicles",
                post(service::register_vehicle).get(service::list_vehicles),
            )
            .route(
                "/vehicles/{id}",
                get(service::get_vehicle).delete(service::delete_vehicle),
            )
            .route(
                "/bookings",
                post(service::create_booking).get(service::query_bookings),
            )
            .route("/bookings/{id}", get(service::get_booking))
            .route("/bookings/{id}/approve", put(service::approve_booking))
            .route("/bookings/{id}/decline", put(service::decline_booking))
            .route("/bookings/{id}/cancel", put(service::cancel_booking))
            .route("/bookings/{id}/payment", post(service::pay_booking))
            .route("/checkout/{id}", post(service::checkout))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }
}

#[cfg(test)]
mod tests {
    use std::{ops::Deref, sync::Arc};

    use abi::{Caller, Config};
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use parking::{ManualClock, ParkingManager};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    struct TestConfig {
        config: Arc<Config>,
        _dir: TempDir,
    }

    impl TestConfig {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::load("../service/fixtures/config.yml").unwrap();
            config.db.path = dir
                .path()
                .join("parking.db")
                .to_string_lossy()
                .into_owned();

            Self {
                config: Arc::new(config),
                _dir: dir,
            }
        }
    }

    impl Deref for TestConfig {
        type Target = Config;

        fn deref(&self) -> &Self::Target {
            self.config.deref()
        }
    }

    async fn app(config: &Config, clock: &ManualClock) -> Router {
        let manager = ParkingManager::from_config(config)
            .await
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        ParkingService::new(manager).router()
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        caller: Option<Caller>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            req = req
                .header(USER_ID_HEADER, caller.user_id.to_string())
                .header(USER_ROLE_HEADER, caller.role.to_string());
        }
        let body = match body {
            Some(body) => {
                req = req.header(CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    const ADMIN: Caller = Caller {
        user_id: 1,
        role: abi::Role::Admin,
    };
    const USER: Caller = Caller {
        user_id: 2,
        role: abi::Role::User,
    };

    /// one lot of `total` spaces at 10/h and one vehicle owned by USER
    async fn seed(app: &Router, total: i64) -> (i64, i64) {
        let (status, lot) = call(
            app,
            Method::POST,
            "/lots",
            Some(ADMIN),
            Some(json!({
                "name": "Central",
                "location": "Main St 1",
                "totalSpaces": total,
                "chargingFeePerHour": "10"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{lot}");

        let (status, vehicle) = call(
            app,
            Method::POST,
            "/vehicles",
            Some(USER),
            Some(json!({ "plateNumber": "ab-123" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{vehicle}");

        (lot["id"].as_i64().unwrap(), vehicle["id"].as_i64().unwrap())
    }

    fn booking_body(vehicle_id: i64, lot_id: i64) -> Value {
        json!({
            "vehicleId": vehicle_id,
            "parkingId": lot_id,
            "entryTime": "2024-01-01T10:00:00Z",
            "checkoutTime": "2024-01-01T13:00:00Z"
        })
    }

    #[tokio::test]
    async fn booking_scenario_should_charge_three_hours() {
        let config = TestConfig::new();
        let clock = ManualClock::new("2024-01-01T10:00:00Z".parse().unwrap());
        let app = app(&config, &clock).await;
        let (lot_id, vehicle_id) = seed(&app, 1).await;

        let (status, booking) = call(
            &app,
            Method::POST,
            "/bookings",
            Some(USER),
            Some(booking_body(vehicle_id, lot_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{booking}");
        assert_eq!(booking["status"], "PENDING");
        let id = booking["id"].as_i64().unwrap();

        let (status, booking) = call(
            &app,
            Method::PUT,
            &format!("/bookings/{id}/approve"),
            Some(ADMIN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(booking["status"], "APPROVED");

        clock.set("2024-01-01T13:00:00Z".parse().unwrap());
        let (status, booking) = call(
            &app,
            Method::POST,
            &format!("/checkout/{id}"),
            Some(USER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(booking["status"], "COMPLETED");
        assert_eq!(booking["amount"], "30.00");

        let (_, lot) = call(&app, Method::GET, &format!("/lots/{lot_id}"), Some(USER), None).await;
        assert_eq!(lot["availableSpaces"], 1);
        let (_, slots) = call(
            &app,
            Method::GET,
            &format!("/lots/{lot_id}/slots"),
            Some(USER),
            None,
        )
        .await;
        assert_eq!(slots[0]["status"], "AVAILABLE");

        let (status, booking) = call(
            &app,
            Method::POST,
            &format!("/bookings/{id}/payment"),
            Some(USER),
            Some(json!({ "paymentMethod": "CARD" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(booking["paymentStatus"], "PAID");
        assert_eq!(booking["paymentMethod"], "CARD");
    }

    #[tokio::test]
    async fn errors_should_carry_kind_and_status() {
        let config = TestConfig::new();
        let clock = ManualClock::new("2024-01-01T09:00:00Z".parse().unwrap());
        let app = app(&config, &clock).await;
        let (lot_id, vehicle_id) = seed(&app, 1).await;

        let (status, body) = call(&app, Method::GET, "/lots", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");

        let (status, body) =
            call(&app, Method::GET, "/bookings/404", Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let (_, booking) = call(
            &app,
            Method::POST,
            "/bookings",
            Some(USER),
            Some(booking_body(vehicle_id, lot_id)),
        )
        .await;
        let id = booking["id"].as_i64().unwrap();

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/bookings/{id}/approve"),
            Some(USER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/bookings/{id}/payment"),
            Some(USER),
            Some(json!({ "paymentMethod": "CASH" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "invalid_state_transition");

        let (status, body) = call(
            &app,
            Method::POST,
            "/bookings",
            Some(USER),
            Some(json!({ "vehicleId": vehicle_id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let (status, body) = call(&app, Method::GET, "/bookings/abc", Some(USER), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let (status, body) =
            call(&app, Method::GET, "/bookings?page=first", Some(USER), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let (status, body) = call(
            &app,
            Method::GET,
            "/bookings?page=9223372036854775807",
            Some(ADMIN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let mut reversed = booking_body(vehicle_id, lot_id);
        reversed["checkoutTime"] = json!("2024-01-01T09:00:00Z");
        let (status, body) =
            call(&app, Method::POST, "/bookings", Some(USER), Some(reversed)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");
    }

    #[tokio::test]
    async fn full_lot_should_conflict() {
        let config = TestConfig::new();
        let clock = ManualClock::new("2024-01-01T09:00:00Z".parse().unwrap());
        let app = app(&config, &clock).await;
        let (lot_id, vehicle_id) = seed(&app, 1).await;

        let other = Caller::user(3);
        let (_, second) = call(
            &app,
            Method::POST,
            "/vehicles",
            Some(other),
            Some(json!({ "plateNumber": "ZZ-9", "vehicleType": "MOTORCYCLE" })),
        )
        .await;
        assert_eq!(second["vehicleType"], "MOTORCYCLE");

        let (status, _) = call(
            &app,
            Method::POST,
            "/bookings",
            Some(USER),
            Some(booking_body(vehicle_id, lot_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            Method::POST,
            "/bookings",
            Some(other),
            Some(booking_body(second["id"].as_i64().unwrap(), lot_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "capacity_exhausted");

        let (status, occupancy) = call(
            &app,
            Method::GET,
            &format!("/lots/{lot_id}/occupancy"),
            Some(ADMIN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(occupancy["availableSpaces"], 0);
        assert_eq!(occupancy["occupiedSlots"], 1);

        let (status, mine) = call(&app, Method::GET, "/bookings", Some(other), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine, json!([]));

        let (status, all) = call(
            &app,
            Method::GET,
            "/bookings?status=PENDING&pageSize=10",
            Some(ADMIN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 1);
    }
}
