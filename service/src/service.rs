use abi::{
    Booking, BookingQuery, LotOccupancy, NewBooking, NewParkingLot, NewVehicle, ParkingLot,
    PaymentMethod, Slot, Vehicle,
};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use parking::{Bookings, ParkingLots, Slots, Vehicles};
use serde::Deserialize;

use crate::{ApiError, Identity, ParkingService, PathId, Payload, QueryParams};

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
}

/// make a booking, the lot's first free slot is held right away
pub(crate) async fn create_booking(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    Payload(req): Payload<NewBooking>,
) -> Created<Booking> {
    let booking = svc.manager.create(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub(crate) async fn approve_booking(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> ApiResult<Booking> {
    Ok(Json(svc.manager.approve(&caller, id).await?))
}

pub(crate) async fn decline_booking(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> ApiResult<Booking> {
    Ok(Json(svc.manager.decline(&caller, id).await?))
}

pub(crate) async fn cancel_booking(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> ApiResult<Booking> {
    Ok(Json(svc.manager.cancel(&caller, id).await?))
}

pub(crate) async fn checkout(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> ApiResult<Booking> {
    Ok(Json(svc.manager.checkout(&caller, id).await?))
}

pub(crate) async fn pay_booking(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
    Payload(req): Payload<PaymentRequest>,
) -> ApiResult<Booking> {
    Ok(Json(svc.manager.pay(&caller, id, req.payment_method).await?))
}

pub(crate) async fn get_booking(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> ApiResult<Booking> {
    Ok(Json(svc.manager.get(&caller, id).await?))
}

/// filter bookings by user, lot and status, newest first unless `desc=false`
pub(crate) async fn query_bookings(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    QueryParams(query): QueryParams<BookingQuery>,
) -> ApiResult<Vec<Booking>> {
    Ok(Json(svc.manager.query(&caller, query).await?))
}

pub(crate) async fn create_lot(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    Payload(lot): Payload<NewParkingLot>,
) -> Created<ParkingLot> {
    let lot = svc.manager.create_lot(&caller, lot).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

pub(crate) async fn list_lots(
    State(svc): State<ParkingService>,
    Identity(_): Identity,
) -> ApiResult<Vec<ParkingLot>> {
    Ok(Json(svc.manager.list_lots().await?))
}

pub(crate) async fn get_lot(
    State(svc): State<ParkingService>,
    Identity(_): Identity,
    PathId(id): PathId,
) -> ApiResult<ParkingLot> {
    Ok(Json(svc.manager.get_lot(id).await?))
}

pub(crate) async fn delete_lot(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> Result<StatusCode, ApiError> {
    svc.manager.delete_lot(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn lot_occupancy(
    State(svc): State<ParkingService>,
    Identity(_): Identity,
    PathId(id): PathId,
) -> ApiResult<LotOccupancy> {
    Ok(Json(svc.manager.occupancy(id).await?))
}

pub(crate) async fn list_slots(
    State(svc): State<ParkingService>,
    Identity(_): Identity,
    PathId(id): PathId,
) -> ApiResult<Vec<Slot>> {
    Ok(Json(svc.manager.list_slots(id).await?))
}

pub(crate) async fn set_maintenance(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
    Payload(req): Payload<MaintenanceRequest>,
) -> ApiResult<Slot> {
    Ok(Json(
        svc.manager.set_maintenance(&caller, id, req.enabled).await?,
    ))
}

pub(crate) async fn register_vehicle(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    Payload(vehicle): Payload<NewVehicle>,
) -> Created<Vehicle> {
    let vehicle = svc.manager.register_vehicle(&caller, vehicle).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub(crate) async fn list_vehicles(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
) -> ApiResult<Vec<Vehicle>> {
    Ok(Json(svc.manager.list_vehicles(&caller).await?))
}

pub(crate) async fn get_vehicle(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> ApiResult<Vehicle> {
    Ok(Json(svc.manager.get_vehicle(&caller, id).await?))
}

pub(crate) async fn delete_vehicle(
    State(svc): State<ParkingService>,
    Identity(caller): Identity,
    PathId(id): PathId,
) -> Result<StatusCode, ApiError> {
    svc.manager.delete_vehicle(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
