use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::{CurrentUser, MaybeUser},
        roles::Capability,
    },
    error::{AppError, AppJson, AppPath, AppQuery},
    query::ListQuery,
    response::Envelope,
    state::AppState,
};

use super::{
    dto::{
        CreatePlaceRequest, DistancesData, NearbyData, PlaceData, PlaceUpdate, PlacesData,
        PlanData, StatsData,
    },
    geo::{self, LatLng, Unit},
    repo::{self, Listing, PLACES},
    services,
    stats::{fill_monthly_plan, plan_year, StatsParams, StatsRange},
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/places/getMyPlaces", get(get_my_places))
        .route("/places/waitingList", get(waiting_list))
        .route(
            "/places/places-within/:distance/center/:latlng/unit/:unit",
            get(places_within),
        )
        .route("/places/distances/:latlng/unit/:unit", get(distances))
        .route("/places/places-stats", get(place_stats))
        .route("/places/monthly-plan/:year", get(monthly_plan))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/places", get(list_places).post(create_place))
        .route(
            "/places/:id",
            get(get_place).patch(update_place).delete(delete_place),
        )
}

async fn listing(
    state: &AppState,
    params: &[(String, String)],
    filter: Listing,
) -> Result<Json<Envelope<PlacesData>>, AppError> {
    let q = ListQuery::parse(&PLACES, params)?;
    let places = repo::list(&state.db, &q, filter).await?;
    let n = places.len();
    Ok(Json(Envelope::success(PlacesData { places }).with_results(n)))
}

#[instrument(skip(state, current, params), fields(user_id = %current.0.id))]
pub async fn list_places(
    State(state): State<AppState>,
    current: CurrentUser,
    AppQuery(params): AppQuery<Vec<(String, String)>>,
) -> Result<Json<Envelope<PlacesData>>, AppError> {
    listing(&state, &params, Listing::All).await
}

#[instrument(skip(state, current, params), fields(user_id = %current.0.id))]
pub async fn get_my_places(
    State(state): State<AppState>,
    current: CurrentUser,
    AppQuery(params): AppQuery<Vec<(String, String)>>,
) -> Result<Json<Envelope<PlacesData>>, AppError> {
    listing(&state, &params, Listing::CreatedBy(current.0.id)).await
}

#[instrument(skip(state, current, params), fields(user_id = %current.0.id))]
pub async fn waiting_list(
    State(state): State<AppState>,
    current: CurrentUser,
    AppQuery(params): AppQuery<Vec<(String, String)>>,
) -> Result<Json<Envelope<PlacesData>>, AppError> {
    listing(&state, &params, Listing::Awaited).await
}

#[instrument(skip(state, current, payload), fields(user_id = %current.0.id))]
pub async fn create_place(
    State(state): State<AppState>,
    current: CurrentUser,
    AppJson(payload): AppJson<CreatePlaceRequest>,
) -> Result<(StatusCode, Json<Envelope<PlaceData>>), AppError> {
    let place = services::create_place(&state.db, &current, payload).await?;
    Ok((StatusCode::CREATED, Json(Envelope::success(PlaceData { place }))))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn get_place(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Envelope<PlaceData>>, AppError> {
    let place = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("place"))?;
    Ok(Json(Envelope::success(PlaceData { place })))
}

#[instrument(skip(state, current, payload), fields(user_id = %current.0.id))]
pub async fn update_place(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<PlaceUpdate>,
) -> Result<Json<Envelope<PlaceData>>, AppError> {
    let place = services::update_place(&state.db, &current, id, payload).await?;
    Ok(Json(Envelope::success(PlaceData { place })))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn delete_place(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_place(&state.db, &current, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, viewer))]
pub async fn places_within(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    AppPath((distance, latlng, unit)): AppPath<(String, String, String)>,
) -> Result<Json<Envelope<NearbyData>>, AppError> {
    let center: LatLng = latlng.parse()?;
    let unit: Unit = unit.parse()?;
    let radius = geo::radius_radians(&distance, unit)?;

    let candidates = repo::located(&state.db, viewer.is_some()).await?;
    let places = geo::within(center, radius, candidates);
    debug!(found = places.len(), radius, "radius search");
    let n = places.len();
    Ok(Json(Envelope::success(NearbyData { places }).with_results(n)))
}

#[instrument(skip(state, viewer))]
pub async fn distances(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    AppPath((latlng, unit)): AppPath<(String, String)>,
) -> Result<Json<Envelope<DistancesData>>, AppError> {
    let center: LatLng = latlng.parse()?;
    let unit: Unit = unit.parse()?;

    let candidates = repo::located(&state.db, viewer.is_some()).await?;
    let distances = geo::rank_by_distance(center, unit, &candidates);
    let n = distances.len();
    Ok(Json(Envelope::success(DistancesData { distances }).with_results(n)))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn place_stats(
    State(state): State<AppState>,
    current: CurrentUser,
    AppQuery(params): AppQuery<StatsParams>,
) -> Result<Json<Envelope<StatsData>>, AppError> {
    current.authorize(Capability::ViewPlaceStats)?;
    let range = StatsRange::try_from(params)?;
    let stats = repo::stats(&state.db, range).await?;
    Ok(Json(Envelope::success(StatsData { stats })))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn monthly_plan(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(year): AppPath<String>,
) -> Result<Json<Envelope<PlanData>>, AppError> {
    current.authorize(Capability::ViewMonthlyPlan)?;
    let year = plan_year(&year)?;
    let counts = repo::monthly_starts(&state.db, year).await?;
    Ok(Json(Envelope::success(PlanData {
        plan: fill_monthly_plan(&counts),
    })))
}
