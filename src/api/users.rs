/// ユーザープロファイルと通知トークンのエンドポイント。
///
/// プッシュ配信自体は外部ファブリックの責務で、ここではデバイストークン
/// の登録簿と閲覧設定だけを保持します。
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::store::models::{Category, UserProfile};

use super::auth::Identity;
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub(crate) struct PreferencesBody {
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterDeviceBody {
    device_token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    status: &'static str,
}

/// `GET /api/users/profile`
pub(crate) async fn profile(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .store()
        .get_user_profile(&identity.user_id)
        .await
        .map_err(ApiError::from)?
        .unwrap_or_else(|| UserProfile::new(&identity.user_id));

    Ok(Json(profile))
}

/// `PUT /api/users/preferences` — カテゴリフィルターを置き換える。
pub(crate) async fn update_preferences(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<PreferencesBody>,
) -> Result<Json<UserProfile>, ApiError> {
    let mut categories = Vec::with_capacity(body.categories.len());
    for raw in &body.categories {
        let category: Category = raw
            .parse()
            .map_err(|_| ApiError::bad_request(format!("unknown category: {raw}")))?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    let store = state.store();
    let mut profile = store
        .get_user_profile(&identity.user_id)
        .await
        .map_err(ApiError::from)?
        .unwrap_or_else(|| UserProfile::new(&identity.user_id));
    profile.preferred_categories = categories;

    store
        .upsert_user_profile(&profile)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(profile))
}

/// `POST /api/notifications/register`
pub(crate) async fn register_device(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<RegisterDeviceBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    if body.device_token.trim().is_empty() {
        return Err(ApiError::bad_request("device_token must not be empty"));
    }

    let store = state.store();
    let mut profile = store
        .get_user_profile(&identity.user_id)
        .await
        .map_err(ApiError::from)?
        .unwrap_or_else(|| UserProfile::new(&identity.user_id));

    if !profile.device_tokens.contains(&body.device_token) {
        profile.device_tokens.push(body.device_token);
        store
            .upsert_user_profile(&profile)
            .await
            .map_err(ApiError::from)?;
    }

    Ok(Json(StatusResponse { status: "registered" }))
}

/// `DELETE /api/notifications/device-token/{token}`
pub(crate) async fn remove_device(
    State(state): State<AppState>,
    identity: Identity,
    Path(token): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let store = state.store();
    let mut profile = store
        .get_user_profile(&identity.user_id)
        .await
        .map_err(ApiError::from)?
        .unwrap_or_else(|| UserProfile::new(&identity.user_id));

    let before = profile.device_tokens.len();
    profile.device_tokens.retain(|t| t != &token);
    if profile.device_tokens.len() != before {
        store
            .upsert_user_profile(&profile)
            .await
            .map_err(ApiError::from)?;
    }

    Ok(Json(StatusResponse { status: "removed" }))
}
