use axum::extract::State;

use crate::db::models::UserSettings;
use crate::db::sqlite::now;
use crate::error::LedgerError;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::Body;
use crate::router::LedgerState;
use crate::types::envelope::ApiResponse;
use crate::types::requests::SettingsUpdate;

pub async fn get_settings(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<UserSettings>, LedgerError> {
    Ok(ApiResponse::ok(state.storage.get_settings(auth.id()).await?))
}

/// PUT /api/user/settings -> partial update; absent fields keep their value.
pub async fn update_settings(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<SettingsUpdate>,
) -> Result<ApiResponse<UserSettings>, LedgerError> {
    req.validate()?;
    let mut settings = state.storage.get_settings(auth.id()).await?;
    let previous_base = settings.base_currency.clone();

    if let Some(code) = req.base_currency {
        if state.storage.find_currency(auth.id(), &code).await?.is_none() {
            return Err(LedgerError::validation("baseCurrency", "unknown currency"));
        }
        settings.base_currency = code;
    }
    if let Some(language) = req.language {
        settings.language = language;
    }
    if let Some(theme) = req.theme {
        settings.theme = theme;
    }
    if let Some(date_format) = req.date_format {
        settings.date_format = date_format.trim().to_string();
    }
    settings.updated_at = now();
    state.storage.save_settings(auth.id(), &settings).await?;

    // every report and snapshot is valued in the base currency
    if settings.base_currency != previous_base {
        state.storage.enable_currency(auth.id(), &settings.base_currency).await?;
        state.data_changed(auth.id()).await?;
    }
    Ok(ApiResponse::ok(settings))
}
