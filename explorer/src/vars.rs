use crate::state::UserState;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use carbon_ql::FilterSet;
use chrono::{DateTime, Utc};
use query_engine::{QueryMode, TimePoint, TimeWindow};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::{form_urlencoded, Url};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Base64(base64::DecodeError),

    #[error("{0}")]
    Json(serde_json::Error),

    #[error("{0}")]
    Query(query_engine::Error),
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<query_engine::Error> for Error {
    fn from(e: query_engine::Error) -> Self {
        Self::Query(e)
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    Ok(STANDARD.encode(serde_json::to_vec(value)?))
}

fn decode<T: DeserializeOwned>(value: &str) -> Result<T, Error> {
    let bytes = STANDARD.decode(value.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Serializes `user` into share-link query parameters. With `absolute`, the
/// time range is pinned to its bounds resolved at `now`.
pub fn share_link(user: &UserState, absolute: bool, now: DateTime<Utc>) -> Result<String, Error> {
    let mut params = form_urlencoded::Serializer::new(String::new());

    if !user.search_term.is_empty() {
        params.append_pair("search", &user.search_term);
    }
    if let Some(sql) = user.sql.as_deref().filter(|s| !s.is_empty()) {
        params.append_pair("sql", &encode(sql)?);
    }
    params.append_pair("mode", &user.mode.to_string());
    if !user.filters.is_empty() {
        params.append_pair("filters", &encode(&user.filters)?);
    }

    let window = if absolute {
        user.time_range.resolve(now).as_window()
    } else {
        user.time_range.clone()
    };
    params.append_pair("from", &window.from.to_string());
    params.append_pair("to", &window.to.to_string());

    if !user.datasource.is_empty() {
        params.append_pair("ds", &user.datasource);
    }
    // Lists are always written: an empty one differs from the defaults.
    params.append_pair("logLevels", &encode(&user.selection.log_levels)?);
    if !user.refresh_interval.is_empty() {
        params.append_pair("refresh", &user.refresh_interval);
    }
    if let Some(row) = user.log_details {
        params.append_pair("logDetails", &serde_json::to_string(&row)?);
    }
    params.append_pair("fields", &encode(&user.selected_fields)?);
    params.append_pair("labels", &encode(&user.selected_labels)?);

    Ok(params.finish())
}

/// Overlays the variables found in `link` onto `user`. Accepts a full URL or
/// a bare query string. Unknown variables are ignored.
pub fn apply_params(user: &UserState, link: &str) -> Result<UserState, Error> {
    let query = match Url::parse(link) {
        Ok(url) => url.query().unwrap_or_default().to_string(),
        Err(_) => link.trim_start_matches('?').to_string(),
    };

    let mut next = user.clone();
    let mut from: Option<TimePoint> = None;
    let mut to: Option<TimePoint> = None;
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        match name.as_ref() {
            "search" | "searchTerm" => next.search_term = value.into_owned(),
            "sql" => next.sql = Some(decode::<String>(&value)?),
            "mode" => next.mode = value.parse::<QueryMode>()?,
            "filters" => next.filters = decode::<FilterSet>(&value)?,
            "from" => from = Some(value.parse()?),
            "to" => to = Some(value.parse()?),
            "ds" => next.datasource = value.into_owned(),
            "logLevels" => next.selection.log_levels = decode(&value)?,
            "refresh" => next.refresh_interval = value.into_owned(),
            "logDetails" => next.log_details = serde_json::from_str(&value)?,
            "fields" => next.selected_fields = decode(&value)?,
            "labels" => next.selected_labels = decode(&value)?,
            _ => {}
        }
    }

    if from.is_some() || to.is_some() {
        next.time_range = TimeWindow::new(
            from.unwrap_or_else(|| user.time_range.from.clone()),
            to.unwrap_or_else(|| user.time_range.to.clone()),
        );
    }

    Ok(next)
}
