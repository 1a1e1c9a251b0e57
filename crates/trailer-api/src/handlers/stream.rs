//! The resolution endpoint (§6): `GET /stream/{type}/{id}.json`. Always
//! returns 200 — an unresolved id degrades to an empty `streams` array
//! rather than a 404, per §7 (never surface upstream flakiness as an error
//! to the calling Stremio-style client).

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use trailer_models::MediaType;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct StreamResponse {
    pub streams: Vec<trailer_resolver::StreamEntry>,
}

/// Strips a trailing `.json` from the id segment; Stremio addon clients
/// always send it, but this service doesn't care whether it's there.
fn strip_json_suffix(raw: &str) -> &str {
    raw.strip_suffix(".json").unwrap_or(raw)
}

fn parse_media_type(raw: &str) -> ApiResult<MediaType> {
    match raw {
        "movie" => Ok(MediaType::Movie),
        "series" => Ok(MediaType::Tv),
        other => Err(ApiError::bad_request(format!("unsupported type: {other}"))),
    }
}

pub async fn stream(
    State(state): State<AppState>,
    Path((media_type, id_file)): Path<(String, String)>,
) -> ApiResult<Json<StreamResponse>> {
    let media_type = parse_media_type(&media_type)?;
    let imdb_id = strip_json_suffix(&id_file);

    if !imdb_id.starts_with("tt") {
        return Err(ApiError::bad_request("id must be an IMDb id starting with 'tt'"));
    }

    let id = imdb_id.to_string();
    let orchestrator = state.orchestrator.clone();
    let entry = state
        .gate
        .run(&id, move || async move { orchestrator.resolve(&id, media_type).await })
        .await
        .flatten();

    Ok(Json(StreamResponse {
        streams: entry.into_iter().collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_suffix() {
        assert_eq!(strip_json_suffix("tt0111161.json"), "tt0111161");
        assert_eq!(strip_json_suffix("tt0111161"), "tt0111161");
    }

    #[test]
    fn parses_known_media_types() {
        assert!(matches!(parse_media_type("movie"), Ok(MediaType::Movie)));
        assert!(matches!(parse_media_type("series"), Ok(MediaType::Tv)));
        assert!(parse_media_type("short").is_err());
    }
}
