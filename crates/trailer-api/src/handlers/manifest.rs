//! Static addon manifest (§6): advertises the one resource this service
//! exposes and the id shapes it accepts.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Manifest {
    pub id: &'static str,
    pub version: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub resources: Vec<&'static str>,
    pub types: Vec<&'static str>,
    #[serde(rename = "idPrefixes")]
    pub id_prefixes: Vec<&'static str>,
}

pub async fn manifest() -> Json<Manifest> {
    Json(Manifest {
        id: "trailer-resolution-engine",
        version: env!("CARGO_PKG_VERSION"),
        name: "Trailer Resolution Engine",
        description: "Resolves a single streamable trailer or teaser for a movie or series by IMDb id",
        resources: vec!["stream"],
        types: vec!["movie", "series"],
        id_prefixes: vec!["tt"],
    })
}
