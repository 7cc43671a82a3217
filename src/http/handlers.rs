use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Json, Response};

use super::static_files::serve_file_with_range;
use super::{AppState, HttpError};

pub async fn status() -> &'static str {
    "Alive"
}

pub async fn list_artists(State(state): State<AppState>) -> Result<Response, HttpError> {
    let names = state.store.list_artist_names().await?;
    Ok(Json(names).into_response())
}

pub async fn list_albums(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, HttpError> {
    let artist = required_param(&params, "artist")?;
    let names = state.store.list_album_names(artist).await?;
    Ok(Json(names).into_response())
}

#[derive(serde::Serialize)]
struct SongJson {
    title: String,
    length: u32,
    hash: String,
}

pub async fn list_songs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, HttpError> {
    let artist = required_param(&params, "artist")?;
    let album = required_param(&params, "album")?;

    let songs = state.store.list_songs_for(artist, album).await?;
    let body: Vec<SongJson> = songs
        .into_iter()
        .map(|s| SongJson {
            title: s.title,
            length: s.duration_secs.unwrap_or(0),
            hash: s.hash,
        })
        .collect();

    Ok(Json(body).into_response())
}

pub async fn stream_song(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let hash = required_param(&params, "song")?;

    let path = match state.store.resolve_song_path(hash).await {
        Ok(path) => path,
        Err(crate::catalog::StoreError::UnknownSong(_)) => return Err(HttpError::NotFound),
        Err(err) => return Err(err.into()),
    };

    serve_file_with_range(&path, headers.get(header::RANGE)).await
}

fn required_param<'a>(
    params: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, HttpError> {
    params
        .get(name)
        .map(|s| s.as_str())
        .ok_or(HttpError::MissingParam(name))
}
