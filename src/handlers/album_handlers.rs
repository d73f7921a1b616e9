//! Public album handlers backing the slideshow.
//!
//! - GET /albums          -> album names (groups under `images/`)
//! - GET /albums/{album}  -> absolute URLs of the photos in one album

use crate::{
    errors::AppError,
    services::listing_service::{ListingQuery, discover_groups, list},
    state::{ALBUM_ROOT, AppState, DELIMITER},
};
use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

/// `GET /albums`
///
/// Albums are discovered one group per page, in store order.
pub async fn list_albums(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let bucket = &state.site.photo_bucket;
    let groups = discover_groups(&state.storage, bucket, ALBUM_ROOT, DELIMITER).await?;

    let albums: Vec<String> = groups.iter().filter_map(|g| album_name(g)).collect();
    info!(bucket = %bucket, albums = albums.len(), "listed albums");
    Ok(Json(albums))
}

/// `GET /albums/{album}`
///
/// Every photo directly under `images/{album}/`, rendered as
/// `{public_base_url}{bucket}/{key}` with each key segment percent-encoded.
/// Nested folders are not descended into.
pub async fn list_album_photos(
    State(state): State<AppState>,
    Path(album): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    if album.is_empty() || album.contains(DELIMITER) {
        return Err(AppError::bad_request("invalid album name"));
    }

    let site = &state.site;
    let prefix = format!("{ALBUM_ROOT}{album}{DELIMITER}");
    let listing = list(
        &state.storage,
        &site.photo_bucket,
        &ListingQuery::delimited(prefix, DELIMITER),
    )
    .await?;

    let urls = listing
        .entries
        .iter()
        .map(|photo| {
            state
                .signer
                .object_url(&site.photo_bucket, &photo.key)
                .map(String::from)
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(album = %album, photos = urls.len(), "listed album");
    Ok(Json(urls))
}

/// `images/camping/` -> `camping`
fn album_name(group: &str) -> Option<String> {
    let name = group.strip_prefix(ALBUM_ROOT)?.strip_suffix(DELIMITER)?;
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::album_name;

    #[test]
    fn album_name_strips_root_and_delimiter() {
        assert_eq!(album_name("images/camping/").as_deref(), Some("camping"));
        assert_eq!(album_name("images/2006 trip/").as_deref(), Some("2006 trip"));
        assert_eq!(album_name("images//"), None);
        assert_eq!(album_name("other/camping/"), None);
    }
}
