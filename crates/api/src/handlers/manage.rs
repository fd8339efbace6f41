//! Bulk export/import of the script corpus as a zip archive.

use std::io::{Cursor, Read, Write};

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// File extension for exported scripts.
const SCRIPT_EXTENSION: &str = "rhai";

fn zip_error(err: zip::result::ZipError) -> AppError {
    AppError::InternalError(format!("zip: {err}"))
}

/// GET /manage/export
///
/// Download every script as `<name>.rhai` inside one zip archive.
pub async fn export_scripts(State(state): State<AppState>) -> AppResult<Response> {
    let cache = state.pool.cache();
    let names = cache.list_scripts().await?;

    // Gather sources first so the archive is written without awaits.
    let mut scripts = Vec::with_capacity(names.len());
    for name in names {
        let code = cache.get_script(&name).await?;
        scripts.push((name, code));
    }

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for (name, code) in &scripts {
            writer
                .start_file(format!("{name}.{SCRIPT_EXTENSION}"), options)
                .map_err(zip_error)?;
            writer
                .write_all(code.as_bytes())
                .map_err(|err| AppError::InternalError(format!("zip write: {err}")))?;
        }
        writer.finish().map_err(zip_error)?;
    }
    let bytes = cursor.into_inner();

    let stamp = chrono::Utc::now().format("%Y%m%d");
    let filename = format!("Scripts-{}_{stamp}.zip", state.config.script.endpoint);

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={filename}"),
        ),
    ];
    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// POST /manage/import
///
/// Import scripts from a multipart-uploaded zip (`zipfile` field). Entries
/// without the script extension are counted as skipped.
pub async fn import_scripts(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut archive_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some("zipfile") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::BadRequest(format!("failed to read upload: {err}")))?;
            archive_bytes = Some(bytes);
        }
    }
    let archive_bytes = archive_bytes
        .ok_or_else(|| AppError::BadRequest("missing 'zipfile' field".to_string()))?;

    // Decode the archive fully before touching the store, so a corrupt
    // upload cannot leave a partial import behind.
    let mut entries = Vec::new();
    let mut skipped_count = 0usize;
    {
        let mut archive = ZipArchive::new(Cursor::new(archive_bytes.as_ref()))
            .map_err(|err| AppError::BadRequest(format!("invalid zip file: {err}")))?;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(zip_error)?;
            if file.is_dir() {
                continue;
            }

            let path = std::path::PathBuf::from(file.name());
            let extension = path.extension().and_then(|ext| ext.to_str());
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            let (Some(extension), Some(stem)) = (extension, stem) else {
                skipped_count += 1;
                continue;
            };
            if extension != SCRIPT_EXTENSION {
                skipped_count += 1;
                continue;
            }

            let mut code = String::new();
            file.read_to_string(&mut code)
                .map_err(|err| AppError::BadRequest(format!("unreadable zip entry: {err}")))?;
            entries.push((stem.to_string(), code));
        }
    }

    let cache = state.pool.cache();
    let mut imported_count = 0usize;
    for (name, code) in entries {
        cache.store_script(&name, &code).await?;
        imported_count += 1;
    }

    Ok(Json(json!({
        "status": "success",
        "message": format!(
            "Successfully imported {imported_count} scripts, skipped {skipped_count} other files"
        ),
        "imported_count": imported_count,
        "skipped_count": skipped_count,
    })))
}
