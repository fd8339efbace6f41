//! Integration tests for bulk export/import.

mod common;

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use axum::http::StatusCode;
use common::{body_bytes, body_json, build_test_app, get, post_multipart, test_config};
use taskforge_api::router::build_app_router;
use taskforge_api::state::AppState;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn read_zip(bytes: &[u8]) -> Vec<(String, String)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        entries.push((file.name().to_string(), content));
    }
    entries.sort();
    entries
}

#[tokio::test]
async fn export_contains_every_script() {
    let (_, pool) = build_test_app().await;
    pool.cache().store_script("alpha", "1").await.unwrap();
    pool.cache().store_script("beta", "2").await.unwrap();

    let state = AppState {
        pool,
        config: Arc::new(test_config()),
    };
    let app = build_app_router(state);

    let response = get(app, "/manage/export").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "application/zip");

    let entries = read_zip(&body_bytes(response).await);
    assert_eq!(
        entries,
        vec![
            ("alpha.rhai".to_string(), "1".to_string()),
            ("beta.rhai".to_string(), "2".to_string()),
        ]
    );
}

#[tokio::test]
async fn import_stores_scripts_and_skips_other_files() {
    let (app, pool) = build_test_app().await;
    let archive = build_zip(&[
        ("job.rhai", "40 + 2"),
        ("readme.txt", "not a script"),
    ]);

    let response = post_multipart(app, "/manage/import", "zipfile", "scripts.zip", archive).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["imported_count"], serde_json::json!(1));
    assert_eq!(json["skipped_count"], serde_json::json!(1));

    assert_eq!(pool.cache().get_script("job").await.unwrap(), "40 + 2");
}

#[tokio::test]
async fn import_rejects_missing_field_and_garbage() {
    let (app, _) = build_test_app().await;
    let response = post_multipart(app, "/manage/import", "other", "x.zip", vec![1, 2, 3]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (app, _) = build_test_app().await;
    let response =
        post_multipart(app, "/manage/import", "zipfile", "x.zip", vec![1, 2, 3]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_import_round_trip_reproduces_the_corpus() {
    // Export from one process…
    let (_, source_pool) = build_test_app().await;
    source_pool.cache().store_script("a", "1").await.unwrap();
    source_pool.cache().store_script("b", "2 + 2").await.unwrap();
    let state = AppState {
        pool: source_pool,
        config: Arc::new(test_config()),
    };
    let app = build_app_router(state);
    let exported = body_bytes(get(app, "/manage/export").await).await;

    // …import into a fresh one.
    let (app, target_pool) = build_test_app().await;
    let response = post_multipart(app, "/manage/import", "zipfile", "scripts.zip", exported).await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut names = target_pool.cache().list_scripts().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(target_pool.cache().get_script("b").await.unwrap(), "2 + 2");
}
