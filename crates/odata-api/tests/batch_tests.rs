//! End-to-end `$batch` tests through the axum router.

mod common;

use axum::http::StatusCode;
use odata_storage::EntityStore;

use common::*;

// =============================================================================
// Independent Requests
// =============================================================================

#[tokio::test]
async fn test_failing_part_does_not_affect_siblings() {
    let storage = create_storage();
    let call = post_batch(
        create_test_app(&storage),
        &[
            create_person(1, "Ada"),
            http_part("GET", "People(404)", None, None),
            http_part("PATCH", "People(1)", Some(r#"{"Email": "ada@example.com"}"#), None),
            http_part("GET", "People(1)", None, None),
        ],
    )
    .await;

    assert_eq!(call.status, StatusCode::OK);
    assert!(call
        .content_type
        .starts_with("multipart/mixed; boundary=batchresponse_"));

    let response = call.decode();
    assert_eq!(all_statuses(&response), vec![201, 404, 204, 200]);
    let person = body_json(single(&response.items[3]));
    assert_eq!(person["Email"], "ada@example.com");
}

#[tokio::test]
async fn test_content_ids_are_echoed() {
    let storage = create_storage();
    let call = post_batch(
        create_test_app(&storage),
        &[
            http_part("GET", "People", None, Some("1")),
            http_part("GET", "People/$count", None, Some("count")),
        ],
    )
    .await;

    let response = call.decode();
    let ids: Vec<_> = response
        .responses()
        .map(|r| r.content_id.clone())
        .collect();
    assert_eq!(ids, vec![Some("1".to_string()), Some("count".to_string())]);
    assert!(std::str::from_utf8(&call.body)
        .unwrap()
        .contains("Content-ID: 1\r\n"));
}

#[tokio::test]
async fn test_absolute_and_root_relative_urls_in_parts() {
    let storage = create_storage();
    let call = post_batch(
        create_test_app(&storage),
        &[
            create_person(1, "Ada"),
            http_part("GET", "http://localhost/People(1)/Name", None, None),
            http_part("GET", "/People(1)/Name/$value", None, None),
        ],
    )
    .await;

    let response = call.decode();
    assert_eq!(all_statuses(&response), vec![201, 200, 200]);
    assert_eq!(single(&response.items[2]).body.as_ref(), b"Ada");
}

#[tokio::test]
async fn test_reserved_paths_inside_batch() {
    let storage = create_storage();
    let call = post_batch(
        create_test_app(&storage),
        &[
            http_part("GET", "$metadata", None, None),
            http_part("POST", "$batch", None, None),
            http_part("GET", "People", None, None),
        ],
    )
    .await;

    let response = call.decode();
    assert_eq!(all_statuses(&response), vec![404, 404, 200]);
    let error = body_json(single(&response.items[0]));
    assert_eq!(error["error"]["code"], "reserved_path");
}

// =============================================================================
// Changesets
// =============================================================================

#[tokio::test]
async fn test_committed_changeset_is_visible() {
    let storage = create_storage();
    let app = create_test_app(&storage);
    let call = post_batch(
        app.clone(),
        &[changeset(
            "changeset_1",
            &[create_person(1, "Ada"), create_person(2, "Bob")],
        )],
    )
    .await;

    let response = call.decode();
    assert_eq!(statuses(changeset_responses(&response.items[0])), vec![201, 201]);

    let (status, json) = get_json(app, "/People").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_changeset_leaves_count_unchanged() {
    let storage = create_storage();
    let app = create_test_app(&storage);
    let call = post_batch(
        app.clone(),
        &[changeset(
            "changeset_1",
            &[
                create_person(1, "Ada"),
                http_part("POST", "People", Some(r#"{"ID": 2}"#), None),
            ],
        )],
    )
    .await;

    assert_eq!(call.status, StatusCode::OK);
    let response = call.decode();
    let responses = changeset_responses(&response.items[0]);
    assert_eq!(statuses(responses), vec![424, 400]);
    assert_eq!(body_json(&responses[0])["error"]["code"], "changeset_rolled_back");

    assert_eq!(storage.count("People").await.unwrap(), 0);
    let (status, _) = get_json(app, "/People(1)").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_changeset_with_content_id_reference() {
    let storage = create_storage();
    let call = post_batch(
        create_test_app(&storage),
        &[changeset(
            "changeset_1",
            &[
                http_part(
                    "POST",
                    "People",
                    Some(r#"{"ID": 5, "Name": "Ada"}"#),
                    Some("1"),
                ),
                http_part(
                    "POST",
                    "Orders",
                    Some(r#"{"ID": 50, "PersonID": 5, "Total": 12.5}"#),
                    Some("2"),
                ),
                http_part("GET", "$1/Orders", None, Some("3")),
            ],
        )],
    )
    .await;

    let response = call.decode();
    let responses = changeset_responses(&response.items[0]);
    assert_eq!(statuses(responses), vec![201, 201, 200]);
    let orders = body_json(&responses[2]);
    assert_eq!(orders["value"][0]["ID"], 50);
}

#[tokio::test]
async fn test_mixed_batch_keeps_document_order() {
    let storage = create_storage();
    let call = post_batch(
        create_test_app(&storage),
        &[
            create_person(1, "Ada"),
            changeset(
                "changeset_a",
                &[http_part("DELETE", "People(1)", None, None)],
            ),
            http_part("GET", "People/$count", None, None),
            changeset(
                "changeset_b",
                &[create_person(2, "Bob"), http_part("DELETE", "People(9)", None, None)],
            ),
            http_part("GET", "People/$count", None, None),
        ],
    )
    .await;

    let response = call.decode();
    assert_eq!(response.items.len(), 5);
    assert_eq!(all_statuses(&response), vec![201, 204, 200, 424, 404, 200]);
    assert_eq!(single(&response.items[2]).body.as_ref(), b"0");
    assert_eq!(single(&response.items[4]).body.as_ref(), b"0");
}

// =============================================================================
// Envelope
// =============================================================================

#[tokio::test]
async fn test_json_content_type_is_rejected() {
    let storage = create_storage();
    let call = post_batch_with(
        create_test_app(&storage),
        "application/json",
        multipart(BOUNDARY, &[create_person(1, "Ada")]),
    )
    .await;

    assert_eq!(call.status, StatusCode::BAD_REQUEST);
    assert_eq!(call.json()["error"]["code"], "invalid_batch");
    assert_eq!(storage.count("People").await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_boundary_is_rejected() {
    let storage = create_storage();
    let call = post_batch_with(
        create_test_app(&storage),
        "multipart/mixed",
        multipart(BOUNDARY, &[create_person(1, "Ada")]),
    )
    .await;
    assert_eq!(call.status, StatusCode::BAD_REQUEST);
    assert_eq!(storage.count("People").await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_batch() {
    let storage = create_storage();
    let call = post_batch(create_test_app(&storage), &[]).await;
    assert_eq!(call.status, StatusCode::OK);
    assert!(call.decode().items.is_empty());
}

#[tokio::test]
async fn test_read_only_batch_replays_identically() {
    let storage = create_storage();
    let app = create_test_app(&storage);
    post_batch(app.clone(), &[create_person(1, "Ada"), create_person(2, "Bob")]).await;

    let parts = [
        http_part("GET", "People?$top=1", None, Some("a")),
        http_part("GET", "People(2)", None, Some("b")),
        http_part("GET", "People/$count", None, None),
    ];
    let first = post_batch(app.clone(), &parts).await.decode();
    let second = post_batch(app, &parts).await.decode();

    let bodies = |r: &odata_server::handlers::batch::BatchResponse| -> Vec<Vec<u8>> {
        r.responses().map(|s| s.body.to_vec()).collect()
    };
    assert_eq!(bodies(&first), bodies(&second));
    assert_eq!(first, second);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_batches_all_commit() {
    let storage = create_storage();
    let app = create_test_app(&storage);

    let mut handles = Vec::new();
    for i in 0..20u32 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            post_batch(
                app,
                &[changeset(
                    "changeset_1",
                    &[create_person(i * 2, "A"), create_person(i * 2 + 1, "B")],
                )],
            )
            .await
            .decode()
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(all_statuses(&response), vec![201, 201]);
    }
    assert_eq!(storage.count("People").await.unwrap(), 40);
}
