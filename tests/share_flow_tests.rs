mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use blockdrop::common::AppError;
use common::http::{build_json_request, create_test_app, extract_json};
use common::{setup, TestEnv};

/// Stores `name` as alice with `comment`, shared with nobody. Returns the file id.
async fn stored_file(env: &TestEnv, name: &str, comment: &str) -> u64 {
    let token = env.login("alice").await;
    env.service
        .define_upload_parameters(&token, &[name.to_string()], "", comment)
        .await
        .unwrap();
    env.service.start_uploading(&token).await.unwrap();
    env.send_blocks(&token, name.as_bytes(), 4).await;
    env.service.logout(&token).await.unwrap();

    let owner = env.login("alice").await;
    let files = env.service.list_download_files(&owner).await.unwrap();
    files.iter().find(|f| f.name == name).unwrap().id
}

//=============
// Authorized
//=============

#[tokio::test]
async fn owner_shares_stored_files() {
    let env = setup();
    let a = stored_file(&env, "a.txt", "draft").await;
    let b = stored_file(&env, "b.txt", "").await;
    let alice = env.login("alice").await;
    let bob = env.login("bob").await;
    assert!(env.service.list_download_files(&bob).await.unwrap().is_empty());

    env.service
        .share_files(&alice, &[a, b], "bob")
        .await
        .unwrap();

    let ids: Vec<u64> = env
        .service
        .list_download_files(&bob)
        .await
        .unwrap()
        .iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(ids, vec![a, b]);
    env.service.start_downloading(&bob, a).await.unwrap();
    assert_eq!(env.read_all(&bob, 3).await, b"a.txt");
    assert!(env
        .audit
        .contains(&format!("files_shared alice [{a}, {b}] true")));
}

#[tokio::test]
async fn unknown_recipients_are_reported_after_sharing() {
    let env = setup();
    let id = stored_file(&env, "a.txt", "").await;
    let alice = env.login("alice").await;

    let err = env
        .service
        .share_files(&alice, &[id], "bob; ghost")
        .await
        .unwrap_err();

    match err {
        AppError::UserFailure(message) => {
            assert_eq!(message, "Some user identifiers are invalid: [ghost]")
        }
        other => panic!("unexpected error {other:?}"),
    }
    let bob = env.login("bob").await;
    assert_eq!(env.service.list_download_files(&bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sharing_leaves_transfer_state_alone() {
    let env = setup();
    let id = stored_file(&env, "a.txt", "").await;
    let alice = env.login("alice").await;
    env.service
        .define_upload_parameters(&alice, &["next.txt".to_string()], "", "")
        .await
        .unwrap();
    let before = env.service.get_upload_status(&alice).await.unwrap();

    env.service.share_files(&alice, &[id], "bob").await.unwrap();

    assert_eq!(env.service.get_upload_status(&alice).await.unwrap(), before);
}

//===============
// Unauthorized
//===============

#[tokio::test]
async fn recipient_cannot_reshare() {
    let env = setup();
    let id = stored_file(&env, "a.txt", "").await;
    let alice = env.login("alice").await;
    env.service.share_files(&alice, &[id], "bob").await.unwrap();

    let bob = env.login("bob").await;
    let err = env
        .service
        .share_files(&bob, &[id], "carol")
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientPrivileges(message) => {
            assert_eq!(message, "Insufficient privileges for user bob.")
        }
        other => panic!("unexpected error {other:?}"),
    }
    let carol = env.login("carol").await;
    assert!(env.service.list_download_files(&carol).await.unwrap().is_empty());
    assert!(env.audit.contains(&format!("files_shared bob [{id}] false")));
}

#[tokio::test]
async fn one_foreign_file_blocks_the_whole_share() {
    let env = setup();
    let own = stored_file(&env, "mine.txt", "").await;
    let bob = env.login("bob").await;
    env.upload_one(&bob, "bobs.txt", b"b", 1).await;
    let foreign = env
        .service
        .list_download_files(&bob)
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.name == "bobs.txt")
        .unwrap()
        .id;

    let alice = env.login("alice").await;
    let err = env
        .service
        .share_files(&alice, &[own, foreign], "carol")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientPrivileges(_)));

    let carol = env.login("carol").await;
    assert!(env.service.list_download_files(&carol).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_file_id_is_not_found() {
    let env = setup();
    let alice = env.login("alice").await;
    let err = env
        .service
        .share_files(&alice, &[404], "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFoundOrUnauthorized { file_id: 404 }));
}

//=======
// HTTP
//=======

#[tokio::test]
async fn share_endpoint_maps_privilege_errors_to_forbidden() {
    let env = setup();
    let id = stored_file(&env, "a.txt", "").await;
    let alice = env.login("alice").await;
    let bob = env.login("bob").await;
    let app = create_test_app(&env);

    let response = app
        .clone()
        .oneshot(build_json_request(
            Method::POST,
            "/rpc/share",
            json!({ "fileIds": [id], "recipients": "carol" }),
            Some(&bob),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        extract_json(response).await["error"],
        "insufficient_privileges"
    );

    let response = app
        .oneshot(build_json_request(
            Method::POST,
            "/rpc/share",
            json!({ "fileIds": [id], "recipients": "bob" }),
            Some(&alice),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response).await["success"], true);
}
