use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;
use common::{create_test_app, send, token_for};

async fn create_problem(app: &axum::Router, token: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/problems",
        Some(token),
        Some(json!({
            "title": "Sum",
            "description": "Print 1 + 1",
            "expected_output": "2",
            "language": "Python"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    body
}

async fn submit(app: &axum::Router, access_code: &str, code: &str, language: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/v1/submissions",
        None,
        Some(json!({ "access_code": access_code, "code": code, "language": language })),
    )
    .await
}

#[tokio::test]
async fn test_correct_solution_counts_completion() {
    let app = create_test_app();
    let token = token_for("author", "Author", "user");
    let problem = create_problem(&app, &token).await;
    assert_eq!(problem["language"], "python");
    let code = problem["access_code"].as_str().unwrap();

    let (status, verdict) = submit(&app, code, "2\n", "PYTHON").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["is_correct"], true);
    assert_eq!(verdict["ran"], true);
    assert_eq!(verdict["language"], "python");

    let (_, fetched) = send(
        &app,
        "GET",
        &format!("/api/v1/problems/access/{}", code),
        None,
        None,
    )
    .await;
    assert_eq!(fetched["completions"], 1);
}

#[tokio::test]
async fn test_wrong_solution_shows_both_outputs() {
    let app = create_test_app();
    let token = token_for("author", "Author", "user");
    let problem = create_problem(&app, &token).await;

    let (status, verdict) = submit(&app, problem["access_code"].as_str().unwrap(), "3", "python").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["is_correct"], false);
    let message = verdict["message"].as_str().unwrap();
    assert!(message.contains("Expected:\n2"));
    assert!(message.contains("Your output:\n3"));
}

#[tokio::test]
async fn test_unsupported_language_is_bad_request() {
    let app = create_test_app();
    let token = token_for("author", "Author", "user");
    let problem = create_problem(&app, &token).await;

    let (status, _) = submit(&app, problem["access_code"].as_str().unwrap(), "2", "cobol").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_execution_failure_hides_upstream_body() {
    let app = create_test_app();
    let token = token_for("author", "Author", "user");
    let problem = create_problem(&app, &token).await;

    let (status, body) = submit(&app, problem["access_code"].as_str().unwrap(), "crash", "python").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Code execution failed");
    assert!(!body.to_string().contains("upstream exploded"));
}

#[tokio::test]
async fn test_unknown_access_code_is_not_found() {
    let app = create_test_app();
    let (status, _) = submit(&app, "nope00", "2", "python").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_problem_listing_and_delete() {
    let app = create_test_app();
    let owner = token_for("author", "Author", "user");
    let other = token_for("other", "Other", "user");
    let problem = create_problem(&app, &owner).await;
    let uri = format!("/api/v1/problems/{}", problem["id"].as_str().unwrap());

    let (status, mine) = send(&app, "GET", "/api/v1/problems", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/v1/problems/access/{}", problem["access_code"].as_str().unwrap()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
