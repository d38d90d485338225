use hashicups_provider::testing::ProviderTester;
use hashicups_provider::{
    ClientConfig, ClientError, FoodApi, FoodItem, HashicupsClient, HashicupsProvider,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        host: server.uri(),
        credentials: None,
    }
}

async fn mount_signin(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/signin"))
        .and(body_json(json!({"username": "education", "password": "test123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "UserID": 1,
            "Username": "education",
            "token": "tok-123"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn sign_in_sends_token_on_requests() {
    let server = MockServer::start().await;
    mount_signin(&server).await;

    Mock::given(method("GET"))
        .and(path("/foods/42"))
        .and(header("Authorization", "tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "items": [{"name": "Burger", "price": 9.99}]
        })))
        .mount(&server)
        .await;

    let client = HashicupsClient::new(ClientConfig {
        host: format!("{}/", server.uri()),
        credentials: Some(("education".into(), "test123".into())),
    })
    .await
    .unwrap();

    assert_eq!(client.host(), server.uri());
    let food = client.get_food("42").await.unwrap();
    assert_eq!(food.id, 42);
    assert_eq!(food.items, vec![FoodItem::new("Burger", 9.99)]);
}

#[tokio::test]
async fn rejected_sign_in_fails_construction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signin"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let err = HashicupsClient::new(ClientConfig {
        host: server.uri(),
        credentials: Some(("education".into(), "wrong".into())),
    })
    .await
    .unwrap_err();

    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "invalid credentials");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn create_posts_items() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/foods"))
        .and(body_json(json!([
            {"name": "Burger", "price": 9.99},
            {"name": "Fries", "price": 3.5}
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "items": [
                {"name": "Burger", "price": 9.99},
                {"name": "Fries", "price": 3.5}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HashicupsClient::new(config_for(&server)).await.unwrap();
    let food = client
        .create_food(&[FoodItem::new("Burger", 9.99), FoodItem::new("Fries", 3.5)])
        .await
        .unwrap();

    assert_eq!(food.id, 42);
    assert_eq!(food.items.len(), 2);
}

#[tokio::test]
async fn update_puts_items_and_tolerates_missing_items() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/foods/42"))
        .and(body_json(json!([{"name": "Fries", "price": 4.0}])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HashicupsClient::new(config_for(&server)).await.unwrap();
    let food = client
        .update_food("42", &[FoodItem::new("Fries", 4.0)])
        .await
        .unwrap();

    assert_eq!(food.id, 42);
    assert!(food.items.is_empty());
}

#[tokio::test]
async fn delete_and_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/foods/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Deleted order"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/foods/42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HashicupsClient::new(config_for(&server)).await.unwrap();
    client.delete_food("42").await.unwrap();

    let err = client.get_food("42").await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(ref p) if p == "/foods/42"));
}

#[tokio::test]
async fn server_error_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/foods"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let client = HashicupsClient::new(config_for(&server)).await.unwrap();
    let err = client.create_food(&[]).await.unwrap_err();
    assert_eq!(err.to_string(), "status: 500, body: database unavailable");
}

#[tokio::test]
async fn provider_configures_client_against_api() {
    let server = MockServer::start().await;
    mount_signin(&server).await;
    Mock::given(method("POST"))
        .and(path("/foods"))
        .and(header("Authorization", "tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "items": [{"name": "Burger", "price": 9.99}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tester = ProviderTester::new(HashicupsProvider::new().with_env_lookup(|_| None));
    tester
        .configure(json!({
            "host": server.uri(),
            "username": "education",
            "password": "test123"
        }))
        .await
        .unwrap();

    let state = tester
        .create(
            "hashicups_food",
            json!({"id": null, "last_updated": null, "items": [{"name": "Burger", "price": 9.99}]}),
        )
        .await
        .unwrap();
    assert_eq!(state["id"], "7");
}

#[tokio::test]
async fn provider_reports_unreachable_sign_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signin"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tester = ProviderTester::new(HashicupsProvider::new().with_env_lookup(|_| None));
    let err = tester
        .configure(json!({
            "host": server.uri(),
            "username": "education",
            "password": "test123"
        }))
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .contains("Unable to Create HashiCups API Client"));
}
