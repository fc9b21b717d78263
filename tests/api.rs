use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use pipeline_crm::{
    app,
    seed::{bootstrap_admin, seed_demo_org, DemoOrg, DEMO_PASSWORD},
    AppState, Config,
};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn setup() -> (Router, DemoOrg) {
    let state = AppState::in_memory(Config::for_tests());
    bootstrap_admin(state.store.as_ref(), &state.config).await.unwrap();
    let org = seed_demo_org(state.store.as_ref()).await.unwrap().unwrap();
    (app(state), org)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn login(app: &Router, login: &str) -> String {
    login_with(app, login, DEMO_PASSWORD).await
}

async fn login_admin(app: &Router) -> String {
    let config = Config::for_tests();
    login_with(app, config.admin_email(), config.admin_password()).await
}

async fn login_with(app: &Router, login: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        post(
            "/auth/login",
            None,
            json!({"email": login, "password": password}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"]["accessToken"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = setup().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let (app, _) = setup().await;
    let request = Request::builder()
        .uri("/customers")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = send(&app, get("/customers", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (app, _) = setup().await;
    let (status, _) = send(
        &app,
        post(
            "/auth/login",
            None,
            json!({"email": "am1@crm.local", "password": "wrong-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_sets_cookies_and_me_answers() {
    let (app, org) = setup().await;
    let response = app
        .clone()
        .oneshot(post(
            "/auth/login",
            None,
            json!({"username": "gm1", "password": DEMO_PASSWORD}),
        ))
        .await
        .unwrap();
    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=") && c.contains("HttpOnly")));

    let token = login(&app, "gm1@crm.local").await;
    let (status, body) = send(&app, get("/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], org.gm1.id.as_str());
    assert!(body["data"].get("password").is_none());
}

#[tokio::test]
async fn customer_visibility_follows_department() {
    let (app, _) = setup().await;
    let am1 = login(&app, "am1@crm.local").await;
    let (status, body) = send(
        &app,
        post(
            "/customers",
            Some(&am1),
            json!({
                "companyName": "PT Maju Jaya",
                "pic": "Budi",
                "phone": "+62 812 3456 7890",
                "potential": 50_000_000,
                "status": "prospect"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let id = body["data"]["id"].as_str().unwrap().to_owned();

    let gm2 = login(&app, "gm2@crm.local").await;
    let (_, body) = send(&app, get("/customers", &gm2)).await;
    assert_eq!(body["data"]["total"], 0);
    let (status, _) = send(&app, get(&format!("/customers/{}", id), &gm2)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let gm1 = login(&app, "gm1@crm.local").await;
    let (_, body) = send(&app, get("/customers", &gm1)).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["customers"][0]["id"], id.as_str());

    let admin = login_admin(&app).await;
    let (_, body) = send(&app, get("/customers?status=prospect", &admin)).await;
    assert_eq!(body["data"]["total"], 1);
    let (status, _) = send(&app, get("/customers?status=won", &admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validation_errors_name_the_fields() {
    let (app, _) = setup().await;
    let am1 = login(&app, "am1@crm.local").await;
    let (status, body) = send(
        &app,
        post(
            "/customers",
            Some(&am1),
            json!({
                "companyName": "",
                "pic": "Budi",
                "phone": "0812345",
                "potential": 0,
                "status": "prospect"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["fields"].get("companyName").is_some());
    assert!(body["data"]["fields"].get("potential").is_some());
}

#[tokio::test]
async fn wrong_typed_fields_are_named() {
    let (app, _) = setup().await;
    let am1 = login(&app, "am1@crm.local").await;
    let (status, body) = send(
        &app,
        post(
            "/customers",
            Some(&am1),
            json!({
                "companyName": "PT Maju",
                "pic": "Budi",
                "phone": "0812345",
                "potential": "lots",
                "status": "prospect"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 7, "{}", body);
    assert!(body["data"]["fields"].get("potential").is_some(), "{}", body);
}

#[tokio::test]
async fn timeline_accepts_a_plain_date() {
    let (app, _) = setup().await;
    let am1 = login(&app, "am1@crm.local").await;
    let (status, body) = send(
        &app,
        post(
            "/customers",
            Some(&am1),
            json!({
                "companyName": "PT Maju",
                "pic": "Budi",
                "phone": "0812345",
                "potential": 10_000_000,
                "timeline": "2025-06-30",
                "status": "prospect"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let timeline = body["data"]["timeline"].as_str().unwrap();
    assert!(timeline.starts_with("2025-06-30T00:00:00"), "{}", timeline);
}

#[tokio::test]
async fn dashboard_reflects_the_pipeline() {
    let (app, _) = setup().await;
    let am1 = login(&app, "am1@crm.local").await;
    for (name, potential, status) in [
        ("PT A", 10_000_000, "prospect"),
        ("PT B", 20_000_000, "negotiation"),
        ("PT C", 30_000_000, "closed-won"),
    ] {
        let (status, _) = send(
            &app,
            post(
                "/customers",
                Some(&am1),
                json!({
                    "companyName": name,
                    "pic": "Budi",
                    "phone": "0812345",
                    "potential": potential,
                    "status": status
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&app, get("/reports/dashboard", &am1)).await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["pipelineValue"], 30_000_000.0);
    assert_eq!(stats["actualAmount"], 30_000_000.0);
    assert_eq!(stats["activeCustomers"], 2);
    assert_eq!(stats["customersByStatus"].as_array().unwrap().len(), 6);
    assert_eq!(stats["needsFollowUp"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn target_upsert_reports_insert_then_overwrite() {
    let (app, org) = setup().await;
    let gm1 = login(&app, "gm1@crm.local").await;
    let body = json!({"amount": 100_000_000, "month": 3, "year": 2025, "userId": org.am1.id});
    let (status, first) = send(&app, post("/targets", Some(&gm1), body.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    let (status, second) = send(&app, post("/targets", Some(&gm1), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["id"], second["data"]["id"]);

    let outside = json!({"amount": 1, "month": 3, "year": 2025, "userId": org.am2.id});
    let (status, _) = send(&app, post("/targets", Some(&gm1), outside)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let am1 = login(&app, "am1@crm.local").await;
    let (status, _) = send(
        &app,
        post("/targets", Some(&am1), json!({"amount": 1, "month": 3, "year": 2025})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = send(&app, get("/targets?month=3&year=2025", &am1)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn user_admin_is_admin_only() {
    let (app, org) = setup().await;
    let gm1 = login(&app, "gm1@crm.local").await;
    let (status, _) = send(&app, get("/users", &gm1)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = login_admin(&app).await;
    let (status, body) = send(&app, get("/users?role=AM", &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/users/{}", org.am2.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        post(
            "/auth/login",
            None,
            json!({"email": "am2@crm.local", "password": DEMO_PASSWORD}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
