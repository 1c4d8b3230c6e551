use axum::{
    body::{to_bytes, Body},
    extract::FromRef,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use giffy::{
    app::build_app,
    auth::{jwt::JwtKeys, session::Session},
    integrations::slack::{ERROR_BAD_PAYLOAD, ERROR_INVALID_ACTION, ERROR_INVALID_CALLBACK_STATE, ERROR_INVALID_QUERY},
    model::user::User,
    state::AppState,
};
use serde_json::Value;
use tower::ServiceExt;

async fn send(app: Router, req: Request<Body>) -> Response {
    app.oneshot(req).await.unwrap()
}

async fn body_text(res: Response) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(res: Response) -> Value {
    serde_json::from_str(&body_text(res).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn form(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn action_form(payload: &str) -> String {
    let url = reqwest::Url::parse_with_params("http://localhost/", &[("payload", payload)]).unwrap();
    url.query().unwrap().to_string()
}

/// Caches a session for `user` and returns the cookie header that selects it.
async fn login(state: &AppState, user: User) -> String {
    let session_id = format!("session-{}", user.uuid);
    let uuid = user.uuid.clone();
    state.sessions.add(Session::new(&session_id, user)).await;
    let token = JwtKeys::from_ref(state).sign_session(&session_id, &uuid).unwrap();
    format!("giffy={}", token)
}

fn with_cookie(mut req: Request<Body>, cookie: &str) -> Request<Body> {
    req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
    req
}

#[tokio::test]
async fn logged_out_user_gets_a_login_url() {
    let res = send(build_app(AppState::fake()), get("/api/session.user")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["Meta"]["StatusCode"], 200);
    assert_eq!(json["Response"]["is_logged_in"], false);
    let login_url = json["Response"]["login_url"].as_str().unwrap();
    assert!(login_url.starts_with("https://accounts.google.com/"));
    assert!(login_url.contains("client_id=google-client"));
}

#[tokio::test]
async fn logged_in_user_is_described() {
    let state = AppState::fake();
    let mut user = User::new("mod@example.com");
    user.is_moderator = true;
    let cookie = login(&state, user).await;

    let res = send(build_app(state), with_cookie(get("/api/session.user"), &cookie)).await;
    let json = body_json(res).await;
    assert_eq!(json["Response"]["is_logged_in"], true);
    assert_eq!(json["Response"]["username"], "mod@example.com");
    assert_eq!(json["Response"]["is_moderator"], true);
    assert_eq!(json["Response"]["is_admin"], false);
}

#[tokio::test]
async fn session_required_routes_reject_anonymous_requests() {
    for uri in ["/api/jobs", "/api/teams", "/api/session/anything", "/images/upload"] {
        let res = send(build_app(AppState::fake()), get(uri)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "{uri}");
        let json = body_json(res).await;
        assert_eq!(json["Meta"]["StatusCode"], 403);
        assert!(json.get("Response").is_none());
    }
}

#[tokio::test]
async fn banned_users_are_treated_as_anonymous() {
    let state = AppState::fake();
    let mut user = User::new("banned@example.com");
    user.is_admin = true;
    user.is_banned = true;
    let cookie = login(&state, user).await;

    let res = send(build_app(state), with_cookie(get("/api/jobs"), &cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_routes_require_admin() {
    let state = AppState::fake();
    let mut moderator = User::new("mod@example.com");
    moderator.is_moderator = true;
    let cookie = login(&state, moderator).await;

    let res = send(build_app(state), with_cookie(get("/api/jobs"), &cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_see_every_job() {
    let state = AppState::fake();
    let mut admin = User::new("admin@example.com");
    admin.is_admin = true;
    let cookie = login(&state, admin).await;

    let res = send(build_app(state), with_cookie(get("/api/jobs"), &cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    let names: Vec<&str> = json["Response"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["clean_tag_values", "delete_orphaned_tags", "fix_image_sizes"]
    );
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let state = AppState::fake();
    let mut admin = User::new("admin@example.com");
    admin.is_admin = true;
    let cookie = login(&state, admin).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/job/not_a_job")
        .body(Body::empty())
        .unwrap();
    let res = send(build_app(state), with_cookie(req, &cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_state_values_round_trip() {
    let state = AppState::fake();
    let cookie = login(&state, User::new("someone@example.com")).await;
    let app = build_app(state);

    let res = send(app.clone(), with_cookie(get("/api/session/theme"), &cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/session/theme")
        .body(Body::from("dark"))
        .unwrap();
    let res = send(app.clone(), with_cookie(req, &cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = send(app, with_cookie(get("/api/session/theme"), &cookie)).await;
    let json = body_json(res).await;
    assert_eq!(json["Response"], "dark");
}

#[tokio::test]
async fn logout_without_session_expires_cookie() {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/logout")
        .body(Body::empty())
        .unwrap();
    let res = send(build_app(AppState::fake()), req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("giffy=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn moderators_get_the_upload_form() {
    let state = AppState::fake();
    let mut moderator = User::new("mod@example.com");
    moderator.is_moderator = true;
    let cookie = login(&state, moderator).await;

    let res = send(build_app(state), with_cookie(get("/images/upload"), &cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["fields"], serde_json::json!(["image_url", "image"]));
}

#[tokio::test]
async fn plain_users_cannot_upload_through_the_form() {
    let state = AppState::fake();
    let cookie = login(&state, User::new("someone@example.com")).await;
    let res = send(build_app(state), with_cookie(get("/images/upload"), &cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn oauth_callbacks_need_a_code() {
    for uri in ["/oauth/google", "/oauth/facebook", "/oauth/slack"] {
        let res = send(build_app(AppState::fake()), get(uri)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn unknown_api_paths_are_json_404s() {
    let res = send(build_app(AppState::fake()), get("/api/not.a.route")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let json = body_json(res).await;
    assert_eq!(json["Meta"]["StatusCode"], 404);
}

#[tokio::test]
async fn slack_short_queries_are_refused() {
    let body = "team_id=T1&channel_id=C1&user_id=U1&team_domain=&channel_name=general&user_name=someone&text=do";
    let res = send(build_app(AppState::fake()), form("/integrations/slack", body.into())).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, ERROR_INVALID_QUERY);
}

#[tokio::test]
async fn slack_bad_payloads_are_reported() {
    let res = send(
        build_app(AppState::fake()),
        form("/integrations/slack.action", "payload=not-json".into()),
    )
    .await;
    assert_eq!(body_text(res).await, ERROR_BAD_PAYLOAD);
}

#[tokio::test]
async fn slack_cancel_deletes_the_preview() {
    let payload = r#"{"actions":[{"name":"action","value":"cancel"}],"callback_id":""}"#;
    let res = send(
        build_app(AppState::fake()),
        form("/integrations/slack.action", action_form(payload)),
    )
    .await;
    let json = body_json(res).await;
    assert_eq!(json["delete_original"], true);
}

#[tokio::test]
async fn slack_unknown_actions_are_reported() {
    let payload = r#"{"actions":[{"name":"action","value":"dance"}]}"#;
    let res = send(
        build_app(AppState::fake()),
        form("/integrations/slack.action", action_form(payload)),
    )
    .await;
    assert_eq!(body_text(res).await, ERROR_INVALID_ACTION);
}

#[tokio::test]
async fn slack_shuffle_needs_a_callback_state() {
    let payload = r#"{"actions":[{"name":"action","value":"shuffle"}],"callback_id":"garbage"}"#;
    let res = send(
        build_app(AppState::fake()),
        form("/integrations/slack.action", action_form(payload)),
    )
    .await;
    assert_eq!(body_text(res).await, ERROR_INVALID_CALLBACK_STATE);
}

#[tokio::test]
async fn slack_url_verification_echoes_the_challenge() {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/integrations/slack.event")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"type":"url_verification","challenge":"abc123","token":"t"}"#))
        .unwrap();
    let res = send(build_app(AppState::fake()), req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["challenge"], "abc123");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/integrations/slack.event")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"type":"app_mention"}"#))
        .unwrap();
    let res = send(build_app(AppState::fake()), req).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/integrations/slack.event")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{"))
        .unwrap();
    let res = send(build_app(AppState::fake()), req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn negative_counts_are_bad_requests() {
    for uri in [
        "/api/images/random/-1",
        "/api/tags/random/-3",
        "/api/images.search/random/-1?query=cats",
        "/api/users/pages/-1/0",
        "/api/users/pages/10/-1",
        "/api/moderation.log/pages/-5/0",
    ] {
        let res = send(build_app(AppState::fake()), get(uri)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_json(res).await["Meta"]["StatusCode"], 400, "{uri}");
    }
}

#[tokio::test]
async fn admin_pages_reject_negative_counts() {
    let state = AppState::fake();
    let mut admin = User::new("admin@example.com");
    admin.is_admin = true;
    let cookie = login(&state, admin).await;
    let app = build_app(state);

    for uri in ["/api/search.history/pages/-1/0", "/api/errors/-1/0"] {
        let res = send(app.clone(), with_cookie(get(uri), &cookie)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn invalid_content_ratings_are_rejected_up_front() {
    let state = AppState::fake();
    let mut moderator = User::new("mod@example.com");
    moderator.is_moderator = true;
    let cookie = login(&state, moderator).await;

    let req = json_request(
        Method::PUT,
        "/api/image/0123456789abcdef0123456789abcdef",
        r#"{"display_name":"renamed","content_rating":99}"#,
    );
    let res = send(build_app(state), with_cookie(req, &cookie)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overlong_tags_are_bad_requests() {
    let state = AppState::fake();
    let cookie = login(&state, User::new("someone@example.com")).await;

    let body = serde_json::json!({ "tag_value": "a".repeat(33) }).to_string();
    let res = send(build_app(state), with_cookie(json_request(Method::POST, "/api/tags", &body), &cookie)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json = body_json(res).await;
    assert!(json["Meta"]["Message"].as_str().unwrap().contains("32"));
}
