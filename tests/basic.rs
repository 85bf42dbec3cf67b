use actix_web::http::StatusCode;
use actix_web::middleware::ErrorHandlers;
use actix_web::web::Data;
use actix_web::{test, App};
use forumdb::store::MemoryRepository;
use forumdb::ForumService;
use serde_json::{json, Value};
use std::sync::Arc;

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(Data::new(ForumService::new(Arc::new(
                    MemoryRepository::new(),
                ))))
                .wrap(
                    ErrorHandlers::new()
                        .handler(StatusCode::NOT_FOUND, forumdb::web::error::render_404),
                )
                .configure(forumdb::web::configure),
        )
        .await
    };
}

macro_rules! post_json {
    ($app:expr, $uri:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri($uri)
            .set_json($body)
            .to_request();
        let resp = test::call_service(&$app, req).await;
        let status = resp.status();
        let body: Value = if status == StatusCode::OK && resp.headers().get("content-type").is_none() {
            Value::Null
        } else {
            test::read_body_json(resp).await
        };
        (status, body)
    }};
}

macro_rules! get_json {
    ($app:expr, $uri:expr) => {{
        let req = test::TestRequest::get().uri($uri).to_request();
        let resp = test::call_service(&$app, req).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

fn user(email: &str) -> Value {
    json!({ "fullname": "Captain Jack", "email": email, "about": "Pirate" })
}

fn ids(body: &Value) -> Vec<i64> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|post| post["id"].as_i64().unwrap())
        .collect()
}

#[actix_rt::test]
async fn test_user_registration_and_profile() {
    let app = app!();

    let (status, body) = post_json!(app, "/api/user/jack/create", user("jack@sea.com"));
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["nickname"], "jack");

    let (status, body) = post_json!(app, "/api/user/JACK/create", user("other@sea.com"));
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["nickname"], "jack");

    let (status, body) = get_json!(app, "/api/user/Jack/profile");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "jack@sea.com");

    let (status, body) = post_json!(app, "/api/user/jack/profile", json!({ "about": "Captain" }));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["about"], "Captain");
    assert_eq!(body["fullname"], "Captain Jack");

    let (status, body) = get_json!(app, "/api/user/nobody/profile");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("nobody"));
}

#[actix_rt::test]
async fn test_forum_conflict_returns_existing() {
    let app = app!();
    post_json!(app, "/api/user/jack/create", user("jack@sea.com"));
    post_json!(app, "/api/user/will/create", user("will@sea.com"));

    let forum = json!({ "slug": "pirates", "title": "Pirates", "user": "JACK" });
    let (status, body) = post_json!(app, "/api/forum/create", forum);
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"], "jack");

    let forum = json!({ "slug": "PIRATES", "title": "Other", "user": "will" });
    let (status, body) = post_json!(app, "/api/forum/create", forum);
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["slug"], "pirates");
    assert_eq!(body["title"], "Pirates");
    assert_eq!(body["user"], "jack");

    let forum = json!({ "slug": "ghosts", "title": "Ghosts", "user": "davy" });
    let (status, _) = post_json!(app, "/api/forum/create", forum);
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_thread_posts_and_votes() {
    let app = app!();
    post_json!(app, "/api/user/jack/create", user("jack@sea.com"));
    post_json!(
        app,
        "/api/forum/create",
        json!({ "slug": "pirates", "title": "Pirates", "user": "jack" })
    );

    let thread = json!({
        "slug": "treasure",
        "author": "jack",
        "title": "Treasure",
        "message": "Where is it?",
        "created": "2017-01-01T00:00:00.000Z"
    });
    let (status, body) = post_json!(app, "/api/forum/pirates/create", thread.clone());
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["forum"], "pirates");
    let thread_id = body["id"].as_i64().unwrap();

    let (status, body) = post_json!(app, "/api/forum/pirates/create", thread);
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["id"], thread_id);

    // No posts yet: an empty page, unlike an unknown thread.
    let (status, body) = get_json!(app, "/api/thread/treasure/posts");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    let (status, _) = get_json!(app, "/api/thread/nowhere/posts");
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, a) = post_json!(
        app,
        "/api/thread/treasure/create",
        json!([{ "author": "jack", "message": "A" }])
    );
    assert_eq!(status, StatusCode::CREATED);
    let a = a[0]["id"].as_i64().unwrap();
    let uri = format!("/api/thread/{}/create", thread_id);
    let (status, rest) = post_json!(
        app,
        &uri,
        json!([
            { "author": "jack", "message": "B", "parent": a },
            { "author": "jack", "message": "C" }
        ])
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rest[0]["created"], rest[1]["created"]);
    let (b, c) = (rest[0]["id"].as_i64().unwrap(), rest[1]["id"].as_i64().unwrap());

    let (_, body) = get_json!(app, "/api/thread/treasure/posts?sort=flat");
    assert_eq!(ids(&body), vec![a, b, c]);
    let (_, body) = get_json!(app, "/api/thread/treasure/posts?sort=tree");
    assert_eq!(ids(&body), vec![a, b, c]);
    let (_, body) = get_json!(app, "/api/thread/treasure/posts?sort=flat&desc=true");
    assert_eq!(ids(&body), vec![c, b, a]);
    let (_, body) = get_json!(app, "/api/thread/treasure/posts?sort=parent_tree&limit=1");
    assert_eq!(ids(&body), vec![a, b]);

    let uri = format!("/api/post/{}/details?related=user,thread,forum", b);
    let (status, body) = get_json!(app, &uri);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["parent"], a);
    assert_eq!(body["post"]["isEdited"], false);
    assert_eq!(body["author"]["nickname"], "jack");
    assert_eq!(body["thread"]["id"], thread_id);
    assert_eq!(body["forum"]["posts"], 3);

    let uri = format!("/api/post/{}/details", b);
    let (status, body) = post_json!(app, &uri, json!({ "message": "B edited" }));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isEdited"], true);

    let vote = |voice: i32| json!({ "nickname": "JACK", "voice": voice });
    let (status, body) = post_json!(app, "/api/thread/treasure/vote", vote(1));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["votes"], 1);
    let (_, body) = post_json!(app, "/api/thread/treasure/vote", vote(-1));
    assert_eq!(body["votes"], -1);

    let (status, body) = get_json!(app, "/api/forum/pirates/users");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["nickname"], "jack");

    let (_, body) = get_json!(app, "/api/forum/pirates/threads?since=2017-01-01T00:00:00Z");
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_cross_thread_parent_is_conflict() {
    let app = app!();
    post_json!(app, "/api/user/jack/create", user("jack@sea.com"));
    post_json!(
        app,
        "/api/forum/create",
        json!({ "slug": "pirates", "title": "Pirates", "user": "jack" })
    );
    let new_thread = json!({ "author": "jack", "title": "T", "message": "M" });
    let (_, first) = post_json!(app, "/api/forum/pirates/create", new_thread.clone());
    let (_, second) = post_json!(app, "/api/forum/pirates/create", new_thread);

    let uri = format!("/api/thread/{}/create", second["id"]);
    let (_, other) = post_json!(app, &uri, json!([{ "author": "jack", "message": "x" }]));

    let uri = format!("/api/thread/{}/create", first["id"]);
    let (status, body) = post_json!(
        app,
        &uri,
        json!([
            { "author": "jack", "message": "ok" },
            { "author": "jack", "message": "bad", "parent": other[0]["id"] }
        ])
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].is_string());

    let uri = format!("/api/thread/{}/posts", first["id"]);
    let (_, body) = get_json!(app, &uri);
    assert_eq!(body, json!([]));
}

#[actix_rt::test]
async fn test_bad_requests() {
    let app = app!();
    post_json!(app, "/api/user/jack/create", user("jack@sea.com"));
    post_json!(
        app,
        "/api/forum/create",
        json!({ "slug": "pirates", "title": "Pirates", "user": "jack" })
    );
    post_json!(
        app,
        "/api/forum/pirates/create",
        json!({ "slug": "t", "author": "jack", "title": "T", "message": "M" })
    );

    let (status, _) = post_json!(app, "/api/thread/t/vote", json!({ "nickname": "jack", "voice": 0 }));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json!(app, "/api/thread/t/posts?limit=-1");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json!(app, "/api/forum/pirates/threads?desc=maybe");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json!(app, "/api/post/abc/details");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get_json!(app, "/api/nothing/here");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].is_string());
}

#[actix_rt::test]
async fn test_status_and_clear() {
    let app = app!();
    post_json!(app, "/api/user/jack/create", user("jack@sea.com"));

    let (status, body) = get_json!(app, "/api/service/status");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "user": 1, "forum": 0, "thread": 0, "post": 0 }));

    let (status, _) = post_json!(app, "/api/service/clear", json!({}));
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get_json!(app, "/api/service/status");
    assert_eq!(body["user"], 0);
}
