use super::params::ListParams;
use crate::error::Error;
use crate::models::{NewPost, ThreadKey, ThreadPatch, Voice};
use crate::service::ForumService;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(create_posts)
        .service(view_thread)
        .service(update_thread)
        .service(view_posts)
        .service(vote);
}

#[post("/thread/{slug_or_id}/create")]
pub async fn create_posts(
    service: web::Data<ForumService>,
    key: web::Path<String>,
    form: web::Json<Vec<NewPost>>,
) -> Result<HttpResponse, Error> {
    let posts = service
        .create_posts(&ThreadKey::parse(&key), form.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(posts))
}

#[get("/thread/{slug_or_id}/details")]
pub async fn view_thread(
    service: web::Data<ForumService>,
    key: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let thread = service.get_thread(&ThreadKey::parse(&key)).await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[post("/thread/{slug_or_id}/details")]
pub async fn update_thread(
    service: web::Data<ForumService>,
    key: web::Path<String>,
    form: web::Json<ThreadPatch>,
) -> Result<HttpResponse, Error> {
    let thread = service
        .patch_thread(&ThreadKey::parse(&key), form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[get("/thread/{slug_or_id}/posts")]
pub async fn view_posts(
    service: web::Data<ForumService>,
    key: web::Path<String>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, Error> {
    let posts = service
        .list_posts(&ThreadKey::parse(&key), &params.posts()?)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[derive(Deserialize)]
pub struct VoteFormData {
    pub nickname: String,
    pub voice: i32,
}

#[post("/thread/{slug_or_id}/vote")]
pub async fn vote(
    service: web::Data<ForumService>,
    key: web::Path<String>,
    form: web::Json<VoteFormData>,
) -> Result<HttpResponse, Error> {
    let voice = Voice::try_from(form.voice)?;
    let thread = service
        .vote(&ThreadKey::parse(&key), &form.nickname, voice)
        .await?;
    Ok(HttpResponse::Ok().json(thread))
}
