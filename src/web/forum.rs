use super::params::ListParams;
use crate::error::Error;
use crate::models::{non_empty, NewForum, NewThread};
use crate::service::ForumService;
use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(create_forum)
        .service(view_forum)
        .service(create_thread)
        .service(view_threads)
        .service(view_users);
}

#[post("/forum/create")]
pub async fn create_forum(
    service: web::Data<ForumService>,
    form: web::Json<NewForum>,
) -> Result<HttpResponse, Error> {
    let registration = service.create_forum(form.into_inner()).await?;
    Ok(if registration.created {
        HttpResponse::Created().json(registration.entity)
    } else {
        HttpResponse::Conflict().json(registration.entity)
    })
}

#[get("/forum/{slug}/details")]
pub async fn view_forum(
    service: web::Data<ForumService>,
    slug: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let forum = service.get_forum(&slug).await?;
    Ok(HttpResponse::Ok().json(forum))
}

#[derive(Deserialize)]
pub struct NewThreadFormData {
    #[serde(default)]
    pub slug: Option<String>,
    pub author: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// The forum comes from the route; a `forum` field in the body is ignored.
#[post("/forum/{slug}/create")]
pub async fn create_thread(
    service: web::Data<ForumService>,
    slug: web::Path<String>,
    form: web::Json<NewThreadFormData>,
) -> Result<HttpResponse, Error> {
    let form = form.into_inner();
    let thread = NewThread {
        forum: slug.into_inner(),
        slug: non_empty(form.slug),
        author: form.author,
        title: form.title,
        message: form.message,
        created: form.created,
    };

    let registration = service.create_thread(thread).await?;
    Ok(if registration.created {
        HttpResponse::Created().json(registration.entity)
    } else {
        HttpResponse::Conflict().json(registration.entity)
    })
}

#[get("/forum/{slug}/threads")]
pub async fn view_threads(
    service: web::Data<ForumService>,
    slug: web::Path<String>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, Error> {
    let threads = service.list_forum_threads(&slug, params.threads()?).await?;
    Ok(HttpResponse::Ok().json(threads))
}

#[get("/forum/{slug}/users")]
pub async fn view_users(
    service: web::Data<ForumService>,
    slug: web::Path<String>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, Error> {
    let users = service.list_forum_users(&slug, params.users()?).await?;
    Ok(HttpResponse::Ok().json(users))
}
