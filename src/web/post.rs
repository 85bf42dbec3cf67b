use super::params::RelatedParams;
use crate::error::Error;
use crate::models::PostPatch;
use crate::service::ForumService;
use actix_web::{get, post, web, HttpResponse};

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_post).service(update_post);
}

#[get("/post/{id}/details")]
pub async fn view_post(
    service: web::Data<ForumService>,
    id: web::Path<i64>,
    params: web::Query<RelatedParams>,
) -> Result<HttpResponse, Error> {
    let details = service.get_post(id.into_inner(), params.related()).await?;
    Ok(HttpResponse::Ok().json(details))
}

#[post("/post/{id}/details")]
pub async fn update_post(
    service: web::Data<ForumService>,
    id: web::Path<i64>,
    form: web::Json<PostPatch>,
) -> Result<HttpResponse, Error> {
    let post = service.patch_post(id.into_inner(), form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}
