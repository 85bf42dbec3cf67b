use crate::error::Error;
use crate::service::ForumService;
use actix_web::{get, post, web, HttpResponse};

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_status).service(clear);
}

#[get("/service/status")]
pub async fn view_status(service: web::Data<ForumService>) -> Result<HttpResponse, Error> {
    let status = service.status().await?;
    Ok(HttpResponse::Ok().json(status))
}

#[post("/service/clear")]
pub async fn clear(service: web::Data<ForumService>) -> Result<HttpResponse, Error> {
    service.clear().await?;
    Ok(HttpResponse::Ok().finish())
}
