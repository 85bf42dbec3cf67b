use crate::error::Error;
use crate::models::{NewUser, UserPatch};
use crate::registrar::UserRegistration;
use crate::service::ForumService;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(create_user)
        .service(view_profile)
        .service(update_profile);
}

#[derive(Deserialize)]
pub struct NewUserFormData {
    pub fullname: String,
    pub email: String,
    #[serde(default)]
    pub about: String,
}

#[post("/user/{nickname}/create")]
pub async fn create_user(
    service: web::Data<ForumService>,
    nickname: web::Path<String>,
    form: web::Json<NewUserFormData>,
) -> Result<HttpResponse, Error> {
    let form = form.into_inner();
    let user = NewUser {
        nickname: nickname.into_inner(),
        fullname: form.fullname,
        email: form.email,
        about: form.about,
    };

    Ok(match service.create_user(user).await? {
        UserRegistration::Created(user) => HttpResponse::Created().json(user),
        UserRegistration::Taken(users) => HttpResponse::Conflict().json(users),
    })
}

#[get("/user/{nickname}/profile")]
pub async fn view_profile(
    service: web::Data<ForumService>,
    nickname: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let user = service.get_user(&nickname).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[post("/user/{nickname}/profile")]
pub async fn update_profile(
    service: web::Data<ForumService>,
    nickname: web::Path<String>,
    form: web::Json<UserPatch>,
) -> Result<HttpResponse, Error> {
    let user = service.patch_user(&nickname, form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}
