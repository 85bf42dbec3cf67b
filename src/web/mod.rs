pub mod error;
pub mod forum;
pub mod params;
pub mod post;
pub mod service;
pub mod thread;
pub mod user;

use crate::error::Error;
use actix_web::web;

/// Configures the web app
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut web::ServiceConfig) {
    conf.service(
        web::scope("/api")
            .app_data(
                web::JsonConfig::default()
                    .error_handler(|err, _req| Error::bad_request(err.to_string()).into()),
            )
            .app_data(
                web::PathConfig::default()
                    .error_handler(|err, _req| Error::bad_request(err.to_string()).into()),
            )
            .app_data(
                web::QueryConfig::default()
                    .error_handler(|err, _req| Error::bad_request(err.to_string()).into()),
            )
            .configure(forum::configure)
            .configure(post::configure)
            .configure(service::configure)
            .configure(thread::configure)
            .configure(user::configure),
    );
}
