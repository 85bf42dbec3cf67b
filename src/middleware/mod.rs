// Documentation for middleware can be found here:
// https://github.com/actix/actix-web/blob/master/src/middleware/normalize.rs
mod slow_request;

pub use slow_request::SlowRequest;
