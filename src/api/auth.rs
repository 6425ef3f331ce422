// Optional bearer-token gate for the populate endpoints

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::api::models::ApiResponse;

const OPEN_PATHS: &[&str] = &["/", "/health"];

/// Requires `Authorization: Bearer <secret>` when a secret is configured.
/// Without one every request passes, matching an unauthenticated CMS route.
#[derive(Clone)]
pub struct Auth {
    secret: Option<Rc<str>>,
}

impl Auth {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Rc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Auth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        }))
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Option<Rc<str>>,
}

impl<S> AuthMiddleware<S> {
    fn allows(&self, req: &ServiceRequest) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        if OPEN_PATHS.contains(&req.path()) {
            return true;
        }
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .is_some_and(|token| token == &**secret)
    }
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.allows(&req) {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        tracing::warn!(path = %req.path(), "rejected request without valid bearer token");
        Box::pin(async move {
            let response = HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error(
                    "Invalid or missing authentication token",
                ))
                .map_into_right_body();
            Ok(req.into_response(response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App};

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    macro_rules! app {
        ($secret:expr) => {
            test::init_service(
                App::new()
                    .wrap(Auth::new($secret))
                    .route("/health", web::get().to(ok))
                    .route("/api/games/populate", web::get().to(ok)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn no_secret_lets_everything_through() {
        let app = app!(None);
        let req = test::TestRequest::get().uri("/api/games/populate").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn secret_is_enforced_except_on_health() {
        let app = app!(Some("s3cret".to_string()));

        let req = test::TestRequest::get().uri("/api/games/populate").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/games/populate")
            .insert_header((header::AUTHORIZATION, "Bearer wrong"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/games/populate")
            .insert_header((header::AUTHORIZATION, "Bearer s3cret"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn empty_secret_means_disabled() {
        assert!(Auth::new(Some(String::new())).secret.is_none());

        let app = app!(Some(String::new()));
        let req = test::TestRequest::get().uri("/api/games/populate").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
