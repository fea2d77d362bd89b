//! Bearer authentication for HTTP handlers.
//!
//! Keep the HTTP modules focused on request/response mapping by concentrating
//! credential checks and caller identity derivation here.

use actix_web::http::header;
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use crate::domain::{AuthenticatedUser, Error};

use super::state::HttpState;

/// The caller behind the request's `Authorization: Bearer` credential.
#[derive(Debug, Clone)]
pub struct BearerUser(pub AuthenticatedUser);

impl BearerUser {
    pub fn into_inner(self) -> AuthenticatedUser {
        self.0
    }
}

impl std::ops::Deref for BearerUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The credential following `Bearer `, if the header has one.
fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

impl FromRequest for BearerUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = req.app_data::<web::Data<HttpState>>().cloned();
        Box::pin(async move {
            let state =
                state.ok_or_else(|| Error::internal("HTTP state is not registered"))?;
            let token = token.ok_or_else(|| Error::unauthorized("bearer credential required"))?;
            let user = state
                .credentials
                .resolve(&token)
                .await
                .map_err(|error| {
                    warn!(%error, "credential lookup failed");
                    if error.is_transient() {
                        Error::service_unavailable("credential store unavailable")
                    } else {
                        Error::internal("credential lookup failed")
                    }
                })?
                .ok_or_else(|| Error::unauthorized("invalid or expired credential"))?;
            Ok(Self(user))
        })
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::UserRole;
    use crate::inbound::http::test_utils::TestHarness;
    use crate::test_support::user_fixture;
    use actix_web::{App, HttpResponse, test as actix_test};
    use rstest::rstest;

    #[rstest]
    #[case("Bearer abc", Some("abc"))]
    #[case("bearer  abc ", Some("abc"))]
    #[case("Basic abc", None)]
    #[case("Bearer ", None)]
    #[case("Bearer", None)]
    fn bearer_scheme_is_parsed(#[case] header_value: &str, #[case] expected: Option<&str>) {
        let req = actix_test::TestRequest::default()
            .insert_header((header::AUTHORIZATION, header_value))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), expected);
    }

    async fn call(harness: &TestHarness, authorization: Option<&str>) -> actix_web::http::StatusCode {
        let app = actix_test::init_service(App::new().app_data(harness.data()).route(
            "/whoami",
            web::get().to(|user: BearerUser| async move {
                HttpResponse::Ok().body(user.role.as_str())
            }),
        ))
        .await;
        let mut request = actix_test::TestRequest::get().uri("/whoami");
        if let Some(value) = authorization {
            request = request.insert_header((header::AUTHORIZATION, value));
        }
        actix_test::call_service(&app, request.to_request())
            .await
            .status()
    }

    #[actix_web::test]
    async fn known_credentials_resolve_to_the_caller() {
        let harness = TestHarness::new();
        harness
            .credentials
            .grant("token-1", user_fixture(UserRole::Admin));

        assert_eq!(call(&harness, Some("Bearer token-1")).await, 200);
    }

    #[rstest]
    #[case::missing(None)]
    #[case::unknown(Some("Bearer nope"))]
    #[actix_web::test]
    async fn absent_or_unknown_credentials_are_unauthorised(#[case] authorization: Option<&str>) {
        let harness = TestHarness::new();
        assert_eq!(call(&harness, authorization).await, 401);
    }
}
