//! Caller identity from request headers.
//!
//! Token validation happens at the edge; this service trusts the resolved
//! identity headers it receives.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use ofistur_common::{AgencyId, AuthContext, LedgerError, Role, UserId};

use crate::error::ApiError;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const AGENCY_HEADER: &str = "x-agency-id";
pub const ROLE_HEADER: &str = "x-role";

/// Authenticated caller extracted from `x-actor-id`, `x-agency-id` and `x-role`.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub AuthContext);

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, LedgerError> {
        let actor_id = UserId(parse_id(headers, ACTOR_HEADER)?);
        let agency_id = AgencyId(parse_id(headers, AGENCY_HEADER)?);
        let role: Role = header(headers, ROLE_HEADER)?.parse()?;
        Ok(Caller(AuthContext::new(actor_id, agency_id, role)))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, LedgerError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LedgerError::Unauthenticated(format!("missing {} header", name)))
}

fn parse_id(headers: &HeaderMap, name: &str) -> Result<i64, LedgerError> {
    let raw = header(headers, name)?;
    raw.parse()
        .map_err(|_| LedgerError::Unauthenticated(format!("invalid {} header '{}'", name, raw)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_valid_headers() {
        let caller = Caller::from_headers(&headers(&[
            (ACTOR_HEADER, "7"),
            (AGENCY_HEADER, "3"),
            (ROLE_HEADER, "gerente"),
        ]))
        .unwrap();
        assert_eq!(caller.0, AuthContext::new(UserId(7), AgencyId(3), Role::Manager));
    }

    #[test]
    fn test_missing_or_invalid_headers() {
        let cases = [
            headers(&[(AGENCY_HEADER, "3"), (ROLE_HEADER, "gerente")]),
            headers(&[(ACTOR_HEADER, "x"), (AGENCY_HEADER, "3"), (ROLE_HEADER, "gerente")]),
            headers(&[(ACTOR_HEADER, "7"), (AGENCY_HEADER, "3"), (ROLE_HEADER, "root")]),
        ];
        for map in cases {
            let err = Caller::from_headers(&map).unwrap_err();
            assert_eq!(err.error_code(), "UNAUTHENTICATED");
        }
    }
}
