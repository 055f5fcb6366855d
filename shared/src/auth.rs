//! Cognito identity extraction.
//!
//! API Gateway's Cognito authorizer verifies tokens before a request reaches a
//! Lambda, so handlers only read the claims it forwards.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use lambda_http::{Request, RequestExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// JWT claims from Cognito.
#[derive(Debug, Serialize, Deserialize)]
pub struct CognitoClaims {
    /// Subject (user id)
    pub sub: String,
    pub email: Option<String>,
    #[serde(rename = "cognito:username")]
    pub cognito_username: Option<String>,
    /// Token use (access or id)
    pub token_use: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Decoded user information.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    /// User's Cognito subject, also the primary key of `users`
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl TryFrom<CognitoClaims> for AuthenticatedUser {
    type Error = Error;

    fn try_from(claims: CognitoClaims) -> Result<Self> {
        Ok(Self {
            user_id: parse_sub(&claims.sub)?,
            email: claims.email.or(claims.cognito_username),
        })
    }
}

fn parse_sub(sub: &str) -> Result<Uuid> {
    Uuid::parse_str(sub).map_err(|_| Error::Auth(format!("Invalid sub claim: {}", sub)))
}

/// Decode a bearer token whose signature was already checked by the authorizer.
///
/// Performs no verification of its own; never call it on an unverified token.
pub fn validate_token(token: &str) -> Result<AuthenticatedUser> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token);

    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;

    let key = DecodingKey::from_secret(b"unused");

    let token_data = decode::<CognitoClaims>(token, &key, &validation)
        .map_err(|e| Error::Auth(format!("Failed to decode token: {}", e)))?;

    AuthenticatedUser::try_from(token_data.claims)
}

/// Extract the user from authorizer claims (`requestContext.authorizer.claims`).
pub fn extract_user_from_context(claims: &serde_json::Value) -> Result<AuthenticatedUser> {
    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Auth("Missing sub claim".to_string()))?;

    let email = claims
        .get("email")
        .or_else(|| claims.get("cognito:username"))
        .and_then(|v| v.as_str())
        .map(String::from);

    Ok(AuthenticatedUser {
        user_id: parse_sub(sub)?,
        email,
    })
}

/// Resolve the caller of an API Gateway request from the authorizer claims.
///
/// Requests that did not pass through the Cognito authorizer are rejected; a bare
/// `Authorization` header is not trusted.
pub fn authenticated_user(event: &Request) -> Result<AuthenticatedUser> {
    let claims = event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|authorizer| authorizer.fields.get("claims"))
        .ok_or_else(|| Error::Auth("Authentication required".to_string()))?;

    extract_user_from_context(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_http::aws_lambda_events::apigw::ApiGatewayProxyRequestContext;
    use lambda_http::http::HeaderValue;
    use lambda_http::request::RequestContext;
    use serde_json::json;

    const SUB: &str = "6f1c2a44-91b3-4c52-9d3e-0c1f6a7b8e90";

    #[test]
    fn test_extract_user_from_claims() {
        let claims = json!({ "sub": SUB, "email": "parent@example.com" });
        let user = extract_user_from_context(&claims).unwrap();
        assert_eq!(user.user_id.to_string(), SUB);
        assert_eq!(user.email.as_deref(), Some("parent@example.com"));
    }

    #[test]
    fn test_username_used_when_email_missing() {
        let claims = json!({ "sub": SUB, "cognito:username": "parent1" });
        let user = extract_user_from_context(&claims).unwrap();
        assert_eq!(user.email.as_deref(), Some("parent1"));
    }

    #[test]
    fn test_missing_or_invalid_sub() {
        assert!(matches!(
            extract_user_from_context(&json!({})),
            Err(Error::Auth(_))
        ));
        assert!(matches!(
            extract_user_from_context(&json!({ "sub": "not-a-uuid" })),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn test_claims_conversion() {
        let claims = CognitoClaims {
            sub: SUB.to_string(),
            email: None,
            cognito_username: Some("parent1".to_string()),
            token_use: "id".to_string(),
            iat: 0,
            exp: 0,
            iss: "https://cognito-idp.us-east-1.amazonaws.com/pool-id".to_string(),
        };

        let user = AuthenticatedUser::try_from(claims).unwrap();
        assert_eq!(user.email.as_deref(), Some("parent1"));
    }

    fn request_with_claims(claims: serde_json::Value) -> Request {
        let mut context = ApiGatewayProxyRequestContext::default();
        context.authorizer.fields.insert("claims".to_string(), claims);
        Request::default().with_request_context(RequestContext::ApiGatewayV1(context))
    }

    #[test]
    fn test_request_without_identity_is_rejected() {
        let request = Request::default();
        assert!(matches!(authenticated_user(&request), Err(Error::Auth(_))));
    }

    #[test]
    fn test_unverified_bearer_token_is_rejected() {
        // RS256 header, sub ending in beef, exp=1 and a garbage signature.
        let forged = "Bearer eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.\
            eyJzdWIiOiIwMDAwMDAwMC0wMDAwLTAwMDAtMDAwMC0wMDAwMDAwMGJlZWYiLCJ0b2tlbl91c2UiOiJpZCIsImlhdCI6MCwiZXhwIjoxLCJpc3MiOiJ4In0.\
            c2lnbmF0dXJl";
        let mut request = Request::default();
        request
            .headers_mut()
            .insert("authorization", HeaderValue::from_static(forged));

        assert!(matches!(authenticated_user(&request), Err(Error::Auth(_))));
    }

    #[test]
    fn test_authorizer_claims_identify_caller() {
        let request = request_with_claims(json!({ "sub": SUB, "email": "parent@example.com" }));
        let user = authenticated_user(&request).unwrap();
        assert_eq!(user.user_id.to_string(), SUB);
        assert_eq!(user.email.as_deref(), Some("parent@example.com"));
    }

    #[test]
    fn test_authorizer_without_claims_is_rejected() {
        let request = Request::default().with_request_context(RequestContext::ApiGatewayV1(
            ApiGatewayProxyRequestContext::default(),
        ));
        assert!(matches!(authenticated_user(&request), Err(Error::Auth(_))));

        let request = request_with_claims(json!({ "sub": "not-a-uuid" }));
        assert!(matches!(authenticated_user(&request), Err(Error::Auth(_))));
    }
}
