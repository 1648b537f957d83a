use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::models::user::Claims;
use crate::state::AppState;

pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
        .ok()
        .map(|data| data.claims)
}

// Same secret source as the websocket handshake: AppConfig, threaded in via
// from_fn_with_state.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims =
        decode_claims(token, &state.config.jwt_secret).ok_or(StatusCode::UNAUTHORIZED)?;

    // Handlers read the principal from request extensions
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[test]
    fn decode_rejects_tokens_signed_with_another_secret() {
        let claims = Claims {
            sub: ObjectId::new().to_hex(),
            role: "agent".to_string(),
            email: "agent@example.com".to_string(),
            exp: 4_102_444_800,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"configured-secret"),
        )
        .unwrap();

        assert!(decode_claims(&token, "configured-secret").is_some());
        assert!(decode_claims(&token, "some-other-secret").is_none());
    }
}
