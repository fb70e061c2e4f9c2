use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::model::role::{Role, join_roles};
use crate::models::{Claims, TokenType};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn build_claims(user_id: u64, email: &str, roles: &[Role], ttl: usize, token_type: TokenType) -> Claims {
    Claims {
        user_id,
        sub: email.to_string(),
        roles: join_roles(roles),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
    }
}

pub fn generate_access_token(
    user_id: u64,
    email: &str,
    roles: &[Role],
    secret: &str,
    ttl: usize,
) -> Result<String, Error> {
    let claims = build_claims(user_id, email, roles, ttl, TokenType::Access);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn generate_refresh_token(
    user_id: u64,
    email: &str,
    roles: &[Role],
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = build_claims(user_id, email, roles, ttl, TokenType::Refresh);

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-test-secret-test-secret";

    #[test]
    fn access_token_round_trips_roles() {
        let token =
            generate_access_token(7, "sara@shabra.ir", &[Role::Manager, Role::Employee], SECRET, 60).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "sara@shabra.ir");
        assert_eq!(claims.roles, "MANAGER,EMPLOYEE");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = generate_refresh_token(1, "a@b.ir", &[Role::Admin], SECRET, 60).unwrap();
        assert!(verify_token(&token, "another-secret").is_err());
    }
}
