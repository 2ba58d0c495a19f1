use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::models::{Claims, TokenType};

/// Decodes an access token. Refresh tokens are rejected.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("refresh tokens cannot be used for API calls".to_string());
    }
    Ok(claims)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    use crate::models::{Claims, TokenType};

    pub const SECRET: &str = "test-secret";

    pub fn token(role: u8, organization_id: u64, employee_id: Option<u64>, token_type: TokenType) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize;
        let claims = Claims {
            user_id: 42,
            sub: "payroll.officer".into(),
            role,
            organization_id,
            exp: now + 600,
            jti: Uuid::new_v4().to_string(),
            token_type,
            employee_id,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{SECRET, token};
    use super::*;

    #[test]
    fn accepts_access_tokens_only() {
        let claims = verify_token(&token(4, 7, None, TokenType::Access), SECRET).unwrap();
        assert_eq!(claims.organization_id, 7);
        assert_eq!(claims.role, 4);

        assert!(verify_token(&token(4, 7, None, TokenType::Refresh), SECRET).is_err());
        assert!(verify_token(&token(4, 7, None, TokenType::Access), "other-secret").is_err());
    }
}
