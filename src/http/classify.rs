//! Request classification into rate limit buckets.

use axum::http::Method;

/// Map a request to the bucket it is counted against.
///
/// Anything not listed here is general API traffic.
pub fn classify(method: &Method, path: &str) -> &'static str {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    match (method, segments.as_slice()) {
        (_, ["api", "admin", "seed", ..]) => "admin.seed",
        (&Method::POST, ["api", "auth", action, ..]) => match *action {
            "signin" | "login" | "callback" => "auth.login",
            "register" | "signup" => "auth.register",
            "forgot-password" | "reset-password" => "auth.password",
            _ => "api.general",
        },
        (&Method::POST, ["api", "worlds", _, "invites"]) => "invites.create",
        (&Method::POST, ["api", "ai", _, ..]) => "ai.generate",
        (&Method::POST, ["api", upload, ..]) if upload.starts_with("upload") => "uploads.create",
        _ => "api.general",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_routes() {
        assert_eq!(classify(&Method::POST, "/api/auth/signin"), "auth.login");
        assert_eq!(classify(&Method::POST, "/api/auth/callback/credentials"), "auth.login");
        assert_eq!(classify(&Method::POST, "/api/auth/register"), "auth.register");
        assert_eq!(classify(&Method::POST, "/api/auth/reset-password"), "auth.password");
        // Session polling is ordinary traffic
        assert_eq!(classify(&Method::GET, "/api/auth/session"), "api.general");
        assert_eq!(classify(&Method::POST, "/api/auth/signout"), "api.general");
    }

    #[test]
    fn test_invite_creation() {
        assert_eq!(classify(&Method::POST, "/api/worlds/w_123/invites"), "invites.create");
        assert_eq!(classify(&Method::POST, "/api/worlds/w_123/invites/"), "invites.create");
        assert_eq!(classify(&Method::GET, "/api/worlds/w_123/invites"), "api.general");
        assert_eq!(classify(&Method::DELETE, "/api/worlds/w_123/invites/abc"), "api.general");
    }

    #[test]
    fn test_admin_seed_any_method() {
        assert_eq!(classify(&Method::POST, "/api/admin/seed"), "admin.seed");
        assert_eq!(classify(&Method::GET, "/api/admin/seed/templates"), "admin.seed");
        assert_eq!(classify(&Method::GET, "/api/admin/users"), "api.general");
    }

    #[test]
    fn test_generation_and_uploads() {
        assert_eq!(classify(&Method::POST, "/api/ai/generate-entity"), "ai.generate");
        assert_eq!(classify(&Method::POST, "/api/ai/images"), "ai.generate");
        assert_eq!(classify(&Method::POST, "/api/upload"), "uploads.create");
        assert_eq!(classify(&Method::POST, "/api/uploads/avatar"), "uploads.create");
    }

    #[test]
    fn test_fallback() {
        assert_eq!(classify(&Method::GET, "/api/worlds"), "api.general");
        assert_eq!(classify(&Method::PUT, "/api/worlds/w_1/entities/e_2"), "api.general");
        assert_eq!(classify(&Method::GET, "/"), "api.general");
    }
}
