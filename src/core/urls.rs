#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health
    pub const HEALTH: &'static str = "/health";
    pub const API_HEALTH: &'static str = "/api/health";

    // Auth - JSON APIs
    pub const AUTH_LOGIN: &'static str = "/api/auth/login";
    pub const AUTH_REGISTER: &'static str = "/api/auth/register";
    pub const AUTH_LOGOUT: &'static str = "/api/auth/logout";
    pub const AUTH_ME: &'static str = "/api/auth/me";

    // Page navigation
    pub const NAVIGATION: &'static str = "/api/navigation";

    // Tickets - JSON APIs
    pub const TICKETS: &'static str = "/api/tickets";
    pub const TICKET_STATS: &'static str = "/api/tickets/stats";
    pub const TICKET_BY_ID: &'static str = "/api/tickets/:id";
    pub const TICKET_ASSIGN: &'static str = "/api/tickets/:id/assign";
    pub const TICKET_STATUS: &'static str = "/api/tickets/:id/status";
    pub const TICKET_REOPEN: &'static str = "/api/tickets/:id/reopen";

    // Notifications - JSON APIs
    pub const NOTIFICATIONS: &'static str = "/api/notifications";
    pub const NOTIFICATIONS_READ_ALL: &'static str = "/api/notifications/read-all";
    pub const NOTIFICATION_READ: &'static str = "/api/notifications/:id/read";
    pub const NOTIFICATION_BY_ID: &'static str = "/api/notifications/:id";

    // User management - JSON APIs (admin)
    pub const USERS: &'static str = "/api/users";
    pub const USER_BY_ID: &'static str = "/api/users/:id";
}

impl ApiUrls {
    pub fn with_params(url: &str, params: &[(&str, &str)]) -> String {
        let mut result = url.to_string();
        for (key, value) in params {
            result = result.replace(&format!(":{key}"), value);
        }
        result
    }

    pub fn with_query(url: &str, params: &[(&str, &str)]) -> String {
        if params.is_empty() {
            return url.to_string();
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{url}?{query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_params() {
        assert_eq!(
            ApiUrls::with_params(ApiUrls::TICKET_ASSIGN, &[("id", "abc")]),
            "/api/tickets/abc/assign"
        );
    }

    #[test]
    fn test_with_query() {
        assert_eq!(
            ApiUrls::with_query(ApiUrls::NAVIGATION, &[("path", "/tickets/1"), ("width", "390")]),
            "/api/navigation?path=%2Ftickets%2F1&width=390"
        );
        assert_eq!(ApiUrls::with_query(ApiUrls::USERS, &[]), "/api/users");
    }
}
