use std::net::SocketAddr;

use chrono::Utc;
use cookie::Cookie;
use diesel::prelude::*;
use http::header::{HeaderMap, COOKIE};

use crate::models::{format_db_datetime, User};
use crate::permissions::UserPermissions;
use crate::schema::{auth_session, auth_user};

#[derive(Clone, Debug)]
pub enum RequestUser {
    Anonymous,
    Authenticated(User),
}

impl RequestUser {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, RequestUser::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            RequestUser::Anonymous => None,
            RequestUser::Authenticated(user) => Some(user),
        }
    }

    pub fn is_staff(&self) -> bool {
        self.user().map_or(false, |u| u.is_active && u.is_staff)
    }
}

/// Per-request identity. Built once per request and passed down explicitly.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub user: RequestUser,
    pub permissions: UserPermissions,
    pub ip_address: String,
}

impl RequestContext {
    pub fn anonymous(ip_address: &str) -> Self {
        Self {
            user: RequestUser::Anonymous,
            permissions: UserPermissions::anonymous(),
            ip_address: ip_address.to_string(),
        }
    }

    pub fn for_user(conn: &mut SqliteConnection, user: User, ip_address: &str) -> QueryResult<Self> {
        let permissions = UserPermissions::load(conn, &user)?;
        Ok(Self {
            user: RequestUser::Authenticated(user),
            permissions,
            ip_address: ip_address.to_string(),
        })
    }

    pub fn load(
        conn: &mut SqliteConnection,
        headers: &HeaderMap,
        remote: Option<SocketAddr>,
    ) -> QueryResult<Self> {
        let ip_address = client_ip(headers, remote);
        match session_key(headers) {
            Some(key) => match session_user(conn, &key)? {
                Some(user) => Self::for_user(conn, user, &ip_address),
                None => Ok(Self::anonymous(&ip_address)),
            },
            None => Ok(Self::anonymous(&ip_address)),
        }
    }
}

fn session_user(conn: &mut SqliteConnection, key: &str) -> QueryResult<Option<User>> {
    let now = format_db_datetime(&Utc::now().naive_utc());
    auth_session::table
        .inner_join(auth_user::table)
        .filter(auth_session::session_key.eq(key))
        .filter(auth_session::expire_date.gt(now))
        .filter(auth_user::is_active.eq(true))
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn session_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == crate::SESSION_COOKIE)
        .map(|cookie| cookie.value_trimmed().to_string())
        .filter(|value| !value.is_empty())
}

/// The first address listed in `X-Forwarded-For`, falling back to the peer address.
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| crate::UNKNOWN_IP_ADDRESS.to_string())
}
