use http::StatusCode;

#[derive(Debug)]
pub struct DBError {
    not_found: bool,
}

impl DBError {
    pub fn new() -> Self {
        DBError { not_found: false }
    }

    pub fn not_found() -> Self {
        DBError { not_found: true }
    }

    pub fn is_not_found(&self) -> bool {
        self.not_found
    }
}

impl Default for DBError {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DBError> for StatusCode {
    fn from(e: DBError) -> Self {
        if e.not_found {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug)]
pub struct TemplateError;

impl From<TemplateError> for StatusCode {
    fn from(_: TemplateError) -> Self {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Debug)]
pub struct NotAuthorized;

impl From<NotAuthorized> for StatusCode {
    fn from(_: NotAuthorized) -> Self {
        StatusCode::FORBIDDEN
    }
}

/// Missing objects, malformed path segments and disallowed replies all look the same to the client.
#[derive(Debug)]
pub struct NotFound;

impl From<NotFound> for StatusCode {
    fn from(_: NotFound) -> Self {
        StatusCode::NOT_FOUND
    }
}
