use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        log::error!("query failed: {e}");
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

/// Maps a storage error to a specific code and tags the table involved.
pub trait DbResultExt<T> {
    fn db_ctx(self, code: &'static str, table: &str) -> Result<T, HandlerErr>;
}

impl<T> DbResultExt<T> for rusqlite::Result<T> {
    fn db_ctx(self, code: &'static str, table: &str) -> Result<T, HandlerErr> {
        self.map_err(|e| {
            log::error!("{code} on {table}: {e}");
            if is_unique_violation(&e) {
                return HandlerErr::new("conflict", e.to_string())
                    .with_details(json!({ "table": table }));
            }
            HandlerErr::new(code, e.to_string()).with_details(json!({ "table": table }))
        })
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
