use reqwest::StatusCode;

/// The number of characters of a response body kept in [`Error::Status`].
pub const BODY_EXCERPT_LEN: usize = 100;

/// Errors that can happen within the cms-client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the underlying [`reqwest`] client.
    ///
    /// This covers connection failures, timeouts and malformed response bodies.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// The CMS answered with a status code that is not considered a success.
    #[error("request failed with status {status}: {body}")]
    Status {
        /// The status code returned by the CMS.
        status: StatusCode,
        /// The beginning of the response body, truncated to [`BODY_EXCERPT_LEN`] characters.
        body: String,
    },
    /// The upload endpoint succeeded but did not return any file.
    #[error("upload response did not contain any file")]
    EmptyUpload,
    /// The login endpoint succeeded but returned an empty token.
    #[error("login response did not contain a token")]
    EmptyToken,
    /// Error when URL manipulation fails.
    #[error("{message}")]
    InvalidUrl {
        /// The URL error message.
        message: String,
    },
}

impl Error {
    /// Returns `true` if the request never produced an HTTP response.
    ///
    /// Such errors are network-level failures (refused connections, resets, timeouts), as
    /// opposed to the CMS rejecting the request.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Reqwest(err) => !err.is_decode() && err.status().is_none(),
            _ => false,
        }
    }

    /// Returns the HTTP status code if the CMS rejected the request.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Reqwest(err) => err.status(),
            _ => None,
        }
    }
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Cuts `body` down to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_owned(),
    }
}

/// Turns non-success responses into [`Error::Status`], keeping an excerpt of the body.
///
/// The CMS answers most creations with `201 Created`, some with `200 OK`. Both count as
/// success here.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::OK || status == StatusCode::CREATED {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Status {
        status,
        body: truncate_body(&body, BODY_EXCERPT_LEN),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_short_bodies() {
        assert_eq!(truncate_body("nope", 100), "nope");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        let body = "病".repeat(150);
        let truncated = truncate_body(&body, 100);

        assert_eq!(truncated.chars().count(), 103);
        assert!(truncated.ends_with("..."));
    }
}
