//! Canned error responses.
//!
//! # Responsibilities
//! - Render the fixed HTML error pages the proxy answers with
//! - Stamp each page with an RFC 1123 `Date` header
//!
//! # Design Decisions
//! - `Content-Length` is computed from the body, never hand-counted
//! - Pages advertise `Connection: close` because the proxy always closes after replying

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Error pages the proxy can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPage {
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    HttpVersionNotSupported,
}

impl ErrorPage {
    pub fn status(&self) -> u16 {
        match self {
            ErrorPage::BadRequest => 400,
            ErrorPage::Forbidden => 403,
            ErrorPage::NotFound => 404,
            ErrorPage::InternalServerError => 500,
            ErrorPage::NotImplemented => 501,
            ErrorPage::HttpVersionNotSupported => 505,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ErrorPage::BadRequest => "Bad Request",
            ErrorPage::Forbidden => "Forbidden",
            ErrorPage::NotFound => "Not Found",
            ErrorPage::InternalServerError => "Internal Server Error",
            ErrorPage::NotImplemented => "Not Implemented",
            ErrorPage::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// HTML body of the page.
    pub fn body(&self) -> String {
        let title = format!("{} {}", self.status(), self.reason());
        let detail = match self {
            ErrorPage::Forbidden => "<br>Permission Denied",
            _ => "",
        };
        format!(
            "<HTML><HEAD><TITLE>{title}</TITLE></HEAD>\n<BODY><H1>{title}</H1>{detail}\n</BODY></HTML>"
        )
    }

    /// Full HTTP message dated `now`.
    pub fn render(&self, now: DateTime<Utc>) -> Vec<u8> {
        let body = self.body();
        format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\nContent-Type: text/html\r\nDate: {}\r\nServer: Proxy/1.0\r\n\r\n{}",
            self.status(),
            self.reason(),
            body.len(),
            http_date(now),
            body
        )
        .into_bytes()
    }

    /// Write the page, dated now, to `writer`.
    pub async fn send<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.render(Utc::now())).await?;
        writer.flush().await
    }
}

/// Format a timestamp as an RFC 1123 HTTP date.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn content_length(message: &str) -> usize {
        message
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn content_lengths_match_bodies() {
        let expected = [
            (ErrorPage::BadRequest, 95),
            (ErrorPage::Forbidden, 112),
            (ErrorPage::NotFound, 91),
            (ErrorPage::InternalServerError, 115),
            (ErrorPage::NotImplemented, 103),
            (ErrorPage::HttpVersionNotSupported, 125),
        ];
        for (page, length) in expected {
            assert_eq!(page.body().len(), length, "status {}", page.status());

            let message = String::from_utf8(page.render(Utc::now())).unwrap();
            assert_eq!(content_length(&message), length);
            let (_, body) = message.split_once("\r\n\r\n").unwrap();
            assert_eq!(body.len(), length);
        }
    }

    #[test]
    fn renders_status_line_and_headers() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let message = String::from_utf8(ErrorPage::InternalServerError.render(now)).unwrap();

        assert!(message.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(message.contains("\r\nDate: Tue, 05 Mar 2024 07:08:09 GMT\r\n"));
        assert!(message.contains("\r\nConnection: close\r\n"));
        assert!(!message.contains("keep-alive"));
        assert!(message.ends_with("<H1>500 Internal Server Error</H1>\n</BODY></HTML>"));
    }

    #[test]
    fn forbidden_page_has_detail() {
        assert!(ErrorPage::Forbidden.body().contains("<br>Permission Denied\n"));
    }

    #[tokio::test]
    async fn send_writes_full_message() {
        let mut out = Vec::new();
        ErrorPage::NotImplemented.send(&mut out).await.unwrap();
        let message = String::from_utf8(out).unwrap();
        assert!(message.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
        assert_eq!(content_length(&message), 103);
    }
}
