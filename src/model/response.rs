use crate::model::{Body, HeaderMap, StatusCode, Version};

/// A HTTP response.
///
/// Its head is fully parsed when it is returned, its body is read lazily from the connection.
///
/// ```
/// use oxchange::model::{Body, Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK).with_body("{\"foo\": \"bar\"}");
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.reason(), "OK");
/// assert_eq!(&response.into_body().to_vec()?, b"{\"foo\": \"bar\"}");
/// # Result::<_,Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug)]
pub struct Response<'a> {
    version: Version,
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
    body: Body<'a>,
}

impl<'a> Response<'a> {
    /// Builds a response with the canonical reason phrase of the status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::HTTP_11,
            status,
            reason: status.canonical_reason().unwrap_or_default().into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub(crate) fn from_parts(
        version: Version,
        status: StatusCode,
        reason: String,
        headers: HeaderMap,
        body: Body<'a>,
    ) -> Self {
        Self {
            version,
            status,
            reason,
            headers,
            body,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase as sent by the server.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body<'a> {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body<'a> {
        &mut self.body
    }

    pub fn with_body(mut self, body: impl Into<Body<'a>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn into_body(self) -> Body<'a> {
        self.body
    }

    pub(crate) fn map_body<'b>(self, f: impl FnOnce(Body<'a>) -> Body<'b>) -> Response<'b> {
        Response {
            version: self.version,
            status: self.status,
            reason: self.reason,
            headers: self.headers,
            body: f(self.body),
        }
    }
}
