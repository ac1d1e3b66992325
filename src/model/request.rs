use crate::model::{Body, HeaderMap, Method};

/// A HTTP request to be sent on a [`Connection`](crate::Connection).
///
/// The target is kept in [origin form](https://httpwg.org/specs/rfc9112.html#origin-form) (a path and an optional query):
/// the host is given by the connection.
///
/// ```
/// use oxchange::model::header::CONTENT_TYPE;
/// use oxchange::model::{HeaderValue, Method, Request};
///
/// let mut request = Request::new(Method::POST, "/foo");
/// request.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
/// request.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
/// let request = request.with_body("{\"foo\": \"bar\"}");
///
/// assert_eq!(*request.method(), Method::POST);
/// assert_eq!(request.target(), "/foo");
/// assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
/// assert_eq!(&request.into_body().to_vec()?, b"{\"foo\": \"bar\"}");
/// # Result::<_,Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug)]
pub struct Request<'a> {
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Body<'a>,
}

impl<'a> Request<'a> {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Use [`HeaderMap::insert`] to get the "last value wins" behavior.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body<'a> {
        &self.body
    }

    pub fn with_body(mut self, body: impl Into<Body<'a>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn into_body(self) -> Body<'a> {
        self.body
    }

    pub(crate) fn into_parts(self) -> (Method, String, HeaderMap, Body<'a>) {
        (self.method, self.target, self.headers, self.body)
    }
}
