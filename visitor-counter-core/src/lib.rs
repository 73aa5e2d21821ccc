use {
    serde::{Serialize, Deserialize},
    http::{HeaderMap, header::{self, IntoHeaderName, HeaderValue}, StatusCode, Method, Uri},
};

/// Trigger delivered by the host for a single invocation. The counter function never looks inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationEvent {
    #[serde(with = "http_serde::method")]
    pub method: Method,
    #[serde(with = "http_serde::uri")]
    pub url: Uri,
}

impl InvocationEvent {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            url: Uri::from_static("/"),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_url(mut self, url: Uri) -> Self {
        self.url = url;
        self
    }
}

impl Default for InvocationEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationContext {
    pub invocation_id: u64,
}

impl InvocationContext {
    pub fn new(invocation_id: u64) -> Self {
        Self {
            invocation_id,
        }
    }
}

/// HTTP-shaped response envelope produced by a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    #[serde(rename = "statusCode", with = "http_serde::status_code")]
    pub status: StatusCode,
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn with_header<K: IntoHeaderName>(mut self, header_name: K, header_value: HeaderValue) -> Self {
        self.headers.insert(header_name, header_value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Encodes `body` as the response body and marks the response as `application/json`.
    pub fn with_json_body<T: Serialize>(self, body: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(body)?;
        Ok(self
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body))
    }

    pub fn json_body<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct CounterBody {
    pub count: u64,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
