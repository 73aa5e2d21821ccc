use {
    tracing::{debug, error},
    http::{StatusCode, header::{self, HeaderValue}},
    visitor_counter_core::{HttpResponse, CounterBody, ErrorBody, InvocationEvent, InvocationContext},
    crate::{
        config::ErrorPolicy,
        error::CounterError,
        storage::{AttributeValue, BoxedCounterStore, CounterStore},
    },
};

pub const COUNTER_RECORD_ID: &str = "visitors";
pub const COUNTER_ATTRIBUTE: &str = "count";

const FALLBACK_ERROR_BODY: &str = r#"{"error":"internal error"}"#;

// past 2^53 an f64 no longer tells neighbouring integers apart
const MAX_EXACT_REAL: f64 = 9_007_199_254_740_991.0;

/// Increments the visitor counter once per invocation and reports the new value.
/// Holds nothing but the store handle, so one instance can serve any number of concurrent invocations.
pub struct CounterService {
    store: BoxedCounterStore,
    error_policy: ErrorPolicy,
}

impl CounterService {
    pub fn new(store: BoxedCounterStore) -> Self {
        Self {
            store,
            error_policy: ErrorPolicy::Guarded,
        }
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// With [`ErrorPolicy::Guarded`] this never returns `Err`: failures become a 500 response.
    pub fn handle(&self, _event: &InvocationEvent, _context: &InvocationContext) -> Result<HttpResponse, CounterError> {
        match self.increment() {
            Ok(response) => Ok(response),
            Err(err) => match self.error_policy {
                ErrorPolicy::Guarded => {
                    error!("failed to increment visitor counter: {err}");
                    Ok(error_response(&err))
                },
                ErrorPolicy::Unguarded => Err(err),
            },
        }
    }

    fn increment(&self) -> Result<HttpResponse, CounterError> {
        let value = self.store.add(COUNTER_RECORD_ID, COUNTER_ATTRIBUTE, 1)?;
        let count = coerce_count(value)?;
        debug!(count, "visitor counter incremented");

        with_cors_headers(HttpResponse::new())
            .with_json_body(&CounterBody { count })
            .map_err(|err| CounterError::SerializationFailure { reason: err.to_string() })
    }
}

/// Runs one invocation outside of any host and returns the serialized response envelope.
/// A failure only surfaces as `Err` with [`ErrorPolicy::Unguarded`].
pub fn invoke_once(service: &CounterService) -> Result<String, CounterError> {
    let response = service.handle(&InvocationEvent::new(), &InvocationContext::new(0))?;
    serde_json::to_string(&response)
        .map_err(|err| CounterError::SerializationFailure { reason: err.to_string() })
}

/// Turns whatever numeric representation the store returned into a plain counter value.
pub fn coerce_count(value: AttributeValue) -> Result<u64, CounterError> {
    let count = match &value {
        AttributeValue::Integer(v) => u64::try_from(*v).ok(),
        AttributeValue::Real(v) => integral_to_u64(*v),
        AttributeValue::Decimal(v) | AttributeValue::Text(v) => parse_decimal(v),
        AttributeValue::Null => {
            return Err(CounterError::RecordMissingOrMalformed { reason: format!("`{COUNTER_ATTRIBUTE}` attribute is missing") });
        },
    };

    count.ok_or_else(|| CounterError::RecordMissingOrMalformed {
        reason: format!("`{COUNTER_ATTRIBUTE}` is not a non-negative integer: {value:?}"),
    })
}

fn parse_decimal(text: &str) -> Option<u64> {
    let text = text.trim();
    text.parse::<u64>().ok()
        .or_else(|| text.parse::<f64>().ok().and_then(integral_to_u64))
}

fn integral_to_u64(value: f64) -> Option<u64> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= MAX_EXACT_REAL {
        Some(value as u64)
    } else {
        None
    }
}

fn error_response(err: &CounterError) -> HttpResponse {
    let body = serde_json::to_string(&ErrorBody { error: err.to_string() })
        .unwrap_or_else(|_| FALLBACK_ERROR_BODY.to_owned());

    with_cors_headers(HttpResponse::new())
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(body)
}

fn with_cors_headers(response: HttpResponse) -> HttpResponse {
    response
        .with_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
        .with_header(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET"))
}
