//! One logical REST call.

use crate::RequestBody;
use derive_getters::Getters;
use parley_core::CompiledRoute;
use parley_error::{BuilderError, BuilderErrorKind};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;

/// A compiled route plus everything needed to dispatch it.
///
/// # Example
///
/// ```
/// use parley_core::routes;
/// use parley_rest::RestRequest;
/// use serde_json::json;
///
/// let route = routes::POST_CHANNEL_MESSAGES.compile(&[("channel", &1u64)]).unwrap();
/// let request = RestRequest::builder()
///     .route(route)
///     .json(json!({"content": "hello"}))
///     .reason("greeting")
///     .build()
///     .unwrap();
///
/// assert!(!request.no_auth());
/// assert_eq!(request.reason().as_deref(), Some("greeting"));
/// ```
#[derive(Clone, derive_builder::Builder, Getters)]
#[builder(setter(into), build_fn(private, name = "build_internal"))]
pub struct RestRequest {
    /// Route to call.
    route: CompiledRoute,
    /// Query string parameters.
    #[builder(default)]
    query: Vec<(String, String)>,
    /// JSON body.
    #[builder(default, setter(into, strip_option))]
    json: Option<JsonValue>,
    /// Form body.
    #[builder(default, setter(into, strip_option))]
    form: Option<Vec<(String, String)>>,
    /// Extra request headers.
    #[builder(default)]
    headers: Vec<(String, String)>,
    /// Audit log reason.
    #[builder(default, setter(into, strip_option))]
    reason: Option<String>,
    /// Send without credentials and bypass the global throttle.
    #[builder(default)]
    #[getter(skip)]
    no_auth: bool,
    /// `Authorization` value overriding the token strategy.
    #[builder(default, setter(into, strip_option))]
    #[getter(skip)]
    auth: Option<String>,
    /// Deadline for the whole call, retries included.
    #[builder(default, setter(into, strip_option))]
    deadline: Option<Duration>,
}

impl RestRequestBuilder {
    /// Append one query parameter.
    pub fn query_param(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.query
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.to_string()));
        self
    }

    /// Append one header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    /// Build the RestRequest.
    ///
    /// # Errors
    ///
    /// Returns error if the route is missing or both a JSON and a form body are set.
    pub fn build(&self) -> Result<RestRequest, BuilderError> {
        let request = self.build_internal().map_err(|e| match e {
            RestRequestBuilderError::UninitializedField(field) => {
                BuilderError::new(BuilderErrorKind::MissingField(field.to_string()))
            }
            RestRequestBuilderError::ValidationError(reason) => {
                BuilderError::new(BuilderErrorKind::InvalidField {
                    field: "request".to_string(),
                    reason,
                })
            }
        })?;
        if request.json.is_some() && request.form.is_some() {
            return Err(BuilderError::new(BuilderErrorKind::ConflictingBodies));
        }
        Ok(request)
    }
}

impl RestRequest {
    /// Start building a request.
    pub fn builder() -> RestRequestBuilder {
        RestRequestBuilder::default()
    }

    /// Request with no body, query or extra headers.
    pub fn new(route: CompiledRoute) -> Self {
        Self {
            route,
            query: Vec::new(),
            json: None,
            form: None,
            headers: Vec::new(),
            reason: None,
            no_auth: false,
            auth: None,
            deadline: None,
        }
    }

    /// Send without credentials and bypass the global throttle.
    pub fn no_auth(&self) -> bool {
        self.no_auth
    }

    /// `Authorization` override, if any.
    pub fn auth(&self) -> Option<&str> {
        self.auth.as_deref()
    }

    /// Body to send, if any.
    pub fn body(&self) -> Option<RequestBody> {
        match (&self.json, &self.form) {
            (Some(json), _) => Some(RequestBody::Json(json.clone())),
            (None, Some(form)) => Some(RequestBody::Form(form.clone())),
            (None, None) => None,
        }
    }
}

impl fmt::Debug for RestRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestRequest")
            .field("route", &self.route.to_string())
            .field("query", &self.query)
            .field("has_json", &self.json.is_some())
            .field("has_form", &self.form.is_some())
            .field("headers", &self.headers.len())
            .field("reason", &self.reason)
            .field("no_auth", &self.no_auth)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .field("deadline", &self.deadline)
            .finish()
    }
}
