//! Route templates and their compiled form.

use crate::HttpMethod;
use parley_error::{RouteError, RouteErrorKind};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Parameters that scope a rate-limit bucket.
///
/// Two calls to the same template with different values for any of these
/// are limited independently by the platform.
pub const MAJOR_PARAMETERS: [&str; 3] = ["channel", "guild", "webhook"];

/// Webhook tokens are part of the bucket scope but only enter keys hashed.
const TOKEN_PARAMETER: &str = "token";

/// An HTTP method plus a URI template with `{name}` placeholders.
///
/// Routes are static definitions; see [`crate::routes`] for the catalog.
///
/// # Examples
///
/// ```
/// use parley_core::{HttpMethod, Route};
///
/// const GET_CHANNEL: Route = Route::new(HttpMethod::Get, "/channels/{channel}");
///
/// let compiled = GET_CHANNEL.compile(&[("channel", &123u64)]).unwrap();
/// assert_eq!(compiled.path(), "/channels/123");
/// assert_eq!(compiled.major_params(), "123");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    method: HttpMethod,
    template: &'static str,
}

impl Route {
    /// Define a route.
    pub const fn new(method: HttpMethod, template: &'static str) -> Self {
        Self { method, template }
    }

    /// HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// URI template.
    pub fn template(&self) -> &'static str {
        self.template
    }

    /// Placeholder names in template order.
    pub fn parameters(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut rest = self.template;
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    names.push(&after[..close]);
                    rest = &after[close + 1..];
                }
                None => break,
            }
        }
        names
    }

    /// Substitute every placeholder, producing a [`CompiledRoute`].
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] when a placeholder has no value or a value is
    /// supplied for a name the template does not contain.
    pub fn compile(&self, params: &[(&str, &dyn fmt::Display)]) -> Result<CompiledRoute, RouteError> {
        let names = self.parameters();

        if let Some((unknown, _)) = params.iter().find(|(name, _)| !names.contains(name)) {
            return Err(RouteError::new(RouteErrorKind::UnknownParameter {
                template: self.template.to_string(),
                parameter: unknown.to_string(),
            }));
        }

        let mut path = String::with_capacity(self.template.len());
        let mut major = Vec::new();
        let mut token_hash = None;
        let mut rest = self.template;

        // Substituted values are never rescanned for placeholders.
        while let Some((open, close)) = rest
            .find('{')
            .and_then(|open| rest[open..].find('}').map(|len| (open, open + len)))
        {
            let name = &rest[open + 1..close];
            let value = params
                .iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, value)| value.to_string())
                .ok_or_else(|| {
                    RouteError::new(RouteErrorKind::MissingParameter {
                        template: self.template.to_string(),
                        parameter: name.to_string(),
                    })
                })?;

            if MAJOR_PARAMETERS.contains(&name) {
                major.push(value.clone());
            } else if name == TOKEN_PARAMETER {
                let mut hasher = DefaultHasher::new();
                value.hash(&mut hasher);
                token_hash = Some(format!("{:016x}", hasher.finish()));
            }

            path.push_str(&rest[..open]);
            path.push_str(&value);
            rest = &rest[close + 1..];
        }
        path.push_str(rest);

        if let Some(hash) = token_hash {
            major.push(hash);
        }

        let major_params = if major.is_empty() {
            "-".to_string()
        } else {
            major.join(":")
        };

        Ok(CompiledRoute {
            route: *self,
            path,
            major_params,
        })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

/// A route with concrete parameter values, ready for dispatch.
///
/// `Display` renders the route identity and major parameters only. The
/// compiled path is never printed since it may contain a webhook token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledRoute {
    route: Route,
    path: String,
    major_params: String,
}

impl CompiledRoute {
    /// The route this was compiled from.
    pub fn route(&self) -> Route {
        self.route
    }

    /// HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.route.method
    }

    /// URI template.
    pub fn template(&self) -> &'static str {
        self.route.template
    }

    /// Concrete path relative to the API base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Major parameter values joined with `:`, or `-` when there are none.
    pub fn major_params(&self) -> &str {
        &self.major_params
    }

    /// `METHOD template`, shared by every compilation of the same route.
    pub fn route_identity(&self) -> String {
        self.route.to_string()
    }

    /// Bucket key under a server-assigned bucket hash.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley_core::routes;
    ///
    /// let compiled = routes::GET_GUILD.compile(&[("guild", &42u64)]).unwrap();
    /// assert_eq!(compiled.bucket_key("abcd"), "abcd;42");
    /// ```
    pub fn bucket_key(&self, bucket_hash: &str) -> String {
        format!("{};{}", bucket_hash, self.major_params)
    }
}

impl fmt::Display for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.route, self.major_params)
    }
}
