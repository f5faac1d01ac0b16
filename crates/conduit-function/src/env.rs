//! Function host environment.
//!
//! OpenFaaS-style watchdogs re-expose the inbound HTTP request as
//! environment variables:
//!
//! | Variable          | Meaning                                     |
//! |-------------------|---------------------------------------------|
//! | `Http_Method`     | request method                              |
//! | `Http_Path`       | request path                                |
//! | `Http_Query`      | raw query string                            |
//! | `Http_<Header>`   | one per header, `-` replaced by `_`         |
//!
//! The function's own name and namespace come from [`FUNCTION_NAME_VAR`]
//! and [`NAMESPACE_VAR`].

use std::collections::BTreeMap;

/// Prefix of the variables carrying the inbound HTTP request.
pub const HTTP_PREFIX: &str = "Http_";

/// Variable naming the deployed function.
pub const FUNCTION_NAME_VAR: &str = "faas_function_name";

/// Variable naming the function's namespace.
pub const NAMESPACE_VAR: &str = "faas_namespace";

/// Variable holding the process the watchdog forks per invocation.
pub const FPROCESS_VAR: &str = "fprocess";

const METHOD_VAR: &str = "Http_Method";
const PATH_VAR: &str = "Http_Path";
const QUERY_VAR: &str = "Http_Query";

/// A snapshot of the variables one invocation sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionEnv {
    vars: BTreeMap<String, String>,
}

impl FunctionEnv {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Builds an environment from explicit pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Builds the environment a watchdog would expose for an HTTP request.
    pub fn from_http_parts(parts: &http::request::Parts) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(METHOD_VAR.to_string(), parts.method.as_str().to_string());
        vars.insert(PATH_VAR.to_string(), parts.uri.path().to_string());
        if let Some(query) = parts.uri.query() {
            vars.insert(QUERY_VAR.to_string(), query.to_string());
        }
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                vars.insert(header_var(name.as_str()), value.to_string());
            }
        }
        Self { vars }
    }

    /// Adds or replaces one variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Returns a non-empty variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.as_str().trim())
            .filter(|v| !v.is_empty())
    }

    /// Returns the inbound request method.
    pub fn method(&self) -> Option<&str> {
        self.get(METHOD_VAR)
    }

    /// Returns the inbound request path.
    pub fn path(&self) -> Option<&str> {
        self.get(PATH_VAR)
    }

    /// Returns the inbound query string.
    pub fn query(&self) -> Option<&str> {
        self.get(QUERY_VAR)
    }

    /// Returns a header by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = header_var(name);
        self.vars
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(&wanted))
            .map(|(_, value)| value.trim())
            .filter(|v| !v.is_empty())
    }

    /// Returns every re-exposed header as `(lowercase-name, value)`.
    pub fn headers(&self) -> impl Iterator<Item = (String, &str)> {
        self.vars.iter().filter_map(|(key, value)| {
            if key == METHOD_VAR || key == PATH_VAR || key == QUERY_VAR {
                return None;
            }
            let rest = key.strip_prefix(HTTP_PREFIX)?;
            if rest.is_empty() {
                return None;
            }
            Some((rest.replace('_', "-").to_ascii_lowercase(), value.as_str()))
        })
    }

    /// Returns the deployed function name.
    pub fn function_name(&self) -> Option<&str> {
        self.get(FUNCTION_NAME_VAR)
    }

    /// Returns the function namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.get(NAMESPACE_VAR)
    }
}

fn header_var(name: &str) -> String {
    let mut var = String::with_capacity(HTTP_PREFIX.len() + name.len());
    var.push_str(HTTP_PREFIX);
    for (i, part) in name.split('-').enumerate() {
        if i > 0 {
            var.push('_');
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            var.push(first.to_ascii_uppercase());
            var.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }
    var
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> FunctionEnv {
        FunctionEnv::from_vars([
            ("Http_Method", "POST"),
            ("Http_Path", "/orders"),
            ("Http_Query", "dry_run=1"),
            ("Http_Content_Type", "application/json"),
            ("Http_X_Call_Id", "call-1"),
            ("faas_function_name", "orders"),
            ("PATH", "/usr/bin"),
        ])
    }

    #[test]
    fn test_request_fields() {
        let env = env();
        assert_eq!(env.method(), Some("POST"));
        assert_eq!(env.path(), Some("/orders"));
        assert_eq!(env.query(), Some("dry_run=1"));
        assert_eq!(env.function_name(), Some("orders"));
        assert_eq!(env.namespace(), None);
    }

    #[test]
    fn test_headers() {
        let env = env();
        assert_eq!(env.header("x-call-id"), Some("call-1"));
        assert_eq!(env.header("Content-Type"), Some("application/json"));

        let mut headers: Vec<_> = env.headers().collect();
        headers.sort();
        assert_eq!(
            headers,
            vec![
                ("content-type".to_string(), "application/json"),
                ("x-call-id".to_string(), "call-1"),
            ]
        );
    }

    #[test]
    fn test_from_http_parts() {
        let (parts, ()) = http::Request::builder()
            .method("PUT")
            .uri("/items/7?full=true")
            .header("x-request-id", "r-1")
            .body(())
            .unwrap()
            .into_parts();

        let env = FunctionEnv::from_http_parts(&parts);
        assert_eq!(env.method(), Some("PUT"));
        assert_eq!(env.path(), Some("/items/7"));
        assert_eq!(env.query(), Some("full=true"));
        assert_eq!(env.get("Http_X_Request_Id"), Some("r-1"));
        assert_eq!(env.header("x-request-id"), Some("r-1"));
    }

    #[test]
    fn test_blank_values_ignored() {
        let env = FunctionEnv::from_vars([("faas_function_name", "  ")]);
        assert_eq!(env.function_name(), None);
    }
}
