use axum::http::{Method, Uri};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 路由表错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route pattern cannot be empty")]
    EmptyPattern,

    #[error("duplicate route for path '{0}'")]
    Duplicate(String),

    #[error("no route for path '{0}'")]
    NotFound(String),
}

/// 请求所经过的监听器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 交给路由处理函数的请求信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub scheme: Scheme,
}

impl Request {
    /// 从 HTTP 请求的方法和 URI 构造，查询串不参与路由
    pub fn from_http(method: &Method, uri: &Uri, scheme: Scheme) -> Self {
        Self {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            scheme,
        }
    }
}

/// 路由处理函数，返回响应体
pub type Handler = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// 构建路由表，重复或空路径返回错误
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: HashMap<String, Handler>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(mut self, path: &str, handler: F) -> Result<Self, RouteError>
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        if path.is_empty() {
            return Err(RouteError::EmptyPattern);
        }
        if self.routes.contains_key(path) {
            return Err(RouteError::Duplicate(path.to_string()));
        }
        self.routes.insert(path.to_string(), Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: Arc::new(self.routes),
        }
    }
}

/// 不可变路由表，构建后在所有连接间共享
#[derive(Clone)]
pub struct RouteTable {
    routes: Arc<HashMap<String, Handler>>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    pub fn resolve(&self, path: &str) -> Result<&Handler, RouteError> {
        self.routes
            .get(path)
            .ok_or_else(|| RouteError::NotFound(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.routes.keys().collect();
        paths.sort();
        f.debug_struct("RouteTable").field("paths", &paths).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request {
        Request {
            method: "GET".into(),
            path: path.into(),
            scheme: Scheme::Http,
        }
    }

    #[test]
    fn test_resolve_registered_route() {
        let table = RouteTable::builder()
            .route("/", |req| format!("{} root", req.scheme))
            .unwrap()
            .route("/health", |_| "ok".into())
            .unwrap()
            .build();

        assert_eq!(table.len(), 2);
        let handler = table.resolve("/").unwrap();
        assert_eq!(handler(&request("/")), "http root");
        assert_eq!(table.resolve("/health").unwrap()(&request("/health")), "ok");
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let err = RouteTable::builder()
            .route("/", |_| String::new())
            .unwrap()
            .route("/", |_| String::new())
            .err()
            .unwrap();
        assert_eq!(err, RouteError::Duplicate("/".into()));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = RouteTable::builder().route("", |_| String::new()).err().unwrap();
        assert_eq!(err, RouteError::EmptyPattern);
    }

    #[test]
    fn test_missing_route() {
        let table = RouteTable::builder().build();
        assert!(table.is_empty());
        assert_eq!(
            table.resolve("/nope").err().unwrap(),
            RouteError::NotFound("/nope".into())
        );
    }

    #[test]
    fn test_request_from_http_drops_query() {
        let uri: Uri = "https://b.local/status?verbose=1".parse().unwrap();
        let req = Request::from_http(&Method::POST, &uri, Scheme::Https);
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/status");
        assert_eq!(req.scheme, Scheme::Https);

        let origin: Uri = "/".parse().unwrap();
        assert_eq!(Request::from_http(&Method::GET, &origin, Scheme::Http).path, "/");
    }
}
