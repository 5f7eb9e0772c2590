use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;

type Reply = Result<HttpResponse, TransportError>;

struct Route {
    suffix: String,
    replies: VecDeque<Reply>,
}

/// Scripted transport for tests and dry runs.
///
/// Replies are queued per URL suffix and consumed in order; the last reply of
/// a route is repeated once the queue drains. Requests to unscripted URLs get
/// a 404. Every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for requests whose URL ends with `suffix`
    pub fn reply(&self, suffix: &str, status: u16, body: impl Into<Bytes>) -> &Self {
        self.push(suffix, Ok(HttpResponse::new(status, body)))
    }

    pub fn reply_json(&self, suffix: &str, status: u16, value: serde_json::Value) -> &Self {
        self.reply(suffix, status, value.to_string())
    }

    /// Queue a transport-level failure
    pub fn fail(&self, suffix: &str, error: TransportError) -> &Self {
        self.push(suffix, Err(error))
    }

    fn push(&self, suffix: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock();
        match routes.iter_mut().find(|r| r.suffix == suffix) {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                suffix: suffix.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of recorded requests whose URL ends with `suffix`
    pub fn count(&self, suffix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = {
            let mut routes = self.routes.lock();
            // Longest matching suffix wins so "/tasks/submit" is not served by "/tasks".
            let route = routes
                .iter_mut()
                .filter(|r| request.url.ends_with(&r.suffix))
                .max_by_key(|r| r.suffix.len());

            match route {
                Some(route) if route.replies.len() > 1 => route.replies.pop_front(),
                Some(route) => route.replies.front().cloned(),
                None => None,
            }
        };

        self.requests.lock().push(request);
        reply.unwrap_or_else(|| Ok(HttpResponse::new(404, Bytes::from_static(b"not scripted"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_sticky() {
        let mock = MockTransport::new();
        mock.reply("/tasks", 429, "").reply("/tasks", 200, "ok");

        let first = mock.send(HttpRequest::post("http://h/tasks")).await.unwrap();
        let second = mock.send(HttpRequest::post("http://h/tasks")).await.unwrap();
        let third = mock.send(HttpRequest::post("http://h/tasks")).await.unwrap();

        assert_eq!(first.status, 429);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(mock.count("/tasks"), 3);
    }

    #[tokio::test]
    async fn test_longest_suffix_wins() {
        let mock = MockTransport::new();
        mock.reply("/tasks", 200, "fetch").reply("/tasks/submit", 204, "");

        let submit = mock.send(HttpRequest::post("http://h/tasks/submit")).await.unwrap();
        assert_eq!(submit.status, 204);
        assert_eq!(mock.count("/tasks/submit"), 1);
    }

    #[tokio::test]
    async fn test_unscripted_is_404_and_failures_surface() {
        let mock = MockTransport::new();
        mock.fail("/nonce", TransportError::Timeout);

        let unscripted = mock.send(HttpRequest::get("http://h/other")).await.unwrap();
        assert_eq!(unscripted.status, 404);

        let failed = mock.send(HttpRequest::get("http://h/nonce")).await;
        assert_eq!(failed, Err(TransportError::Timeout));
        assert_eq!(mock.requests().len(), 2);
    }
}
